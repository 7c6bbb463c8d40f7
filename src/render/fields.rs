//! Field Renderer - static binding tables instead of reflection
//!
//! Each renderable type declares a `&'static [FieldSpec]` and hands out
//! `&mut dyn FieldValue` for every named field. [`render_fields`] walks the
//! table in declaration order and fills in empty fields from the value
//! store, a default, or not at all.
//!
//! ```rust,ignore
//! impl Renderable for WaitForPods {
//!     const TYPE_NAME: &'static str = "WaitForPods";
//!     const FIELDS: &'static [FieldSpec] =
//!         &[FieldSpec::new("namespace").key(NAMESPACE_KEY).required()];
//!
//!     fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue> {
//!         match name {
//!             "namespace" => Some(&mut self.namespace),
//!             _ => None,
//!         }
//!     }
//! }
//! ```

use tracing::debug;

use super::{RenderContext, Values};
use crate::error::{Result, ValetError};

/// Binding of one struct field to the value store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub key: Option<&'static str>,
    pub default: Option<&'static str>,
    pub required: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            key: None,
            default: None,
            required: false,
        }
    }

    pub const fn key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }

    pub const fn default_value(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A field slot the renderer can test and write
pub trait FieldValue {
    /// `""`, `0`, `false` and `None` count as empty
    fn is_empty(&self) -> bool;

    /// Parse `raw` into the field's type and store it
    fn assign(&mut self, raw: &str) -> std::result::Result<(), String>;
}

impl FieldValue for String {
    fn is_empty(&self) -> bool {
        str::is_empty(self)
    }

    fn assign(&mut self, raw: &str) -> std::result::Result<(), String> {
        *self = raw.to_string();
        Ok(())
    }
}

macro_rules! impl_numeric_field {
    ($($ty:ty),*) => {$(
        impl FieldValue for $ty {
            fn is_empty(&self) -> bool {
                *self == 0
            }

            fn assign(&mut self, raw: &str) -> std::result::Result<(), String> {
                *self = raw.trim().parse::<$ty>().map_err(|e| e.to_string())?;
                Ok(())
            }
        }
    )*};
}

impl_numeric_field!(u16, u32);

impl FieldValue for bool {
    fn is_empty(&self) -> bool {
        !*self
    }

    fn assign(&mut self, raw: &str) -> std::result::Result<(), String> {
        *self = raw.trim().parse::<bool>().map_err(|e| e.to_string())?;
        Ok(())
    }
}

impl<T: FieldValue + Default> FieldValue for Option<T> {
    fn is_empty(&self) -> bool {
        self.is_none()
    }

    fn assign(&mut self, raw: &str) -> std::result::Result<(), String> {
        let mut value = T::default();
        value.assign(raw)?;
        *self = Some(value);
        Ok(())
    }
}

/// `skip_serializing_if` helper for bound fields
pub fn is_unset<T: FieldValue>(value: &T) -> bool {
    value.is_empty()
}

/// A type with a static field-binding table
pub trait Renderable {
    const TYPE_NAME: &'static str;
    const FIELDS: &'static [FieldSpec];

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn FieldValue>;
}

/// Fill every empty field of `target` from `values`, in declaration order.
///
/// A failed render leaves `target` partially populated.
pub async fn render_fields<T>(target: &mut T, values: &Values, rctx: &RenderContext<'_>) -> Result<()>
where
    T: Renderable + Send,
{
    for spec in T::FIELDS {
        if !slot(target, spec)?.is_empty() {
            continue;
        }
        let Some(raw) = resolve_field(spec, values, rctx).await? else {
            continue;
        };
        debug!(type_name = T::TYPE_NAME, field = spec.name, "Rendered field");
        slot(target, spec)?
            .assign(&raw)
            .map_err(|reason| ValetError::FieldConversion {
                field: spec.name.to_string(),
                value: raw.clone(),
                reason,
            })?;
    }
    Ok(())
}

/// Names from `T::FIELDS` that `field_mut` does not answer for
pub fn unaddressable_fields<T: Renderable>(target: &mut T) -> Vec<&'static str> {
    T::FIELDS
        .iter()
        .filter(|spec| target.field_mut(spec.name).is_none())
        .map(|spec| spec.name)
        .collect()
}

fn slot<'t, T: Renderable>(target: &'t mut T, spec: &FieldSpec) -> Result<&'t mut dyn FieldValue> {
    target
        .field_mut(spec.name)
        .ok_or_else(|| ValetError::UnknownField {
            field: spec.name.to_string(),
            type_name: T::TYPE_NAME,
        })
}

/// `Ok(None)` leaves the field empty
async fn resolve_field(
    spec: &FieldSpec,
    values: &Values,
    rctx: &RenderContext<'_>,
) -> Result<Option<String>> {
    if let Some(key) = spec.key {
        match values.resolve(key, rctx).await {
            Ok(resolved) => return Ok(Some(resolved)),
            Err(err) => {
                if let Some(default) = spec.default {
                    return Ok(Some(default.to_string()));
                }
                if spec.required {
                    return Err(ValetError::RequiredValueNotProvided {
                        key: key.to_string(),
                    });
                }
                return match err {
                    ValetError::UndefinedValue { .. } => Ok(None),
                    other => Err(other),
                };
            }
        }
    }

    if let Some(default) = spec.default {
        return Ok(Some(default.to_string()));
    }
    if spec.required {
        return Err(ValetError::RequiredValueNotProvided {
            key: spec.name.to_string(),
        });
    }
    Ok(None)
}
