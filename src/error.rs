//! Valet Error Types with Error Codes
//!
//! Error code ranges:
//! - VALET-001-009: Configuration errors
//! - VALET-010-019: Resolution errors
//! - VALET-020-029: Verification errors
//! - VALET-030-039: External collaborator errors
//! - VALET-090-099: IO/parse errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValetError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum ValetError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (001-009)
    // ═══════════════════════════════════════════
    #[error("[VALET-001] Failed to parse '{path}': {details}")]
    ParseError { path: String, details: String },

    #[error("[VALET-002] Invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("[VALET-003] Required value '{key}' was not provided")]
    RequiredValueNotProvided { key: String },

    #[error("[VALET-004] Must specify exactly one of service or portForward")]
    InvalidTarget,

    #[error("[VALET-005] Ciphertext files must end with '.enc', got '{path}'")]
    InvalidCiphertextFilename { path: String },

    #[error("[VALET-006] Invalid step: {reason}")]
    InvalidStep { reason: String },

    #[error("[VALET-007] Invalid resource: {reason}")]
    InvalidResource { reason: String },

    // ═══════════════════════════════════════════
    // RESOLUTION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[VALET-010] Value '{key}' is not defined")]
    UndefinedValue { key: String },

    #[error("[VALET-011] Value cycle detected: {chain}")]
    ValueCycle { chain: String },

    #[error("[VALET-012] Template parse error at position {position}: {details}")]
    TemplateParse { position: usize, details: String },

    #[error("[VALET-013] Cannot assign '{value}' to field '{field}': {reason}")]
    FieldConversion {
        field: String,
        value: String,
        reason: String,
    },

    #[error("[VALET-014] Field '{field}' is declared but not addressable on {type_name}")]
    UnknownField {
        field: String,
        type_name: &'static str,
    },

    #[error("[VALET-015] Missing environment variable {name}")]
    MissingEnvVar { name: String },

    // ═══════════════════════════════════════════
    // VERIFICATION ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[VALET-020] Curl got unexpected status code {status}")]
    UnexpectedStatusCode { status: u16 },

    #[error("[VALET-021] Curl got unexpected response body:\n{body}")]
    UnexpectedResponseBody { body: String },

    #[error("[VALET-022] Condition on {target} not met: expected '{expected}', got '{actual}'")]
    ConditionNotMet {
        target: String,
        expected: String,
        actual: String,
    },

    // ═══════════════════════════════════════════
    // EXTERNAL COLLABORATOR ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[VALET-030] Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("[VALET-031] HTTP request failed: {reason}")]
    HttpError { reason: String },

    #[error("[VALET-032] Unable to decrypt file: {reason}")]
    DecryptFailed { reason: String },

    #[error("[VALET-033] Unable to cleanup plaintext file '{path}': {reason}")]
    PlaintextCleanupFailed { path: String, reason: String },

    #[error("[VALET-034] Unable to stop process '{command}': {reason}")]
    ProcessCleanup { command: String, reason: String },

    #[error("[VALET-035] Kubernetes query failed: {reason}")]
    KubeError { reason: String },

    #[error("[VALET-036] Operation cancelled")]
    Cancelled,

    // ═══════════════════════════════════════════
    // IO/PARSE ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[VALET-090] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[VALET-091] YAML error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("[VALET-092] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[VALET-093] Cannot read '{path}': {reason}")]
    FileRead { path: String, reason: String },
}

impl ValetError {
    /// Get the error code (e.g., "VALET-003")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "VALET-001",
            Self::ConfigError { .. } => "VALET-002",
            Self::RequiredValueNotProvided { .. } => "VALET-003",
            Self::InvalidTarget => "VALET-004",
            Self::InvalidCiphertextFilename { .. } => "VALET-005",
            Self::InvalidStep { .. } => "VALET-006",
            Self::InvalidResource { .. } => "VALET-007",
            Self::UndefinedValue { .. } => "VALET-010",
            Self::ValueCycle { .. } => "VALET-011",
            Self::TemplateParse { .. } => "VALET-012",
            Self::FieldConversion { .. } => "VALET-013",
            Self::UnknownField { .. } => "VALET-014",
            Self::MissingEnvVar { .. } => "VALET-015",
            Self::UnexpectedStatusCode { .. } => "VALET-020",
            Self::UnexpectedResponseBody { .. } => "VALET-021",
            Self::ConditionNotMet { .. } => "VALET-022",
            Self::CommandFailed { .. } => "VALET-030",
            Self::HttpError { .. } => "VALET-031",
            Self::DecryptFailed { .. } => "VALET-032",
            Self::PlaintextCleanupFailed { .. } => "VALET-033",
            Self::ProcessCleanup { .. } => "VALET-034",
            Self::KubeError { .. } => "VALET-035",
            Self::Cancelled => "VALET-036",
            Self::IoError(_) => "VALET-090",
            Self::YamlParse(_) => "VALET-091",
            Self::JsonError(_) => "VALET-092",
            Self::FileRead { .. } => "VALET-093",
        }
    }
}

impl FixSuggestion for ValetError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ValetError::ParseError { .. } => Some("Check YAML syntax and field names"),
            ValetError::ConfigError { .. } => {
                Some("Check ~/.config/valet/global.yaml for syntax errors")
            }
            ValetError::RequiredValueNotProvided { .. } => {
                Some("Pass the value with --set Key=Value or add it to 'values:'")
            }
            ValetError::InvalidTarget => Some("Set either 'service' or 'portForward', not both"),
            ValetError::InvalidCiphertextFilename { .. } => {
                Some("Rename the encrypted file so it ends with '.enc'")
            }
            ValetError::InvalidStep { .. } => Some("Each step must set exactly one action"),
            ValetError::InvalidResource { .. } => {
                Some("Each resource and secret entry must set exactly one kind")
            }
            ValetError::UndefinedValue { .. } => Some("Define the key in 'values:'"),
            ValetError::ValueCycle { .. } => Some("Break the chain of 'key:' references"),
            ValetError::TemplateParse { .. } => Some("Use {{ .Name }} placeholder syntax"),
            ValetError::FieldConversion { .. } => {
                Some("Check the value has the type the field expects")
            }
            ValetError::UnknownField { .. } => None,
            ValetError::MissingEnvVar { .. } => {
                Some("Export the variable or add it to the global config 'env:' map")
            }
            ValetError::UnexpectedStatusCode { .. } | ValetError::UnexpectedResponseBody { .. } => {
                Some("Increase attempts/delay or check the service configuration")
            }
            ValetError::ConditionNotMet { .. } => {
                Some("Increase the timeout or check the object with kubectl get -o jsonpath")
            }
            ValetError::CommandFailed { .. } => Some("Check kubectl/helm/gcloud are installed"),
            ValetError::HttpError { .. } => Some("Check the endpoint is reachable"),
            ValetError::DecryptFailed { .. } => Some("Check gcloud credentials and key names"),
            ValetError::PlaintextCleanupFailed { .. } => {
                Some("Remove the plaintext file manually")
            }
            ValetError::ProcessCleanup { .. } => Some("Kill the leftover process manually"),
            ValetError::KubeError { .. } => Some("Check the kube context is reachable"),
            ValetError::Cancelled => None,
            ValetError::IoError(_) => Some("Check file path and permissions"),
            ValetError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            ValetError::JsonError(_) => Some("Check JSON syntax"),
            ValetError::FileRead { .. } => {
                Some("Paths are relative to the directory valet is run from")
            }
        }
    }
}
