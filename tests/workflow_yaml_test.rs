//! Workflow documents: YAML round-trip and strict parsing
//!
//! The fixture is the gloo rate-limiting walkthrough: install, deploy the
//! petstore, then tighten rate limits step by step and check each stage.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use valet::loader;
use valet::step::{Condition, Curl, InstallHelmChart, Patch, ServiceRef, Step};
use valet::{Values, Workflow};

// =============================================================================
// FIXTURE
// =============================================================================

fn gateway_proxy() -> Option<ServiceRef> {
    Some(ServiceRef::new("gateway-proxy", "gloo-system"))
}

fn install_gloo() -> Step {
    Step::InstallHelmChart(InstallHelmChart {
        release_name: "gloo".to_string(),
        release_uri: "https://storage.googleapis.com/gloo-ee-helm/charts/gloo-ee-1.3.0.tgz".to_string(),
        namespace: "gloo-system".to_string(),
        wait_for_pods: true,
        set: [("license_key".to_string(), "env:LICENSE_KEY".to_string())].into(),
        ..Default::default()
    })
}

fn patch_settings(path: &str) -> Step {
    Step::Patch(Patch {
        name: "default".to_string(),
        namespace: "gloo-system".to_string(),
        kube_type: "settings".to_string(),
        patch_type: "merge".to_string(),
        path: path.to_string(),
        ..Default::default()
    })
}

fn curl_status(status: u16) -> Curl {
    Curl {
        service: gateway_proxy(),
        path: "/sample-route-1".to_string(),
        status_code: status,
        ..Default::default()
    }
}

fn curl_with_headers(status: u16, kind: &str, number: &str) -> Step {
    let headers: BTreeMap<String, String> = [
        ("x-type".to_string(), kind.to_string()),
        ("x-number".to_string(), number.to_string()),
    ]
    .into();
    Step::Curl(Curl {
        headers,
        ..curl_status(status)
    })
}

fn curl_with_token(status: u16, token: &str) -> Curl {
    Curl {
        headers: [("x-token".to_string(), token.to_string())].into(),
        ..curl_status(status)
    }
}

fn rate_limit_workflow() -> Workflow {
    let eventual = Curl {
        attempts: 100,
        delay: "100ms".to_string(),
        ..curl_with_token(429, "token-3")
    };
    Workflow {
        values: Values::new().with("Namespace", "gloo-system"),
        steps: vec![
            install_gloo(),
            Step::apply("petstore.yaml"),
            Step::wait_for_pods("default"),
            Step::apply("vs-petstore-1.yaml"),
            Step::Curl(Curl {
                response_body: r#"[{"id":1,"name":"Dog","status":"available"},{"id":2,"name":"Cat","status":"pending"}]"#.to_string(),
                ..curl_status(200)
            }),
            Step::Condition(Condition {
                kube_type: "settings".to_string(),
                name: "default".to_string(),
                jsonpath: "{.metadata.generation}".to_string(),
                value: "1".to_string(),
                timeout: "30s".to_string(),
                ..Default::default()
            }),
            patch_settings("settings-patch-1.yaml"),
            Step::apply("vs-petstore-2.yaml"),
            Step::Curl(curl_status(429)),
            patch_settings("settings-patch-2.yaml"),
            Step::apply("vs-petstore-3.yaml"),
            curl_with_headers(429, "Messenger", "311"),
            curl_with_headers(429, "Whatsapp", "311"),
            curl_with_headers(200, "Whatsapp", "411"),
            Step::apply("vs-petstore-4.yaml"),
            Step::Curl(curl_with_token(429, "token-1")),
            Step::Curl(curl_with_token(429, "token-2")),
            Step::Curl(curl_with_token(200, "token-3")),
            Step::Curl(eventual),
        ],
    }
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_workflow_round_trip() {
    let initial = rate_limit_workflow();

    let yaml = serde_yaml::to_string(&initial).unwrap();
    let parsed: Workflow = loader::parse(&yaml, "workflow.yaml").unwrap();

    assert_eq!(parsed, initial);
}

#[tokio::test]
async fn test_workflow_round_trip_through_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = dir.path().join("workflow.yaml");
    std::fs::write(&file, serde_yaml::to_string(&rate_limit_workflow()).unwrap()).unwrap();

    let loaded = Workflow::load(&file).await.unwrap();

    assert_eq!(loaded, rate_limit_workflow());
}

#[test]
fn test_serialized_form_is_camel_case() {
    let yaml = serde_yaml::to_string(&rate_limit_workflow()).unwrap();
    assert!(yaml.contains("installHelmChart:"));
    assert!(yaml.contains("releaseUri:"));
    assert!(yaml.contains("waitForPods: true"));
    assert!(yaml.contains("statusCode: 429"));
    assert!(yaml.contains("kubeType: settings"));
    assert!(yaml.contains("condition:"));
    assert!(yaml.contains("type: settings"));
    assert!(!yaml.contains("null"));
}

// =============================================================================
// STRICT PARSING
// =============================================================================

#[test]
fn test_unknown_step_field_rejected() {
    let yaml = r#"
steps:
  - curl:
      path: /
      statusCod: 200
"#;
    let err = loader::parse::<Workflow>(yaml, "workflow.yaml").unwrap_err();
    assert!(err.to_string().contains("statusCod"));
}

#[test]
fn test_step_with_two_actions_rejected() {
    let yaml = r#"
steps:
  - apply:
      path: a.yaml
    waitForPods:
      namespace: default
"#;
    let err = loader::parse::<Workflow>(yaml, "workflow.yaml").unwrap_err();
    assert!(err.to_string().contains("more than one action set: apply, waitForPods"));
}

#[test]
fn test_unknown_step_kind_rejected() {
    let yaml = "steps:\n  - provision:\n      name: cluster\n";
    let err = loader::parse::<Workflow>(yaml, "workflow.yaml").unwrap_err();
    assert!(err.to_string().contains("provision"));
}
