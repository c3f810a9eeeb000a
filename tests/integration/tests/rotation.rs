//! Rotating several credentials when one secondary store misbehaves.

use envseal_core::config::Environment;
use envseal_core::{Config, ExitStatus};
use envseal_rotation::{
    stores, AutoApprove, Orchestrator, RotationError, RotationPlan, RotationState, Selection,
    StoreSecrets,
};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREDENTIALS: &[(&str, &str, &str)] = &[
    ("one", "svc-one", "ONE_CLIENT_SECRET"),
    ("two", "svc-two", "TWO_CLIENT_SECRET"),
    ("three", "svc-three", "THREE_CLIENT_SECRET"),
];

fn config(keycloak: &MockServer, github: &MockServer) -> Config {
    let credentials: Vec<_> = CREDENTIALS
        .iter()
        .map(|(name, client_id, secret)| {
            json!({ "name": name, "client_id": client_id, "github_secret": secret })
        })
        .collect();
    let raw = json!({
        "rotation": {
            "concurrency": 2,
            "timeout_secs": 5,
            "retry": { "max_retries": 0 },
            "environments": {
                "stage": {
                    "keycloak": { "url": keycloak.uri(), "realm": "corp" },
                    "github": { "api_url": github.uri(), "repo": "acme/platform" },
                },
            },
            "credentials": credentials,
        },
    });
    Config::parse(&raw.to_string()).unwrap()
}

async fn mock_keycloak(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/realms/master/protocol/openid-connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "admin-token"})))
        .mount(server)
        .await;

    for (_, client_id, _) in CREDENTIALS {
        let uuid = format!("uuid-{client_id}");
        Mock::given(method("GET"))
            .and(path("/admin/realms/corp/clients"))
            .and(query_param("clientId", *client_id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "id": uuid, "clientId": client_id }])),
            )
            .mount(server)
            .await;

        let secret_path = format!("/admin/realms/corp/clients/{uuid}/client-secret");
        let body = json!({ "type": "secret", "value": format!("rotated-{client_id}") });
        Mock::given(method("POST"))
            .and(path(secret_path.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(secret_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

async fn mock_github(server: &MockServer, failing_secret: &str) {
    // Any 32 bytes form a valid X25519 public key.
    let public_key = format!("{}CQk=", "CQkJ".repeat(10));
    Mock::given(method("GET"))
        .and(path("/repos/acme/platform/actions/secrets/public-key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"key_id": "42", "key": public_key})),
        )
        .mount(server)
        .await;

    for (_, _, secret) in CREDENTIALS {
        let status = if *secret == failing_secret { 422 } else { 201 };
        Mock::given(method("PUT"))
            .and(path(format!("/repos/acme/platform/actions/secrets/{secret}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_partial_failure_is_isolated() {
    let keycloak = MockServer::start().await;
    let github = MockServer::start().await;
    mock_keycloak(&keycloak).await;
    mock_github(&github, "TWO_CLIENT_SECRET").await;

    let config = config(&keycloak, &github);
    config.validate().unwrap();
    let plan = RotationPlan::build(&config, Environment::Stage, &Selection::All).unwrap();
    assert_eq!(plan.rotations.len(), 3);

    let env_config = config.environment(Environment::Stage).unwrap();
    let vars: HashMap<&str, &str> =
        HashMap::from([("KEYCLOAK_ADMIN_PASSWORD", "admin"), ("GITHUB_TOKEN", "ghp_test")]);
    let secrets = StoreSecrets::resolve(env_config, |name| vars.get(name).map(|v| v.to_string()));
    let stores = stores::build(env_config, secrets, Duration::from_secs(5)).unwrap();

    let summary = Orchestrator::from_config(stores, &config.rotation)
        .execute(&plan, &AutoApprove)
        .await
        .unwrap();

    let states: HashMap<&str, RotationState> = summary
        .reports
        .iter()
        .map(|r| (r.credential.as_str(), r.state))
        .collect();
    assert_eq!(states["one"], RotationState::Done);
    assert_eq!(states["two"], RotationState::PartiallyPropagated);
    assert_eq!(states["three"], RotationState::Done);

    assert_eq!(summary.exit_status(), ExitStatus::Failure);
    assert_eq!(summary.exit_status().code(), 1);
    assert!(matches!(
        summary.ensure_complete(),
        Err(RotationError::PartialPropagation { credentials }) if credentials == vec!["two".to_string()]
    ));

    // Nothing in the summary carries a secret value.
    let json = serde_json::to_string(&summary).unwrap();
    assert!(!json.contains("rotated-svc"));
}

#[tokio::test]
async fn test_dry_run_makes_no_calls() {
    let keycloak = MockServer::start().await;
    let github = MockServer::start().await;
    let config = config(&keycloak, &github);

    let plan = RotationPlan::build(
        &config,
        Environment::Stage,
        &Selection::Named(vec!["two".into()]),
    )
    .unwrap();
    assert_eq!(plan.credential_names(), vec!["two"]);
    assert!(plan.to_string().contains("TWO_CLIENT_SECRET"));

    assert!(keycloak.received_requests().await.unwrap().is_empty());
    assert!(github.received_requests().await.unwrap().is_empty());
}
