//! Credential setup, settings and durable state against a mock Gemini server

use std::sync::Arc;

use gemini_sheets::config::GatewayConfig;
use gemini_sheets::state::DurableStateSnapshot;
use gemini_sheets::store::{DurableStore, FileStore, MemoryStore};
use gemini_sheets::{SettingsUpdate, SheetsGateway, Tier};
use mockito::Server;

async fn gateway_for(server: &Server, store: Arc<dyn DurableStore>) -> SheetsGateway {
    SheetsGateway::builder()
        .config(GatewayConfig::default().with_base_url(server.url()))
        .store(store)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_setup_with_valid_key() {
    let mut server = Server::new_async().await;
    let models = server
        .mock("GET", "/models")
        .match_header("x-goog-api-key", "good-key")
        .with_status(200)
        .with_body(r#"{"models":[]}"#)
        .create_async()
        .await;

    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    let outcome = gateway.setup_credential("good-key").await;
    assert!(outcome.success, "{outcome:?}");
    assert!(outcome.error.is_none());
    assert!(gateway.get_settings().await.api_key_set);
    models.assert_async().await;
}

#[tokio::test]
async fn test_setup_with_rejected_key_clears_it() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/models")
        .with_status(400)
        .with_body("API key not valid")
        .create_async()
        .await;

    let store = Arc::new(MemoryStore::new());
    let gateway = gateway_for(&server, store.clone()).await;
    let outcome = gateway.setup_credential("bad-key").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Invalid API key"));
    assert!(!gateway.get_settings().await.api_key_set);

    let raw = store.get("geminiState").await.unwrap().unwrap();
    let saved: DurableStateSnapshot = serde_json::from_str(&raw).unwrap();
    assert!(saved.api_key.is_none());
    assert!(!saved.api_key_set);
}

#[tokio::test]
async fn test_setup_with_empty_key() {
    let server = Server::new_async().await;
    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    let outcome = gateway.setup_credential("  ").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("API key is required"));

    let failures = gateway.recent_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].function, "setup_credential");
    // failure records belong to the gateway that caught them
    let other = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    assert!(other.recent_failures().is_empty());
}

#[tokio::test]
async fn test_validate_upgrades_tier() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/models")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    assert_eq!(gateway.tier().await, Tier::Free);
    assert!(gateway.validate_credential("k").await);
    assert_eq!(gateway.tier().await, Tier::Paid);
    assert!(!gateway.validate_credential("").await);
}

#[tokio::test]
async fn test_validate_failure_keeps_tier() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/models")
        .with_status(403)
        .create_async()
        .await;

    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    assert!(!gateway.validate_credential("k").await);
    assert_eq!(gateway.tier().await, Tier::Free);
}

#[tokio::test]
async fn test_set_credential_rejects_blank() {
    let server = Server::new_async().await;
    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    assert!(!gateway.set_credential("").await);
    assert!(!gateway.set_credential("   ").await);
    assert!(gateway.set_credential("k").await);
    assert!(gateway.get_settings().await.api_key_set);
}

#[tokio::test]
async fn test_settings_filter_catalog_and_migrate_default_model() {
    let server = Server::new_async().await;
    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;

    let settings = gateway.get_settings().await;
    assert!(!settings.experimental);
    assert!(settings
        .available_models
        .iter()
        .all(|m| m.name != "models/gemini-2.0-flash-lite"));

    assert!(
        gateway
            .update_settings(SettingsUpdate {
                experimental: Some(true),
                default_model: Some("gemini-pro".into()),
                ..Default::default()
            })
            .await
    );
    let settings = gateway.get_settings().await;
    assert!(settings.experimental);
    assert!(!settings.show_legacy);
    assert_eq!(settings.default_model, "models/gemini-2.0-flash");
    assert!(settings
        .available_models
        .iter()
        .any(|m| m.name == "models/gemini-2.0-flash-lite"));
}

#[tokio::test]
async fn test_state_survives_a_new_context() {
    let dir = tempfile::tempdir().unwrap();
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/models/gemini-1.5-pro:generateContent")
        .with_status(200)
        .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"persisted"}]}}]}"#)
        .create_async()
        .await;

    {
        let gateway = gateway_for(&server, Arc::new(FileStore::new(dir.path()))).await;
        assert!(gateway.set_credential("k").await);
        gateway
            .update_settings(SettingsUpdate {
                default_model: Some("models/gemini-1.5-pro".into()),
                show_legacy: Some(true),
                ..Default::default()
            })
            .await;
        gateway.submit_prompt("remember me", None, None, None).await;
        gateway.wait_idle().await;
        assert_eq!(
            gateway.submit_prompt("remember me", None, None, None).await,
            "persisted"
        );
    }

    let reopened = gateway_for(&server, Arc::new(FileStore::new(dir.path()))).await;
    let settings = reopened.get_settings().await;
    assert!(settings.api_key_set);
    assert!(settings.show_legacy);
    assert_eq!(settings.default_model, "models/gemini-1.5-pro");
    let stats = reopened.get_stats().await;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.completed_requests, 1);
    assert!(reopened.processing_snapshot().is_empty());

    assert!(reopened.reset_all().await);
    let reset = gateway_for(&server, Arc::new(FileStore::new(dir.path()))).await;
    assert!(!reset.get_settings().await.api_key_set);
    assert_eq!(reset.get_stats().await.total_requests, 0);
}

#[tokio::test]
async fn test_upstream_error_body_reaches_the_cell() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/models/gemini-2.0-flash:generateContent")
        .with_status(403)
        .with_body("Permission denied on resource project")
        .expect(1)
        .create_async()
        .await;

    let gateway = gateway_for(&server, Arc::new(MemoryStore::new())).await;
    gateway.set_credential("k").await;
    gateway.submit_prompt("p", None, None, None).await;
    gateway.wait_idle().await;
    assert_eq!(
        gateway.submit_prompt("p", None, None, None).await,
        "❌ Error: Permission denied on resource project"
    );
}
