use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use waterwise_telemetry::{router, AppState, Config, DisabledPrimary, MemoryPrimary, PrimaryStore};

// ---

struct TestServer {
    base: String,
    ledger: PathBuf,
    client: Client,
}

fn scratch_ledger() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("waterwise-it-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("waterwise_data.json")
}

/// Serve the full router on an ephemeral port.
async fn spawn(primary: Arc<dyn PrimaryStore>) -> Result<TestServer> {
    // ---
    let ledger = scratch_ledger();
    let ledger_str = ledger.display().to_string();
    let cfg = Config::load_with(|key| match key {
        "PRIMARY_BACKEND" => Some("disabled".to_string()),
        "FALLBACK_DATA_FILE" => Some(ledger_str.clone()),
        _ => None,
    })?;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(AppState::new(primary, cfg));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        base: format!("http://{addr}"),
        ledger,
        client: Client::new(),
    })
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

fn sample_reading() -> Value {
    json!({
        "id_sensor": 3,
        "umidade_solo": 18.2,
        "temperatura_ar": 31.5,
        "precipitacao_mm": 0.0,
    })
}

// ---

#[tokio::test]
async fn reading_falls_back_when_primary_is_down() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server
        .client
        .post(server.url("/api/leituras"))
        .json(&sample_reading())
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["storage"], "fallback");
    assert_eq!(body["leitura_id"], 1);
    assert_eq!(body["data"]["farm_id"], "FARM_WaterWise_2025");
    assert!(server.ledger.exists(), "ledger file should be written");

    let listed: Value = server
        .client
        .get(server.url("/api/leituras?limit=1"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed["storage"], "fallback");
    assert_eq!(listed["count"], 1);
    let record = &listed["leituras"][0];
    assert_eq!(record["id_leitura"], 1);
    assert_eq!(record["id_sensor"], 3);
    assert_eq!(record["umidade_solo"], 18.2);
    assert_eq!(record["temperatura_ar"], 31.5);

    Ok(())
}

#[tokio::test]
async fn missing_field_is_rejected_without_writing() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server
        .client
        .post(server.url("/api/leituras"))
        .json(&json!({"id_sensor": 3, "umidade_solo": 18.2, "precipitacao_mm": 0.0}))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await?;
    assert_eq!(body["missing_fields"], json!(["temperatura_ar"]));
    assert_eq!(body["required_fields"].as_array().map(Vec::len), Some(4));
    assert!(!server.ledger.exists(), "rejected payload must not touch the ledger");

    Ok(())
}

#[tokio::test]
async fn malformed_body_is_rejected() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server
        .client
        .post(server.url("/api/alertas"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!server.ledger.exists());

    Ok(())
}

#[tokio::test]
async fn alert_falls_back_when_primary_is_down() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server
        .client
        .post(server.url("/api/alertas"))
        .json(&json!({
            "id_produtor": 7,
            "codigo_severidade": "ALTO",
            "descricao_alerta": "Solo saturado no setor norte",
        }))
        .send()
        .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = resp.json().await?;
    assert_eq!(body["storage"], "fallback");
    assert_eq!(body["alerta_id"], 1);

    let listed: Value = server
        .client
        .get(server.url("/api/alertas"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["alertas"][0]["codigo_severidade"], "ALTO");

    Ok(())
}

#[tokio::test]
async fn health_reports_partial_without_primary() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server.client.get(server.url("/health")).send().await?;
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    let body: Value = resp.json().await?;
    assert_eq!(body["api_status"], "healthy");
    assert_eq!(body["oracle_connection"], false);
    assert_eq!(body["storage_mode"], "fallback");

    Ok(())
}

#[tokio::test]
async fn primary_accepts_and_replay_drains_ledger() -> Result<()> {
    // ---
    let memory = Arc::new(MemoryPrimary::new());
    let server = spawn(memory.clone()).await?;

    let resp = server.client.get(server.url("/health")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = server
        .client
        .post(server.url("/api/leituras"))
        .json(&sample_reading())
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["storage"], "primary");
    assert!(!server.ledger.exists(), "primary writes never touch the ledger");

    memory.set_reachable(false);
    let body: Value = server
        .client
        .post(server.url("/api/leituras"))
        .json(&sample_reading())
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(body["storage"], "fallback");

    memory.set_reachable(true);
    let resp = server.client.post(server.url("/api/sync")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let report: Value = resp.json().await?;
    assert_eq!(report["readings"]["replayed"], 1);
    assert_eq!(memory.readings().len(), 2);

    let report: Value = server
        .client
        .post(server.url("/api/sync"))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(report["readings"]["replayed"], 0);

    Ok(())
}

#[tokio::test]
async fn unknown_route_is_json_404() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;

    let resp = server.client.get(server.url("/api/nope")).send().await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await?;
    assert!(body["error"].is_string());

    Ok(())
}

#[tokio::test]
async fn unparsable_limit_uses_default_page() -> Result<()> {
    // ---
    let server = spawn(Arc::new(DisabledPrimary)).await?;
    for _ in 0..12 {
        let resp = server
            .client
            .post(server.url("/api/leituras"))
            .json(&sample_reading())
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    for limit in ["abc", "-1"] {
        let resp = server
            .client
            .get(server.url(&format!("/api/leituras?limit={limit}")))
            .send()
            .await?;
        assert_eq!(resp.status(), StatusCode::OK, "limit={limit}");
        let body: Value = resp.json().await?;
        assert_eq!(body["count"], 10, "limit={limit}");
        assert_eq!(body["leituras"][0]["id_leitura"], 12);
    }

    let resp = server.client.get(server.url("/api/alertas?limit=abc")).send().await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}
