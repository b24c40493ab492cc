//! HTTP surface exercise for the server-logs toggle, following the teacher's
//! pattern of driving a real in-process server with `reqwest` rather than
//! calling handlers directly.

use std::time::Duration;

use radar::hub::Hub;
use radar::server::{build_router, AppState};

async fn spawn_test_server() -> std::net::SocketAddr {
    spawn_test_server_with_public_dir(None).await
}

async fn spawn_test_server_with_public_dir(public_dir: Option<std::path::PathBuf>) -> std::net::SocketAddr {
    let dir = tempfile::tempdir().unwrap().into_path();
    let log_sink = radar_ui_log::JsonlLogSink::new(dir).unwrap();
    let hub = Hub::new(Duration::from_millis(16));
    let state = AppState { hub, log_sink };
    let router = build_router(state, public_dir);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn server_logs_setting_is_enabled_by_default_and_toggles_over_http() {
    let addr = spawn_test_server().await;
    let url = format!("http://{addr}/api/settings/server-logs");

    let before: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(before["enabled"], true);

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({ "enabled": false }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let after: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(after["enabled"], false);
}

#[tokio::test]
async fn unknown_path_falls_back_to_the_placeholder_page_without_a_public_dir() {
    let addr = spawn_test_server().await;
    let resp = reqwest::get(format!("http://{addr}/no-such-asset"))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("radar"));
}

#[tokio::test]
async fn unmatched_api_sub_path_404s_instead_of_falling_through_to_static_serving() {
    let public_dir = tempfile::tempdir().unwrap();
    std::fs::write(public_dir.path().join("index.html"), "<html></html>").unwrap();

    let addr = spawn_test_server_with_public_dir(Some(public_dir.path().to_path_buf())).await;
    let resp = reqwest::get(format!("http://{addr}/api/does-not-exist"))
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn a_real_static_asset_is_still_served_from_the_public_dir() {
    let public_dir = tempfile::tempdir().unwrap();
    std::fs::write(public_dir.path().join("index.html"), "<html>radar ui</html>").unwrap();

    let addr = spawn_test_server_with_public_dir(Some(public_dir.path().to_path_buf())).await;
    let resp = reqwest::get(format!("http://{addr}/index.html")).await.unwrap();
    assert!(resp.status().is_success());
    let body = resp.text().await.unwrap();
    assert!(body.contains("radar ui"));
}
