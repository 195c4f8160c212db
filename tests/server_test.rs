//! Integration tests for the keyjitter HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use keyjitter::server::{run, ServerConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_endpoint() {
        let config = ServerConfig::new(0, 1_000);
        let (addr, shutdown_tx, _handle) = run(config).await.expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_ingest_then_snapshot() {
        let config = ServerConfig::new(0, 1_000);
        let (addr, shutdown_tx, _handle) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        // One out-of-order timestamp in the batch is counted, not fatal.
        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/ingest", addr))
            .json(&serde_json::json!({ "timestamps": [0, 12_000, 25_000, 24_000] }))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["accepted"], 3);
        assert_eq!(body["rejected"], 1);

        let response = client
            .get(format!("http://{}/snapshot", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["bin_rate"], 1_000);
        assert_eq!(body["accepted"], 3);
        assert_eq!(body["rejected"], 1);
        assert_eq!(body["distinct_bins"], 3);
        assert_eq!(
            body["histograms"]["consecutive"].as_array().map(|a| a.len()),
            Some(1_001)
        );

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_bin_rate_endpoint() {
        let config = ServerConfig::new(0, 1_000);
        let (addr, shutdown_tx, _handle) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/bin-rate", addr))
            .json(&serde_json::json!({ "bin_rate": 125 }))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["bin_rate"], 125);
        assert_eq!(body["interval_us"], 8_000.0);

        // Invalid candidates are a client error and change nothing.
        let response = client
            .post(format!("http://{}/bin-rate", addr))
            .json(&serde_json::json!({ "bin_rate": 999 }))
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_BIN_RATE");

        let response = client
            .get(format!("http://{}/snapshot", addr))
            .send()
            .await
            .expect("Failed to send request");
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["bin_rate"], 125);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_reset_endpoint_clears_counts() {
        let config = ServerConfig::new(0, 1_000);
        let (addr, shutdown_tx, _handle) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let _ = client
            .post(format!("http://{}/ingest", addr))
            .json(&serde_json::json!({ "timestamps": [0, 5_000] }))
            .send()
            .await
            .expect("Failed to send request");

        let response = client
            .post(format!("http://{}/reset", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let response = client
            .get(format!("http://{}/snapshot", addr))
            .send()
            .await
            .expect("Failed to send request");
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["accepted"], 0);
        assert_eq!(body["distinct_bins"], 0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let config = ServerConfig::new(0, 1_000);
        let (addr, shutdown_tx, _handle) = run(config).await.expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/ingest", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
