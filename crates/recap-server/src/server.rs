use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use recap_engine::SummaryService;

use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 9191,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SummaryService>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/conversations/{id}/messages", post(handlers::store_message))
        .route("/conversations/{id}/tone", put(handlers::set_tone))
        .route("/conversations/{id}/summaries", post(handlers::summarize))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and start serving. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, service: Arc<SummaryService>) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(AppState { service });
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, "recap server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(signal.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        addr,
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the server task to exit.
    pub async fn wait(self) {
        if let Err(e) = self.server.await {
            tracing::error!(error = %e, "server task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_llm::MockCompletion;
    use recap_settings::RecapSettings;
    use serde_json::{json, Value};

    async fn setup(summary: &str) -> (ServerHandle, String) {
        let service = SummaryService::new(Arc::new(MockCompletion::repeating(summary)), RecapSettings::default())
            .unwrap();
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };
        let handle = start(config, Arc::new(service)).await.unwrap();
        let base = format!("http://127.0.0.1:{}", handle.port());
        (handle, base)
    }

    async fn post_message(client: &reqwest::Client, base: &str, body: Value) -> Value {
        client
            .post(format!("{base}/conversations/-1002233/messages"))
            .json(&body)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (handle, base) = setup("unused").await;
        assert!(handle.port() > 0);

        let resp = reqwest::get(format!("{base}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");

        handle.shutdown();
        handle.wait().await;
    }

    #[tokio::test]
    async fn store_and_summarize_round_trip() {
        let (_handle, base) = setup("Ana said the big game was on.").await;
        let client = reqwest::Client::new();

        let stored = post_message(
            &client,
            &base,
            json!({"id": 7, "sender": "ana", "text": "the big game was wild", "timestamp": "2026-05-01T19:00:00Z"}),
        )
        .await;
        assert_eq!(stored["stored"], true);

        let replay = post_message(&client, &base, json!({"id": 7, "sender": "ana", "text": "again"})).await;
        assert_eq!(replay["stored"], false);

        let resp = client
            .post(format!("{base}/conversations/-1002233/summaries"))
            .json(&json!({"count": 10}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "summarized");
        assert_eq!(
            body["text"],
            "Ana said <a href=\"https://t.me/c/2233/7\">the big game was</a> on."
        );
    }

    #[tokio::test]
    async fn empty_conversation_reports_empty() {
        let (_handle, base) = setup("unused").await;
        let body: Value = reqwest::Client::new()
            .post(format!("{base}/conversations/quiet_group/summaries"))
            .json(&json!({"count": 5}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "empty");
        assert_eq!(body["text"], "Nothing to summarize yet.");
    }

    #[tokio::test]
    async fn invalid_count_is_a_bad_request() {
        let (_handle, base) = setup("unused").await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/conversations/quiet_group/summaries"))
            .json(&json!({"count": 0}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "count must be a positive number of messages, got 0");
    }

    #[tokio::test]
    async fn tone_updates_and_rejections() {
        let (_handle, base) = setup("unused").await;
        let client = reqwest::Client::new();
        let url = format!("{base}/conversations/quiet_group/tone");

        let ok = client.put(&url).json(&json!({"tone": "Pubbie"})).send().await.unwrap();
        assert_eq!(ok.status(), 200);
        let body: Value = ok.json().await.unwrap();
        assert_eq!(body["tone"], "pubbie");

        let bad = client.put(&url).json(&json!({"tone": "smug"})).send().await.unwrap();
        assert_eq!(bad.status(), 400);
        let body: Value = bad.json().await.unwrap();
        assert_eq!(
            body["error"],
            "Invalid tone 'smug'. Available tones: stoic, chaotic, pubbie, deaf"
        );
    }
}
