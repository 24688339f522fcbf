use axum::{Json, Router, body::Body, routing::get, routing::post};
use futures::StreamExt;
use ollama_client::{Model, OllamaClient};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use crate::config::{GenerationDefaults, OllamaFileConfig};
use crate::registry::Registry;

/// One scripted reply of the stub provider's generate endpoint.
#[derive(Clone, Debug)]
pub struct Script {
    pub lines: Vec<String>,
    /// Keep the body open after the last line instead of closing it.
    pub stall: bool,
}

impl Script {
    pub fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            stall: false,
        }
    }

    pub fn stalled(lines: &[&str]) -> Self {
        Self {
            stall: true,
            ..Self::lines(lines)
        }
    }
}

/// A fake Ollama bound to a random local port.
///
/// Generate requests consume scripts in order; once they run out every
/// request gets an empty final chunk. Callers must hold the struct for the
/// lifetime of the test, dropping it shuts the server down.
pub struct StubProvider {
    pub base_url: String,
    requests: Arc<Mutex<Vec<serde_json::Value>>>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl StubProvider {
    /// Bodies of every generate request received so far.
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn defaults(&self) -> GenerationDefaults {
        GenerationDefaults {
            base_url: self.base_url.clone(),
            ..GenerationDefaults::from_file(&OllamaFileConfig::default())
        }
    }
}

pub async fn spawn_stub_provider(models: &[&str], scripts: Vec<Script>) -> StubProvider {
    let catalog = serde_json::json!({
        "models": models
            .iter()
            .map(|name| serde_json::json!({
                "name": name,
                "modified_at": "2024-05-01T00:00:00Z",
                "size": 4_000_000_000u64,
                "digest": format!("sha256:{}", name),
            }))
            .collect::<Vec<_>>(),
    });

    let requests: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
    let scripts = Arc::new(Mutex::new(VecDeque::from(scripts)));

    let recorded = requests.clone();
    let app = Router::new()
        .route("/api/tags", get(move || async move { Json(catalog) }))
        .route(
            "/api/generate",
            post(move |Json(body): Json<serde_json::Value>| {
                let recorded = recorded.clone();
                let scripts = scripts.clone();
                async move {
                    recorded.lock().unwrap().push(body);
                    let script = scripts
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Script::lines(&[r#"{"done":true,"context":[]}"#]));
                    let chunks = script
                        .lines
                        .into_iter()
                        .map(|line| Ok::<_, Infallible>(format!("{}\n", line)));
                    let body = futures::stream::iter(chunks);
                    if script.stall {
                        Body::from_stream(body.chain(futures::stream::pending()))
                    } else {
                        Body::from_stream(body)
                    }
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await
            .unwrap();
    });

    StubProvider {
        base_url: format!("http://127.0.0.1:{}", port),
        requests,
        _shutdown: tx,
    }
}

/// Registry over a fixed catalog, talking to `provider` for generation.
pub fn test_registry(provider: &StubProvider, models: &[&str]) -> Arc<Registry> {
    let models = models
        .iter()
        .map(|name| Model {
            name: name.to_string(),
            ..Default::default()
        })
        .collect();
    Arc::new(
        Registry::with_models(OllamaClient::new(), provider.defaults(), models)
            .expect("non-empty catalog"),
    )
}
