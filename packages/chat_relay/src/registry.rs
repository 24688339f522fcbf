//! Session Registry
//!
//! Maps caller-supplied conversation ids to [`Session`]s and owns the model
//! catalog fetched once at startup. Ids are opaque, untrusted strings; a
//! `start` on an id that is already live replaces the old entry without
//! touching its in-flight generation.

use ollama_client::{Model, OllamaClient};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::GenerationDefaults;
use crate::session::Session;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider at {base_url} advertises no models")]
    NoModels { base_url: String },
}

pub struct Registry {
    client: OllamaClient,
    defaults: GenerationDefaults,
    /// Never empty.
    models: Vec<Model>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Registry {
    /// Fetch the catalog from the provider. An empty catalog is fatal.
    pub async fn initialize(
        client: OllamaClient,
        defaults: GenerationDefaults,
    ) -> Result<Self, RegistryError> {
        let models = client.list_models(&defaults.base_url).await;
        info!(
            "Provider at {} advertises {} model(s)",
            defaults.base_url,
            models.len()
        );
        Self::with_models(client, defaults, models)
    }

    pub fn with_models(
        client: OllamaClient,
        defaults: GenerationDefaults,
        models: Vec<Model>,
    ) -> Result<Self, RegistryError> {
        if models.is_empty() {
            return Err(RegistryError::NoModels {
                base_url: defaults.base_url,
            });
        }
        Ok(Self {
            client,
            defaults,
            models,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Exact name match, otherwise the head of the catalog.
    pub fn resolve_model(&self, requested: Option<&str>) -> &Model {
        requested
            .filter(|name| !name.is_empty())
            .and_then(|name| self.models.iter().find(|m| m.name == name))
            .unwrap_or(&self.models[0])
    }

    /// Create a session under `id`, replacing any existing one.
    pub async fn start(
        &self,
        id: &str,
        model: Option<&str>,
        system: Option<&str>,
    ) -> Arc<Session> {
        let resolved = self.resolve_model(model);
        if let Some(requested) = model.filter(|m| !m.is_empty() && *m != resolved.name) {
            debug!(
                conversation = %id,
                "Model {} not in catalog, using {}", requested, resolved.name
            );
        }
        let config = self.defaults.for_model(&resolved.name, system);
        let session = Arc::new(Session::new(id, config, self.client.clone()));

        let replaced = self
            .sessions
            .write()
            .await
            .insert(id.to_string(), session.clone());
        if replaced.is_some() {
            debug!(conversation = %id, "Replaced existing conversation");
        }
        info!(conversation = %id, model = %resolved.name, "Conversation started");
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Returns whether an entry was actually removed.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(conversation = %id, "Conversation ended");
        }
        removed
    }

    /// Number of live conversations.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Abort every in-flight generation and forget all conversations.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.cancel_generation();
        }
        info!("Closed {} conversation(s)", sessions.len());
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("defaults", &self.defaults)
            .field("models", &self.models.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OllamaFileConfig;
    use crate::session::SessionState;
    use crate::test_helpers::{Script, spawn_stub_provider, test_registry};
    use futures::StreamExt;

    fn model(name: &str) -> Model {
        Model {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn defaults() -> GenerationDefaults {
        GenerationDefaults::from_file(&OllamaFileConfig::default())
    }

    fn registry(names: &[&str]) -> Registry {
        Registry::with_models(
            OllamaClient::new(),
            defaults(),
            names.iter().map(|n| model(n)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_catalog_is_rejected() {
        let err = Registry::with_models(OllamaClient::new(), defaults(), vec![]).unwrap_err();
        assert!(matches!(err, RegistryError::NoModels { .. }));
        assert!(err.to_string().contains("http://localhost:11434"));
    }

    #[test]
    fn test_resolve_model() {
        let registry = registry(&["llama3", "mistral"]);
        assert_eq!(registry.resolve_model(Some("mistral")).name, "mistral");
        assert_eq!(registry.resolve_model(None).name, "llama3");
        assert_eq!(registry.resolve_model(Some("")).name, "llama3");
        assert_eq!(registry.resolve_model(Some("gpt-5")).name, "llama3");
        // Exact match only
        assert_eq!(registry.resolve_model(Some("Mistral")).name, "llama3");
    }

    #[tokio::test]
    async fn test_start_resolves_model_and_system() {
        let registry = registry(&["llama3", "mistral"]);

        let session = registry.start("c1", None, None).await;
        assert_eq!(session.model(), "llama3");
        assert_eq!(session.config().system, registry.defaults().system);

        let session = registry.start("c2", Some("mistral"), Some("Be a pirate.")).await;
        assert_eq!(session.model(), "mistral");
        assert_eq!(session.config().system, "Be a pirate.");

        let session = registry.start("c3", Some("unknown"), Some("")).await;
        assert_eq!(session.model(), "llama3");
        assert_eq!(session.config().system, registry.defaults().system);

        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_get_and_remove() {
        let registry = registry(&["llama3"]);
        assert!(registry.get("c1").await.is_none());

        registry.start("c1", None, None).await;
        assert_eq!(registry.get("c1").await.unwrap().id(), "c1");

        assert!(registry.remove("c1").await);
        assert!(registry.get("c1").await.is_none());
        // Idempotent
        assert!(!registry.remove("c1").await);
        assert!(!registry.remove("never-existed").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_restart_replaces_live_session() {
        let provider = spawn_stub_provider(
            &["llama3"],
            vec![Script::stalled(&[r#"{"done":false,"response":"old"}"#])],
        )
        .await;
        let registry = test_registry(&provider, &["llama3"]);

        let first = registry.start("c1", None, None).await;
        let mut answer = first.ask("hello");
        assert_eq!(answer.next().await.unwrap().response(), "old");

        let second = registry.start("c1", None, None).await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.get("c1").await.unwrap(), &second));
        assert_eq!(registry.len().await, 1);

        // The orphan keeps its generation; the replacement starts idle
        assert_eq!(first.state(), SessionState::Generating);
        assert_eq!(second.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_generation() {
        let provider = spawn_stub_provider(
            &["llama3"],
            vec![Script::stalled(&[r#"{"done":false,"response":"a"}"#])],
        )
        .await;
        let registry = test_registry(&provider, &["llama3"]);

        let session = registry.start("c1", None, None).await;
        let mut answer = session.ask("hello");
        assert!(answer.next().await.is_some());

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        let rest = tokio::time::timeout(std::time::Duration::from_secs(5), answer.collect::<Vec<_>>())
            .await
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_initialize_fetches_catalog() {
        let provider = spawn_stub_provider(&["llama3", "phi3"], vec![]).await;
        let registry = Registry::initialize(OllamaClient::new(), provider.defaults())
            .await
            .unwrap();
        let names: Vec<_> = registry.models().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3", "phi3"]);
    }

    #[tokio::test]
    async fn test_initialize_fails_without_models() {
        let provider = spawn_stub_provider(&[], vec![]).await;
        let result = Registry::initialize(OllamaClient::new(), provider.defaults()).await;
        assert!(matches!(result, Err(RegistryError::NoModels { .. })));

        let unreachable = GenerationDefaults {
            base_url: "http://127.0.0.1:1".into(),
            ..defaults()
        };
        let result = Registry::initialize(OllamaClient::new(), unreachable).await;
        assert!(matches!(result, Err(RegistryError::NoModels { .. })));
    }
}
