use ollama_client::GenerationConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   relay.toml:      [ollama]
//                    base_url = "http://gpu-box:11434"
//
//   env var:         RELAY_OLLAMA__BASE_URL=http://gpu-box:11434
//
//   CLI flag:        relay --base-url=http://gpu-box:11434
//
// CLI flags win over env vars, env vars win over the file.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub ollama: OllamaFileConfig,
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Provider settings (lives under `[ollama]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaFileConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_generate_path")]
    pub path: String,
    #[serde(default = "default_system_prompt")]
    pub system: String,
}

impl Default for OllamaFileConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            path: default_generate_path(),
            system: default_system_prompt(),
        }
    }
}

/// Listener settings (lives under `[server]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_generate_path() -> String {
    "/api/generate".to_string()
}
fn default_system_prompt() -> String {
    "Be concise, no more than 200 characters in each response. Do not moralize. Do not hallucinate."
        .to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_public_dir() -> PathBuf {
    PathBuf::from("./public")
}

/// Build a figment that layers: defaults → config file → RELAY_* env vars.
///
/// A missing config file is not an error; the layer is simply empty.
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_OLLAMA__SYSTEM="..."`  →  `ollama.system = "..."`
///   `RELAY_SERVER__PORT=9000`     →  `server.port = 9000`
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("RELAY_").split("__"))
}

/// Values given on the command line. Empty strings count as "not given".
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub path: Option<String>,
    pub system: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn with_overrides(mut self, cli: &CliOverrides) -> Self {
        fn non_empty(value: &Option<String>) -> Option<String> {
            value.as_ref().filter(|v| !v.is_empty()).cloned()
        }

        if let Some(base_url) = non_empty(&cli.base_url) {
            self.ollama.base_url = base_url;
        }
        if let Some(path) = non_empty(&cli.path) {
            self.ollama.path = path;
        }
        if let Some(system) = non_empty(&cli.system) {
            self.ollama.system = system;
        }
        if let Some(host) = non_empty(&cli.host) {
            self.server.host = host;
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(dir) = cli.public_dir.as_ref().filter(|d| !d.as_os_str().is_empty()) {
            self.server.public_dir = dir.clone();
        }
        self
    }
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

/// Process-wide generation defaults every new conversation starts from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationDefaults {
    pub base_url: String,
    pub path: String,
    pub system: String,
}

impl GenerationDefaults {
    pub fn from_file(fc: &OllamaFileConfig) -> Self {
        Self {
            base_url: fc.base_url.clone(),
            path: fc.path.clone(),
            system: fc.system.clone(),
        }
    }

    /// Per-conversation config for an already-resolved model.
    /// A missing or empty system override falls back to the default prompt.
    pub fn for_model(&self, model: &str, system: Option<&str>) -> GenerationConfig {
        let system = system
            .filter(|s| !s.is_empty())
            .unwrap_or(self.system.as_str())
            .to_string();
        GenerationConfig {
            model: model.to_string(),
            base_url: self.base_url.clone(),
            path: self.path.clone(),
            system,
        }
    }
}

/// Fully resolved relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub generation: GenerationDefaults,
    pub host: String,
    pub port: u16,
    pub public_dir: PathBuf,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            generation: GenerationDefaults::from_file(&fc.ollama),
            host: fc.server.host.clone(),
            port: fc.server.port,
            public_dir: fc.server.public_dir.clone(),
        }
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        use anyhow::Context;
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.ollama.base_url, "http://localhost:11434");
        assert_eq!(fc.ollama.path, "/api/generate");
        assert!(fc.ollama.system.starts_with("Be concise"));
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 8000);
        assert_eq!(fc.server.public_dir, PathBuf::from("./public"));
    }

    #[test]
    fn test_load_config_without_file() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(&tmp.path().join("relay.toml"))
            .extract()
            .unwrap();
        assert_eq!(fc.ollama.base_url, "http://localhost:11434");
        assert_eq!(fc.server.port, 8000);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("relay.toml");
        std::fs::write(
            &path,
            "[ollama]\nbase_url = \"http://gpu-box:11434\"\nsystem = \"Answer in French.\"\n\n[server]\nport = 9001\n",
        )
        .unwrap();

        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.ollama.base_url, "http://gpu-box:11434");
        assert_eq!(fc.ollama.system, "Answer in French.");
        // Untouched keys keep their defaults
        assert_eq!(fc.ollama.path, "/api/generate");
        assert_eq!(fc.server.port, 9001);
        assert_eq!(fc.server.host, "127.0.0.1");
    }

    #[test]
    fn test_cli_overrides_win() {
        let fc = FileConfig::default().with_overrides(&CliOverrides {
            base_url: Some("http://10.0.0.5:11434".into()),
            path: Some("/api/chat-generate".into()),
            port: Some(8080),
            ..Default::default()
        });
        assert_eq!(fc.ollama.base_url, "http://10.0.0.5:11434");
        assert_eq!(fc.ollama.path, "/api/chat-generate");
        assert_eq!(fc.server.port, 8080);
        assert!(fc.ollama.system.starts_with("Be concise"));
    }

    #[test]
    fn test_empty_cli_values_are_ignored() {
        let fc = FileConfig::default().with_overrides(&CliOverrides {
            base_url: Some(String::new()),
            system: Some(String::new()),
            host: Some(String::new()),
            public_dir: Some(PathBuf::new()),
            ..Default::default()
        });
        assert_eq!(fc.ollama.base_url, "http://localhost:11434");
        assert!(fc.ollama.system.starts_with("Be concise"));
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.public_dir, PathBuf::from("./public"));
    }

    #[test]
    fn test_generation_defaults_for_model() {
        let defaults = GenerationDefaults::from_file(&OllamaFileConfig::default());

        let config = defaults.for_model("llama3", None);
        assert_eq!(config.model, "llama3");
        assert_eq!(config.url(), "http://localhost:11434/api/generate");
        assert_eq!(config.system, defaults.system);

        let config = defaults.for_model("llama3", Some("Talk like a pirate."));
        assert_eq!(config.system, "Talk like a pirate.");

        let config = defaults.for_model("llama3", Some(""));
        assert_eq!(config.system, defaults.system);
    }

    #[test]
    fn test_relay_config_bind_addr() {
        let rc = RelayConfig::from_file(&FileConfig::default());
        assert_eq!(rc.bind_addr().unwrap(), "127.0.0.1:8000".parse::<SocketAddr>().unwrap());

        let rc = RelayConfig {
            host: "not a host".into(),
            ..rc
        };
        assert!(rc.bind_addr().is_err());
    }
}
