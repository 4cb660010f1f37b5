//! Runtime settings
//!
//! Resolved in layers, later layers winning:
//! 1. Built-in defaults
//! 2. `config.toml` in the data directory (`[ai]`, `[retrieval]`, `[server]`)
//! 3. Environment variables
//!
//! Missing credentials are not an error here; the backend reports them on
//! its first call.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the optional config file inside the data directory
pub const CONFIG_FILE: &str = "config.toml";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
pub const DEFAULT_OLLAMA_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_TOP_K: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Which AI backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    OpenAICompatible,
    Ollama,
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAICompatible => "openai_compatible",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Ok(Self::OpenAICompatible)
            }
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("Unknown AI backend: {}", other))),
        }
    }
}

/// AI backend settings
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub backend: BackendKind,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_embedding_model: String,
    pub openai_vision_model: Option<String>,
    pub ollama_host: String,
    pub ollama_model: String,
    pub ollama_embedding_model: String,
    pub ollama_vision_model: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_embedding_model: DEFAULT_OPENAI_EMBEDDING_MODEL.to_string(),
            openai_vision_model: None,
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_embedding_model: DEFAULT_OLLAMA_EMBEDDING_MODEL.to_string(),
            ollama_vision_model: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Retrieval settings
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Records retrieved per question
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Default)]
pub struct ServerSettings {
    /// Bearer keys accepted by the API; auth is off when empty
    pub api_keys: Vec<String>,
    /// Allowed CORS origins
    pub cors_origins: Vec<String>,
    pub allow_any_origin: bool,
}

/// Fully resolved settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub ai: AiSettings,
    pub retrieval: RetrievalSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Resolve settings from the process environment
    ///
    /// `data_dir` (from the CLI) beats `PENNY_DATA_DIR`, which beats the
    /// platform default.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        Self::load_with(data_dir, |key| std::env::var(key).ok())
    }

    /// Resolve settings with a custom environment lookup
    pub fn load_with<F>(data_dir: Option<PathBuf>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match data_dir.or_else(|| env("PENNY_DATA_DIR").map(PathBuf::from)) {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        let mut settings = Self::defaults(data_dir);

        let config_path = settings.data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content = fs::read_to_string(&config_path).map_err(|e| {
                Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
            })?;
            settings.apply_file(&content)?;
            debug!(path = %config_path.display(), "Loaded config file");
        }

        settings.apply_env(env)?;
        Ok(settings)
    }

    /// Built-in defaults for a data directory
    pub fn defaults(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ai: AiSettings::default(),
            retrieval: RetrievalSettings::default(),
            server: ServerSettings::default(),
        }
    }

    fn apply_file(&mut self, content: &str) -> Result<()> {
        let raw: RawConfig = toml::from_str(content)?;

        if let Some(ai) = raw.ai {
            if let Some(backend) = ai.backend {
                self.ai.backend = backend.parse()?;
            }
            set(&mut self.ai.openai_base_url, ai.openai_base_url);
            set(&mut self.ai.openai_model, ai.openai_model);
            set(&mut self.ai.openai_embedding_model, ai.openai_embedding_model);
            set_opt(&mut self.ai.openai_vision_model, ai.openai_vision_model);
            set(&mut self.ai.ollama_host, ai.ollama_host);
            set(&mut self.ai.ollama_model, ai.ollama_model);
            set(&mut self.ai.ollama_embedding_model, ai.ollama_embedding_model);
            set_opt(&mut self.ai.ollama_vision_model, ai.ollama_vision_model);
            set(&mut self.ai.request_timeout_secs, ai.request_timeout_secs);
        }

        if let Some(retrieval) = raw.retrieval {
            if let Some(top_k) = retrieval.top_k {
                if top_k == 0 {
                    return Err(Error::Config("retrieval.top_k must be at least 1".into()));
                }
                self.retrieval.top_k = top_k;
            }
        }

        if let Some(server) = raw.server {
            set(&mut self.server.cors_origins, server.cors_origins);
            set(&mut self.server.allow_any_origin, server.allow_any_origin);
        }

        Ok(())
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(backend) = var("AI_BACKEND") {
            self.ai.backend = backend.parse()?;
        }
        set_opt(&mut self.ai.openai_api_key, var("OPENAI_API_KEY"));
        set(&mut self.ai.openai_base_url, var("OPENAI_BASE_URL"));
        set(&mut self.ai.openai_model, var("OPENAI_MODEL"));
        set(&mut self.ai.openai_embedding_model, var("OPENAI_EMBEDDING_MODEL"));
        set_opt(&mut self.ai.openai_vision_model, var("OPENAI_VISION_MODEL"));
        set(&mut self.ai.ollama_host, var("OLLAMA_HOST"));
        set(&mut self.ai.ollama_model, var("OLLAMA_MODEL"));
        set(&mut self.ai.ollama_embedding_model, var("OLLAMA_EMBEDDING_MODEL"));
        set_opt(&mut self.ai.ollama_vision_model, var("OLLAMA_VISION_MODEL"));

        if let Some(keys) = var("PENNY_API_KEYS") {
            self.server.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(())
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(crate::ledger::LEDGER_FILE)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join(crate::index::INDEX_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }
}

/// Platform data directory (`~/.local/share/penny` on Linux)
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|d| d.join("penny"))
        .ok_or_else(|| Error::Config("Could not determine a data directory".into()))
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn set_opt<T>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *target = value;
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ai: Option<RawAi>,
    retrieval: Option<RawRetrieval>,
    server: Option<RawServer>,
}

#[derive(Debug, Deserialize)]
struct RawAi {
    backend: Option<String>,
    openai_base_url: Option<String>,
    openai_model: Option<String>,
    openai_embedding_model: Option<String>,
    openai_vision_model: Option<String>,
    ollama_host: Option<String>,
    ollama_model: Option<String>,
    ollama_embedding_model: Option<String>,
    ollama_vision_model: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRetrieval {
    top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawServer {
    cors_origins: Option<Vec<String>>,
    allow_any_origin: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn load(dir: &Path, vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::load_with(Some(dir.to_path_buf()), |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = load(dir.path(), &[]).unwrap();

        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.ai.backend, BackendKind::OpenAICompatible);
        assert_eq!(settings.ai.openai_model, "gpt-4o-mini");
        assert_eq!(settings.ai.openai_embedding_model, "text-embedding-3-small");
        assert!(settings.ai.openai_api_key.is_none());
        assert_eq!(settings.retrieval.top_k, 8);
        assert!(settings.server.api_keys.is_empty());
    }

    #[test]
    fn test_file_then_env_layering() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[ai]
backend = "ollama"
ollama_model = "qwen2.5"
openai_model = "from-file"

[retrieval]
top_k = 4

[server]
cors_origins = ["http://localhost:5173"]
"#,
        )
        .unwrap();

        let settings = load(
            dir.path(),
            &[("OPENAI_MODEL", "from-env"), ("PENNY_API_KEYS", "a, b,,")],
        )
        .unwrap();

        assert_eq!(settings.ai.backend, BackendKind::Ollama);
        assert_eq!(settings.ai.ollama_model, "qwen2.5");
        assert_eq!(settings.ai.openai_model, "from-env");
        assert_eq!(settings.retrieval.top_k, 4);
        assert_eq!(settings.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(settings.server.api_keys, vec!["a", "b"]);
    }

    #[test]
    fn test_data_dir_precedence() {
        let explicit = TempDir::new().unwrap();
        let from_env = TempDir::new().unwrap();
        let env_path = from_env.path().to_string_lossy().to_string();

        let settings = Settings::load_with(Some(explicit.path().to_path_buf()), |k| {
            (k == "PENNY_DATA_DIR").then(|| env_path.clone())
        })
        .unwrap();
        assert_eq!(settings.data_dir, explicit.path());

        let settings = Settings::load_with(None, |k| {
            (k == "PENNY_DATA_DIR").then(|| env_path.clone())
        })
        .unwrap();
        assert_eq!(settings.data_dir, from_env.path());
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let dir = TempDir::new().unwrap();
        let settings = load(dir.path(), &[("OPENAI_API_KEY", "  "), ("AI_BACKEND", "")]).unwrap();
        assert!(settings.ai.openai_api_key.is_none());
        assert_eq!(settings.ai.backend, BackendKind::OpenAICompatible);
    }

    #[test]
    fn test_invalid_values() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load(dir.path(), &[("AI_BACKEND", "gpt5000")]),
            Err(Error::Config(_))
        ));

        fs::write(dir.path().join(CONFIG_FILE), "[retrieval]\ntop_k = 0\n").unwrap();
        assert!(matches!(load(dir.path(), &[]), Err(Error::Config(_))));

        fs::write(dir.path().join(CONFIG_FILE), "[ai\n").unwrap();
        assert!(matches!(load(dir.path(), &[]), Err(Error::Toml(_))));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("OLLAMA".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAICompatible);
        assert_eq!("mock".parse::<BackendKind>().unwrap(), BackendKind::Mock);
        assert_eq!(BackendKind::Ollama.as_str(), "ollama");
    }
}
