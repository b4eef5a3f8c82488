//! Configuration management for portal-assist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const APP_DIR: &str = "portal-assist";

/// What kind of endpoint a model is served from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Chat completions and agents endpoints.
    #[default]
    Inference,
    /// Image generation. Not usable for chat.
    Diffusion,
}

/// A model the proxy accepts, keyed by its public name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,

    /// Upstream model id. Falls back to the public name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Supports extended thinking.
    pub reasoning: bool,
}

/// Per-invocation parameters for a Heroku tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_app_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// A Heroku tool the agents endpoint can run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    #[serde(rename = "type", default = "ToolConfig::default_type")]
    pub tool_type: String,

    pub name: String,

    #[serde(default)]
    pub runtime_params: RuntimeParams,
}

impl ToolConfig {
    fn default_type() -> String {
        "heroku_tool".to_string()
    }

    fn heroku(name: &str) -> Self {
        Self {
            tool_type: Self::default_type(),
            name: name.to_string(),
            runtime_params: RuntimeParams::default(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxy server configuration.
    pub api: ApiConfig,

    /// Upstream inference service.
    pub inference: InferenceConfig,

    /// Chat client defaults.
    pub chat: ChatConfig,

    /// Accepted models by public name.
    #[serde(default = "Config::default_models")]
    pub models: BTreeMap<String, ModelConfig>,

    /// Heroku tool definitions by name.
    #[serde(default = "Config::default_tools")]
    pub tools: BTreeMap<String, ToolConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            inference: InferenceConfig::default(),
            chat: ChatConfig::default(),
            models: Self::default_models(),
            tools: Self::default_tools(),
        }
    }
}

impl Config {
    /// Load configuration from the default paths and the environment.
    ///
    /// Loads global config first, merges project-local config if present,
    /// then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let global_path = Self::config_path()?;
        let mut config = Self::load_from(&global_path)?;

        if let Ok(project_path) = Self::project_config_path() {
            if project_path.exists() {
                let contents = std::fs::read_to_string(&project_path)?;
                let project_config: Self = toml::from_str(&contents)?;
                config.merge(project_config);
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load a single configuration file, falling back to defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Get the project-local configuration file path.
    ///
    /// Looks for `.portal-assist/config.toml` in the current directory.
    pub fn project_config_path() -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(format!(".{APP_DIR}")).join("config.toml"))
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/portal-assist/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join(APP_DIR));
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join(APP_DIR))
    }

    /// Merge another config into this one (project overrides global).
    fn merge(&mut self, other: Self) {
        let api_default = ApiConfig::default();
        if other.api.host != api_default.host {
            self.api.host = other.api.host;
        }
        if other.api.port != api_default.port {
            self.api.port = other.api.port;
        }
        if other.api.token.is_some() {
            self.api.token = other.api.token;
        }

        let inference_default = InferenceConfig::default();
        if other.inference.url != inference_default.url {
            self.inference.url = other.inference.url;
        }
        if other.inference.api_key.is_some() {
            self.inference.api_key = other.inference.api_key;
        }
        if other.inference.model_id.is_some() {
            self.inference.model_id = other.inference.model_id;
        }
        if other.inference.system_prompt != inference_default.system_prompt {
            self.inference.system_prompt = other.inference.system_prompt;
        }
        if other.inference.target_app_name != inference_default.target_app_name {
            self.inference.target_app_name = other.inference.target_app_name;
        }

        let chat_default = ChatConfig::default();
        if other.chat.endpoint != chat_default.endpoint {
            self.chat.endpoint = other.chat.endpoint;
        }
        if other.chat.model != chat_default.model {
            self.chat.model = other.chat.model;
        }
        if other.chat.reasoning {
            self.chat.reasoning = true;
        }
        if other.chat.history_limit != chat_default.history_limit {
            self.chat.history_limit = other.chat.history_limit;
        }

        if other.models != Self::default_models() {
            self.models.extend(other.models);
        }
        if other.tools != Self::default_tools() {
            self.tools.extend(other.tools);
        }
    }

    /// Apply environment overrides read through `var`.
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(url) = var("INFERENCE_URL") {
            self.inference.url = url;
        }
        if let Some(key) = var("INFERENCE_KEY") {
            self.inference.api_key = Some(key);
        }
        if let Some(model_id) = var("INFERENCE_MODEL_ID") {
            self.inference.model_id = Some(model_id);
        }
        if let Some(prompt) = var("SYSTEM_PROMPT") {
            self.inference.system_prompt = prompt;
        }
        if let Some(app) = var("HEROKU_APP_NAME").or_else(|| var("TARGET_APP_NAME")) {
            self.inference.target_app_name = app;
        }
        if let Some(endpoint) = var("PORTAL_CHAT_ENDPOINT") {
            self.chat.endpoint = endpoint;
        }
        if let Some(token) = var("PORTAL_API_TOKEN") {
            self.api.token = Some(token);
        }
    }

    /// Look up a model usable for chat.
    #[must_use]
    pub fn chat_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models
            .get(name)
            .filter(|model| model.kind == ModelKind::Inference)
    }

    /// Upstream model id for a public model name.
    ///
    /// The configured `inference.model_id` wins over per-model ids.
    #[must_use]
    pub fn upstream_model_id(&self, name: &str) -> String {
        self.inference
            .model_id
            .clone()
            .or_else(|| self.models.get(name).and_then(|m| m.model_id.clone()))
            .unwrap_or_else(|| name.to_string())
    }

    fn default_models() -> BTreeMap<String, ModelConfig> {
        BTreeMap::from([
            (
                "claude-3-7-sonnet".to_string(),
                ModelConfig {
                    kind: ModelKind::Inference,
                    model_id: Some("claude-3-7-sonnet".to_string()),
                    reasoning: false,
                },
            ),
            (
                "claude-4-sonnet".to_string(),
                ModelConfig {
                    kind: ModelKind::Inference,
                    model_id: Some("claude-4-5-sonnet".to_string()),
                    reasoning: true,
                },
            ),
            (
                "stable-image-ultra".to_string(),
                ModelConfig {
                    kind: ModelKind::Diffusion,
                    model_id: Some("stable-image-ultra".to_string()),
                    reasoning: false,
                },
            ),
        ])
    }

    fn default_tools() -> BTreeMap<String, ToolConfig> {
        crate::core::tools::HEROKU_TOOLS
            .iter()
            .map(|tool| (tool.id.to_string(), ToolConfig::heroku(tool.id)))
            .collect()
    }
}

/// Proxy server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Host to bind to.
    pub host: String,

    /// Port to bind to.
    pub port: u16,

    /// Bearer token required on `/api` routes. Unset means no auth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            token: None,
        }
    }
}

/// Upstream inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Base URL of the inference service.
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Upstream model id used for every chat model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Prepended to every upstream conversation.
    pub system_prompt: String,

    /// Default `target_app_name` for Heroku tools.
    pub target_app_name: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            url: "https://us.inference.heroku.com".to_string(),
            api_key: None,
            model_id: None,
            system_prompt:
                "You are a helpful assistant that can answer questions and help with tasks."
                    .to_string(),
            target_app_name: "template-web-portal".to_string(),
        }
    }
}

impl InferenceConfig {
    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// Chat client defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat endpoint the client posts to.
    pub endpoint: String,

    /// Default model.
    pub model: String,

    /// Request extended thinking by default.
    pub reasoning: bool,

    /// Number of history entries sent with each request. 0 sends the whole
    /// history.
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/heroku-mia".to_string(),
            model: "claude-4-sonnet".to_string(),
            reasoning: false,
            history_limit: chat_core::controller::DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_portal_models_and_tools() {
        let config = Config::default();
        assert!(config.chat_model("claude-4-sonnet").is_some());
        assert!(config.chat_model("claude-3-7-sonnet").is_some());
        assert!(config.chat_model("stable-image-ultra").is_none());
        assert!(config.chat_model("gpt-4o").is_none());
        assert_eq!(config.tools.len(), 8);
        assert_eq!(config.tools["postgres_run_query"].tool_type, "heroku_tool");
        assert_eq!(config.chat.history_limit, 6);
    }

    #[test]
    fn upstream_model_id_prefers_global_override() {
        let mut config = Config::default();
        assert_eq!(config.upstream_model_id("claude-4-sonnet"), "claude-4-5-sonnet");
        assert_eq!(config.upstream_model_id("custom"), "custom");

        config.inference.model_id = Some("claude-4-6-sonnet".to_string());
        assert_eq!(config.upstream_model_id("claude-3-7-sonnet"), "claude-4-6-sonnet");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("INFERENCE_URL", "http://localhost:9000"),
            ("INFERENCE_KEY", "inf-abc"),
            ("SYSTEM_PROMPT", "Be brief."),
            ("TARGET_APP_NAME", "target-app"),
            ("PORTAL_CHAT_ENDPOINT", "http://portal/api/heroku-mia"),
        ]));

        assert_eq!(config.inference.url, "http://localhost:9000");
        assert_eq!(config.inference.api_key.as_deref(), Some("inf-abc"));
        assert_eq!(config.inference.system_prompt, "Be brief.");
        assert_eq!(config.inference.target_app_name, "target-app");
        assert_eq!(config.chat.endpoint, "http://portal/api/heroku-mia");
    }

    #[test]
    fn heroku_app_name_wins_over_target_app_name() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("HEROKU_APP_NAME", "running-app"),
            ("TARGET_APP_NAME", "other-app"),
        ]));
        assert_eq!(config.inference.target_app_name, "running-app");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("INFERENCE_URL", "")]));
        assert_eq!(config.inference.url, "https://us.inference.heroku.com");
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config.api.port, 3000);
    }

    #[test]
    fn load_from_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[chat]
model = "claude-3-7-sonnet"

[tools.custom_tool]
name = "custom_tool"
runtime_params = { max_retries = 2 }
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.chat.model, "claude-3-7-sonnet");
        assert_eq!(config.chat.endpoint, ChatConfig::default().endpoint);
        assert_eq!(config.tools["custom_tool"].tool_type, "heroku_tool");
        assert_eq!(config.tools["custom_tool"].runtime_params.max_retries, Some(2));
        // An explicit tools table replaces the defaults.
        assert!(!config.tools.contains_key("html_to_markdown"));
        assert_eq!(config.models.len(), 3);
    }

    #[test]
    fn merge_project_over_global() {
        let mut global = Config::default();
        global.api.port = 4000;

        let mut project = Config::default();
        project.chat.model = "claude-3-7-sonnet".to_string();
        project.inference.url = "http://project-inference".to_string();

        global.merge(project);
        assert_eq!(global.api.port, 4000);
        assert_eq!(global.chat.model, "claude-3-7-sonnet");
        assert_eq!(global.inference.url, "http://project-inference");
        assert_eq!(global.tools.len(), 8);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.models, config.models);
        assert_eq!(parsed.tools, config.tools);
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let inference = InferenceConfig {
            url: "http://localhost:9000/".to_string(),
            ..InferenceConfig::default()
        };
        assert_eq!(inference.base_url(), "http://localhost:9000");
    }
}
