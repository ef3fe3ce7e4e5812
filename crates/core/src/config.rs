use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinator::{DeliverySettings, DEFAULT_MAX_REJECTIONS};
use crate::domain::envelope::ConnectionMode;
use crate::store::file::DEFAULT_CACHE_FILE_NAME;

const CONFIG_FILE_NAME: &str = "slack-reporter.toml";

#[derive(Clone, Debug)]
pub struct ReporterConfig {
    pub slack: SlackConfig,
    pub queue: QueueConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    /// Webhook id in webhook mode, API token in authenticated mode.
    pub default_token: SecretString,
    pub connection_mode: ConnectionMode,
    pub user_name: String,
    pub post_as_user: bool,
    pub webhook_base_url: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub disable_queue: bool,
    pub cache_path: PathBuf,
    pub max_rejections: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub default_token: Option<String>,
    pub connection_mode: Option<ConnectionMode>,
    pub user_name: Option<String>,
    pub webhook_base_url: Option<String>,
    pub api_base_url: Option<String>,
    pub disable_queue: Option<bool>,
    pub cache_path: Option<PathBuf>,
    pub max_rejections: Option<u32>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                default_token: String::new().into(),
                connection_mode: ConnectionMode::Webhook,
                user_name: String::new(),
                post_as_user: true,
                webhook_base_url: "https://hooks.slack.com/".to_string(),
                api_base_url: "https://slack.com/".to_string(),
                timeout_secs: 30,
            },
            queue: QueueConfig {
                disable_queue: false,
                cache_path: PathBuf::from(DEFAULT_CACHE_FILE_NAME),
                max_rejections: DEFAULT_MAX_REJECTIONS,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl ReporterConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Settings the delivery coordinator needs, detached from file-level concerns.
    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings {
            default_token: self.slack.default_token.clone(),
            disable_queue: self.queue.disable_queue,
            max_rejections: self.queue.max_rejections,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(default_token_value) = slack.default_token {
                self.slack.default_token = secret_value(default_token_value);
            }
            if let Some(connection_mode) = slack.connection_mode {
                self.slack.connection_mode = connection_mode;
            }
            if let Some(user_name) = slack.user_name {
                self.slack.user_name = user_name;
            }
            if let Some(post_as_user) = slack.post_as_user {
                self.slack.post_as_user = post_as_user;
            }
            if let Some(webhook_base_url) = slack.webhook_base_url {
                self.slack.webhook_base_url = webhook_base_url;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(queue) = patch.queue {
            if let Some(disable_queue) = queue.disable_queue {
                self.queue.disable_queue = disable_queue;
            }
            if let Some(cache_path) = queue.cache_path {
                self.queue.cache_path = cache_path;
            }
            if let Some(max_rejections) = queue.max_rejections {
                self.queue.max_rejections = max_rejections;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(default_token) = overrides.default_token {
            self.slack.default_token = secret_value(default_token);
        }
        if let Some(connection_mode) = overrides.connection_mode {
            self.slack.connection_mode = connection_mode;
        }
        if let Some(user_name) = overrides.user_name {
            self.slack.user_name = user_name;
        }
        if let Some(webhook_base_url) = overrides.webhook_base_url {
            self.slack.webhook_base_url = webhook_base_url;
        }
        if let Some(api_base_url) = overrides.api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(disable_queue) = overrides.disable_queue {
            self.queue.disable_queue = disable_queue;
        }
        if let Some(cache_path) = overrides.cache_path {
            self.queue.cache_path = cache_path;
        }
        if let Some(max_rejections) = overrides.max_rejections {
            self.queue.max_rejections = max_rejections;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_queue(&self.queue)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from("config").join(CONFIG_FILE_NAME)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let token = slack.default_token.expose_secret().trim();
    match slack.connection_mode {
        ConnectionMode::Authenticated => {
            if token.is_empty() {
                return Err(ConfigError::Validation(
                    "slack.default_token is required in authenticated mode. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions".to_string()
                ));
            }
            if !token.starts_with("xox") {
                let hint = if token.contains('/') {
                    " (hint: this looks like a webhook id; use connection_mode = \"webhook\")"
                } else {
                    ""
                };
                return Err(ConfigError::Validation(format!(
                    "slack.default_token must be a user or bot token starting with `xox`{hint}"
                )));
            }
        }
        ConnectionMode::Webhook => {
            if token.starts_with("http://") || token.starts_with("https://") {
                return Err(ConfigError::Validation(
                    "slack.default_token must be the webhook id only (the part after `/services/`), not the full URL".to_string(),
                ));
            }
        }
    }

    let base_urls = [
        ("slack.webhook_base_url", &slack.webhook_base_url),
        ("slack.api_base_url", &slack.api_base_url),
    ];
    for (key, url) in base_urls {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{key} must start with http:// or https://"
            )));
        }
    }

    if slack.timeout_secs == 0 || slack.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ConfigError> {
    if queue.cache_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("queue.cache_path must not be empty".to_string()));
    }
    if queue.cache_path.file_name().is_none() {
        return Err(ConfigError::Validation(
            "queue.cache_path must name a file, not a directory".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    queue: Option<QueuePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    default_token: Option<String>,
    connection_mode: Option<ConnectionMode>,
    user_name: Option<String>,
    post_as_user: Option<bool>,
    webhook_base_url: Option<String>,
    api_base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueuePatch {
    disable_queue: Option<bool>,
    cache_path: Option<PathBuf>,
    max_rejections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
