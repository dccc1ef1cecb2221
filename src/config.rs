//! Configuration loading and validation.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level server configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub jwt: JwtConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub vip: VipConfig,

    #[serde(default)]
    pub blockable_admins: bool,

    #[serde(default)]
    pub public_channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub message_filters: Vec<MessageFilterConfig>,

    #[serde(default)]
    pub moderation_rules: Vec<ModerationRuleConfig>,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub direct_message_history: HistoryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            jwt: JwtConfig::default(),
            admin: AdminConfig::default(),
            vip: VipConfig::default(),
            blockable_admins: false,
            public_channels: Vec::new(),
            message_filters: Vec::new(),
            moderation_rules: Vec::new(),
            websocket: WebSocketConfig::default(),
            direct_message_history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_bind")]
    pub socket_bind: String,

    #[serde(default = "default_poll_bind")]
    pub poll_bind: String,

    #[serde(default = "default_admin_bind")]
    pub admin_bind: String,

    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    #[serde(default = "default_cors_hosts")]
    pub cors_hosts: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            name: default_name(),
            socket_bind: default_bind(),
            poll_bind: default_poll_bind(),
            admin_bind: default_admin_bind(),
            metrics_port: default_metrics_port(),
            log_format: default_log_format(),
            cors_hosts: default_cors_hosts(),
        }
    }
}

fn default_name() -> String {
    "BareRTC".to_string()
}
fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_poll_bind() -> String {
    "0.0.0.0:8081".to_string()
}
fn default_admin_bind() -> String {
    "127.0.0.1:8082".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}
fn default_cors_hosts() -> Vec<String> {
    Vec::new()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// JWT-gated login.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Strict mode: plain (tokenless) logins are rejected outright.
    #[serde(default)]
    pub strict: bool,

    /// HMAC secret used to validate/resign claims. Empty string disables
    /// the collaborator entirely regardless of `enabled`.
    #[serde(default)]
    pub secret: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtConfig {
            enabled: false,
            strict: false,
            secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        AdminConfig {
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VipConfig {
    #[serde(default)]
    pub mutually_secret: bool,
}

/// One public channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub vip_only: bool,

    #[serde(default = "default_true")]
    pub permit_photos: bool,

    #[serde(default)]
    pub welcome_messages: Vec<String>,

    #[serde(default = "default_echo_count")]
    pub echo_messages_on_join: usize,
}

fn default_true() -> bool {
    true
}
fn default_echo_count() -> usize {
    30
}

/// A server-side message filter rule.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Phrases compiled as regular expressions (word-boundary phrase sets).
    pub phrases: Vec<String>,

    #[serde(default)]
    pub scope: FilterScope,

    #[serde(default)]
    pub censor_message: bool,

    /// When false, the (possibly censored) message is echoed back to the
    /// sender only and dropped from delivery to everyone else.
    #[serde(default = "default_true")]
    pub forward_message: bool,

    #[serde(default)]
    pub report_message: bool,

    #[serde(default)]
    pub chat_server_response: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterScope {
    #[default]
    Both,
    Public,
    Private,
}

/// Per-username moderation rule. JWT-carried rule tokens are merged with
/// these at evaluation time (see `collaborators::jwt::Rule` and
/// `state::moderation::merge_rules`).
#[derive(Debug, Clone, Deserialize)]
pub struct ModerationRuleConfig {
    pub username: String,

    #[serde(default)]
    pub camera_always_nsfw: bool,

    #[serde(default)]
    pub disable_camera: bool,

    #[serde(default)]
    pub no_broadcast: bool,

    #[serde(default)]
    pub no_video: bool,

    #[serde(default)]
    pub no_image: bool,

    #[serde(default)]
    pub no_dark_video: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_read_limit")]
    pub read_limit_bytes: usize,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            read_limit_bytes: default_read_limit(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_read_limit() -> usize {
    40 * 1024 * 1024
}
fn default_send_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_history_path")]
    pub path: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            enabled: false,
            path: default_history_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_history_path() -> String {
    "barertc-history.db".to_string()
}
fn default_retention_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub directory: String,

    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default)]
    pub usernames: Vec<String>,
}

/// Webhook-out collaborator target.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    pub url: String,

    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Load and parse the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn get_channel(&self, id_or_at: &str) -> Option<&ChannelConfig> {
        let id = id_or_at.strip_prefix('@').unwrap_or(id_or_at);
        self.public_channels.iter().find(|c| c.id == id)
    }

    pub fn get_moderation_rule(&self, username: &str) -> Option<&ModerationRuleConfig> {
        self.moderation_rules.iter().find(|r| r.username == username)
    }

    pub fn get_webhook(&self, name: &str) -> Option<&WebhookConfig> {
        self.webhooks.iter().find(|w| w.name == name)
    }

    pub fn webhook_enabled(&self, name: &str) -> bool {
        self.get_webhook(name).map(|w| w.enabled).unwrap_or(false)
    }
}

/// Validate a loaded configuration, run once at startup before any listener
/// binds.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.jwt.strict && !config.jwt.enabled {
        errors.push("jwt.strict requires jwt.enabled".to_string());
    }
    if config.jwt.enabled && config.jwt.secret.is_empty() {
        errors.push("jwt.enabled requires a non-empty jwt.secret".to_string());
    }
    if config.admin.api_key.is_empty() {
        errors.push("admin.api_key must be set to enable the admin control plane".to_string());
    }

    for filter in &config.message_filters {
        for phrase in &filter.phrases {
            if let Err(e) = regex::Regex::new(phrase) {
                errors.push(format!("invalid message filter phrase {phrase:?}: {e}"));
            }
        }
    }

    let mut seen_channels = std::collections::HashSet::new();
    for channel in &config.public_channels {
        if !seen_channels.insert(&channel.id) {
            errors.push(format!("duplicate public channel id: {}", channel.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
