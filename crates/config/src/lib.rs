//! Configuration loading, validation, and management for Waypoint.
//!
//! Loads configuration from `~/.waypoint/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use waypoint_core::Budgets;

/// The root configuration structure.
///
/// Maps directly to `~/.waypoint/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Tools whose results are never echoed in the final reply
    #[serde(default = "default_silent_tools")]
    pub silent_tools: Vec<String>,

    /// Run budgets
    #[serde(default)]
    pub budgets: BudgetConfig,

    /// Human-in-the-loop gates
    #[serde(default)]
    pub hitl: HitlConfig,

    /// Checkpoint storage
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Reasoner prompt settings
    #[serde(default)]
    pub reasoner: ReasonerConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "deepseek".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

fn default_silent_tools() -> Vec<String> {
    [
        "memory_save_location",
        "memory_save_preference",
        "memory_save_user_profile",
        "memory_save_relationship",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("silent_tools", &self.silent_tools)
            .field("budgets", &self.budgets)
            .field("hitl", &self.hitl)
            .field("checkpoint", &self.checkpoint)
            .field("reasoner", &self.reasoner)
            .field("gateway", &self.gateway)
            .field("telemetry", &self.telemetry)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

// ── Budgets ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_max_total_tool_calls")]
    pub max_total_tool_calls: u32,

    #[serde(default = "default_wall_clock_timeout_secs")]
    pub wall_clock_timeout_secs: u64,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Reset the iteration counter at the start of every user turn
    #[serde(default = "default_true")]
    pub reset_iterations_each_turn: bool,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_max_total_tool_calls() -> u32 {
    50
}
fn default_wall_clock_timeout_secs() -> u64 {
    120
}
fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_total_tool_calls: default_max_total_tool_calls(),
            wall_clock_timeout_secs: default_wall_clock_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            reset_iterations_each_turn: true,
        }
    }
}

impl BudgetConfig {
    pub fn to_budgets(&self) -> Budgets {
        Budgets {
            max_iterations: self.max_iterations,
            max_total_tool_calls: self.max_total_tool_calls,
            wall_clock_timeout: Duration::from_secs(self.wall_clock_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
        }
    }
}

// ── Human-in-the-loop ─────────────────────────────────────────────────────

/// Which tools pause for a human, and what they say when they do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlConfig {
    /// High-risk tools that need explicit confirmation before running
    #[serde(default = "default_require_confirmation")]
    pub require_confirmation: Vec<String>,

    /// Tools whose list-shaped results are offered to the user for selection
    #[serde(default = "default_require_selection")]
    pub require_selection: Vec<String>,

    /// Confirmation message used when a tool has no template (or it fails); `{tool}` is substituted
    #[serde(default = "default_confirmation_message")]
    pub default_confirmation: String,

    /// Selection message used when a tool has no template; `{count}` is substituted
    #[serde(default = "default_selection_message")]
    pub default_selection: String,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// tool → field → prompt shown when that field is missing
    #[serde(default = "default_param_prompts")]
    pub param_prompts: HashMap<String, HashMap<String, String>>,

    /// tool → message with `{field}` placeholders filled from the arguments
    #[serde(default = "default_confirmation_templates")]
    pub confirmation_templates: HashMap<String, String>,

    /// tool → message with a `{count}` placeholder
    #[serde(default = "default_selection_templates")]
    pub selection_templates: HashMap<String, String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_require_confirmation() -> Vec<String> {
    strings(&[
        "set_destination",
        "set_destination_with_memory",
        "add_via_poi",
        "start_navigation",
        "stop_navigation",
        "book_ticket",
        "cancel_ticket",
        "pay_order",
        "memory_save_user_profile",
        "memory_save_relationship",
    ])
}

fn default_require_selection() -> Vec<String> {
    strings(&["query_tickets"])
}

fn default_confirmation_message() -> String {
    "About to run {tool}. Do you want to continue?".into()
}

fn default_selection_message() -> String {
    "I found {count} options. Which one would you like?".into()
}

fn default_max_candidates() -> usize {
    10
}

fn default_min_candidates() -> usize {
    2
}

fn default_param_prompts() -> HashMap<String, HashMap<String, String>> {
    let mut prompts = HashMap::new();
    prompts.insert(
        "get_weather".into(),
        pairs(&[("city", "Which city should I check the weather for?")]),
    );
    prompts.insert(
        "search_poi".into(),
        pairs(&[("keyword", "What place are you looking for?")]),
    );
    prompts.insert(
        "search_nearby_poi".into(),
        pairs(&[("keyword", "What kind of place nearby are you looking for?")]),
    );
    prompts.insert(
        "set_destination".into(),
        pairs(&[("poi_name", "Where would you like to go?")]),
    );
    prompts.insert(
        "start_navigation".into(),
        pairs(&[("destination", "Where should I navigate to?")]),
    );
    prompts.insert(
        "query_tickets".into(),
        pairs(&[
            ("from_station", "Which station are you leaving from?"),
            ("to_station", "Which station are you going to?"),
            ("date", "Which day do you want to travel (YYYY-MM-DD)?"),
        ]),
    );
    prompts.insert(
        "book_ticket".into(),
        pairs(&[
            ("train_no", "Which train should I book?"),
            ("date", "Which day do you want to travel (YYYY-MM-DD)?"),
        ]),
    );
    prompts
}

fn default_confirmation_templates() -> HashMap<String, String> {
    pairs(&[
        ("set_destination", "Set the destination to {poi_name}?"),
        ("set_destination_with_memory", "Set the destination to {poi_name}?"),
        ("add_via_poi", "Add {poi_name} as a stop along the way?"),
        ("start_navigation", "Start navigating to {destination}?"),
        ("stop_navigation", "Stop the current navigation?"),
        ("book_ticket", "Book train {train_no} on {date}?"),
        ("cancel_ticket", "Cancel ticket {ticket_id}?"),
        ("pay_order", "Pay for order {order_id}?"),
        ("memory_save_user_profile", "Remember {key} = {value} in your profile?"),
        ("memory_save_relationship", "Remember that {name} is your {relationship}?"),
    ])
}

fn default_selection_templates() -> HashMap<String, String> {
    pairs(&[("query_tickets", "I found {count} trains. Which one would you like?")])
}

impl Default for HitlConfig {
    fn default() -> Self {
        Self {
            require_confirmation: default_require_confirmation(),
            require_selection: default_require_selection(),
            default_confirmation: default_confirmation_message(),
            default_selection: default_selection_message(),
            max_candidates: default_max_candidates(),
            min_candidates: default_min_candidates(),
            param_prompts: default_param_prompts(),
            confirmation_templates: default_confirmation_templates(),
            selection_templates: default_selection_templates(),
        }
    }
}

// ── Checkpoints ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// "sqlite", "file", or "memory"
    #[serde(default = "default_checkpoint_backend")]
    pub backend: String,

    /// Database file (sqlite) or directory (file); defaults under the config dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_checkpoint_backend() -> String {
    "sqlite".into()
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: default_checkpoint_backend(),
            path: None,
        }
    }
}

impl CheckpointConfig {
    /// The effective storage path for the configured backend.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None if self.backend == "file" => AppConfig::config_dir().join("checkpoints"),
            None => AppConfig::config_dir().join("checkpoints.db"),
        }
    }
}

// ── Reasoner / gateway / telemetry ───────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonerConfig {
    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8642
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Record per-turn traces
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum traces kept in memory
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
}

fn default_max_traces() -> usize {
    500
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_traces: default_max_traces(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.waypoint/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `WAYPOINT_API_KEY`, then `DEEPSEEK_API_KEY`, then `OPENAI_API_KEY`
    /// - `WAYPOINT_PROVIDER`, `WAYPOINT_MODEL`
    /// - `WAYPOINT_MAX_ITERATIONS`, `WAYPOINT_MAX_TOOL_CALLS`
    /// - `WAYPOINT_CHECKPOINT_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from a specific path, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the environment in production).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("WAYPOINT_API_KEY")
                .or_else(|| lookup("DEEPSEEK_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("WAYPOINT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("WAYPOINT_MODEL") {
            self.default_model = model;
        }

        if let Some(raw) = lookup("WAYPOINT_MAX_ITERATIONS") {
            self.budgets.max_iterations = parse_override("WAYPOINT_MAX_ITERATIONS", &raw)?;
        }

        if let Some(raw) = lookup("WAYPOINT_MAX_TOOL_CALLS") {
            self.budgets.max_total_tool_calls = parse_override("WAYPOINT_MAX_TOOL_CALLS", &raw)?;
        }

        if let Some(path) = lookup("WAYPOINT_CHECKPOINT_PATH") {
            self.checkpoint.path = Some(PathBuf::from(path));
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".waypoint")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.budgets.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "budgets.max_iterations must be at least 1".into(),
            ));
        }

        if self.budgets.max_total_tool_calls == 0 {
            return Err(ConfigError::ValidationError(
                "budgets.max_total_tool_calls must be at least 1".into(),
            ));
        }

        if self.budgets.wall_clock_timeout_secs == 0 || self.budgets.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "budget timeouts must be greater than zero".into(),
            ));
        }

        if self.hitl.min_candidates < 1 || self.hitl.max_candidates < self.hitl.min_candidates {
            return Err(ConfigError::ValidationError(
                "hitl.max_candidates must be >= hitl.min_candidates >= 1".into(),
            ));
        }

        if !matches!(self.checkpoint.backend.as_str(), "sqlite" | "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown checkpoint backend '{}' (expected sqlite, file or memory)",
                self.checkpoint.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value '{raw}'")))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            silent_tools: default_silent_tools(),
            budgets: BudgetConfig::default(),
            hitl: HitlConfig::default(),
            checkpoint: CheckpointConfig::default(),
            reasoner: ReasonerConfig::default(),
            gateway: GatewayConfig::default(),
            telemetry: TelemetryConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
