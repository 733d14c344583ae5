use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// REST API path prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/v2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300; // coarse total timeout, non-streaming calls
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120; // per-read timeout, list/describe/stream
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const MAX_ERROR_BODY_CHARS: usize = 2000;
pub const DEFAULT_ORIGIN_APPLICATION: &str = "hcls_agent_st";

/// Top-level config (cortex.toml + SNOWFLAKE_* / CORTEX_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexConfig {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Where and how to reach the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Account URL. A missing scheme is filled in with `https://`.
    pub account_url: String,
    /// Bearer token (PAT or OAuth access token).
    pub auth_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Verify server certificates. Turning this off is logged at warn level
    /// every time a client is built.
    #[serde(default = "bool_true")]
    pub verify_tls: bool,
}

/// Which agent object to run and how threads are tagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Tag attached to threads created by this front end.
    #[serde(default = "default_origin_application")]
    pub origin_application: String,
    /// `tool_choice.type` sent with every run. `None` omits the field.
    #[serde(default = "default_tool_choice")]
    pub tool_choice: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            schema: default_schema(),
            name: default_agent_name(),
            origin_application: default_origin_application(),
            tool_choice: default_tool_choice(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}
fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_database() -> String {
    "SNOWFLAKE_INTELLIGENCE".to_string()
}
fn default_schema() -> String {
    "AGENTS".to_string()
}
fn default_agent_name() -> String {
    "HCLS_AGENT".to_string()
}
fn default_origin_application() -> String {
    DEFAULT_ORIGIN_APPLICATION.to_string()
}
fn default_tool_choice() -> Option<String> {
    Some("auto".to_string())
}

impl CortexConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Path resolution:
    ///   1. Explicit path argument
    ///   2. `CORTEX_CONFIG` env var
    ///   3. ~/.cortex/cortex.toml
    ///
    /// The legacy `SNOWFLAKE_ACCOUNT_URL` / `SNOWFLAKE_AUTH_TOKEN` family is
    /// honoured, and `CORTEX_SECTION__KEY` variables win over everything.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CORTEX_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        tracing::debug!(path = %path, "loading config");

        let config: CortexConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(snowflake_env())
            .merge(Env::prefixed("CORTEX_").split("__"))
            .extract()
            .map_err(|e| crate::error::CortexError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        if self.connection.account_url.trim().is_empty()
            || self.connection.auth_token.trim().is_empty()
        {
            return Err(crate::error::CortexError::Config(
                "SNOWFLAKE_ACCOUNT_URL and SNOWFLAKE_AUTH_TOKEN must be set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Maps the flat `SNOWFLAKE_*` variables onto their config sections.
fn snowflake_env() -> Env {
    Env::prefixed("SNOWFLAKE_").filter_map(|key| {
        let mapped = match key.as_str().to_ascii_lowercase().as_str() {
            "account_url" => "connection.account_url",
            "auth_token" => "connection.auth_token",
            "agent_database" => "agent.database",
            "agent_schema" => "agent.schema",
            "agent_name" => "agent.name",
            "origin_application" => "agent.origin_application",
            _ => return None,
        };
        Some(mapped.into())
    })
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cortex/cortex.toml", home)
}
