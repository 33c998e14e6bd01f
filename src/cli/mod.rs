use clap::{ Args as ClapArgs, Parser, Subcommand };
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the state + chat proxy HTTP server
    Serve(ServeArgs),
    /// Interactive terminal client for a running server
    Console(ConsoleArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:3001")]
    pub server_addr: String,

    // --- State Store Args ---
    /// Backing medium for the simulation state (file, sqlite, memory)
    #[arg(long, env = "STATE_BACKEND", default_value = "file")]
    pub state_backend: String,

    /// JSON file used by the file backend.
    #[arg(long, env = "STATE_PATH", default_value = "memory.json")]
    pub state_path: String,

    /// Database file used by the sqlite backend.
    #[arg(long, env = "SQLITE_PATH", default_value = "memory.db")]
    pub sqlite_path: String,

    // --- Chat LLM Provider Args ---
    /// API Key for the upstream chat provider. Required.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    pub chat_api_key: Option<String>,

    /// Base URL of the upstream provider API (chat calls go to /v1/chat/completions)
    #[arg(long, env = "CHAT_BASE_URL", default_value = "https://api.mistral.ai")]
    pub chat_base_url: String,

    /// Model used when a chat request does not name one.
    #[arg(long, env = "CHAT_MODEL", default_value = "mistral-large-latest")]
    pub chat_model: String,

    /// Sampling temperature used when a chat request does not set one.
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Completion token cap used when a chat request does not set one.
    #[arg(long, env = "CHAT_MAX_TOKENS", default_value = "2000")]
    pub chat_max_tokens: u32,

    /// Forward every unmatched path and method to the upstream provider.
    #[arg(long, env = "ENABLE_PROXY", default_value = "false")]
    pub enable_proxy: bool,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ConsoleArgs {
    /// Base URL of a running simrelay server.
    #[arg(long, env = "SERVER_URL", default_value = "http://127.0.0.1:3001")]
    pub server_url: String,

    /// Quiet period before local state changes are written back.
    #[arg(long, env = "SAVE_DEBOUNCE_MS", default_value = "500")]
    pub save_debounce_ms: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MISTRAL_API_KEY (--chat-api-key) must be set to a non-empty value")]
    MissingApiKey,

    #[error("Both --tls-cert-path and --tls-key-path must be provided to enable TLS")]
    IncompleteTls,

    #[error("Unsupported state backend: {0}")]
    UnsupportedBackend(String),

    #[error("State store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid upstream configuration: {0}")]
    InvalidUpstream(String),
}

impl ServeArgs {
    /// Checks the settings that cannot be defaulted. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.chat_api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => {}
            _ => {
                return Err(ConfigError::MissingApiKey);
            }
        }

        if self.enable_tls && (self.tls_cert_path.is_none() || self.tls_key_path.is_none()) {
            return Err(ConfigError::IncompleteTls);
        }

        match self.state_backend.to_lowercase().as_str() {
            "file" | "sqlite" | "memory" => Ok(()),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }

    pub fn api_key(&self) -> &str {
        self.chat_api_key.as_deref().map(str::trim).unwrap_or_default()
    }
}
