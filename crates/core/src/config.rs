use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub carrier: CarrierConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    /// Sessions untouched for longer than this are dropped by the store.
    pub ttl_secs: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Carrier endpoint settings and the markup defaults applied when the
/// engine does not say otherwise.
#[derive(Clone, Debug)]
pub struct CarrierConfig {
    /// Shared secret for `x-zang-signature`. `None` disables verification.
    pub auth_token: Option<SecretString>,
    pub api_version: String,
    pub url_token: String,
    pub default_language: String,
    pub default_voice: String,
    pub default_caller_id: String,
    pub gather_timeout_secs: u32,
    pub default_num_digits: u32,
    pub max_conference_parties: u32,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub provider: EngineProvider,
    pub endpoint_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub script_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    Sqlite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineProvider {
    Rest,
    Scripted,
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
    pub database_url: Option<String>,
    pub session_backend: Option<SessionBackend>,
    pub log_level: Option<String>,
    pub carrier_auth_token: Option<String>,
    pub carrier_url_token: Option<String>,
    pub engine_provider: Option<EngineProvider>,
    pub engine_endpoint_url: Option<String>,
    pub engine_script_path: Option<PathBuf>,
    pub server_port: Option<u16>,
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
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://callbridge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            session: SessionConfig {
                backend: SessionBackend::Memory,
                ttl_secs: DEFAULT_SESSION_TTL_SECS,
            },
            carrier: CarrierConfig::default(),
            engine: EngineConfig {
                provider: EngineProvider::Scripted,
                endpoint_url: None,
                api_key: None,
                timeout_secs: 10,
                script_path: None,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for CarrierConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            api_version: "v2".to_string(),
            url_token: "carrier".to_string(),
            default_language: "en-US".to_string(),
            default_voice: "woman".to_string(),
            default_caller_id: "18004567890".to_string(),
            gather_timeout_secs: 10,
            default_num_digits: 1,
            max_conference_parties: 2,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SessionBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Validation(format!(
                "unsupported session backend `{other}` (expected memory|sqlite)"
            ))),
        }
    }
}

impl std::str::FromStr for EngineProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rest" => Ok(Self::Rest),
            "scripted" => Ok(Self::Scripted),
            other => Err(ConfigError::Validation(format!(
                "unsupported engine provider `{other}` (expected rest|scripted)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("callbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(session) = patch.session {
            if let Some(backend) = session.backend {
                self.session.backend = backend;
            }
            if let Some(ttl_secs) = session.ttl_secs {
                self.session.ttl_secs = ttl_secs;
            }
        }

        if let Some(carrier) = patch.carrier {
            if let Some(auth_token_value) = carrier.auth_token {
                self.carrier.auth_token = Some(secret_value(auth_token_value));
            }
            if let Some(api_version) = carrier.api_version {
                self.carrier.api_version = api_version;
            }
            if let Some(url_token) = carrier.url_token {
                self.carrier.url_token = url_token;
            }
            if let Some(default_language) = carrier.default_language {
                self.carrier.default_language = default_language;
            }
            if let Some(default_voice) = carrier.default_voice {
                self.carrier.default_voice = default_voice;
            }
            if let Some(default_caller_id) = carrier.default_caller_id {
                self.carrier.default_caller_id = default_caller_id;
            }
            if let Some(gather_timeout_secs) = carrier.gather_timeout_secs {
                self.carrier.gather_timeout_secs = gather_timeout_secs;
            }
            if let Some(default_num_digits) = carrier.default_num_digits {
                self.carrier.default_num_digits = default_num_digits;
            }
            if let Some(max_conference_parties) = carrier.max_conference_parties {
                self.carrier.max_conference_parties = max_conference_parties;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(provider) = engine.provider {
                self.engine.provider = provider;
            }
            if let Some(endpoint_url) = engine.endpoint_url {
                self.engine.endpoint_url = Some(endpoint_url);
            }
            if let Some(engine_api_key_value) = engine.api_key {
                self.engine.api_key = Some(secret_value(engine_api_key_value));
            }
            if let Some(timeout_secs) = engine.timeout_secs {
                self.engine.timeout_secs = timeout_secs;
            }
            if let Some(script_path) = engine.script_path {
                self.engine.script_path = Some(script_path);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CALLBRIDGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CALLBRIDGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CALLBRIDGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLBRIDGE_SESSION_BACKEND") {
            self.session.backend = value.parse()?;
        }
        if let Some(value) = read_env("CALLBRIDGE_SESSION_TTL_SECS") {
            self.session.ttl_secs = parse_u64("CALLBRIDGE_SESSION_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLBRIDGE_CARRIER_AUTH_TOKEN") {
            self.carrier.auth_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_API_VERSION") {
            self.carrier.api_version = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_URL_TOKEN") {
            self.carrier.url_token = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_DEFAULT_LANGUAGE") {
            self.carrier.default_language = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_DEFAULT_VOICE") {
            self.carrier.default_voice = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_DEFAULT_CALLER_ID") {
            self.carrier.default_caller_id = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_GATHER_TIMEOUT_SECS") {
            self.carrier.gather_timeout_secs =
                parse_u32("CALLBRIDGE_CARRIER_GATHER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_DEFAULT_NUM_DIGITS") {
            self.carrier.default_num_digits =
                parse_u32("CALLBRIDGE_CARRIER_DEFAULT_NUM_DIGITS", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_CARRIER_MAX_CONFERENCE_PARTIES") {
            self.carrier.max_conference_parties =
                parse_u32("CALLBRIDGE_CARRIER_MAX_CONFERENCE_PARTIES", &value)?;
        }

        if let Some(value) = read_env("CALLBRIDGE_ENGINE_PROVIDER") {
            self.engine.provider = value.parse()?;
        }
        if let Some(value) = read_env("CALLBRIDGE_ENGINE_ENDPOINT_URL") {
            self.engine.endpoint_url = Some(value);
        }
        if let Some(value) = read_env("CALLBRIDGE_ENGINE_API_KEY") {
            self.engine.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CALLBRIDGE_ENGINE_TIMEOUT_SECS") {
            self.engine.timeout_secs = parse_u64("CALLBRIDGE_ENGINE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_ENGINE_SCRIPT_PATH") {
            self.engine.script_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("CALLBRIDGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CALLBRIDGE_SERVER_PORT") {
            self.server.port = parse_u16("CALLBRIDGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CALLBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CALLBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CALLBRIDGE_LOGGING_LEVEL").or_else(|| read_env("CALLBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CALLBRIDGE_LOGGING_FORMAT").or_else(|| read_env("CALLBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(session_backend) = overrides.session_backend {
            self.session.backend = session_backend;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(carrier_auth_token) = overrides.carrier_auth_token {
            self.carrier.auth_token = Some(secret_value(carrier_auth_token));
        }
        if let Some(carrier_url_token) = overrides.carrier_url_token {
            self.carrier.url_token = carrier_url_token;
        }
        if let Some(engine_provider) = overrides.engine_provider {
            self.engine.provider = engine_provider;
        }
        if let Some(engine_endpoint_url) = overrides.engine_endpoint_url {
            self.engine.endpoint_url = Some(engine_endpoint_url);
        }
        if let Some(engine_script_path) = overrides.engine_script_path {
            self.engine.script_path = Some(engine_script_path);
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_session(&self.session)?;
        validate_carrier(&self.carrier)?;
        validate_engine(&self.engine)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("callbridge.toml"), PathBuf::from("config/callbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "session.ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_carrier(carrier: &CarrierConfig) -> Result<(), ConfigError> {
    if carrier.api_version.trim().is_empty() {
        return Err(ConfigError::Validation("carrier.api_version must not be empty".to_string()));
    }

    let url_token = carrier.url_token.trim();
    if url_token.is_empty() || url_token.contains('/') {
        return Err(ConfigError::Validation(
            "carrier.url_token must be a single non-empty path segment".to_string(),
        ));
    }

    if let Some(token) = &carrier.auth_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "carrier.auth_token is set but empty; remove it to disable signature checks"
                    .to_string(),
            ));
        }
    }

    if carrier.default_num_digits == 0 {
        return Err(ConfigError::Validation(
            "carrier.default_num_digits must be greater than zero".to_string(),
        ));
    }

    if carrier.gather_timeout_secs == 0 || carrier.gather_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "carrier.gather_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    if carrier.max_conference_parties < 2 {
        return Err(ConfigError::Validation(
            "carrier.max_conference_parties must be at least 2".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.timeout_secs == 0 || engine.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "engine.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if engine.provider == EngineProvider::Rest {
        let Some(endpoint_url) = engine.endpoint_url.as_deref() else {
            return Err(ConfigError::Validation(
                "engine.endpoint_url is required for the rest provider".to_string(),
            ));
        };
        if !endpoint_url.starts_with("http://") && !endpoint_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "engine.endpoint_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    session: Option<SessionPatch>,
    carrier: Option<CarrierPatch>,
    engine: Option<EnginePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    backend: Option<SessionBackend>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CarrierPatch {
    auth_token: Option<String>,
    api_version: Option<String>,
    url_token: Option<String>,
    default_language: Option<String>,
    default_voice: Option<String>,
    default_caller_id: Option<String>,
    gather_timeout_secs: Option<u32>,
    default_num_digits: Option<u32>,
    max_conference_parties: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    provider: Option<EngineProvider>,
    endpoint_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    script_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
