use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use callbridge_core::config::{AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("session.backend", format!("{:?}", config.session.backend)),
        ("session.ttl_secs", config.session.ttl_secs.to_string()),
        ("carrier.auth_token", redact_secret(config.carrier.auth_token.as_ref())),
        ("carrier.api_version", config.carrier.api_version.clone()),
        ("carrier.url_token", config.carrier.url_token.clone()),
        ("carrier.default_language", config.carrier.default_language.clone()),
        ("carrier.default_voice", config.carrier.default_voice.clone()),
        ("carrier.default_caller_id", config.carrier.default_caller_id.clone()),
        ("carrier.gather_timeout_secs", config.carrier.gather_timeout_secs.to_string()),
        ("carrier.default_num_digits", config.carrier.default_num_digits.to_string()),
        ("carrier.max_conference_parties", config.carrier.max_conference_parties.to_string()),
        ("engine.provider", format!("{:?}", config.engine.provider)),
        (
            "engine.endpoint_url",
            config.engine.endpoint_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("engine.api_key", redact_secret(config.engine.api_key.as_ref())),
        ("engine.timeout_secs", config.engine.timeout_secs.to_string()),
        (
            "engine.script_path",
            config
                .engine
                .script_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<builtin demo>".to_string()),
        ),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("server.graceful_shutdown_secs", config.server.graceful_shutdown_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value) in fields {
        let env_key = env_key_for(key);
        lines.push(render_line(
            key,
            &value,
            field_source(
                key,
                Some(&env_key),
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        ));
    }

    lines.join("\n")
}

fn env_key_for(key_path: &str) -> String {
    format!("CALLBRIDGE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn detect_config_path() -> Option<PathBuf> {
    ["callbridge.toml", "config/callbridge.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}
