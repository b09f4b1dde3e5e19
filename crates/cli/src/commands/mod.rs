pub mod config;
pub mod doctor;
pub mod migrate;
pub mod sign;
pub mod simulate;

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Parses repeated `KEY=VALUE` arguments. Later keys win.
pub fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>, String> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(format!("expected KEY=VALUE, got `{pair}`")),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_params;

    #[test]
    fn params_split_on_first_equals_sign() {
        let params = parse_params(&["UrlBase=https://x/y?a=b".to_string(), "Digits=".to_string()])
            .expect("params");

        assert_eq!(params.get("UrlBase").map(String::as_str), Some("https://x/y?a=b"));
        assert_eq!(params.get("Digits").map(String::as_str), Some(""));
    }

    #[test]
    fn params_without_key_are_rejected() {
        assert!(parse_params(&["=value".to_string()]).is_err());
        assert!(parse_params(&["novalue".to_string()]).is_err());
    }
}
