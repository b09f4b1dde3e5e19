use callbridge_core::config::{AppConfig, LoadOptions};
use callbridge_core::signature::compute_signature;
use secrecy::ExposeSecret;

use crate::commands::{parse_params, CommandResult};

pub fn run(url: &str, raw_params: &[String]) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sign",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let Some(secret) = config.carrier.auth_token.as_ref() else {
        return CommandResult::failure(
            "sign",
            "missing_secret",
            "carrier.auth_token must be configured to sign callbacks",
            3,
        );
    };

    let params = match parse_params(raw_params) {
        Ok(params) => params,
        Err(message) => return CommandResult::failure("sign", "invalid_input", message, 3),
    };

    let signature = compute_signature(secret.expose_secret().as_bytes(), url, &params);
    CommandResult::success("sign", signature)
}
