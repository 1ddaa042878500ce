//! Shared utility functions for provider adapters.

use ag_domain::config::UpstreamConfig;
use ag_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the upstream API key.
///
/// Precedence:
/// 1. `api_key` field (plaintext, warned)
/// 2. `api_key_env` environment variable
/// 3. Empty key; the upstream decides whether it needs one
pub fn resolve_api_key(cfg: &UpstreamConfig) -> String {
    if let Some(ref key) = cfg.api_key {
        tracing::warn!(
            "API key loaded from plaintext config field 'api_key'; \
             prefer 'api_key_env' instead"
        );
        return key.clone();
    }

    if let Some(ref env_var) = cfg.api_key_env {
        match std::env::var(env_var) {
            Ok(key) => return key,
            Err(_) => {
                tracing::warn!(
                    env_var = %env_var,
                    "API key environment variable not set, sending requests without a key"
                );
            }
        }
    }

    String::new()
}
