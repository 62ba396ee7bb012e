use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client settings. Everything has a default; `from_env` overlays
/// environment values.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    /// How long a command may wait for its response before failing with
    /// `CommandTimeout`. Overridable per command with `ModifyOption::Timeout`.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub default_timeout: Duration,

    /// Whether commands expect a response unless told otherwise.
    #[builder(default = true)]
    pub response_required_default: bool,

    /// Label attached to log lines, to tell client instances apart.
    #[builder(default = String::from("twinlink"), setter(into))]
    pub client_label: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientConfig {
    /// Load from environment variables (and `.env` if present).
    ///
    /// - `TWINLINK_DEFAULT_TIMEOUT_MS`: response timeout in milliseconds
    /// - `TWINLINK_CLIENT_LABEL`: log label
    /// - `TWINLINK_RESPONSE_REQUIRED`: `true`/`false`
    pub fn from_env() -> ClientResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("TWINLINK_DEFAULT_TIMEOUT_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("TWINLINK_DEFAULT_TIMEOUT_MS must be a number, got {raw:?}"))
            })?;
            if ms == 0 {
                return Err(ClientError::Config(
                    "TWINLINK_DEFAULT_TIMEOUT_MS must be positive".into(),
                ));
            }
            config.default_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup("TWINLINK_RESPONSE_REQUIRED") {
            config.response_required_default = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("TWINLINK_RESPONSE_REQUIRED must be true or false, got {raw:?}"))
            })?;
        }

        if let Some(label) = lookup("TWINLINK_CLIENT_LABEL").filter(|l| !l.trim().is_empty()) {
            config.client_label = label.trim().to_string();
        }

        Ok(config)
    }

    pub fn log_summary(&self) {
        tracing::info!(
            label = %self.client_label,
            default_timeout_ms = self.default_timeout.as_millis() as u64,
            response_required = self.response_required_default,
            "Client config loaded"
        );
    }
}
