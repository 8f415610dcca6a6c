//! Client configuration
//!
//! Defaults mirror the development setup; every field can be overridden
//! from `HOUSEMATE_*` environment variables.

use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Application key used to validate messages before any user has signed in
pub const DEFAULT_APP_KEY: &str = "75b4ca08fade4db1900296126ae5670e";

/// Client settings
#[derive(Debug, Clone)]
pub struct Settings {
    /// Use the production addresses
    pub prod: bool,
    /// Retry failed transports with doubling backoff. Should usually be on.
    pub comm_backoff: bool,
    pub dev_server_address: String,
    pub prod_server_address: Option<String>,
    pub dev_node_address: String,
    pub prod_node_address: Option<String>,
    /// First retry delay for a failed message
    pub retry_base: Duration,
    /// Optional ceiling for the retry delay. `None` keeps doubling forever.
    pub max_retry_delay: Option<Duration>,
    pub request_timeout: Duration,
    pub app_key: String,
    /// IANA zone name sent when creating a group
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            prod: false,
            comm_backoff: true,
            dev_server_address: "http://localhost:8081".to_string(),
            prod_server_address: None,
            dev_node_address: "http://localhost:82".to_string(),
            prod_node_address: None,
            retry_base: Duration::from_millis(500),
            max_retry_delay: None,
            request_timeout: Duration::from_secs(10),
            app_key: DEFAULT_APP_KEY.to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("HOUSEMATE_PROD") {
            settings.prod = parse_bool("HOUSEMATE_PROD", &v)?;
        }
        if let Some(v) = lookup("HOUSEMATE_COMM_BACKOFF") {
            settings.comm_backoff = parse_bool("HOUSEMATE_COMM_BACKOFF", &v)?;
        }
        if let Some(v) = lookup("HOUSEMATE_SERVER_ADDRESS") {
            if settings.prod {
                settings.prod_server_address = Some(v);
            } else {
                settings.dev_server_address = v;
            }
        }
        if let Some(v) = lookup("HOUSEMATE_NODE_ADDRESS") {
            if settings.prod {
                settings.prod_node_address = Some(v);
            } else {
                settings.dev_node_address = v;
            }
        }
        if let Some(v) = lookup("HOUSEMATE_RETRY_BASE_MS") {
            settings.retry_base = parse_millis("HOUSEMATE_RETRY_BASE_MS", &v)?;
        }
        if let Some(v) = lookup("HOUSEMATE_MAX_RETRY_DELAY_MS") {
            settings.max_retry_delay = Some(parse_millis("HOUSEMATE_MAX_RETRY_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("HOUSEMATE_REQUEST_TIMEOUT_MS") {
            settings.request_timeout = parse_millis("HOUSEMATE_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("HOUSEMATE_APP_KEY") {
            settings.app_key = v;
        }
        if let Some(v) = lookup("HOUSEMATE_TIMEZONE") {
            settings.timezone = v;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        if self.retry_base.is_zero() {
            return Err(AppError::Config("retry base must be greater than zero".into()));
        }
        if let Some(max) = self.max_retry_delay {
            if max < self.retry_base {
                return Err(AppError::Config(format!(
                    "max retry delay {:?} is below the retry base {:?}",
                    max, self.retry_base
                )));
            }
        }
        if self.prod && self.prod_server_address.is_none() {
            return Err(AppError::Config("production server address is not set".into()));
        }
        Ok(())
    }

    /// Address of the RPC server for the active environment
    pub fn server_address(&self) -> &str {
        match (&self.prod_server_address, self.prod) {
            (Some(addr), true) => addr,
            _ => &self.dev_server_address,
        }
    }

    /// Address of the socket node for the active environment
    pub fn node_address(&self) -> &str {
        match (&self.prod_node_address, self.prod) {
            (Some(addr), true) => addr,
            _ => &self.dev_node_address,
        }
    }

    /// Full URL of the RPC endpoint
    pub fn rpc_endpoint(&self) -> String {
        format!("{}/ajax/", self.server_address().trim_end_matches('/'))
    }
}

fn parse_bool(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!("{}: expected a boolean, got {:?}", key, other))),
    }
}

fn parse_millis(key: &str, value: &str) -> AppResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| AppError::Config(format!("{}: {}", key, e)))
}
