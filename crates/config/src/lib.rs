//! Configuration for the custom domain certificate manager.
//!
//! All settings come from environment variables prefixed with `CDM_`
//! (`CDM_STATE_BUCKET`, `CDM_DB_HOST`, ...). Optional settings have
//! defaults; required ones are checked by [`Config::validate`].
//!
//! # Example
//!
//! ```ignore
//! let config = cdm_config::Config::from_env()?;
//! config.validate()?;
//! println!("serving on :{}", config.port);
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};
use validator::Validate;

pub use cdm_common::LogFormat;

/// Prefix shared by every configuration variable
pub const ENV_PREFIX: &str = "CDM_";

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory
pub const LETSENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Environment name that selects the production ACME directory
pub const PRODUCTION_ENVIRONMENT: &str = "prod";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// What to do when attaching or detaching a listener certificate fails.
///
/// Both leave the listener in a state the rotator does not repair on its
/// own. Either way the failure is logged at error level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPolicy {
    /// Terminate the process with a non-zero exit code so a supervisor restarts it
    #[default]
    Exit,
    /// Keep serving HTTP but refuse every further rotation until restart
    Hold,
}

/// Complete process configuration
#[derive(Clone, Deserialize, Validate)]
pub struct Config {
    /// Deployment environment; selects registry rows and the ACME directory
    #[serde(default)]
    pub environment: String,

    /// HTTP listen port for `/ping` and the challenge proxy
    #[serde(default = "default_port")]
    pub port: u16,

    /// ACME account contact
    #[validate(email)]
    pub email: String,

    /// Local port of the HTTP-01 challenge responder
    #[serde(default = "default_challenge_port")]
    pub challenge_server_port: u16,

    /// Optional ACME directory override (e.g. a Pebble instance)
    #[serde(default)]
    pub acme_directory: Option<String>,

    /// Bucket holding the state document
    #[validate(length(min = 1))]
    pub state_bucket: String,

    /// Key of the state document inside the bucket
    #[serde(default = "default_state_file_path")]
    #[validate(length(min = 1))]
    pub state_file_path: String,

    /// Cloud region for every AWS client
    #[validate(length(min = 1))]
    pub aws_region: String,

    /// Listener whose certificates are managed
    #[validate(length(min = 1))]
    pub listener_arn: String,

    /// Domain registry connection
    #[serde(default)]
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_pass: String,
    #[serde(default)]
    pub db_name: String,

    /// Delay between scheduler ticks
    #[serde(default = "default_check_interval_secs")]
    #[validate(range(min = 1))]
    pub check_interval_secs: u64,

    /// Delay between "is the old certificate still in use" checks
    #[serde(default = "default_release_poll_interval_secs")]
    #[validate(range(min = 1))]
    pub release_poll_interval_secs: u64,

    /// Upper bound on waiting for the old certificate to be released
    #[serde(default = "default_release_timeout_secs")]
    #[validate(range(min = 1))]
    pub release_timeout_secs: u64,

    /// Grace period for in-flight HTTP requests on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Reaction to listener attach/detach failures
    #[serde(default)]
    pub escalation: EscalationPolicy,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_port() -> u16 {
    4000
}

fn default_challenge_port() -> u16 {
    5002
}

fn default_state_file_path() -> String {
    "cdm/state.json".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_release_poll_interval_secs() -> u64 {
    1
}

fn default_release_timeout_secs() -> u64 {
    300
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from an explicit set of variables.
    ///
    /// Only variables starting with [`ENV_PREFIX`] are considered.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        trace!(prefix = ENV_PREFIX, "Loading configuration from environment");
        let config: Config = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        debug!(
            environment = %config.environment,
            port = config.port,
            region = %config.aws_region,
            escalation = ?config.escalation,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check required fields and ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;
        Ok(())
    }

    /// Whether this deployment issues publicly trusted certificates
    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION_ENVIRONMENT
    }

    /// ACME directory URL: the override if set, else production or staging
    /// Let's Encrypt depending on the environment.
    pub fn acme_directory_url(&self) -> &str {
        match self.acme_directory.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ if self.is_production() => LETSENCRYPT_PRODUCTION,
            _ => LETSENCRYPT_STAGING,
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn release_poll_interval(&self) -> Duration {
        Duration::from_secs(self.release_poll_interval_secs)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_secs(self.release_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Base URL the HTTP surface proxies `/.well-known/` requests to
    pub fn challenge_upstream(&self) -> String {
        format!("http://127.0.0.1:{}", self.challenge_server_port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("email", &self.email)
            .field("challenge_server_port", &self.challenge_server_port)
            .field("acme_directory", &self.acme_directory)
            .field("state_bucket", &self.state_bucket)
            .field("state_file_path", &self.state_file_path)
            .field("aws_region", &self.aws_region)
            .field("listener_arn", &self.listener_arn)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_pass", &"<redacted>")
            .field("db_name", &self.db_name)
            .field("check_interval_secs", &self.check_interval_secs)
            .field("release_poll_interval_secs", &self.release_poll_interval_secs)
            .field("release_timeout_secs", &self.release_timeout_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("escalation", &self.escalation)
            .field("log_format", &self.log_format)
            .finish()
    }
}
