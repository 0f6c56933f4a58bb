//! Configuration via `cairn.toml`
//!
//! A simple config file in the data directory. On first open, a default
//! `cairn.toml` is created. To change settings, edit the file and restart.
//!
//! The file is parsed into [`CairnConfig`]; the engine consumes the
//! [`PersistenceConfig`] part and the bridge consumes the batching and
//! timeout settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "cairn.toml";

/// Default snapshot file name.
pub const DEFAULT_DB_NAME: &str = "cairn.db";

/// Default quiet period before a flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Errors reading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("failed to access config file '{}': {source}", path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("failed to parse config file '{}': {message}", path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A field has an unusable value
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// How a failed flush is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// No timer-driven retry; the next mutation's debounce cycle retries.
    NextMutation,
    /// Exponential backoff, doubling from `initial` up to `max`.
    Backoff {
        /// Delay before the first retry
        initial: Duration,
        /// Upper bound on the delay
        max: Duration,
    },
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` when the
    /// policy does not schedule retries.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            RetryPolicy::NextMutation => None,
            RetryPolicy::Backoff { initial, max } => {
                let shift = attempt.saturating_sub(1).min(20);
                let delay = initial.saturating_mul(1u32 << shift);
                Some(delay.min(max))
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Backoff {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(60_000),
        }
    }
}

/// Settings for the debounced persistence controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Snapshot name handed to the sink
    pub db_name: String,
    /// Quiet period after the last mutation before flushing
    pub debounce: Duration,
    /// Retry behaviour for failed flushes
    pub retry: RetryPolicy,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}

impl PersistenceConfig {
    /// Set the debounce window
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the snapshot name
    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }
}

/// Database configuration loaded from `cairn.toml`.
///
/// # Example
///
/// ```toml
/// db_name = "cairn.db"
/// debounce_ms = 2000
/// batch_window_ms = 50
/// max_batch_size = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    /// Snapshot file name inside the data directory
    pub db_name: String,
    /// Quiet period before a flush, in milliseconds
    pub debounce_ms: u64,
    /// Read batching window, in milliseconds
    pub batch_window_ms: u64,
    /// Queue size that triggers an immediate batch flush
    pub max_batch_size: usize,
    /// Run merged read batches inside one read transaction
    pub batch_use_transaction: bool,
    /// Per-request timeout in milliseconds; 0 disables the timeout
    pub request_timeout_ms: u64,
    /// `"backoff"` or `"next_mutation"`
    pub retry: String,
    /// First retry delay for `"backoff"`, in milliseconds
    pub retry_initial_ms: u64,
    /// Retry delay cap for `"backoff"`, in milliseconds
    pub retry_max_ms: u64,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            debounce_ms: 2000,
            batch_window_ms: 50,
            max_batch_size: 50,
            batch_use_transaction: true,
            request_timeout_ms: 30_000,
            retry: "backoff".to_string(),
            retry_initial_ms: 1000,
            retry_max_ms: 60_000,
        }
    }
}

impl CairnConfig {
    /// Parse the retry string into a [`RetryPolicy`].
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        match self.retry.as_str() {
            "backoff" => {
                if self.retry_initial_ms == 0 {
                    return Err(ConfigError::Invalid {
                        field: "retry_initial_ms",
                        reason: "must be greater than 0".into(),
                    });
                }
                Ok(RetryPolicy::Backoff {
                    initial: Duration::from_millis(self.retry_initial_ms),
                    max: Duration::from_millis(self.retry_max_ms.max(self.retry_initial_ms)),
                })
            }
            "next_mutation" => Ok(RetryPolicy::NextMutation),
            other => Err(ConfigError::Invalid {
                field: "retry",
                reason: format!(
                    "'{}' is not supported; expected \"backoff\" or \"next_mutation\"",
                    other
                ),
            }),
        }
    }

    /// Build the engine-side persistence settings.
    pub fn persistence_config(&self) -> Result<PersistenceConfig, ConfigError> {
        Ok(PersistenceConfig {
            db_name: self.db_name.clone(),
            debounce: Duration::from_millis(self.debounce_ms),
            retry: self.retry_policy()?,
        })
    }

    /// Request timeout, `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Check every field eagerly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        cairn_durability::validate_db_name(&self.db_name).map_err(|e| ConfigError::Invalid {
            field: "db_name",
            reason: e.to_string(),
        })?;
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        self.retry_policy()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Cairn database configuration

# Snapshot file name inside the data directory
db_name = "cairn.db"

# Quiet period after the last write before the store is flushed to disk
debounce_ms = 2000

# Read batching: queries arriving within the window are sent together
batch_window_ms = 50
max_batch_size = 50
batch_use_transaction = true

# Per-request timeout in milliseconds (0 = wait forever)
request_timeout_ms = 30000

# Failed flush retry: "backoff" (default) or "next_mutation"
#   "backoff"       = retry after retry_initial_ms, doubling up to retry_max_ms
#   "next_mutation" = only the next write schedules another flush
retry = "backoff"
retry_initial_ms = 1000
retry_max_ms = 60000
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: CairnConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
