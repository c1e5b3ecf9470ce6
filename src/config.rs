use crate::constants::{defaults, env};
use crate::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Convert handler panics into `DispatchError::HandlerPanicked`
    pub catch_panics: bool,
    /// Handlers running longer than this are logged at warn level; 0 disables
    pub slow_handler_threshold_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            catch_panics: defaults::CATCH_PANICS,
            slow_handler_threshold_ms: defaults::SLOW_HANDLER_THRESHOLD_MS,
        }
    }
}

impl DispatcherConfig {
    /// Defaults overlaid with `FLUX_DISPATCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ::config::Config::builder()
            .add_source(::config::Environment::with_prefix(env::CONFIG_PREFIX).try_parsing(true))
            .build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .map_err(|e| DispatchError::Configuration(format!("Invalid dispatcher config: {e}")))
    }

    pub fn slow_handler_threshold(&self) -> Option<Duration> {
        match self.slow_handler_threshold_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}
