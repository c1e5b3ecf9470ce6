//! # Dispatcher Constants
//!
//! Wire formats, environment variable names and default tunables shared by
//! the dispatcher, its configuration and logging.

/// Prefix of the string form of a dispatch token (`ID_1`, `ID_2`, ...)
pub const TOKEN_PREFIX: &str = "ID_";

/// First raw token value handed out by a fresh registry
pub const FIRST_TOKEN_ID: u64 = 1;

/// Environment variable names
pub mod env {
    /// Prefix for `DispatcherConfig` overrides, e.g. `FLUX_DISPATCH_CATCH_PANICS`
    pub const CONFIG_PREFIX: &str = "FLUX_DISPATCH";

    /// Environment names checked in order when choosing a log level
    pub const ENVIRONMENT_VARS: &[&str] = &["FLUX_ENV", "APP_ENV"];

    /// Set to `json` for JSON log lines
    pub const LOG_FORMAT: &str = "FLUX_LOG_FORMAT";
}

/// Defaults for `DispatcherConfig`
pub mod defaults {
    pub const CATCH_PANICS: bool = true;
    pub const SLOW_HANDLER_THRESHOLD_MS: u64 = 1000;
}
