//! Export configuration.
//!
//! Defaults can be overridden through `VIZ_EXPORT_*` environment variables;
//! the CLI applies its flags on top of that.

use crate::sql_augmenter::{DEFAULT_GEOMETRY_COLUMN, SqlAugmenter};
use std::env;
use std::time::Duration;

pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Maximum number of sub-layer downloads in flight; 0 means unbounded
    pub max_concurrency: usize,
    /// Longest silence allowed between reads of a response; downloads of
    /// any total duration succeed while data keeps arriving
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Also write `style.json` for every sub-layer
    pub export_styles: bool,
    pub geometry_column: String,
    pub sql_dialect: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: format!("viz-export/{}", env!("CARGO_PKG_VERSION")),
            export_styles: false,
            geometry_column: DEFAULT_GEOMETRY_COLUMN.to_string(),
            sql_dialect: "generic".to_string(),
        }
    }
}

impl ExportConfig {
    /// Defaults overridden by any `VIZ_EXPORT_*` variables that are set.
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_concurrency = env::var("VIZ_EXPORT_MAX_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_concurrency);
        let read_timeout = env::var("VIZ_EXPORT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.read_timeout);
        let connect_timeout = env::var("VIZ_EXPORT_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);
        let user_agent = env::var("VIZ_EXPORT_USER_AGENT").unwrap_or(defaults.user_agent);
        let geometry_column =
            env::var("VIZ_EXPORT_GEOMETRY_COLUMN").unwrap_or(defaults.geometry_column);
        let sql_dialect = env::var("VIZ_EXPORT_SQL_DIALECT").unwrap_or(defaults.sql_dialect);

        Self {
            max_concurrency,
            read_timeout,
            connect_timeout,
            user_agent,
            export_styles: defaults.export_styles,
            geometry_column,
            sql_dialect,
        }
    }

    /// HTTP client shared by the document loader and the sub-layer fetcher.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .read_timeout(self.read_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(self.user_agent.clone())
            .build()
    }

    pub fn sql_augmenter(&self) -> SqlAugmenter {
        SqlAugmenter::with_dialect_name(&self.sql_dialect)
            .with_geometry_column(self.geometry_column.clone())
    }
}
