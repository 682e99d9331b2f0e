//! Configuration loading and management
//!
//! Configuration is loaded from `./prwatch.toml` (or the path given with
//! `--config`). Every section is optional and falls back to defaults.
//!
//! Logs follow the XDG Base Directory Specification:
//! - State/Logs: `$XDG_STATE_HOME/prwatch/` (~/.local/state/prwatch/)

use crate::agents::{default_roster, validate_roster, AgentMeta};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file name, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "prwatch.toml";

/// Env var that overrides `github.token`
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Search API settings
    #[serde(default)]
    pub github: GithubConfig,

    /// Artifact locations
    #[serde(default)]
    pub output: OutputConfig,

    /// Chart settings
    #[serde(default)]
    pub chart: ChartConfig,

    /// Dashboard page settings
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Commit/publish settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Roster override; the built-in roster is used when absent
    #[serde(default)]
    pub agents: Option<Vec<AgentMeta>>,
}

/// Search API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token (the `GITHUB_TOKEN` env var takes precedence)
    pub token: Option<String>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Longest rate-limit wait we are willing to sleep through
    #[serde(default = "default_max_rate_limit_wait")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait(),
        }
    }
}

impl GithubConfig {
    /// Token from the environment, falling back to the config file.
    pub fn resolved_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.token.clone().filter(|t| !t.trim().is_empty()))
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("prwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_max_rate_limit_wait() -> u64 {
    300
}

/// Artifact paths, relative to the working directory
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
    #[serde(default = "default_chart_image")]
    pub chart_image: PathBuf,
    #[serde(default = "default_chart_data")]
    pub chart_data: PathBuf,
    #[serde(default = "default_readme_template")]
    pub readme_template: PathBuf,
    #[serde(default = "default_readme")]
    pub readme: PathBuf,
    #[serde(default = "default_index_template")]
    pub index_template: PathBuf,
    #[serde(default = "default_index")]
    pub index: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            chart_image: default_chart_image(),
            chart_data: default_chart_data(),
            readme_template: default_readme_template(),
            readme: default_readme(),
            index_template: default_index_template(),
            index: default_index(),
        }
    }
}

impl OutputConfig {
    /// Resolve every relative path against `base`.
    pub fn rebased(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            data_file: join(&self.data_file),
            chart_image: join(&self.chart_image),
            chart_data: join(&self.chart_data),
            readme_template: join(&self.readme_template),
            readme: join(&self.readme),
            index_template: join(&self.index_template),
            index: join(&self.index),
        }
    }
}

fn default_data_file() -> PathBuf {
    PathBuf::from("data.csv")
}

fn default_chart_image() -> PathBuf {
    PathBuf::from("docs/chart.png")
}

fn default_chart_data() -> PathBuf {
    PathBuf::from("docs/chart-data.json")
}

fn default_readme_template() -> PathBuf {
    PathBuf::from("templates/readme_template.md")
}

fn default_readme() -> PathBuf {
    PathBuf::from("README.md")
}

fn default_index_template() -> PathBuf {
    PathBuf::from("templates/index_template.html")
}

fn default_index() -> PathBuf {
    PathBuf::from("docs/index.html")
}

/// Value plotted per agent
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartMetric {
    /// Merged / total, in percent
    #[default]
    SuccessRate,
    /// Cumulative total PRs
    Total,
    /// New PRs since the previous data point
    DailyNew,
}

impl ChartMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartMetric::SuccessRate => "success_rate",
            ChartMetric::Total => "total",
            ChartMetric::DailyNew => "daily_new",
        }
    }

    /// Axis label for the metric
    pub fn axis_label(&self) -> &'static str {
        match self {
            ChartMetric::SuccessRate => "Merge Success Rate (%)",
            ChartMetric::Total => "Total PRs",
            ChartMetric::DailyNew => "New PRs per Interval",
        }
    }
}

/// Chart configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChartConfig {
    #[serde(default)]
    pub metric: ChartMetric,

    /// Max dates plotted in the static image (0 = all)
    #[serde(default = "default_max_points")]
    pub max_points: usize,

    #[serde(default = "default_chart_width")]
    pub width: u32,

    #[serde(default = "default_chart_height")]
    pub height: u32,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            metric: ChartMetric::default(),
            max_points: default_max_points(),
            width: default_chart_width(),
            height: default_chart_height(),
        }
    }
}

fn default_max_points() -> usize {
    8
}

fn default_chart_width() -> u32 {
    1600
}

fn default_chart_height() -> u32 {
    1000
}

/// Dashboard page configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    /// Meta refresh interval in seconds
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh_secs(),
        }
    }
}

fn default_refresh_secs() -> u64 {
    3600
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files (defaults to the XDG state dir)
    pub dir: Option<PathBuf>,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            max_files: default_max_log_files(),
        }
    }
}

impl LoggingConfig {
    /// Directory log files are written to
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(Config::state_dir)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Publish configuration
///
/// Disabled by default: the scheduled job usually commits on its own.
#[derive(Debug, Deserialize, Clone)]
pub struct PublishConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Commit message; `{date}` is replaced with the run date
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Push after committing
    #[serde(default)]
    pub push: bool,

    #[serde(default = "default_remote")]
    pub remote: String,

    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            commit_message: default_commit_message(),
            push: false,
            remote: default_remote(),
            author_name: None,
            author_email: None,
        }
    }
}

impl PublishConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.commit_message.trim().is_empty() {
            return Err(Error::Config(
                "publish.commit_message must not be empty".to_string(),
            ));
        }
        if self.author_name.is_some() != self.author_email.is_some() {
            return Err(Error::Config(
                "publish.author_name and publish.author_email must be set together".to_string(),
            ));
        }
        if self.push && self.remote.trim().is_empty() {
            return Err(Error::Config(
                "publish.remote is required when publish.push is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_commit_message() -> String {
    "Update PR statistics for {date}".to_string()
}

fn default_remote() -> String {
    "origin".to_string()
}

impl Config {
    /// Load configuration from `./prwatch.toml`, or defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        validate_roster(&self.agents())?;
        self.publish.validate()?;
        if self.chart.width < 200 || self.chart.height < 150 {
            return Err(Error::Config(
                "chart.width and chart.height must be at least 200x150".to_string(),
            ));
        }
        if self.chart.max_points == 1 {
            return Err(Error::Config(
                "chart.max_points must be 0 (no limit) or at least 2".to_string(),
            ));
        }
        if self.github.api_url.trim().is_empty() {
            return Err(Error::Config("github.api_url must not be empty".to_string()));
        }
        if self.github.timeout_secs == 0 {
            return Err(Error::Config(
                "github.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The roster in display order
    pub fn agents(&self) -> Vec<AgentMeta> {
        self.agents.clone().unwrap_or_else(default_roster)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/prwatch/` (~/.local/state/prwatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("prwatch")
    }
}
