use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_FILE: &str = "imaginate.toml";

/// Timestamp for August 1st, 2024.
pub const DEFAULT_EPOCH: i64 = 1722484800;
pub const SECONDS_PER_DAY: i64 = 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployEnv {
    Dev,
    Prod,
}

impl DeployEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployEnv::Dev => "dev",
            DeployEnv::Prod => "prod",
        }
    }

    /// Parse the `IMAGINATE_ENV` value. Unset or empty means `dev`.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("dev") => Ok(DeployEnv::Dev),
            Some("prod") => Ok(DeployEnv::Prod),
            Some(other) => Err(anyhow!(
                "Environment should be one of: [\"dev\", \"prod\"] (got \"{}\")",
                other
            )),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::parse(std::env::var("IMAGINATE_ENV").ok().as_deref())
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            DeployEnv::Dev => "http://127.0.0.1:5000",
            DeployEnv::Prod => "https://playimaginate.com",
        }
    }

    pub fn ledger_file_name(self) -> String {
        format!("imaginate_{}.db", self.as_str())
    }
}

/// Root data directory. `IMAGINATE_DATA_DIR` wins, else `~/.imaginate`.
pub fn data_dir() -> PathBuf {
    match std::env::var("IMAGINATE_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => return PathBuf::from(dir),
        _ => {}
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".imaginate")
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub backends: BackendConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_epoch")]
    pub epoch: i64,

    #[serde(default = "default_seconds_per_day")]
    pub seconds_per_day: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// Falls back to the deployment environment's URL when unset.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_create_path")]
    pub create_path: String,

    #[serde(default = "default_publish_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_image_edit_url")]
    pub image_edit_url: String,

    #[serde(default = "default_text_to_image_url")]
    pub text_to_image_url: String,

    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LedgerConfig {
    /// Absolute, or relative to the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional file (relative to the data directory) that receives a copy of every log line.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_epoch() -> i64 {
    DEFAULT_EPOCH
}
fn default_seconds_per_day() -> i64 {
    SECONDS_PER_DAY
}
fn default_create_path() -> String {
    "/image/create".to_string()
}
fn default_publish_timeout() -> u64 {
    10
}
fn default_image_edit_url() -> String {
    "http://127.0.0.1:7860/edit".to_string()
}
fn default_text_to_image_url() -> String {
    "http://127.0.0.1:7860/generate".to_string()
}
fn default_backend_timeout() -> u64 {
    600
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            epoch: default_epoch(),
            seconds_per_day: default_seconds_per_day(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            create_path: default_create_path(),
            timeout_secs: default_publish_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            image_edit_url: default_image_edit_url(),
            text_to_image_url: default_text_to_image_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let config_path = data_dir.as_ref().join(CONFIG_FILE);
        if !config_path.exists() {
            info!("No {} found, using defaults.", CONFIG_FILE);
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&config_path).await?;
        let config = Self::parse(&content)?;
        info!(
            "Loaded config: epoch={}, seconds_per_day={}, edit={}, text={}",
            config.calendar.epoch,
            config.calendar.seconds_per_day,
            config.backends.image_edit_url,
            config.backends.text_to_image_url
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.calendar.seconds_per_day <= 0 {
            return Err(anyhow!(
                "calendar.seconds_per_day must be positive (got {})",
                self.calendar.seconds_per_day
            ));
        }
        if !self.publisher.create_path.starts_with('/') {
            return Err(anyhow!(
                "publisher.create_path must start with '/' (got \"{}\")",
                self.publisher.create_path
            ));
        }
        Ok(())
    }

    pub fn publisher_base_url(&self, env: DeployEnv) -> String {
        self.publisher
            .base_url
            .clone()
            .unwrap_or_else(|| env.default_base_url().to_string())
    }

    pub fn ledger_path(&self, data_dir: &Path, env: DeployEnv) -> PathBuf {
        match &self.ledger.path {
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => data_dir.join(p),
            None => data_dir.join(env.ledger_file_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_calendar_matches_launch_date() {
        let config = AppConfig::default();
        assert_eq!(config.calendar.epoch, 1722484800);
        assert_eq!(config.calendar.seconds_per_day, 86400);
        assert_eq!(config.publisher.create_path, "/image/create");
        assert_eq!(config.publisher.timeout_secs, 10);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn env_parsing() {
        assert_eq!(DeployEnv::parse(None).unwrap(), DeployEnv::Dev);
        assert_eq!(DeployEnv::parse(Some("")).unwrap(), DeployEnv::Dev);
        assert_eq!(DeployEnv::parse(Some("PROD")).unwrap(), DeployEnv::Prod);
        assert!(DeployEnv::parse(Some("staging")).is_err());
    }

    #[test]
    fn base_url_follows_env_unless_configured() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.publisher_base_url(DeployEnv::Dev),
            "http://127.0.0.1:5000"
        );
        assert_eq!(
            config.publisher_base_url(DeployEnv::Prod),
            "https://playimaginate.com"
        );
        config.publisher.base_url = Some("http://store.local".to_string());
        assert_eq!(
            config.publisher_base_url(DeployEnv::Prod),
            "http://store.local"
        );
    }

    #[test]
    fn ledger_path_resolution() {
        let mut config = AppConfig::default();
        let dir = Path::new("/data");
        assert_eq!(
            config.ledger_path(dir, DeployEnv::Dev),
            PathBuf::from("/data/imaginate_dev.db")
        );
        config.ledger.path = Some(PathBuf::from("custom.db"));
        assert_eq!(
            config.ledger_path(dir, DeployEnv::Prod),
            PathBuf::from("/data/custom.db")
        );
        config.ledger.path = Some(PathBuf::from("/var/ledger.db"));
        assert_eq!(
            config.ledger_path(dir, DeployEnv::Prod),
            PathBuf::from("/var/ledger.db")
        );
    }

    #[test]
    fn parse_partial_toml() {
        let content = r#"
[calendar]
seconds_per_day = 3600

[backends]
text_to_image_url = "http://gpu:9000/txt2img"

[log]
level = "debug"
file = "imaginate.log"
"#;
        let config = AppConfig::parse(content).unwrap();
        assert_eq!(config.calendar.epoch, DEFAULT_EPOCH);
        assert_eq!(config.calendar.seconds_per_day, 3600);
        assert_eq!(config.backends.text_to_image_url, "http://gpu:9000/txt2img");
        assert_eq!(config.backends.image_edit_url, "http://127.0.0.1:7860/edit");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.file, Some(PathBuf::from("imaginate.log")));
    }

    #[test]
    fn rejects_non_positive_day_length() {
        let content = "[calendar]\nseconds_per_day = 0\n";
        assert!(AppConfig::parse(content).is_err());
    }

    #[tokio::test]
    async fn load_missing_file_returns_default() {
        let tmpdir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(tmpdir.path()).await.unwrap();
        assert_eq!(config.calendar.epoch, DEFAULT_EPOCH);
    }

    #[tokio::test]
    async fn load_reads_config_file() {
        let tmpdir = tempfile::tempdir().unwrap();
        std::fs::write(
            tmpdir.path().join(CONFIG_FILE),
            "[publisher]\nbase_url = \"http://10.0.0.2:5000\"\n",
        )
        .unwrap();
        let config = AppConfig::load(tmpdir.path()).await.unwrap();
        assert_eq!(
            config.publisher_base_url(DeployEnv::Dev),
            "http://10.0.0.2:5000"
        );
    }
}
