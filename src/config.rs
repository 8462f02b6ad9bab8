use aws_config::{BehaviorVersion, SdkConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "POD_CENSUS_CONFIG";

/// Errors that can occur during config operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// AWS SDK settings; unset fields fall through to the default chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsSettings {
    /// Named profile from the shared config files
    #[serde(default)]
    pub profile: Option<String>,
    /// Region for EKS calls and token signing
    #[serde(default)]
    pub region: Option<String>,
}

impl AwsSettings {
    /// Load the SDK config, applying profile and region overrides
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref profile) = self.profile {
            config_loader = config_loader.profile_name(profile);
        }

        if let Some(ref region) = self.region {
            config_loader = config_loader.region(aws_sdk_eks::config::Region::new(region.clone()));
        }

        config_loader.load().await
    }
}

/// Cluster metadata cache policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Seconds before a resolved cluster is looked up again; `None` keeps
    /// entries for the life of the process
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl CacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// Network timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// Upper bound for each step of an invocation
    #[serde(default = "default_call_secs")]
    pub call_secs: u64,
    /// TCP connect timeout for the Kubernetes API server
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    /// Read timeout for the Kubernetes API server
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
}

fn default_call_secs() -> u64 {
    30
}

fn default_connect_secs() -> u64 {
    5
}

fn default_read_secs() -> u64 {
    30
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            call_secs: default_call_secs(),
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
        }
    }
}

impl TimeoutSettings {
    /// Every timeout must be at least one second
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, secs) in [
            ("call_secs", self.call_secs),
            ("connect_secs", self.connect_secs),
            ("read_secs", self.read_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("timeouts.{} must be greater than 0", name)));
            }
        }
        Ok(())
    }

    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

/// Handler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default)]
    pub aws: AwsSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

impl HandlerConfig {
    /// Path named by `POD_CENSUS_CONFIG`, if set
    pub fn config_path() -> Option<PathBuf> {
        std::env::var_os(CONFIG_PATH_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// Load configuration from the file named by `POD_CENSUS_CONFIG`
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("{} not set, using defaults", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.timeouts.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}
