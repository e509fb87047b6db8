use anyhow::Context;
use capload_bundles::{FsBundleStore, LoaderLimits};
use capload_detect::DetectorConfig;
use capload_pipeline::{Consumer, PipelineConfig};
use capload_types::Tier;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Default config template created when no config exists
const DEFAULT_CONFIG: &str = r#"
[logging]
level = "info"  # trace, debug, info, warn, error

[bundles]
root = "~/.capload/bundles"  # Set via CAPLOAD_BUNDLE_ROOT env var

[bundles.limits]
summary_max_bytes = 102400
detail_max_bytes = 1048576

[detection]
threshold = 0.8
tie_epsilon = 0.02
max_scan_depth = 3

[pipeline]
deadline_ms = 5000

[pipeline.cache]
capacity = 3

[request]
workspace = "."  # Set via CAPLOAD_WORKSPACE env var
tier = "summary"  # or "detail"
consumer = "capload-gateway@0.1.2"  # Set via CAPLOAD_CONSUMER env var (id@version)
on_fallback = "generic"  # or "abort"
"#;

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BundlesConfig {
    /// Store root; the personal store is used when unset
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub limits: LoaderLimits,
}

/// Non-interactive answer to a pending fallback
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    Generic,
    Abort,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RequestConfig {
    pub workspace: String,
    pub tier: Tier,
    pub consumer: String,
    pub on_fallback: FallbackPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub bundles: BundlesConfig,
    #[serde(default)]
    pub detection: DetectorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub request: RequestConfig,
}

impl Config {
    /// Get the global config path: ~/.capload/capload.toml
    fn global_config_path() -> anyhow::Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".capload").join("capload.toml"))
    }

    /// Ensure global config directory and file exist, creating defaults if needed
    fn ensure_global_config() -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()?;
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
            eprintln!("Created config directory: {}", config_dir.display());
        }

        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG.trim())?;
            eprintln!("Created default config: {}", config_path.display());
            eprintln!("Please edit this file or set environment variables.");
        }

        Ok(config_path)
    }

    /// Load configuration with layered approach:
    /// 1. Global config: ~/.capload/capload.toml (auto-created if missing)
    /// 2. Local override: ./capload.toml (workspace, optional)
    /// 3. Environment variables (highest priority)
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file from current directory
        dotenvy::dotenv().ok();

        let global_config_path = Self::ensure_global_config()?;

        // Later sources override earlier ones
        let mut config_builder = config::Config::builder()
            .add_source(config::File::from(global_config_path))
            .add_source(config::File::with_name("capload").required(false))
            // CAPLOAD__PIPELINE__DEADLINE_MS=250 etc.
            .add_source(config::Environment::with_prefix("CAPLOAD").separator("__"));

        // Convenience env var overrides
        if let Ok(root) = env::var("CAPLOAD_BUNDLE_ROOT") {
            config_builder = config_builder.set_override("bundles.root", root)?;
        }

        if let Ok(workspace) = env::var("CAPLOAD_WORKSPACE") {
            config_builder = config_builder.set_override("request.workspace", workspace)?;
        }

        if let Ok(consumer) = env::var("CAPLOAD_CONSUMER") {
            config_builder = config_builder.set_override("request.consumer", consumer)?;
        }

        let config: Self = config_builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the library crates cannot check themselves
    fn validate(&self) -> anyhow::Result<()> {
        self.consumer()?;
        self.detection.validate()?;
        self.bundles.limits.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    /// Consumer identity the session serves
    pub fn consumer(&self) -> anyhow::Result<Consumer> {
        Ok(self.request.consumer.parse()?)
    }

    /// Workspace to inspect, with `~` expanded
    pub fn workspace(&self) -> PathBuf {
        expand_home(&self.request.workspace)
    }

    /// Bundle store from `bundles.root`, or the personal store
    pub fn bundle_store(&self) -> anyhow::Result<FsBundleStore> {
        match &self.bundles.root {
            Some(root) if !root.is_empty() => Ok(FsBundleStore::new(expand_home(root))),
            _ => FsBundleStore::personal().context("No bundle root configured"),
        }
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.request.tier, Tier::Summary);
        assert_eq!(config.request.on_fallback, FallbackPolicy::Generic);
        assert_eq!(config.pipeline.deadline_ms, 5000);
        assert_eq!(config.pipeline.cache.capacity, 3);
        assert_eq!(config.bundles.limits, LoaderLimits::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.consumer().unwrap().id, "capload-gateway");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[logging]
level = "debug"

[bundles]

[request]
workspace = "/srv/project"
tier = "detail"
consumer = "reviewer@2.0.0"
on_fallback = "abort"
"#,
        )
        .unwrap();
        assert!(config.bundles.root.is_none());
        assert_eq!(config.detection, DetectorConfig::default());
        assert_eq!(config.workspace(), PathBuf::from("/srv/project"));
        assert_eq!(config.request.on_fallback, FallbackPolicy::Abort);
    }

    #[test]
    fn test_bad_consumer_rejected() {
        let mut config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.request.consumer = "no-version".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/bundles"), home.join("bundles"));
        }
    }
}
