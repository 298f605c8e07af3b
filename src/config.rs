//! Configuration loading and validation.
//!
//! Precedence is CLI flags > config file > built-in defaults. Config files
//! may be YAML, JSON or TOML, picked by extension.

use anyhow::{bail, Context};
use bbs_discovery::client::{ClientSettings, RemoteStateClient};
use bbs_discovery::{BbsHttpClient, CacheRegistry, DiscoveryError, FixtureClient, StateCache};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_BBS_URL: &str = "https://bbs.service.cf.internal:8889";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_RETRIES: usize = 10;

const DEFAULT_CONFIG_PATHS: [&str; 6] = [
    "/etc/bbs-discovery/bbs-discovery.yaml",
    "/etc/bbs-discovery/bbs-discovery.yml",
    "/etc/bbs-discovery/bbs-discovery.json",
    "./bbs-discovery.yaml",
    "./bbs-discovery.yml",
    "./bbs-discovery.json",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // BBS connection
    #[serde(alias = "bbs-url")]
    pub bbs_url: Option<String>,
    /// Restrict both queries to one BBS domain (e.g. "cf-apps")
    #[serde(alias = "bbs-domain")]
    pub bbs_domain: Option<String>,
    #[serde(alias = "skip-tls-verify")]
    pub skip_tls_verify: Option<bool>,
    pub ca_file: Option<PathBuf>,
    pub request_timeout_secs: Option<u64>,
    pub retries: Option<usize>,
    pub max_idle_conns_per_host: Option<usize>,

    // Refresh
    #[serde(alias = "poll-interval")]
    pub poll_interval_secs: Option<u64>,
    pub parallelism: Option<usize>,
    /// Serve BBS records from a fixture file instead of a live BBS
    pub fixture_file: Option<PathBuf>,

    // Feature flags
    pub enable_health: Option<bool>,
    pub enable_telemetry: Option<bool>,
    pub enable_templates: Option<bool>,

    // Logging
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: Some(DEFAULT_PORT),
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            bbs_url: Some(DEFAULT_BBS_URL.to_string()),
            bbs_domain: None,
            skip_tls_verify: Some(false),
            ca_file: None,
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            retries: Some(DEFAULT_RETRIES),
            max_idle_conns_per_host: Some(0),
            poll_interval_secs: Some(DEFAULT_POLL_INTERVAL_SECS),
            parallelism: None,
            fixture_file: None,
            enable_health: Some(true),
            enable_telemetry: Some(true),
            enable_templates: Some(true),
            log_level: Some("info".into()),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }

    /// BBS endpoint, falling back to the default when the config omits it.
    pub fn bbs_url(&self) -> &str {
        self.bbs_url.as_deref().unwrap_or(DEFAULT_BBS_URL)
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::new(self.bbs_url());
        settings.skip_tls_verify = self.skip_tls_verify.unwrap_or(false);
        settings.ca_file = self.ca_file.clone();
        settings.request_timeout = Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        settings.retries = self.retries.unwrap_or(DEFAULT_RETRIES);
        settings.max_idle_conns_per_host = self.max_idle_conns_per_host.unwrap_or(0);
        settings
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.poll_interval_secs == Some(0) {
        bail!("poll_interval_secs must be at least 1");
    }
    if cfg.request_timeout_secs == Some(0) {
        bail!("request_timeout_secs must be at least 1");
    }

    if cfg.fixture_file.is_none() {
        let url = cfg.bbs_url().trim();
        if url.is_empty() {
            bail!("bbs_url must not be empty unless fixture_file is set");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("bbs_url '{}' must start with http:// or https://", url);
        }
    }

    if let Some(ca) = &cfg.ca_file {
        if !ca.exists() {
            bail!("ca_file '{}' does not exist", ca.display());
        }
    }

    if let Some(domain) = &cfg.bbs_domain {
        if domain.trim().is_empty() {
            bail!("bbs_domain must not be empty when set");
        }
    }

    Ok(())
}

/// Configures the process-wide cache from the effective config.
///
/// A fixture file takes precedence over the BBS URL.
pub fn configure_cache(registry: &CacheRegistry, cfg: &Config) -> Result<StateCache, DiscoveryError> {
    registry.get_or_configure_with(|| {
        let client: Arc<dyn RemoteStateClient> = match &cfg.fixture_file {
            Some(path) => {
                info!("Serving BBS state from fixture file: {}", path.display());
                Arc::new(FixtureClient::new(path.clone()))
            }
            None => Arc::new(
                BbsHttpClient::new(&cfg.client_settings())
                    .map_err(|e| DiscoveryError::Configuration(e.to_string()))?,
            ),
        };
        Ok(StateCache::with_domain(
            client,
            cfg.poll_interval(),
            cfg.bbs_domain.clone(),
        ))
    })
}

pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(url) = &args.bbs_url {
        config.bbs_url = Some(url.clone());
    }
    if let Some(domain) = &args.bbs_domain {
        config.bbs_domain = Some(domain.clone());
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval_secs = Some(secs);
    }
    if args.skip_tls_verify {
        config.skip_tls_verify = Some(true);
    }
    if let Some(ca) = &args.ca_file {
        config.ca_file = Some(ca.clone());
    }
    if let Some(path) = &args.fixture_file {
        config.fixture_file = Some(path.clone());
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.disable_telemetry {
        config.enable_telemetry = Some(false);
    }

    Ok(config)
}

/// Loads the config file, falling back to the default locations.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => PathBuf::from(p),
        None => match DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let config = parse_config(&content, &path)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

fn parse_config(content: &str, path: &Path) -> anyhow::Result<Config> {
    let config = match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content)?,
        Some("toml") => toml::from_str(content)?,
        // Default to YAML
        _ => serde_yaml::from_str(content)?,
    };
    Ok(config)
}

/// Renders a config in the requested format.
pub fn render_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Adds comments to YAML configuration
pub fn add_config_comments(yaml: String) -> String {
    let comments = r#"# BBS Discovery Configuration
# ===========================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
#
# BBS Connection
# --------------
# bbs_url: "https://bbs.service.cf.internal:8889"
# bbs_domain: null             # Only list LRPs of this domain (e.g. "cf-apps")
# skip_tls_verify: false       # Accept any BBS certificate (test foundations only)
# ca_file: null                # Extra PEM root certificate for the BBS
# request_timeout_secs: 5      # Per-request timeout
# retries: 10                  # Retries per request after the first attempt
# max_idle_conns_per_host: 0   # Idle connections kept per host
#
# Refresh
# -------
# poll_interval_secs: 3        # Seconds between BBS refreshes
# parallelism: null            # Threads projecting LRP records (null = auto)
# fixture_file: null           # Serve records from a JSON fixture instead of the BBS
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_telemetry: true       # Enable /metrics endpoint
# enable_templates: true       # Enable /templates endpoint
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
"#;

    format!("{comments}\n{yaml}")
}
