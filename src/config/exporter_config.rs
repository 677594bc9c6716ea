// Exporter configuration: CLI flags > environment > YAML file > defaults
use super::config_error::ConfigError;
use clap::Parser;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = "sap_system_exporter.yaml";
const CONFIG_SEARCH_PATHS: [&str; 4] = ["./", "./config/", "./conf/", "/etc/"];
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_CACHE_ERROR_TTL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "sap_system_exporter",
    version,
    about = "Prometheus exporter for the SAPControl web service"
)]
pub struct CliArgs {
    /// The port number to listen on for HTTP requests
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// The address to listen on for HTTP requests
    #[arg(long, env = "ADDRESS")]
    pub address: Option<String>,

    /// The minimum logging level: debug, info, warn, error
    #[arg(long = "log-level", env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// SAPControl URL, [https://]$HOST:$PORT. Port 5xx13 (http) or 5xx14 (https)
    #[arg(long = "sap-control-url", env = "SAP_CONTROL_URL")]
    pub sap_control_url: Option<String>,

    /// Domain appended to single-word SAP hostnames
    #[arg(long = "host-domain", env = "SAP_CONTROL_DOMAIN")]
    pub host_domain: Option<String>,

    #[arg(long = "sap-control-user", env = "SAP_CONTROL_USER")]
    pub sap_control_user: Option<String>,

    #[arg(
        long = "sap-control-password",
        env = "SAP_CONTROL_PASSWORD",
        hide_env_values = true
    )]
    pub sap_control_password: Option<String>,

    /// For HTTPS, accept certificates signed by an unknown authority
    #[arg(long = "tls-skip-verify")]
    pub tls_skip_verify: Option<bool>,

    /// Oldest accepted alert timestamp, e.g. 24h. "-1s" disables the limit
    #[arg(long = "alert-samples-max-age", allow_hyphen_values = true)]
    pub alert_samples_max_age: Option<String>,

    /// Path to a YAML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub address: String,
    pub port: u16,
    pub log_level: String,

    pub sap_control_url: String,
    pub sap_control_access_point: String,
    pub host_domain: String,
    pub sap_control_user: String,
    pub sap_control_password: String,
    pub tls_skip_verify: bool,
    pub sap_sid: String,

    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub cache_error_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub cache_cleanup_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub scrape_timeout: Duration,
    pub fanout_limit: usize,

    pub collect_enqueueserver: bool,
    pub collect_dispatcher: bool,
    pub collect_workprocess: bool,
    pub collect_alerts: bool,
    pub send_alerts_to_prom: bool,
    #[serde(deserialize_with = "deserialize_max_age")]
    pub alert_samples_max_age: Option<Duration>,

    pub loki_url: String,
    pub loki_name: String,
    pub loki_tenant_id: String,
    #[serde(with = "humantime_serde")]
    pub loki_batch_wait: Duration,
    pub loki_batch_entries_number: usize,
    #[serde(with = "humantime_serde")]
    pub loki_http_timeout: Duration,
    pub loki_time_offset: String,

    // derived from sap_control_url
    #[serde(skip)]
    pub sap_host: String,
    #[serde(skip)]
    pub sap_port: u16,
    #[serde(skip)]
    pub use_tls: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 9680,
            log_level: "info".to_string(),
            sap_control_url: "localhost:50013".to_string(),
            sap_control_access_point: "/sap/bc/soap/rfc".to_string(),
            host_domain: String::new(),
            sap_control_user: String::new(),
            sap_control_password: String::new(),
            tls_skip_verify: false,
            sap_sid: String::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_error_ttl: DEFAULT_CACHE_ERROR_TTL,
            cache_cleanup_interval: Duration::ZERO,
            scrape_timeout: Duration::from_secs(30),
            fanout_limit: 16,
            collect_enqueueserver: true,
            collect_dispatcher: true,
            collect_workprocess: true,
            collect_alerts: true,
            send_alerts_to_prom: false,
            alert_samples_max_age: Some(Duration::from_secs(24 * 3600)),
            loki_url: String::new(),
            loki_name: "sap_alerts".to_string(),
            loki_tenant_id: "fake".to_string(),
            loki_batch_wait: Duration::from_millis(100),
            loki_batch_entries_number: 32,
            loki_http_timeout: Duration::from_millis(1000),
            loki_time_offset: "+03:00".to_string(),
            sap_host: String::new(),
            sap_port: 0,
            use_tls: false,
        }
    }
}

fn deserialize_max_age<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_max_age(&raw).map_err(serde::de::Error::custom)
}

/// Negative durations mean "no limit".
pub fn parse_max_age(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Ok(None);
    }
    humantime::parse_duration(raw)
        .map(Some)
        .map_err(|e| ConfigError::Duration("alert_samples_max_age".to_string(), e.to_string()))
}

impl ExporterConfig {
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => match find_config_file() {
                Some(path) => Self::from_file(&path)?,
                None => {
                    log::warn!("No config file found, using defaults and environment variables");
                    ExporterConfig::default()
                }
            },
        };
        config.apply_args(args)?;
        config.validate()?;
        log::debug!("Effective config: {:?}", config.redacted());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let name = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(name.clone(), e))?;
        let config = Self::from_yaml(&raw).map_err(|e| ConfigError::Yaml(name.clone(), e))?;
        log::info!("Using config file: {}", name);
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        // an empty file is a valid (all defaults) config
        if raw.trim().is_empty() {
            return Ok(ExporterConfig::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn apply_args(&mut self, args: &CliArgs) -> Result<(), ConfigError> {
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(address) = &args.address {
            self.address = address.clone();
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(url) = &args.sap_control_url {
            self.sap_control_url = url.clone();
        }
        if let Some(domain) = &args.host_domain {
            self.host_domain = domain.clone();
        }
        if let Some(user) = &args.sap_control_user {
            self.sap_control_user = user.clone();
        }
        if let Some(password) = &args.sap_control_password {
            self.sap_control_password = password.clone();
        }
        if let Some(skip) = args.tls_skip_verify {
            self.tls_skip_verify = skip;
        }
        if let Some(max_age) = &args.alert_samples_max_age {
            self.alert_samples_max_age = parse_max_age(max_age)?;
        }
        Ok(())
    }

    /// Normalizes sap_control_url and derives sap_host, sap_port, use_tls and host_domain.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let raw = if self.sap_control_url.starts_with("http://")
            || self.sap_control_url.starts_with("https://")
        {
            self.sap_control_url.clone()
        } else {
            format!("http://{}", self.sap_control_url)
        };

        let mut url = Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(raw.clone(), e.to_string()))?;
        let port = url.port().ok_or_else(|| ConfigError::MissingPort(raw.clone()))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(raw.clone(), "no host".to_string()))?
            .to_string();
        let is_ip = hostname.starts_with('[') || hostname.parse::<IpAddr>().is_ok();

        self.sap_port = port;
        self.use_tls = url.scheme() == "https";

        match hostname.split_once('.') {
            Some((_, domain)) if !is_ip => {
                if !self.host_domain.is_empty() && self.host_domain != domain {
                    log::warn!(
                        "host_domain parameter is overwritten by sap_control_url: {}",
                        domain
                    );
                }
                self.host_domain = domain.to_string();
                self.sap_host = hostname.clone();
            }
            _ if !is_ip && !self.host_domain.is_empty() => {
                let fqdn = format!("{}.{}", hostname, self.host_domain);
                url.set_host(Some(&fqdn))
                    .map_err(|e| ConfigError::InvalidUrl(fqdn.clone(), e.to_string()))?;
                self.sap_host = fqdn;
            }
            _ => {
                if !is_ip {
                    log::warn!(
                        "host_domain parameter is empty and no domain part in the sap_control_url: {}",
                        raw
                    );
                }
                self.sap_host = hostname.clone();
            }
        }
        self.sap_control_url = url.as_str().trim_end_matches('/').to_string();

        if self.cache_ttl.is_zero() {
            self.cache_ttl = DEFAULT_CACHE_TTL;
        }
        if self.cache_error_ttl.is_zero() {
            self.cache_error_ttl = DEFAULT_CACHE_ERROR_TTL;
        }
        if self.cache_error_ttl > self.cache_ttl {
            self.cache_error_ttl = self.cache_ttl;
        }
        Ok(())
    }

    pub fn redacted(&self) -> ExporterConfig {
        let mut copy = self.clone();
        if !copy.sap_control_password.is_empty() {
            copy.sap_control_password = "***".to_string();
        }
        copy
    }
}

fn find_config_file() -> Option<PathBuf> {
    CONFIG_SEARCH_PATHS
        .iter()
        .map(|dir| Path::new(dir).join(CONFIG_FILE_NAME))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(url: &str, domain: &str) -> Result<ExporterConfig, ConfigError> {
        let mut config = ExporterConfig {
            sap_control_url: url.to_string(),
            host_domain: domain.to_string(),
            ..Default::default()
        };
        config.validate().map(|_| config)
    }

    #[test]
    fn test_schemeless_url_gets_http_and_domain() {
        let config = validated("sapci:50013", "corp.local").unwrap();
        assert_eq!(config.sap_control_url, "http://sapci.corp.local:50013");
        assert_eq!(config.sap_host, "sapci.corp.local");
        assert_eq!(config.sap_port, 50013);
        assert!(!config.use_tls);
    }

    #[test]
    fn test_https_url_with_domain_overrides_host_domain() {
        let config = validated("https://sapci.prod.corp:50014", "other.corp").unwrap();
        assert!(config.use_tls);
        assert_eq!(config.host_domain, "prod.corp");
        assert_eq!(config.sap_host, "sapci.prod.corp");
        assert_eq!(config.sap_control_url, "https://sapci.prod.corp:50014");
    }

    #[test]
    fn test_ip_address_is_not_split() {
        let config = validated("10.1.2.3:50013", "").unwrap();
        assert_eq!(config.sap_host, "10.1.2.3");
        assert_eq!(config.host_domain, "");
    }

    #[test]
    fn test_port_is_required() {
        assert!(matches!(
            validated("http://sapci.corp.local", ""),
            Err(ConfigError::MissingPort(_))
        ));
    }

    #[test]
    fn test_yaml_file_values_and_defaults() {
        let config = ExporterConfig::from_yaml(
            r#"
sap_control_url: "https://sapci:50014"
cache_ttl: 1m
scrape_timeout: 10s
fanout_limit: 4
collect_alerts: false
alert_samples_max_age: "-1s"
loki_batch_wait: 250ms
"#,
        )
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.scrape_timeout, Duration::from_secs(10));
        assert_eq!(config.fanout_limit, 4);
        assert!(!config.collect_alerts);
        assert!(config.collect_dispatcher);
        assert_eq!(config.alert_samples_max_age, None);
        assert_eq!(config.loki_batch_wait, Duration::from_millis(250));
        assert_eq!(config.port, 9680);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = ExporterConfig::from_yaml("port: 9000\nlog_level: warn\n").unwrap();
        let args = CliArgs {
            port: Some(9100),
            alert_samples_max_age: Some("2h".to_string()),
            ..Default::default()
        };
        config.apply_args(&args).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.alert_samples_max_age, Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_error_ttl_is_capped_by_cache_ttl() {
        let mut config = ExporterConfig {
            cache_ttl: Duration::from_secs(2),
            cache_error_ttl: Duration::from_secs(10),
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.cache_error_ttl, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_cache_ttl_falls_back_to_default() {
        let mut config = ExporterConfig {
            cache_ttl: Duration::ZERO,
            cache_error_ttl: Duration::ZERO,
            ..Default::default()
        };
        config.validate().unwrap();
        assert_eq!(config.cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.cache_error_ttl, DEFAULT_CACHE_ERROR_TTL);
    }

    #[test]
    fn test_redacted_hides_password() {
        let config = ExporterConfig {
            sap_control_password: "secret".to_string(),
            ..Default::default()
        };
        assert_eq!(config.redacted().sap_control_password, "***");
    }
}
