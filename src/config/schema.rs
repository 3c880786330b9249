//! Configuration file schema and resolution into runtime settings.
//!
//! Every scalar is optional in the file so that a layer only overrides what
//! it actually sets. [`Config::resolve`] fills gaps with defaults and
//! validates the result.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::bridge::BridgeConfig;
use crate::cli::Cli;
use crate::proxy::{ProxyConfig, UpstreamConfig};

/// Default VM address.
pub const DEFAULT_VM_HOST: &str = "192.168.137.25";
/// Default Docker daemon port on the VM.
pub const DEFAULT_VM_PORT: u16 = 2375;
/// Default local listening port.
pub const DEFAULT_LOCAL_PORT: u16 = 2375;
/// Default local listening address.
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
/// Default destination prefix for translated paths.
pub const DEFAULT_BASE: &str = "/mnt/hgfs/docker/volumes/";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Local listener settings.
    #[serde(default)]
    pub proxy: ProxySection,

    /// Docker daemon on the VM.
    #[serde(default)]
    pub upstream: UpstreamSection,

    /// Path translation settings.
    #[serde(default)]
    pub paths: PathsSection,

    /// Port bridge settings.
    #[serde(default)]
    pub bridge: BridgeSection,

    /// General application settings.
    #[serde(default)]
    pub general: GeneralConfig,
}

impl Config {
    /// Merge another config into this one. Values set in `other` win.
    pub fn merge(&mut self, other: Config) {
        self.proxy.merge(other.proxy);
        self.upstream.merge(other.upstream);
        self.paths.merge(other.paths);
        self.bridge.merge(other.bridge);
        self.general.merge(other.general);
    }

    /// The layer contributed by command-line flags.
    pub fn from_cli(cli: &Cli) -> Self {
        Config {
            proxy: ProxySection {
                listen_port: cli.local_port,
                ..Default::default()
            },
            upstream: UpstreamSection {
                host: cli.ip.clone(),
                port: cli.vm_port,
                ..Default::default()
            },
            paths: PathsSection {
                base: cli.base.clone(),
            },
            bridge: BridgeSection::default(),
            general: GeneralConfig {
                syslog: cli.syslog.then_some(true),
            },
        }
    }

    /// Apply defaults and validate.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let listen_ip = parse_ip(
            "proxy.listen_address",
            self.proxy.listen_address.as_deref().unwrap_or(DEFAULT_LISTEN_ADDRESS),
        )?;
        let listen_port = self.proxy.listen_port.unwrap_or(DEFAULT_LOCAL_PORT);

        let host = self
            .upstream
            .host
            .clone()
            .unwrap_or_else(|| DEFAULT_VM_HOST.to_string());
        if host.trim().is_empty() {
            return Err(ConfigError::invalid("upstream.host", "must not be empty"));
        }
        let port = self.upstream.port.unwrap_or(DEFAULT_VM_PORT);
        if port == 0 {
            return Err(ConfigError::invalid("upstream.port", "must be between 1 and 65535"));
        }

        let mut upstream = UpstreamConfig::new(host.clone(), port);
        if let Some(secs) = self.upstream.connect_timeout_secs {
            upstream.connect_timeout = non_zero_secs("upstream.connect_timeout_secs", secs)?;
        }
        if let Some(secs) = self.upstream.keepalive_secs {
            upstream.keepalive = non_zero_secs("upstream.keepalive_secs", secs)?;
        }
        if let Some(secs) = self.upstream.idle_timeout_secs {
            upstream.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.upstream.max_idle_connections {
            upstream.max_idle_connections = max;
        }

        let base = self
            .paths
            .base
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE.to_string());
        if base.is_empty() {
            return Err(ConfigError::invalid("paths.base", "must not be empty"));
        }

        let mut bridge = BridgeConfig::new(host);
        if let Some(ref addr) = self.bridge.listen_address {
            bridge.listen_ip = parse_ip("bridge.listen_address", addr)?;
        }
        if let Some(secs) = self.bridge.dial_timeout_secs {
            bridge.dial_timeout = non_zero_secs("bridge.dial_timeout_secs", secs)?;
        }

        Ok(Settings {
            listen_addr: SocketAddr::new(listen_ip, listen_port),
            upstream,
            base,
            bridge,
            syslog: self.general.syslog.unwrap_or(false),
        })
    }
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("'{}' is not an IP address", value)))
}

fn non_zero_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::invalid(field, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

/// `[proxy]`: where clients connect.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ProxySection {
    /// Local interface to listen on.
    #[serde(default)]
    pub listen_address: Option<String>,

    /// Local port to listen on.
    #[serde(default)]
    pub listen_port: Option<u16>,
}

impl ProxySection {
    fn merge(&mut self, other: ProxySection) {
        if other.listen_address.is_some() {
            self.listen_address = other.listen_address;
        }
        if other.listen_port.is_some() {
            self.listen_port = other.listen_port;
        }
    }
}

/// `[upstream]`: the Docker daemon inside the VM.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct UpstreamSection {
    /// VM hostname or IP. Also the target of port bridges.
    #[serde(default)]
    pub host: Option<String>,

    /// Daemon TCP port.
    #[serde(default)]
    pub port: Option<u16>,

    /// Connect timeout in seconds.
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// TCP keepalive interval in seconds.
    #[serde(default)]
    pub keepalive_secs: Option<u64>,

    /// Idle pooled connection lifetime in seconds.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Maximum idle pooled connections.
    #[serde(default)]
    pub max_idle_connections: Option<usize>,
}

impl UpstreamSection {
    fn merge(&mut self, other: UpstreamSection) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.connect_timeout_secs.is_some() {
            self.connect_timeout_secs = other.connect_timeout_secs;
        }
        if other.keepalive_secs.is_some() {
            self.keepalive_secs = other.keepalive_secs;
        }
        if other.idle_timeout_secs.is_some() {
            self.idle_timeout_secs = other.idle_timeout_secs;
        }
        if other.max_idle_connections.is_some() {
            self.max_idle_connections = other.max_idle_connections;
        }
    }
}

/// `[paths]`: Windows path translation.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct PathsSection {
    /// Destination prefix, e.g. `/mnt/hgfs/docker/volumes/`.
    #[serde(default)]
    pub base: Option<String>,
}

impl PathsSection {
    fn merge(&mut self, other: PathsSection) {
        if other.base.is_some() {
            self.base = other.base;
        }
    }
}

/// `[bridge]`: localhost port bridges.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BridgeSection {
    /// Local interface bridge listeners bind.
    #[serde(default)]
    pub listen_address: Option<String>,

    /// Bound on each bridged connection's dial, in seconds.
    #[serde(default)]
    pub dial_timeout_secs: Option<u64>,
}

impl BridgeSection {
    fn merge(&mut self, other: BridgeSection) {
        if other.listen_address.is_some() {
            self.listen_address = other.listen_address;
        }
        if other.dial_timeout_secs.is_some() {
            self.dial_timeout_secs = other.dial_timeout_secs;
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Send audit events to syslog.
    #[serde(default)]
    pub syslog: Option<bool>,
}

impl GeneralConfig {
    fn merge(&mut self, other: GeneralConfig) {
        if other.syslog.is_some() {
            self.syslog = other.syslog;
        }
    }
}

/// Fully resolved, validated runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address the proxy listens on.
    pub listen_addr: SocketAddr,
    /// Daemon requests are forwarded to.
    pub upstream: UpstreamConfig,
    /// Destination prefix for translated paths.
    pub base: String,
    /// Settings for port bridges.
    pub bridge: BridgeConfig,
    /// Whether audit events go to syslog.
    pub syslog: bool,
}

impl Settings {
    /// Transport settings for the proxy server.
    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            listen_addr: self.listen_addr,
            upstream: self.upstream.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_defaults() {
        let settings = Config::default().resolve().unwrap();
        assert_eq!(settings.listen_addr, "127.0.0.1:2375".parse().unwrap());
        assert_eq!(settings.upstream.authority(), "192.168.137.25:2375");
        assert_eq!(settings.base, "/mnt/hgfs/docker/volumes/");
        assert_eq!(settings.bridge.remote_host, "192.168.137.25");
        assert_eq!(settings.bridge.listen_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(settings.bridge.dial_timeout, Duration::from_secs(5));
        assert!(!settings.syslog);
    }

    #[test]
    fn test_parse_full_file() {
        let toml_str = r#"
            [proxy]
            listen_address = "0.0.0.0"
            listen_port = 12375

            [upstream]
            host = "10.0.0.9"
            port = 2376
            connect_timeout_secs = 3
            keepalive_secs = 15
            idle_timeout_secs = 60
            max_idle_connections = 8

            [paths]
            base = "/srv/shares/"

            [bridge]
            listen_address = "127.0.0.2"
            dial_timeout_secs = 2

            [general]
            syslog = true
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let settings = config.resolve().unwrap();

        assert_eq!(settings.listen_addr, "0.0.0.0:12375".parse().unwrap());
        assert_eq!(settings.upstream.host, "10.0.0.9");
        assert_eq!(settings.upstream.port, 2376);
        assert_eq!(settings.upstream.connect_timeout, Duration::from_secs(3));
        assert_eq!(settings.upstream.keepalive, Duration::from_secs(15));
        assert_eq!(settings.upstream.idle_timeout, Duration::from_secs(60));
        assert_eq!(settings.upstream.max_idle_connections, 8);
        assert_eq!(settings.base, "/srv/shares/");
        assert_eq!(settings.bridge.remote_host, "10.0.0.9");
        assert_eq!(settings.bridge.listen_ip, "127.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(settings.bridge.dial_timeout, Duration::from_secs(2));
        assert!(settings.syslog);
    }

    #[test]
    fn test_merge_overrides_only_set_values() {
        let mut base: Config = toml::from_str(
            r#"
            [upstream]
            host = "10.0.0.1"
            port = 2376
            "#,
        )
        .unwrap();
        let overlay: Config = toml::from_str(
            r#"
            [upstream]
            host = "10.0.0.2"
            "#,
        )
        .unwrap();

        base.merge(overlay);

        assert_eq!(base.upstream.host.as_deref(), Some("10.0.0.2"));
        assert_eq!(base.upstream.port, Some(2376));
    }

    #[test]
    fn test_cli_layer() {
        let cli = Cli {
            ip: Some("10.1.1.1".to_string()),
            local_port: Some(3000),
            base: Some("/data/".to_string()),
            ..Default::default()
        };
        let layer = Config::from_cli(&cli);

        assert_eq!(layer.upstream.host.as_deref(), Some("10.1.1.1"));
        assert_eq!(layer.upstream.port, None);
        assert_eq!(layer.proxy.listen_port, Some(3000));
        assert_eq!(layer.paths.base.as_deref(), Some("/data/"));
        // An absent --syslog flag must not override a config file.
        assert_eq!(layer.general.syslog, None);
    }

    #[test]
    fn test_empty_base_rejected() {
        let config = Config {
            paths: PathsSection {
                base: Some(String::new()),
            },
            ..Default::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "paths.base"));
    }

    #[test]
    fn test_zero_dial_timeout_rejected() {
        let config = Config {
            bridge: BridgeSection {
                dial_timeout_secs: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "bridge.dial_timeout_secs"
        ));
    }

    #[test]
    fn test_bad_listen_address_rejected() {
        let config = Config {
            proxy: ProxySection {
                listen_address: Some("localhost".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "proxy.listen_address"
        ));
    }

    #[test]
    fn test_zero_upstream_port_rejected() {
        let config = Config {
            upstream: UpstreamSection {
                port: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.resolve().is_err());
    }

    #[test]
    fn test_settings_proxy_config() {
        let settings = Config::default().resolve().unwrap();
        let proxy = settings.proxy_config();
        assert_eq!(proxy.listen_addr, settings.listen_addr);
        assert_eq!(proxy.upstream, settings.upstream);
    }
}
