use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use dockbridge::cli::Cli;
use dockbridge::config::{ConfigError, ConfigLoader};
use tempfile::tempdir;

#[test]
fn test_layers_merge_in_order() {
    let dir = tempdir().unwrap();
    let system = dir.path().join("system.toml");
    let user = dir.path().join("user.toml");
    let extra = dir.path().join("extra.toml");

    fs::write(
        &system,
        r#"
        [upstream]
        host = "10.0.0.1"
        port = 2376

        [paths]
        base = "/system/"
        "#,
    )
    .unwrap();
    fs::write(
        &user,
        r#"
        [paths]
        base = "/user/"

        [bridge]
        dial_timeout_secs = 9
        "#,
    )
    .unwrap();
    fs::write(
        &extra,
        r#"
        [upstream]
        host = "10.0.0.3"

        [general]
        syslog = true
        "#,
    )
    .unwrap();

    let cli = Cli::parse_from([
        "dockbridge",
        "--config",
        extra.to_str().unwrap(),
        "--local-port",
        "12375",
        "--base",
        "/cli/",
    ]);
    let settings = ConfigLoader::with_paths(system, user)
        .load_settings(&cli)
        .unwrap();

    assert_eq!(settings.upstream.host, "10.0.0.3");
    assert_eq!(settings.upstream.port, 2376);
    assert_eq!(settings.base, "/cli/");
    assert_eq!(
        settings.listen_addr,
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 12375)
    );
    assert_eq!(settings.bridge.remote_host, "10.0.0.3");
    assert_eq!(settings.bridge.dial_timeout, Duration::from_secs(9));
    assert!(settings.syslog);
}

#[test]
fn test_cli_ip_sets_bridge_remote() {
    let dir = tempdir().unwrap();
    let cli = Cli::parse_from(["dockbridge", "--ip", "192.168.56.10", "--vm-port", "2380"]);
    let settings = ConfigLoader::with_paths(dir.path().join("a"), dir.path().join("b"))
        .load_settings(&cli)
        .unwrap();

    assert_eq!(settings.upstream.authority(), "192.168.56.10:2380");
    assert_eq!(settings.bridge.remote_host, "192.168.56.10");
}

#[test]
fn test_invalid_value_in_file_rejected() {
    let dir = tempdir().unwrap();
    let user = dir.path().join("user.toml");
    fs::write(&user, "[bridge]\nlisten_address = \"not-an-ip\"\n").unwrap();

    let err = ConfigLoader::with_paths(dir.path().join("system.toml"), user)
        .load_settings(&Cli::default())
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { .. }));
    assert!(err.to_string().contains("bridge.listen_address"));
}
