use std::sync::Arc;

use bytes::Bytes;
use dockbridge::bridge::{BridgeConfig, BridgeManager};
use dockbridge::config::DEFAULT_BASE;
use dockbridge::proxy::CreateInterceptor;
use dockbridge::rewrite::{translate, PathReference, PayloadRewriter};
use dockbridge::telemetry::AuditLogger;
use serde_json::Value;

fn rewrite_json(base: &str, body: &str) -> Value {
    let outcome = PayloadRewriter::new(base).rewrite(Bytes::from(body.to_string()));
    serde_json::from_slice(&outcome.body).expect("rewritten body is JSON")
}

#[test]
fn test_bind_with_default_base() {
    let out = rewrite_json(DEFAULT_BASE, r#"{"HostConfig":{"Binds":["C:\\data:/app"]}}"#);
    assert_eq!(
        out["HostConfig"]["Binds"][0],
        "/mnt/hgfs/docker/volumes/C/data:/app"
    );
}

#[test]
fn test_bind_mode_suffix_preserved() {
    let out = rewrite_json("/vol/", r#"{"HostConfig":{"Binds":["C:\\data:/app:ro"]}}"#);
    assert_eq!(out["HostConfig"]["Binds"][0], "/vol/C/data:/app:ro");
}

#[test]
fn test_env_value_translated() {
    let out = rewrite_json(DEFAULT_BASE, r#"{"Env":["DB_PATH=C:\\config\\db"]}"#);
    assert_eq!(
        out["Env"][0],
        "DB_PATH=/mnt/hgfs/docker/volumes/C/config/db"
    );
}

#[test]
fn test_env_without_drive_untouched() {
    let rewriter = PayloadRewriter::new("/vol/");
    let body = Bytes::from_static(br#"{"Env":["NAME=value"]}"#);
    let outcome = rewriter.rewrite(body.clone());

    assert!(!outcome.was_modified());
    assert_eq!(outcome.body, body);
}

#[test]
fn test_non_json_passthrough() {
    let rewriter = PayloadRewriter::new("/vol/");
    let outcome = rewriter.rewrite(Bytes::from_static(b"not json"));

    assert_eq!(&outcome.body[..], b"not json");
    assert!(outcome.ports.is_empty());
    assert!(!outcome.was_modified());
}

#[test]
fn test_translation_is_idempotent() {
    let once = translate("/vol", 'd', "projects\\api");
    assert_eq!(once, "/vol/D/projects/api");
    assert!(PathReference::parse_bind(&once).is_none());
    assert!(PathReference::parse_value(&once).is_none());
}

#[test]
fn test_mixed_payload_keeps_other_fields() {
    let out = rewrite_json(
        "/vol/",
        r#"{"Image":"postgres:16","Env":["A=1","HOME=e:/users/me"],"HostConfig":{"Binds":["named:/data","E:/src:/src"],"Memory":0}}"#,
    );
    assert_eq!(out["Image"], "postgres:16");
    assert_eq!(out["Env"][0], "A=1");
    assert_eq!(out["Env"][1], "HOME=/vol/E/users/me");
    assert_eq!(out["HostConfig"]["Binds"][0], "named:/data");
    assert_eq!(out["HostConfig"]["Binds"][1], "/vol/E/src:/src");
    assert_eq!(out["HostConfig"]["Memory"], 0);
}

#[tokio::test]
async fn test_repeated_port_starts_one_bridge() {
    let bridges = Arc::new(BridgeManager::new(BridgeConfig::new("127.0.0.1")));
    let hook = Arc::new(CreateInterceptor::new(
        "/vol/",
        bridges.clone(),
        Arc::new(AuditLogger::new_null()),
    ));
    let body = Bytes::from_static(
        br#"{"HostConfig":{"PortBindings":{"5432/tcp":[{"HostPort":"54322"}]}}}"#,
    );

    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let hook = hook.clone();
            let body = body.clone();
            tokio::spawn(async move { hook.intercept("/v1.43/containers/create", body) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(bridges.registered_ports(), vec!["54322".to_string()]);
    bridges.shutdown();
}
