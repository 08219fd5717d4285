// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use async_trait::async_trait;
use lancache_supervisor::{ContainerSpec, ContainerStatus, Result as SupervisorResult, SupervisorError};
use parking_lot::Mutex;
use std::time::Duration;

/// Records every `exec` call and replays canned responses in order, keyed
/// by matching the first word of the command.
#[derive(Default)]
struct FakeEngine {
    responses: Mutex<std::collections::HashMap<String, SupervisorResult<String>>>,
}

impl FakeEngine {
    fn with(mut self, tool: &str, result: SupervisorResult<String>) -> Self {
        self.responses.get_mut().insert(tool.to_string(), result);
        self
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn pull(&self, _image: &str) -> SupervisorResult<()> {
        Ok(())
    }
    async fn create(&self, _spec: &ContainerSpec) -> SupervisorResult<String> {
        Ok("fake".into())
    }
    async fn start(&self, _container_id: &str) -> SupervisorResult<()> {
        Ok(())
    }
    async fn stop(&self, _container_id: &str, _wait_before_kill: Duration) -> SupervisorResult<()> {
        Ok(())
    }
    async fn kill(&self, _container_id: &str) -> SupervisorResult<()> {
        Ok(())
    }
    async fn remove(&self, _container_id: &str) -> SupervisorResult<()> {
        Ok(())
    }
    async fn inspect(&self, _container_id: &str) -> SupervisorResult<ContainerStatus> {
        Ok(ContainerStatus { running: true, exit_code: None })
    }
    async fn logs(&self, _container_id: &str, _tail_lines: usize) -> SupervisorResult<String> {
        Ok(String::new())
    }
    async fn exec(&self, _container_id: &str, cmd: &[&str]) -> SupervisorResult<String> {
        let tool = cmd.first().copied().unwrap_or("");
        match self.responses.lock().get(tool) {
            Some(Ok(s)) => Ok(s.clone()),
            Some(Err(_)) | None => Err(SupervisorError::Container(format!("no canned response for {tool}"))),
        }
    }
    async fn network_ip(&self, _network: &str, _container_name: &str) -> SupervisorResult<Option<String>> {
        Ok(None)
    }
    async fn list_by_prefix(&self, _prefix: &str) -> SupervisorResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn mount_source(&self, _container_id: &str, _container_path: &str) -> SupervisorResult<Option<String>> {
        Ok(None)
    }
}

#[test]
fn classify_private_and_public_v4() {
    assert_eq!(classify("192.168.1.5"), AddressClass::Private);
    assert_eq!(classify("10.0.0.1"), AddressClass::Private);
    assert_eq!(classify("8.8.8.8"), AddressClass::Public);
}

#[test]
fn classify_ula_and_public_v6() {
    assert_eq!(classify("fc00::1"), AddressClass::Private);
    assert_eq!(classify("fe80::1"), AddressClass::Private);
    assert_eq!(classify("2001:4860:4860::8888"), AddressClass::Public);
}

#[test]
fn extract_addresses_pulls_ipv4_out_of_nslookup_output() {
    let out = "Server:\t\t127.0.0.11\nAddress:\t127.0.0.11#53\n\nName:\tsteampowered.com\nAddress: 23.66.230.4\n";
    let addrs = extract_addresses(out);
    assert!(addrs.contains(&"23.66.230.4".to_string()));
}

#[tokio::test]
async fn http_probe_prefers_wget_when_it_succeeds() {
    let engine = FakeEngine::default().with("wget", Ok(String::new()));
    let result = http_probe(&engine, "c1", "https://example.com", None).await;
    assert!(result.succeeded);
    assert_eq!(result.method, "wget");
}

#[tokio::test]
async fn http_probe_falls_back_to_curl_when_wget_is_missing() {
    let engine = FakeEngine::default().with("curl", Ok("200".into()));
    let result = http_probe(&engine, "c1", "https://example.com", None).await;
    assert!(result.succeeded);
    assert_eq!(result.method, "curl");
}

#[tokio::test]
async fn http_probe_reports_failure_when_neither_tool_is_available() {
    let engine = FakeEngine::default();
    let result = http_probe(&engine, "c1", "https://example.com", None).await;
    assert!(!result.succeeded);
}

#[tokio::test]
async fn resolve_domain_falls_back_through_nslookup_getent_ping() {
    let engine = FakeEngine::default().with("getent", Ok("10.0.0.5   steam-cache.internal".into()));
    let result = resolve_domain(&engine, "c1", "steam-cache.internal").await;
    assert!(result.resolved);
    assert_eq!(result.method, "getent");
    assert_eq!(result.classification, AddressClass::Private);
}

#[tokio::test]
async fn run_short_circuits_when_no_probe_url_is_configured() {
    let engine = FakeEngine::default();
    let result = run(&engine, "c1", "", &[]).await;
    assert!(!result.https_probe.attempted);
    assert!(result.dns.is_empty());
}
