// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefill Network Diagnostics (spec §4.N): a handful of best-effort
//! in-container probes run right after a session container starts, whose
//! results attach to the session purely for observability. A probe that
//! can't run (missing tool, container unreachable) degrades to a failed
//! result, never an error the caller has to handle — "diagnostics never
//! fail session creation" (spec §4.N).

use lancache_supervisor::ContainerEngine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static IPV4_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static IPV6_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F:]{2,}:[0-9a-fA-F:]*\b").expect("constant regex pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Private,
    Public,
    Unknown,
}

fn classify(addr: &str) -> AddressClass {
    match addr.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            if v4.is_private() || v4.is_link_local() || v4.is_loopback() {
                AddressClass::Private
            } else {
                AddressClass::Public
            }
        }
        Ok(IpAddr::V6(v6)) => {
            // ULA (fc00::/7) and link-local (fe80::/10) both stay inside
            // the LAN; everything else is treated as public.
            let first_byte = v6.octets()[0];
            if (0xfc..=0xfd).contains(&first_byte) || v6.is_loopback() || v6.segments()[0] == 0xfe80 {
                AddressClass::Private
            } else {
                AddressClass::Public
            }
        }
        Err(_) => AddressClass::Unknown,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProbeResult {
    pub attempted: bool,
    pub succeeded: bool,
    pub method: &'static str,
    pub detail: Option<String>,
}

impl HttpProbeResult {
    fn not_attempted() -> Self {
        Self { attempted: false, succeeded: false, method: "none", detail: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsProbeResult {
    pub domain: String,
    pub resolved: bool,
    pub addresses: Vec<String>,
    pub classification: AddressClass,
    pub method: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsResult {
    pub https_probe: HttpProbeResult,
    pub ipv4_probe: HttpProbeResult,
    pub ipv6_probe: HttpProbeResult,
    pub dns: Vec<DnsProbeResult>,
}

async fn exec(container: &dyn ContainerEngine, container_id: &str, cmd: &[&str]) -> Option<String> {
    container.exec(container_id, cmd).await.ok()
}

/// wget --spider, falling back to curl, with an optional `-4`/`-6` pin.
async fn http_probe(
    container: &dyn ContainerEngine,
    container_id: &str,
    url: &str,
    ip_flag: Option<&str>,
) -> HttpProbeResult {
    let mut wget_args = vec!["wget", "--spider", "-q"];
    if let Some(f) = ip_flag {
        wget_args.push(f);
    }
    wget_args.push(url);
    if exec(container, container_id, &wget_args).await.is_some() {
        return HttpProbeResult { attempted: true, succeeded: true, method: "wget", detail: None };
    }

    let mut curl_args = vec!["curl", "-s", "-o", "/dev/null", "-w", "%{http_code}", "--max-time", "10"];
    if let Some(f) = ip_flag {
        curl_args.push(f);
    }
    curl_args.push(url);
    match exec(container, container_id, &curl_args).await {
        Some(code) => {
            let ok = code.trim().starts_with('2') || code.trim().starts_with('3');
            HttpProbeResult { attempted: true, succeeded: ok, method: "curl", detail: Some(code) }
        }
        None => HttpProbeResult { attempted: true, succeeded: false, method: "curl", detail: None },
    }
}

fn extract_addresses(output: &str) -> Vec<String> {
    // Matches IPv4 dotted-quad and bare-colon IPv6 forms found in
    // nslookup/getent/ping output without parsing each tool's own format.
    let mut found: Vec<String> = IPV4_PATTERN.find_iter(output).map(|m| m.as_str().to_string()).collect();
    found.extend(
        IPV6_PATTERN
            .find_iter(output)
            .filter(|m| m.as_str().contains("::") || m.as_str().matches(':').count() >= 2)
            .map(|m| m.as_str().to_string()),
    );
    found.retain(|a| a.parse::<IpAddr>().is_ok());
    found.sort();
    found.dedup();
    found
}

/// nslookup -> getent hosts -> ping, in order, for a single domain.
async fn resolve_domain(container: &dyn ContainerEngine, container_id: &str, domain: &str) -> DnsProbeResult {
    if let Some(out) = exec(container, container_id, &["nslookup", domain]).await {
        let addrs = extract_addresses(&out);
        if !addrs.is_empty() {
            let classification = classify(&addrs[0]);
            return DnsProbeResult { domain: domain.to_string(), resolved: true, addresses: addrs, classification, method: "nslookup" };
        }
    }
    if let Some(out) = exec(container, container_id, &["getent", "hosts", domain]).await {
        let addrs = extract_addresses(&out);
        if !addrs.is_empty() {
            let classification = classify(&addrs[0]);
            return DnsProbeResult { domain: domain.to_string(), resolved: true, addresses: addrs, classification, method: "getent" };
        }
    }
    if let Some(out) = exec(container, container_id, &["ping", "-c", "1", "-W", "2", domain]).await {
        let addrs = extract_addresses(&out);
        if !addrs.is_empty() {
            let classification = classify(&addrs[0]);
            return DnsProbeResult { domain: domain.to_string(), resolved: true, addresses: addrs, classification, method: "ping" };
        }
    }
    DnsProbeResult {
        domain: domain.to_string(),
        resolved: false,
        addresses: Vec::new(),
        classification: AddressClass::Unknown,
        method: "none",
    }
}

/// Runs the full probe suite for one just-started session container (spec
/// §4.N). Every probe swallows its own failures; this function itself never
/// returns an error.
pub async fn run(
    container: &dyn ContainerEngine,
    container_id: &str,
    probe_url: &str,
    domains: &[String],
) -> DiagnosticsResult {
    if probe_url.is_empty() {
        return DiagnosticsResult {
            https_probe: HttpProbeResult::not_attempted(),
            ipv4_probe: HttpProbeResult::not_attempted(),
            ipv6_probe: HttpProbeResult::not_attempted(),
            dns: Vec::new(),
        };
    }

    let https_probe = http_probe(container, container_id, probe_url, None).await;
    let ipv4_probe = http_probe(container, container_id, probe_url, Some("-4")).await;
    let ipv6_probe = http_probe(container, container_id, probe_url, Some("-6")).await;

    let mut dns = Vec::with_capacity(domains.len());
    for domain in domains {
        dns.push(resolve_domain(container, container_id, domain).await);
    }

    DiagnosticsResult { https_probe, ipv4_probe, ipv6_probe, dns }
}

#[cfg(test)]
#[path = "diagnostics_tests.rs"]
mod tests;
