// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefill session configuration (spec §4.M, §6 `Prefill:*` keys). Plain
//! data assembled by `lancache-daemon` from its layered config file and
//! handed to [`crate::session::PrefillSessionManager::new`].

use std::path::PathBuf;
use std::time::Duration;

/// An explicit networking override for session containers (spec §4.M step
/// 4: "explicit override wins").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOverride {
    Host,
    Named(String),
}

#[derive(Debug, Clone)]
pub struct PrefillConfig {
    /// `Prefill:DockerImage`.
    pub docker_image: String,
    /// `Prefill:EpicDockerImage`.
    pub epic_docker_image: String,
    /// Base directory (container-local, from this process's point of view)
    /// under which per-session command/response directories are created.
    pub sessions_root: PathBuf,
    /// `Prefill:HostDataPath` — explicit host path backing `sessions_root`,
    /// bypassing self-mount inspection when set.
    pub host_data_path: Option<PathBuf>,
    /// `Prefill:UseTcp`.
    pub use_tcp: bool,
    /// `Prefill:TcpPort` — the daemon's internal listening port.
    pub tcp_port: u16,
    /// `Prefill:HostTcpPort` — fixed host port, or `0` to pick an ephemeral
    /// one per session.
    pub host_tcp_port: u16,
    /// `Prefill:TcpHost`.
    pub tcp_host: String,
    /// `Prefill:NetworkMode`.
    pub network_override: Option<NetworkOverride>,
    /// `Prefill:LancacheDnsIp` — explicit override for the DNS container's
    /// IP; when unset, the manager resolves it live.
    pub lancache_dns_ip: Option<String>,
    pub lancache_dns_network: String,
    pub lancache_dns_container: String,
    /// `Prefill:SessionTimeoutMinutes`, converted. Default 120 min.
    pub session_timeout: Duration,
    pub container_name_prefix: String,
}

impl Default for PrefillConfig {
    fn default() -> Self {
        Self {
            docker_image: "lancache-prefill:latest".into(),
            epic_docker_image: "lancache-prefill-epic:latest".into(),
            sessions_root: PathBuf::from("/data/prefill-sessions"),
            host_data_path: None,
            use_tcp: cfg!(windows),
            tcp_port: 9900,
            host_tcp_port: 0,
            tcp_host: "127.0.0.1".into(),
            network_override: None,
            lancache_dns_ip: None,
            lancache_dns_network: "lancache_default".into(),
            lancache_dns_container: "lancache-dns".into(),
            session_timeout: Duration::from_secs(120 * 60),
            container_name_prefix: "lancache-prefill-".into(),
        }
    }
}
