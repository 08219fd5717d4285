// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Prefill Session Manager (spec §4.M): per-user ephemeral containers
//! that log in to a storefront and populate the shared cache on the user's
//! behalf. State lives in memory keyed by `sessionId` and is mirrored into
//! the `PrefillSession`/`PrefillHistoryEntry` tables so a restart can at
//! least account for (and clean up) what was in flight.

use crate::auth::{AuthRejection, AuthState, AuthStateMachine};
use crate::config::{NetworkOverride, PrefillConfig};
use crate::crypto;
use crate::diagnostics;
use crate::error::{PrefillError, Result};
use crate::transport::{DaemonClient, DaemonEventHandler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lancache_core::operation::{KillableProcess, OperationId, OperationMetadata, OperationType};
use lancache_core::{Clock, CoreError, NotificationEvent, NotificationPayload, SystemClock};
use lancache_engine::{schedule_eviction, NotificationBus, UnifiedOperationTracker};
use lancache_protocol::{Challenge, Command, CredentialType, PrefillProgressUpdate};
use lancache_storage::{
    BanStore, PrefillCachedDepot, PrefillHistoryStatus, PrefillSession, PrefillSessionStatus,
    PrefillStore,
};
use lancache_supervisor::{BindMount, ContainerEngine, ContainerSpec, NetworkMode, PortBinding};
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde_json::json;
use std::collections::HashMap;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Service-level hooks fired on the first/last authenticated session (spec
/// §4.M: "used by the external storefront-session service to yield/resume
/// its own session").
#[async_trait]
pub trait PrefillHooks: Send + Sync {
    async fn on_session_authenticated(&self);
    async fn on_all_sessions_logged_out(&self);
}

pub struct NoopPrefillHooks;

#[async_trait]
impl PrefillHooks for NoopPrefillHooks {
    async fn on_session_authenticated(&self) {}
    async fn on_all_sessions_logged_out(&self) {}
}

/// Why a session ended, recorded on the DB row and in the `SessionEnded`
/// event (spec §4.M "Termination").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    UserRequested,
    Timeout,
    Shutdown,
}

impl TerminationReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

struct ContainerKillHandle {
    container: Arc<dyn ContainerEngine>,
    container_id: String,
}

impl KillableProcess for ContainerKillHandle {
    fn kill_tree(&self) {
        let container = self.container.clone();
        let id = self.container_id.clone();
        tokio::spawn(async move {
            let _ = container.kill(&id).await;
        });
    }
}

/// In-memory state for one live session, mirrored into `PrefillSession`.
pub struct SessionHandle {
    pub session_id: String,
    pub user_id: String,
    pub container_id: String,
    pub container_name: String,
    pub client: Arc<DaemonClient>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    command_dir: PathBuf,
    response_dir: PathBuf,
    auth: SyncMutex<AuthStateMachine>,
    is_prefilling: AtomicBool,
    prefill_operation_id: SyncMutex<Option<OperationId>>,
    current_history_id: SyncMutex<Option<i64>>,
    last_app_id: SyncMutex<Option<i64>>,
    total_bytes_transferred: AtomicU64,
}

impl SessionHandle {
    pub fn auth_state(&self) -> AuthState {
        self.auth.lock().state().clone()
    }

    pub fn is_prefilling(&self) -> bool {
        self.is_prefilling.load(Ordering::SeqCst)
    }

    pub fn total_bytes_transferred(&self) -> u64 {
        self.total_bytes_transferred.load(Ordering::SeqCst)
    }
}

/// Collaborators shared between the manager and the per-session daemon
/// event handler, split out so the handler doesn't need a back-reference
/// to the manager itself.
struct SharedContext<C: Clock> {
    store: Arc<PrefillStore>,
    bans: Arc<BanStore>,
    tracker: Arc<UnifiedOperationTracker<C>>,
    bus: Arc<NotificationBus>,
    hooks: Arc<dyn PrefillHooks>,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    authenticated_count: AtomicU64,
}

pub struct PrefillSessionManager<C: Clock + Send + Sync + 'static = SystemClock> {
    config: PrefillConfig,
    container: Arc<dyn ContainerEngine>,
    ctx: Arc<SharedContext<C>>,
    user_sessions: RwLock<HashMap<String, String>>,
    creation_locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    own_mount_cache: AsyncMutex<Option<Option<PathBuf>>>,
    probe_url: String,
    probe_domains: Vec<String>,
}

impl<C: Clock + Send + Sync + 'static> PrefillSessionManager<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PrefillConfig,
        container: Arc<dyn ContainerEngine>,
        store: Arc<PrefillStore>,
        bans: Arc<BanStore>,
        tracker: Arc<UnifiedOperationTracker<C>>,
        bus: Arc<NotificationBus>,
        hooks: Arc<dyn PrefillHooks>,
        probe_url: String,
        probe_domains: Vec<String>,
    ) -> Self {
        Self {
            config,
            container,
            ctx: Arc::new(SharedContext {
                store,
                bans,
                tracker,
                bus,
                hooks,
                sessions: RwLock::new(HashMap::new()),
                authenticated_count: AtomicU64::new(0),
            }),
            user_sessions: RwLock::new(HashMap::new()),
            creation_locks: SyncMutex::new(HashMap::new()),
            own_mount_cache: AsyncMutex::new(None),
            probe_url,
            probe_domains,
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.ctx.sessions.read().get(session_id).cloned()
    }

    fn user_lock(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        self.creation_locks.lock().entry(user_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Session creation (spec §4.M steps 1-11).
    pub async fn create_session(&self, user_id: &str, created_by_session_id: Option<String>) -> Result<Arc<SessionHandle>> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        // Step 1: single-flight per user.
        if let Some(existing_id) = self.user_sessions.read().get(user_id).cloned() {
            if let Some(existing) = self.get_session(&existing_id) {
                return Ok(existing);
            }
        }

        // Step 2: pull image, falling back to cached on failure.
        if let Err(e) = self.container.pull(&self.config.docker_image).await {
            warn!(image = %self.config.docker_image, error = %e, "image pull failed, falling back to cached image");
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let container_name = format!("{}{session_id}", self.config.container_name_prefix);

        // Step 3: materialize + translate session directories.
        let command_dir = self.config.sessions_root.join(&session_id).join("commands");
        let response_dir = self.config.sessions_root.join(&session_id).join("responses");
        tokio::fs::create_dir_all(&command_dir).await.map_err(|e| PrefillError::Transport(e.to_string()))?;
        tokio::fs::create_dir_all(&response_dir).await.map_err(|e| PrefillError::Transport(e.to_string()))?;
        let host_command_dir = self.translate_to_host_path(&command_dir).await;
        let host_response_dir = self.translate_to_host_path(&response_dir).await;

        // Step 4: network strategy.
        let (network, dns_server, sysctls) = self.compute_network().await;

        // Step 5-6: transport + socket secret.
        const CONTAINER_COMMAND_DIR: &str = "/data/commands";
        const CONTAINER_RESPONSE_DIR: &str = "/data/responses";
        let socket_secret = crypto::generate_socket_secret();
        let mut env = HashMap::new();
        env.insert("SOCKET_SECRET".to_string(), socket_secret);
        if let Ok(tz) = std::env::var("TZ") {
            env.insert("TZ".to_string(), tz);
        }

        let mut ports = Vec::new();
        let local_socket_path;
        let mut host_port = self.config.host_tcp_port;
        if self.config.use_tcp {
            host_port = if host_port == 0 { pick_ephemeral_port()? } else { host_port };
            ports.push(PortBinding { host_port, container_port: self.config.tcp_port });
            env.insert("USE_TCP".to_string(), "1".to_string());
            env.insert("TCP_PORT".to_string(), self.config.tcp_port.to_string());
            local_socket_path = None;
        } else {
            local_socket_path = Some(response_dir.join("daemon.sock"));
            env.insert("SOCKET_PATH".to_string(), format!("{CONTAINER_RESPONSE_DIR}/daemon.sock"));
        }

        // Step 7: create + start the container.
        let spec = ContainerSpec {
            name: container_name.clone(),
            image: self.config.docker_image.clone(),
            command: vec!["daemon".to_string()],
            env,
            mounts: vec![
                BindMount::rw(host_command_dir, CONTAINER_COMMAND_DIR),
                BindMount::rw(host_response_dir, CONTAINER_RESPONSE_DIR),
            ],
            network,
            dns_server,
            sysctls,
            ports,
            auto_remove: false,
        };
        let container_id = self.container.create(&spec).await?;
        self.container.start(&container_id).await?;

        // Step 8: confirm it's actually running.
        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = self.container.inspect(&container_id).await?;
        if !status.running {
            let tail = self.container.logs(&container_id, 50).await.unwrap_or_default();
            let _ = self.container.remove(&container_id).await;
            return Err(PrefillError::Transport(format!(
                "session container exited immediately (exit code {:?}): {tail}",
                status.exit_code
            )));
        }

        // Step 9: network diagnostics (never fails session creation).
        let diagnostics = diagnostics::run(self.container.as_ref(), &container_id, &self.probe_url, &self.probe_domains).await;
        info!(session_id = %session_id, https_ok = diagnostics.https_probe.succeeded, "prefill diagnostics complete");

        // Step 10: connect the daemon client and register event handlers.
        let handler: Arc<dyn DaemonEventHandler> =
            Arc::new(SessionEventHandler { ctx: self.ctx.clone(), session_id: session_id.clone() });
        let client = Arc::new(match local_socket_path {
            Some(path) => DaemonClient::connect_unix(&path, handler).await?,
            None => DaemonClient::connect_tcp(&self.config.tcp_host, host_port, handler).await?,
        });

        let now = Utc::now();
        let handle = Arc::new(SessionHandle {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            container_id: container_id.clone(),
            container_name: container_name.clone(),
            client,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(self.config.session_timeout).unwrap_or(chrono::Duration::hours(2)),
            command_dir,
            response_dir,
            auth: SyncMutex::new(AuthStateMachine::new()),
            is_prefilling: AtomicBool::new(false),
            prefill_operation_id: SyncMutex::new(None),
            current_history_id: SyncMutex::new(None),
            last_app_id: SyncMutex::new(None),
            total_bytes_transferred: AtomicU64::new(0),
        });

        self.ctx.sessions.write().insert(session_id.clone(), handle.clone());
        self.user_sessions.write().insert(user_id.to_string(), session_id.clone());

        // Step 11: persist + notify.
        self.ctx
            .store
            .upsert_session(&PrefillSession {
                session_id: session_id.clone(),
                created_by_session_id,
                container_id: Some(container_id),
                container_name: Some(container_name),
                status: PrefillSessionStatus::Active,
                steam_username: None,
                is_authenticated: false,
                is_prefilling: false,
                created_at_utc: handle.created_at,
                expires_at_utc: handle.expires_at,
                ended_at_utc: None,
                termination_reason: None,
                terminated_by: None,
            })
            .await?;
        self.ctx.bus.notify_all(NotificationEvent::DaemonSessionCreated { session_id: session_id.clone() });

        Ok(handle)
    }

    async fn translate_to_host_path(&self, local_path: &Path) -> PathBuf {
        if let Some(host_base) = &self.config.host_data_path {
            if let Ok(rel) = local_path.strip_prefix(&self.config.sessions_root) {
                return host_base.join(rel);
            }
        }

        let own_container_id = std::env::var("HOSTNAME").unwrap_or_default();
        if own_container_id.is_empty() {
            return local_path.to_path_buf();
        }

        let mut cache = self.own_mount_cache.lock().await;
        if cache.is_none() {
            let source = self
                .container
                .mount_source(&own_container_id, &self.config.sessions_root.display().to_string())
                .await
                .ok()
                .flatten()
                .map(PathBuf::from);
            if source.is_none() {
                warn!("could not determine host mount point for sessions root, using container-local paths for prefill bind mounts");
            }
            *cache = Some(source);
        }

        match cache.as_ref().and_then(Option::as_ref) {
            Some(host_base) => match local_path.strip_prefix(&self.config.sessions_root) {
                Ok(rel) => host_base.join(rel),
                Err(_) => local_path.to_path_buf(),
            },
            None => local_path.to_path_buf(),
        }
    }

    /// Network strategy (spec §4.M step 4). Detecting the DNS container's
    /// own host-networking mode has no direct `docker inspect` field; we
    /// infer it from the absence of a per-network IP entry, which is how a
    /// host-mode container's `NetworkSettings.Networks` map actually looks.
    async fn compute_network(&self) -> (NetworkMode, Option<String>, HashMap<String, String>) {
        if let Some(over) = &self.config.network_override {
            return match over {
                NetworkOverride::Host => (NetworkMode::Host, None, HashMap::new()),
                NetworkOverride::Named(name) => (NetworkMode::Named(name.clone()), None, HashMap::new()),
            };
        }

        if let Some(ip) = &self.config.lancache_dns_ip {
            return (NetworkMode::Named(self.config.lancache_dns_network.clone()), Some(ip.clone()), ipv6_disable_sysctl());
        }

        match self.container.network_ip(&self.config.lancache_dns_network, &self.config.lancache_dns_container).await {
            Ok(Some(ip)) => (NetworkMode::Named(self.config.lancache_dns_network.clone()), Some(ip), ipv6_disable_sysctl()),
            Ok(None) => {
                info!("lancache-dns has no address on its own network, assuming host networking");
                (NetworkMode::Host, None, HashMap::new())
            }
            Err(e) => {
                warn!(error = %e, "could not resolve lancache-dns container, session container uses default network");
                (NetworkMode::Default, None, HashMap::new())
            }
        }
    }

    /// `StartLogin` (spec §4.M): may short-circuit if already authenticated.
    pub async fn start_login(&self, session_id: &str) -> Result<()> {
        let session = self.get_session(session_id).ok_or_else(|| PrefillError::Protocol("unknown session".into()))?;

        if session.auth_state() == AuthState::Authenticated {
            let resp = session.client.call(Command::GetStatus, serde_json::Value::Null, Duration::from_secs(5)).await?;
            let reauth_needed = resp.data.as_ref().and_then(|d| d.get("reauth_needed")).and_then(|v| v.as_bool()).unwrap_or(false);
            if !reauth_needed {
                return Ok(());
            }
        }

        session.auth.lock().start_login();
        session.client.call(Command::StartLogin, serde_json::Value::Null, Duration::from_secs(10)).await?;

        // Small poll-for-queued-challenge window (spec §4.M: "~10s").
        if tokio::time::timeout(Duration::from_secs(10), wait_for_challenge(&session)).await.is_err() {
            let resp = session.client.call(Command::GetStatus, serde_json::Value::Null, Duration::from_secs(5)).await?;
            let status = resp.data.as_ref().and_then(|d| d.get("status")).and_then(|v| v.as_str()).unwrap_or("");
            if status == "logged-in" {
                session.auth.lock().on_authenticated();
            }
        }
        Ok(())
    }

    /// `ProvideCredential` (spec §4.M). Performs the username-step ban
    /// check, then encrypts and forwards the credential.
    pub async fn provide_credential(
        &self,
        session_id: &str,
        challenge: &Challenge,
        plaintext: &[u8],
        service: &str,
    ) -> Result<()> {
        let session = self.get_session(session_id).ok_or_else(|| PrefillError::Protocol("unknown session".into()))?;

        if challenge.credential_type == CredentialType::Username {
            let username = String::from_utf8_lossy(plaintext).to_ascii_lowercase();
            if self.ctx.bans.find_active(&username).await?.is_some() {
                session.auth.lock().reset();
                return Err(PrefillError::Banned("account banned".into()));
            }
        }

        {
            let mut auth = session.auth.lock();
            auth.consume_challenge(&challenge.challenge_id).map_err(|e| match e {
                AuthRejection::ChallengeMismatch => PrefillError::Protocol("challengeId does not match the pending challenge".into()),
                AuthRejection::ChallengeAlreadyConsumed => PrefillError::Protocol("challengeId was already used".into()),
                AuthRejection::NoChallengePending => PrefillError::Protocol("no credential challenge is pending".into()),
            })?;
        }

        let response = crypto::encrypt_credential(&challenge.challenge_id, &challenge.server_public_key, service, plaintext)?;
        session
            .client
            .call(Command::ProvideCredential, serde_json::to_value(&response).unwrap_or_default(), Duration::from_secs(30))
            .await?;
        Ok(())
    }

    /// Starts a prefill run, registering it with the UOT so the usual
    /// Cancel/ForceKill machinery reaches it (spec §4.M "integrates with
    /// the UOT").
    pub async fn start_prefill(&self, session_id: &str, parameters: serde_json::Value) -> Result<OperationId> {
        let session = self.get_session(session_id).ok_or_else(|| PrefillError::Protocol("unknown session".into()))?;

        let cancel = CancellationToken::new();
        let mut metadata = OperationMetadata::empty();
        metadata.set("entity_key", session_id.to_string());
        let operation_id = self
            .ctx
            .tracker
            .register(OperationType::Prefill, "Prefill", cancel, metadata)
            .map_err(|e| PrefillError::from(PrefillCoreWrap(e)))?;
        *session.prefill_operation_id.lock() = Some(operation_id);
        session.is_prefilling.store(true, Ordering::SeqCst);

        let mut parameters = parameters;
        if let serde_json::Value::Object(ref mut map) = parameters {
            let manifests = self.ctx.store.cached_manifests().await.unwrap_or_default();
            map.insert("cachedManifests".to_string(), serde_json::to_value(&manifests).unwrap_or_default());
        }
        session.client.call(Command::Prefill, parameters, Duration::from_secs(10)).await?;
        Ok(operation_id)
    }

    /// Best-effort cancel of an in-flight prefill run (spec §4.M
    /// termination step "send cancel-prefill if a prefill is running").
    pub async fn cancel_prefill(&self, session_id: &str) -> Result<()> {
        let session = self.get_session(session_id).ok_or_else(|| PrefillError::Protocol("unknown session".into()))?;
        if let Some(op_id) = *session.prefill_operation_id.lock() {
            let _ = self.ctx.tracker.cancel(op_id);
        }
        if session.is_prefilling() {
            let _ = session.client.call(Command::CancelPrefill, serde_json::Value::Null, Duration::from_secs(5)).await;
        }
        Ok(())
    }

    /// Termination (spec §4.M). Always deletes the session's directories,
    /// regardless of how far the graceful shutdown got.
    pub async fn terminate_session(&self, session_id: &str, reason: TerminationReason, force: bool) -> Result<()> {
        let Some(session) = self.ctx.sessions.write().remove(session_id) else { return Ok(()) };
        self.user_sessions.write().retain(|_, sid| sid != session_id);

        if session.is_prefilling() {
            let _ = session.client.call(Command::CancelPrefill, serde_json::Value::Null, Duration::from_secs(5)).await;
        }
        if let Some(history_id) = session.current_history_id.lock().take() {
            let _ = self
                .ctx
                .store
                .finalize_history_entry(history_id, PrefillHistoryStatus::Cancelled, 0, 0, Some("session terminated"), Utc::now())
                .await;
        }

        let now = Utc::now();
        let _ = self
            .ctx
            .store
            .upsert_session(&PrefillSession {
                session_id: session.session_id.clone(),
                created_by_session_id: None,
                container_id: Some(session.container_id.clone()),
                container_name: Some(session.container_name.clone()),
                status: PrefillSessionStatus::Terminated,
                steam_username: None,
                is_authenticated: session.auth_state() == AuthState::Authenticated,
                is_prefilling: false,
                created_at_utc: session.created_at,
                expires_at_utc: session.expires_at,
                ended_at_utc: Some(now),
                termination_reason: Some(reason.as_str().to_string()),
                terminated_by: None,
            })
            .await;

        if !force {
            let _ = tokio::time::timeout(Duration::from_secs(2), session.client.shutdown()).await;
            let _ = self.container.stop(&session.container_id, Duration::from_secs(1)).await;
        } else {
            let _ = self.container.kill(&session.container_id).await;
        }
        let _ = self.container.remove(&session.container_id).await;

        if let Some(op_id) = *session.prefill_operation_id.lock() {
            self.ctx.tracker.complete(op_id, !matches!(reason, TerminationReason::Timeout), None);
            schedule_eviction(self.ctx.tracker.clone(), op_id);
        }
        note_logout_if_last(&self.ctx, session.auth_state() == AuthState::Authenticated).await;

        let _ = tokio::fs::remove_dir_all(&session.command_dir).await;
        let _ = tokio::fs::remove_dir_all(&session.response_dir).await;

        self.ctx.bus.notify_all(NotificationEvent::SessionEnded {
            session_id: session.session_id.clone(),
            reason: reason.as_str().to_string(),
        });
        Ok(())
    }

    /// Terminates every live session on process shutdown (spec §4.M
    /// "Termination: either user-requested, timeout ..., or on shutdown").
    pub async fn shutdown_all(&self) {
        let ids: Vec<String> = self.ctx.sessions.read().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.terminate_session(&id, TerminationReason::Shutdown, false).await {
                warn!(session_id = %id, error = %e, "failed to terminate session on shutdown");
            }
        }
    }

    /// Orphan reconciliation on startup (spec §4.M): containers from a
    /// previous process instance that never got torn down.
    pub async fn reconcile_orphans(&self) -> Result<()> {
        let orphans = self.ctx.store.sessions_with_container_prefix(&self.config.container_name_prefix).await?;
        for orphan in orphans {
            let mut row = orphan;
            row.status = PrefillSessionStatus::Orphaned;
            let _ = self.ctx.store.upsert_session(&row).await;

            if let Some(container_id) = &row.container_id {
                match self.container.stop(container_id, Duration::from_secs(1)).await {
                    Ok(()) | Err(_) => {}
                }
                let _ = self.container.remove(container_id).await;
            }

            row.status = PrefillSessionStatus::Cleaned;
            row.ended_at_utc = Some(Utc::now());
            let _ = self.ctx.store.upsert_session(&row).await;
        }

        // Also sweep any container still running under our naming prefix
        // that has no matching DB row at all (e.g. crash before the row was
        // ever written).
        if let Ok(ids) = self.container.list_by_prefix(&self.config.container_name_prefix).await {
            for id in ids {
                let _ = self.container.stop(&id, Duration::from_secs(1)).await;
                let _ = self.container.remove(&id).await;
            }
        }
        Ok(())
    }
}

fn ipv6_disable_sysctl() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("net.ipv6.conf.all.disable_ipv6".to_string(), "1".to_string());
    m
}

fn pick_ephemeral_port() -> Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(|e| PrefillError::Transport(format!("allocating TCP port: {e}")))?;
    Ok(listener.local_addr().map_err(|e| PrefillError::Transport(e.to_string()))?.port())
}

async fn wait_for_challenge(session: &SessionHandle) {
    loop {
        if session.auth_state() != AuthState::LoggingIn {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn note_logout_if_last<C: Clock>(ctx: &SharedContext<C>, was_authenticated: bool) {
    if !was_authenticated {
        return;
    }
    let remaining = ctx.sessions.read().values().filter(|s| s.auth_state() == AuthState::Authenticated).count();
    if remaining == 0 {
        ctx.authenticated_count.store(0, Ordering::SeqCst);
        ctx.hooks.on_all_sessions_logged_out().await;
    }
}

/// Bridges `EngineError`'s `CoreError` conversion machinery so `register`'s
/// error type can flow into [`PrefillError`] without this crate depending
/// on `lancache-engine`'s error enum directly.
struct PrefillCoreWrap(CoreError);

impl From<PrefillCoreWrap> for PrefillError {
    fn from(e: PrefillCoreWrap) -> Self {
        PrefillError::Core(e.0)
    }
}

/// Dispatches daemon-pushed events into auth transitions, prefill history
/// accounting, and the notification bus (spec §4.M).
struct SessionEventHandler<C: Clock> {
    ctx: Arc<SharedContext<C>>,
    session_id: String,
}

impl<C: Clock + Send + Sync + 'static> SessionEventHandler<C> {
    fn session(&self) -> Option<Arc<SessionHandle>> {
        self.ctx.sessions.read().get(&self.session_id).cloned()
    }
}

#[async_trait]
impl<C: Clock + Send + Sync + 'static> DaemonEventHandler for SessionEventHandler<C> {
    async fn on_challenge(&self, challenge: Challenge) {
        let Some(session) = self.session() else { return };
        session.auth.lock().on_challenge(challenge.challenge_id.clone(), challenge.credential_type);
        let credential_type = serde_json::to_value(challenge.credential_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.ctx.bus.notify_all(NotificationEvent::CredentialChallenge {
            session_id: self.session_id.clone(),
            challenge_id: challenge.challenge_id,
            credential_type,
        });
    }

    async fn on_status(&self, status: String) {
        let Some(session) = self.session() else { return };
        if status == "logged-in" {
            session.auth.lock().on_authenticated();
            let first = self.ctx.authenticated_count.fetch_add(1, Ordering::SeqCst) == 0;
            if first {
                self.ctx.hooks.on_session_authenticated().await;
            }
        }
        self.ctx
            .bus
            .notify_all(NotificationEvent::AuthStateChanged { session_id: self.session_id.clone(), state: session.auth_state().as_str().to_string() });
        self.ctx.bus.notify_all(NotificationEvent::StatusChanged { session_id: self.session_id.clone(), status });
    }

    async fn on_progress(&self, progress: PrefillProgressUpdate) {
        let Some(session) = self.session() else { return };
        handle_progress(&self.ctx, &session, progress).await;
    }

    async fn on_error(&self, message: String) {
        warn!(session_id = %self.session_id, error = %message, "prefill daemon reported an error");
        self.ctx.bus.notify_all(NotificationEvent::StatusChanged { session_id: self.session_id.clone(), status: format!("error: {message}") });
    }

    async fn on_disconnect(&self, reason: Option<String>) {
        warn!(session_id = %self.session_id, reason = ?reason, "prefill daemon transport disconnected");
    }
}

const TERMINAL_STATES: &[&str] = &["completed", "failed", "error", "cancelled"];

async fn handle_progress<C: Clock + Send + Sync + 'static>(ctx: &SharedContext<C>, session: &SessionHandle, update: PrefillProgressUpdate) {
    let now = Utc::now();

    if let Some(app_id) = update.current_app_id {
        if app_id != 0 {
            let mut last = session.last_app_id.lock();
            if *last != Some(app_id) {
                if let Some(prev_id) = session.current_history_id.lock().take() {
                    let status = if update.bytes_downloaded == 0 { PrefillHistoryStatus::Cached } else { PrefillHistoryStatus::Completed };
                    let _ = ctx.store.finalize_history_entry(prev_id, status, update.bytes_downloaded as i64, update.total_bytes as i64, None, now).await;
                }
                match ctx.store.start_history_entry(&session.session_id, app_id, update.current_app_name.as_deref(), now).await {
                    Ok(id) => *session.current_history_id.lock() = Some(id),
                    Err(e) => warn!(session_id = %session.session_id, error = %e, "failed to start prefill history entry"),
                }
                *last = Some(app_id);
            }
        }
    }

    if update.state == "app_completed" {
        if let Some(history_id) = session.current_history_id.lock().take() {
            let status = match update.result.as_deref() {
                Some("AlreadyUpToDate") | Some("Skipped") | Some("NoDepotsToDownload") => PrefillHistoryStatus::Cached,
                Some("Failed") => PrefillHistoryStatus::Failed,
                _ => PrefillHistoryStatus::Completed,
            };
            let error_message = matches!(status, PrefillHistoryStatus::Failed).then(|| update.result.clone().unwrap_or_default());
            let _ = ctx
                .store
                .finalize_history_entry(history_id, status, update.bytes_downloaded as i64, update.total_bytes as i64, error_message.as_deref(), now)
                .await;
        }
        for depot in &update.depots {
            let _ = ctx
                .store
                .record_cached_depot(&PrefillCachedDepot {
                    session_id: session.session_id.clone(),
                    depot_id: depot.depot_id,
                    manifest_id: depot.manifest_id.clone(),
                    total_bytes: depot.total_bytes as i64,
                    recorded_at_utc: now,
                })
                .await;
        }
        if let Some(app_id) = update.current_app_id {
            self_notify_history(ctx, session, app_id as u32);
        }
    }

    let finalized = ctx.store.finalized_bytes_total(&session.session_id).await.unwrap_or(0);
    session.total_bytes_transferred.store(finalized as u64 + update.bytes_downloaded, Ordering::SeqCst);

    if TERMINAL_STATES.contains(&update.state.as_str()) {
        if let Some(history_id) = session.current_history_id.lock().take() {
            let status = if update.state == "cancelled" { PrefillHistoryStatus::Cancelled } else if update.state == "completed" { PrefillHistoryStatus::Completed } else { PrefillHistoryStatus::Failed };
            let _ = ctx.store.finalize_history_entry(history_id, status, update.bytes_downloaded as i64, update.total_bytes as i64, None, now).await;
        }
        session.is_prefilling.store(false, Ordering::SeqCst);
        if let Some(op_id) = session.prefill_operation_id.lock().take() {
            ctx.tracker.complete(op_id, update.state == "completed", (update.state != "completed").then(|| update.state.clone()));
            schedule_eviction(ctx.tracker.clone(), op_id);
        }
        ctx.bus.notify_all(NotificationEvent::PrefillStateChanged { session_id: session.session_id.clone(), state: update.state.clone() });
    } else {
        ctx.bus.notify_all(NotificationEvent::PrefillStateChanged { session_id: session.session_id.clone(), state: update.state.clone() });
    }

    ctx.bus.notify_all(NotificationEvent::PrefillProgress {
        session_id: session.session_id.clone(),
        payload: NotificationPayload::from_value(json!({
            "state": update.state,
            "currentAppId": update.current_app_id,
            "currentAppName": update.current_app_name,
            "totalBytes": update.total_bytes,
            "bytesDownloaded": update.bytes_downloaded,
            "bytesPerSecond": update.bytes_per_second,
            "totalBytesTransferred": session.total_bytes_transferred(),
        })),
    });
}

fn self_notify_history<C: Clock>(ctx: &SharedContext<C>, session: &SessionHandle, app_id: u32) {
    ctx.bus.notify_all(NotificationEvent::PrefillHistoryUpdated { session_id: session.session_id.clone(), app_id });
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
