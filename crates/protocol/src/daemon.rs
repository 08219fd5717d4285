// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prefill daemon wire protocol (spec §6): newline-delimited JSON frames
//! exchanged between `lancache-prefill`'s session manager and the in-container
//! daemon, over a Unix domain socket or loopback TCP (framing decided by
//! `SPEC_FULL.md`'s "concrete daemon wire transport" supplement).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands the manager may send to the daemon (spec §6, exhaustive list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetStatus,
    StartLogin,
    ProvideCredential,
    GetAutoLoginChallenge,
    ProvideAutoLogin,
    CancelLogin,
    CancelPrefill,
    SetSelectedApps,
    Prefill,
    CheckCacheStatus,
    GetOwnedGames,
    GetCacheInfo,
    ClearCache,
    GetSelectedAppsStatus,
    Shutdown,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetStatus => "get-status",
            Self::StartLogin => "start-login",
            Self::ProvideCredential => "provide-credential",
            Self::GetAutoLoginChallenge => "get-auto-login-challenge",
            Self::ProvideAutoLogin => "provide-auto-login",
            Self::CancelLogin => "cancel-login",
            Self::CancelPrefill => "cancel-prefill",
            Self::SetSelectedApps => "set-selected-apps",
            Self::Prefill => "prefill",
            Self::CheckCacheStatus => "check-cache-status",
            Self::GetOwnedGames => "get-owned-games",
            Self::GetCacheInfo => "get-cache-info",
            Self::ClearCache => "clear-cache",
            Self::GetSelectedAppsStatus => "get-selected-apps-status",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A request frame sent to the daemon (spec §6: `{command, parameters,
/// timeout}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub command: String,
    #[serde(default)]
    pub parameters: Value,
    /// Timeout in milliseconds, if the caller wants one enforced daemon-side
    /// in addition to the client-side timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl DaemonRequest {
    pub fn new(command: Command, parameters: Value) -> Self {
        Self { command: command.as_str().to_string(), parameters, timeout: None }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}

/// A response frame from the daemon (spec §6: `{success, message?, error?,
/// data?}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// The credential type a challenge is asking for (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialType {
    Username,
    Password,
    #[serde(rename = "2fa")]
    TwoFactor,
    Steamguard,
    DeviceConfirmation,
}

/// Server-initiated credential challenge (spec §6): `{challengeId,
/// serverPublicKey, credentialType}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub server_public_key: String,
    pub credential_type: CredentialType,
}

/// The manager's reply to a [`Challenge`] (spec §4.M): the client's ECDH
/// public key plus the AES-GCM-sealed credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge_id: String,
    pub client_public_key: String,
    pub encrypted_credential: String,
    pub nonce: String,
    pub tag: String,
}

/// One depot/manifest pair inside a progress-update event (spec §4.M).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepotProgress {
    pub depot_id: i64,
    pub manifest_id: String,
    pub total_bytes: u64,
}

/// The payload of a `progress-update` event (spec §4.M).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefillProgressUpdate {
    pub state: String,
    pub current_app_id: Option<i64>,
    pub current_app_name: Option<String>,
    pub total_bytes: u64,
    pub bytes_downloaded: u64,
    pub bytes_per_second: u64,
    #[serde(default)]
    pub depots: Vec<DepotProgress>,
    pub result: Option<String>,
}

/// Server-initiated events (spec §6): credential-challenge, status-update,
/// progress-update, error, disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum DaemonEvent {
    CredentialChallenge(Challenge),
    StatusUpdate { status: String },
    ProgressUpdate(PrefillProgressUpdate),
    Error { message: String },
    Disconnect { reason: Option<String> },
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
