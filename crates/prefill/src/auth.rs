// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session authentication state machine (spec §4.M, §9: "model
//! explicitly as a tagged sum and transition table rather than conditionals
//! sprinkled across message handlers").
//!
//! `NotAuthenticated -> LoggingIn -> {UsernameRequired | PasswordRequired |
//! TwoFactorRequired | SteamGuardRequired | DeviceConfirmationRequired} ->
//! Authenticated`, driven entirely by [`Challenge`]/status events from the
//! daemon. The ban check on the username step and the `StartLogin`
//! short-circuit both live in `session.rs`, since both need collaborators
//! (the ban store, the daemon client) this pure state machine doesn't have;
//! this module only owns the legal transitions and challenge bookkeeping.

use lancache_protocol::CredentialType;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    NotAuthenticated,
    LoggingIn,
    UsernameRequired,
    PasswordRequired,
    TwoFactorRequired,
    SteamGuardRequired,
    DeviceConfirmationRequired,
    Authenticated,
}

impl AuthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not_authenticated",
            Self::LoggingIn => "logging_in",
            Self::UsernameRequired => "username_required",
            Self::PasswordRequired => "password_required",
            Self::TwoFactorRequired => "two_factor_required",
            Self::SteamGuardRequired => "steam_guard_required",
            Self::DeviceConfirmationRequired => "device_confirmation_required",
            Self::Authenticated => "authenticated",
        }
    }
}

fn required_state_for(credential_type: CredentialType) -> AuthState {
    match credential_type {
        CredentialType::Username => AuthState::UsernameRequired,
        CredentialType::Password => AuthState::PasswordRequired,
        CredentialType::TwoFactor => AuthState::TwoFactorRequired,
        CredentialType::Steamguard => AuthState::SteamGuardRequired,
        CredentialType::DeviceConfirmation => AuthState::DeviceConfirmationRequired,
    }
}

/// Rejection reasons a caller turns into a [`crate::error::PrefillError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    /// The submitted `challengeId` doesn't match the one currently pending.
    ChallengeMismatch,
    /// This `challengeId` was already consumed by an earlier, successful
    /// `ProvideCredential` (spec §8: "succeeds at most once for a given C").
    ChallengeAlreadyConsumed,
    /// No challenge is outstanding to answer.
    NoChallengePending,
}

/// Per-session authentication state plus the bookkeeping needed to enforce
/// "a challenge id is consumed at most once" (spec §8) across resets.
pub struct AuthStateMachine {
    state: AuthState,
    pending_challenge_id: Option<String>,
    consumed_challenge_ids: HashSet<String>,
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateMachine {
    pub fn new() -> Self {
        Self { state: AuthState::NotAuthenticated, pending_challenge_id: None, consumed_challenge_ids: HashSet::new() }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn pending_challenge_id(&self) -> Option<&str> {
        self.pending_challenge_id.as_deref()
    }

    /// `StartLogin` transitions to `LoggingIn`, clearing any stale pending
    /// challenge (spec §4.M step "Username step... clear any pending
    /// challenge" reuses this same clearing logic on ban rejection).
    pub fn start_login(&mut self) {
        self.state = AuthState::LoggingIn;
        self.pending_challenge_id = None;
    }

    /// A `credential-challenge` event arrived from the daemon: transition
    /// into the matching `*Required` state and record its id as pending.
    pub fn on_challenge(&mut self, challenge_id: impl Into<String>, credential_type: CredentialType) {
        self.state = required_state_for(credential_type);
        self.pending_challenge_id = Some(challenge_id.into());
    }

    /// The daemon reported the session is fully logged in.
    pub fn on_authenticated(&mut self) {
        self.state = AuthState::Authenticated;
        self.pending_challenge_id = None;
    }

    /// Resets to `NotAuthenticated`, clearing any pending challenge — used
    /// both by explicit logout and by the ban-rejection path (spec §4.M
    /// scenario 4).
    pub fn reset(&mut self) {
        self.state = AuthState::NotAuthenticated;
        self.pending_challenge_id = None;
    }

    /// Validates that `challenge_id` is the one currently pending and has
    /// never been consumed, then marks it consumed. Callers must call this
    /// before forwarding a `ProvideCredential` to the daemon (spec §8).
    pub fn consume_challenge(&mut self, challenge_id: &str) -> Result<(), AuthRejection> {
        let Some(pending) = &self.pending_challenge_id else { return Err(AuthRejection::NoChallengePending) };
        if pending != challenge_id {
            return Err(AuthRejection::ChallengeMismatch);
        }
        if self.consumed_challenge_ids.contains(challenge_id) {
            return Err(AuthRejection::ChallengeAlreadyConsumed);
        }
        self.consumed_challenge_ids.insert(challenge_id.to_string());
        self.pending_challenge_id = None;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
