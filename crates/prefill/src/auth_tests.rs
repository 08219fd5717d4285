// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fresh_machine_starts_not_authenticated() {
    let m = AuthStateMachine::new();
    assert_eq!(*m.state(), AuthState::NotAuthenticated);
    assert!(m.pending_challenge_id().is_none());
}

#[test]
fn start_login_then_challenge_walks_the_required_states() {
    let mut m = AuthStateMachine::new();
    m.start_login();
    assert_eq!(*m.state(), AuthState::LoggingIn);

    m.on_challenge("c1", CredentialType::Username);
    assert_eq!(*m.state(), AuthState::UsernameRequired);
    assert_eq!(m.pending_challenge_id(), Some("c1"));

    m.on_challenge("c2", CredentialType::Password);
    assert_eq!(*m.state(), AuthState::PasswordRequired);

    m.on_challenge("c3", CredentialType::TwoFactor);
    assert_eq!(*m.state(), AuthState::TwoFactorRequired);

    m.on_challenge("c4", CredentialType::Steamguard);
    assert_eq!(*m.state(), AuthState::SteamGuardRequired);

    m.on_challenge("c5", CredentialType::DeviceConfirmation);
    assert_eq!(*m.state(), AuthState::DeviceConfirmationRequired);

    m.on_authenticated();
    assert_eq!(*m.state(), AuthState::Authenticated);
    assert!(m.is_authenticated());
    assert!(m.pending_challenge_id().is_none());
}

#[test]
fn reset_clears_state_and_pending_challenge() {
    let mut m = AuthStateMachine::new();
    m.start_login();
    m.on_challenge("c1", CredentialType::Username);
    m.reset();
    assert_eq!(*m.state(), AuthState::NotAuthenticated);
    assert!(m.pending_challenge_id().is_none());
}

#[test]
fn consume_challenge_rejects_mismatched_id() {
    let mut m = AuthStateMachine::new();
    m.on_challenge("c1", CredentialType::Username);
    assert_eq!(m.consume_challenge("wrong"), Err(AuthRejection::ChallengeMismatch));
}

#[test]
fn consume_challenge_rejects_when_none_pending() {
    let mut m = AuthStateMachine::new();
    assert_eq!(m.consume_challenge("c1"), Err(AuthRejection::NoChallengePending));
}

#[test]
fn consume_challenge_succeeds_at_most_once() {
    let mut m = AuthStateMachine::new();
    m.on_challenge("c1", CredentialType::Username);
    assert!(m.consume_challenge("c1").is_ok());

    // Same id posted again (e.g. a duplicate submission) without a new
    // challenge being issued must be rejected, not silently re-accepted.
    assert_eq!(m.consume_challenge("c1"), Err(AuthRejection::NoChallengePending));
}

#[test]
fn consume_challenge_rejects_reissued_same_id_after_consumption() {
    let mut m = AuthStateMachine::new();
    m.on_challenge("c1", CredentialType::Username);
    assert!(m.consume_challenge("c1").is_ok());

    // If the daemon somehow reissues the same challenge id, the consumed set
    // still refuses it even though it's pending again.
    m.on_challenge("c1", CredentialType::Password);
    assert_eq!(m.consume_challenge("c1"), Err(AuthRejection::ChallengeAlreadyConsumed));
}
