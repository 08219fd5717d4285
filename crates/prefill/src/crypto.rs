// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential encryption for the prefill daemon's challenge/response
//! exchange (spec §4.M, `SPEC_FULL.md`'s "concrete credential-encryption
//! module" supplement): ECDH (X25519) + HKDF-SHA256 + AES-256-GCM.
//!
//! The daemon's [`Challenge`] carries a fresh server public key; the
//! manager generates a fresh client key pair per challenge, derives a
//! shared secret, expands it with HKDF (salt = challenge id, info = a
//! service-specific tag so one storefront's derivation can never be replayed
//! against another), and seals the credential under AES-GCM with a random
//! 12-byte nonce. The ephemeral private key is dropped the moment the shared
//! secret is derived and never leaves this module; the decrypted credential
//! itself is never logged.

use crate::error::{PrefillError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hkdf::Hkdf;
use lancache_protocol::ChallengeResponse;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const OKM_LEN: usize = 32;

/// Derives the HKDF `info` tag for a storefront so one service's derived key
/// can never be reused against another (spec §9 "HKDF info strings are
/// service-specific to prevent cross-service replay").
pub fn hkdf_info(service: &str) -> Vec<u8> {
    format!("lancache-prefill/{service}/credential-v1").into_bytes()
}

/// Seals `plaintext` (the credential, or a JSON `{username, refreshToken}`
/// blob for auto-login) against the server's ECDH public key, returning the
/// wire-ready [`ChallengeResponse`] (spec §4.M).
pub fn encrypt_credential(
    challenge_id: &str,
    server_public_key_hex: &str,
    service: &str,
    plaintext: &[u8],
) -> Result<ChallengeResponse> {
    let server_public = decode_public_key(server_public_key_hex)?;

    let client_secret = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
    let client_public = PublicKey::from(&client_secret);
    let shared = client_secret.diffie_hellman(&server_public);

    let okm = derive_key(shared.as_bytes(), challenge_id.as_bytes(), &hkdf_info(service))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&okm));
    let sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| PrefillError::Crypto("AES-GCM encryption failed".into()))?;
    if sealed.len() < TAG_LEN {
        return Err(PrefillError::Crypto("sealed credential shorter than one auth tag".into()));
    }
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(ChallengeResponse {
        challenge_id: challenge_id.to_string(),
        client_public_key: hex::encode(client_public.as_bytes()),
        encrypted_credential: hex::encode(ciphertext),
        nonce: hex::encode(nonce_bytes),
        tag: hex::encode(tag),
    })
}

fn derive_key(shared_secret: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; OKM_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = [0u8; OKM_LEN];
    hk.expand(info, &mut okm).map_err(|_| PrefillError::Crypto("HKDF expand failed".into()))?;
    Ok(okm)
}

fn decode_public_key(hex_str: &str) -> Result<PublicKey> {
    let bytes = hex::decode(hex_str).map_err(|e| PrefillError::Crypto(format!("bad server public key: {e}")))?;
    let arr: [u8; 32] =
        bytes.try_into().map_err(|_| PrefillError::Crypto("server public key must be 32 bytes".into()))?;
    Ok(PublicKey::from(arr))
}

/// Generates a fresh 32-byte socket secret, hex-encoded, used as the
/// HMAC/auth token for the local daemon transport (spec §4.M step 6).
pub fn generate_socket_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
