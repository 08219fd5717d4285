// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use x25519_dalek::StaticSecret;

fn server_keypair() -> (StaticSecret, PublicKey) {
    let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret);
    (secret, public)
}

#[test]
fn encrypt_credential_round_trips_through_server_side_decrypt() {
    let (server_secret, server_public) = server_keypair();
    let server_public_hex = hex::encode(server_public.as_bytes());

    let resp = encrypt_credential("chal-1", &server_public_hex, "steam", b"hunter2").unwrap();

    // Emulate what the in-container daemon does on receipt: derive the same
    // shared secret from its static secret and the client's ephemeral public key.
    let client_public_bytes: [u8; 32] = hex::decode(&resp.client_public_key).unwrap().try_into().unwrap();
    let client_public = PublicKey::from(client_public_bytes);
    let shared = server_secret.diffie_hellman(&client_public);
    let okm = derive_key(shared.as_bytes(), b"chal-1", &hkdf_info("steam")).unwrap();

    let ciphertext = hex::decode(&resp.encrypted_credential).unwrap();
    let tag = hex::decode(&resp.tag).unwrap();
    let nonce_bytes = hex::decode(&resp.nonce).unwrap();
    let mut combined = ciphertext.clone();
    combined.extend_from_slice(&tag);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&okm));
    let plaintext = cipher.decrypt(Nonce::from_slice(&nonce_bytes), combined.as_ref()).unwrap();
    assert_eq!(plaintext, b"hunter2");
}

#[test]
fn different_services_derive_different_keys_from_the_same_shared_secret() {
    let shared = [7u8; 32];
    let a = derive_key(&shared, b"salt", &hkdf_info("steam")).unwrap();
    let b = derive_key(&shared, b"salt", &hkdf_info("epic")).unwrap();
    assert_ne!(a, b, "HKDF info must be service-specific to prevent cross-service replay");
}

#[test]
fn rejects_malformed_server_public_key() {
    let err = encrypt_credential("chal-1", "not-hex", "steam", b"x").unwrap_err();
    assert!(matches!(err, PrefillError::Crypto(_)));
}

#[test]
fn generate_socket_secret_is_32_bytes_hex_encoded() {
    let secret = generate_socket_secret();
    assert_eq!(secret.len(), 64);
    assert!(hex::decode(&secret).is_ok());
}

#[test]
fn two_generated_socket_secrets_differ() {
    assert_ne!(generate_socket_secret(), generate_socket_secret());
}
