// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable E2EE for login verification.
//!
//! The login state machine only needs three things: a fresh secret whose
//! public half rides on the QR URL, a PIN-keyed encryption of that public
//! half, and decryption of the server's verifier blob under the agreed
//! secret. How those are computed is a provider detail; the default uses
//! X25519 + SHA-256 + AES-256-ECB.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::Engine;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{Error, Result};

/// The private half of a login secret, held for the flow's lifetime.
pub struct QrSecret {
    secret: StaticSecret,
}

impl QrSecret {
    pub fn public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }
}

/// Provider seam; alternative implementations can be plugged in without
/// touching the login state machines.
pub trait E2eeProvider: Send + Sync {
    /// Mint a secret and the `?secret=…&e2eeVersion=1` URL suffix carrying
    /// its public half.
    fn create_qr_secret(&self) -> (QrSecret, String);

    /// Encrypt the secret's public half under a PIN-derived key (email
    /// login sends this as the request's `secret` field).
    fn encrypt_public_key_with_pin(&self, pin: &str, secret: &QrSecret) -> Result<Vec<u8>>;

    /// Decrypt a server blob under the X25519 shared secret with the
    /// server's ephemeral public key, yielding the cleartext verifier.
    fn decrypt_verifier_blob(
        &self,
        secret: &QrSecret,
        server_public_key: &[u8],
        blob: &[u8],
    ) -> Result<Vec<u8>>;
}

/// Default provider.
#[derive(Default)]
pub struct DefaultE2ee;

impl DefaultE2ee {
    pub fn new() -> Self {
        Self
    }
}

impl E2eeProvider for DefaultE2ee {
    fn create_qr_secret(&self) -> (QrSecret, String) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let qr = QrSecret { secret };
        let public_b64 = base64::engine::general_purpose::STANDARD.encode(qr.public_key());
        let suffix = format!("?secret={}&e2eeVersion=1", urlencoding::encode(&public_b64));
        (qr, suffix)
    }

    fn encrypt_public_key_with_pin(&self, pin: &str, secret: &QrSecret) -> Result<Vec<u8>> {
        let key = Sha256::digest(pin.as_bytes());
        aes_ecb_encrypt(&key, &secret.public_key())
    }

    fn decrypt_verifier_blob(
        &self,
        secret: &QrSecret,
        server_public_key: &[u8],
        blob: &[u8],
    ) -> Result<Vec<u8>> {
        let server_key: [u8; 32] = server_public_key
            .try_into()
            .map_err(|_| Error::Auth("e2ee: server public key is not 32 bytes".to_owned()))?;
        let shared = secret.secret.diffie_hellman(&PublicKey::from(server_key));
        let key = Sha256::digest(shared.as_bytes());
        aes_ecb_decrypt(&key, blob)
    }
}

fn aes_ecb_encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256::new_from_slice(key)
        .map_err(|_| Error::Auth("e2ee: bad aes key length".to_owned()))?;
    let padded = pkcs7_pad(data);
    let mut out = Vec::with_capacity(padded.len());
    for chunk in padded.chunks(16) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        out.extend_from_slice(&block);
    }
    Ok(out)
}

fn aes_ecb_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 16 != 0 {
        return Err(Error::Auth("e2ee: ciphertext is not block-aligned".to_owned()));
    }
    let cipher = Aes256::new_from_slice(key)
        .map_err(|_| Error::Auth("e2ee: bad aes key length".to_owned()))?;
    let mut out = Vec::with_capacity(data.len());
    for chunk in data.chunks(16) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        out.extend_from_slice(&block);
    }
    pkcs7_unpad(out)
}

fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = 16 - (data.len() % 16);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad as u8).take(pad));
    out
}

fn pkcs7_unpad(mut data: Vec<u8>) -> Result<Vec<u8>> {
    let Some(&pad) = data.last() else {
        return Err(Error::Auth("e2ee: empty plaintext".to_owned()));
    };
    let pad = pad as usize;
    if pad == 0 || pad > 16 || pad > data.len() {
        return Err(Error::Auth("e2ee: bad padding".to_owned()));
    }
    if !data[data.len() - pad..].iter().all(|&b| b as usize == pad) {
        return Err(Error::Auth("e2ee: bad padding".to_owned()));
    }
    data.truncate(data.len() - pad);
    Ok(data)
}

#[cfg(test)]
#[path = "e2ee_tests.rs"]
mod tests;
