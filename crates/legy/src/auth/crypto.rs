// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The RSA credential envelope used by the email login RPCs.

use rsa::{BigUint, Pkcs1v15Encrypt, RsaPublicKey};

use crate::error::{Error, Result};

/// Build the login plaintext: each of session key, email and password
/// prefixed with its single-byte length.
pub fn credential_envelope(session_key: &str, email: &str, password: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(session_key.len() + email.len() + password.len() + 3);
    for part in [session_key, email, password] {
        let bytes = part.as_bytes();
        let len = u8::try_from(bytes.len())
            .map_err(|_| Error::Config("credential field longer than 255 bytes".to_owned()))?;
        out.push(len);
        out.extend_from_slice(bytes);
    }
    Ok(out)
}

/// PKCS#1 v1.5 encrypt under the server's hex-encoded modulus/exponent;
/// the wire wants the ciphertext back as lowercase hex.
pub fn rsa_encrypt_hex(nvalue_hex: &str, evalue_hex: &str, message: &[u8]) -> Result<String> {
    let n = BigUint::parse_bytes(nvalue_hex.as_bytes(), 16)
        .ok_or_else(|| Error::Auth("rsa key: bad modulus".to_owned()))?;
    let e = BigUint::parse_bytes(evalue_hex.as_bytes(), 16)
        .ok_or_else(|| Error::Auth("rsa key: bad exponent".to_owned()))?;
    let key = RsaPublicKey::new(n, e).map_err(|e| Error::Auth(format!("rsa key: {e}")))?;

    let mut rng = rand::thread_rng();
    let ciphertext = key
        .encrypt(&mut rng, Pkcs1v15Encrypt, message)
        .map_err(|e| Error::Auth(format!("rsa encrypt: {e}")))?;
    Ok(hex(&ciphertext))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
