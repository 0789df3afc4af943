//! Proof key for code exchange (RFC 7636).
//!
//! A [`PkceChallenge`] bundles the secret verifier, the `S256` challenge
//! derived from it and an independent anti-forgery state nonce. The verifier
//! and nonce stay on this side of the redirect; only the challenge and the
//! nonce travel in the authorize URL.

use base64::prelude::*;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use veil::Redact;

#[derive(Clone, PartialEq, Eq, Redact)]
pub struct PkceChallenge {
    #[redact]
    verifier: String,
    challenge: String,
    #[redact]
    state: String,
}

impl PkceChallenge {
    /// Length of the verifier, within the 43..=128 range RFC 7636 allows.
    pub const VERIFIER_LENGTH: usize = 96;

    /// Length of the state nonce.
    pub const STATE_LENGTH: usize = 24;

    /// Challenge method announced to the authorize endpoint.
    pub const METHOD: &'static str = "S256";

    /// Generates a fresh verifier, its challenge and a state nonce.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_string(Self::VERIFIER_LENGTH);
        let challenge = Self::challenge_for(&verifier);
        let state = random_string(Self::STATE_LENGTH);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    /// Derives the `S256` challenge: unpadded base64url of the SHA-256
    /// digest of the verifier.
    #[must_use]
    pub fn challenge_for(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        BASE64_URL_SAFE_NO_PAD.encode(digest)
    }

    #[must_use]
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    #[must_use]
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }
}

/// Random string over `[A-Za-z0-9]` from the thread-local CSPRNG.
fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
