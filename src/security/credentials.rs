//! Credential Verification
//!
//! Gatekeeping for who may view claims data. Sessions only see the
//! `CredentialVerifier` trait, so the backing store can be swapped or faked
//! in tests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait CredentialVerifier {
    /// True when `secret` is the valid credential for `username`.
    fn verify(&self, username: &str, secret: &str) -> bool;
}

/// A user entry as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub username: String,
    pub password: String,
}

/// Credentials loaded from configuration at startup, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(entries: &[CredentialEntry]) -> Self {
        Self {
            users: entries
                .iter()
                .map(|e| (e.username.clone(), e.password.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }
}

/// Compare without returning at the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, secret: &str) -> bool {
        match self.users.get(username) {
            Some(expected) => constant_time_eq(expected.as_bytes(), secret.as_bytes()),
            None => false,
        }
    }
}
