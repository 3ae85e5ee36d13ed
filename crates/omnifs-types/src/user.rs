//! User records and roles.
//!
//! A `UserRecord` is one slot of a volume's fixed-capacity user table. The
//! username is the identity; the credential is a salted SHA-256 digest of
//! the password, never the password itself.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Longest username a user slot can hold, in bytes.
pub const MAX_USERNAME_LEN: usize = 32;

/// What a user may do beyond their own files.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    /// May read, edit and delete any file.
    Admin,
    /// Restricted to files it owns.
    Standard,
}

/// Why a username was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserError {
    #[error("username is empty")]
    Empty,
    #[error("username longer than {MAX_USERNAME_LEN} bytes: {0}")]
    TooLong(String),
    #[error("username contains invalid character {1:?}: {0}")]
    InvalidChar(String, char),
}

/// Check that `username` fits a user slot and is safe to print.
///
/// Allowed: ASCII letters, digits, `_`, `.` and `-`.
pub fn validate_username(username: &str) -> Result<(), UserError> {
    if username.is_empty() {
        return Err(UserError::Empty);
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(UserError::TooLong(username.to_string()));
    }
    if let Some(c) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(UserError::InvalidChar(username.to_string(), c));
    }
    Ok(())
}

/// One entry of the user table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique key.
    pub username: String,
    /// Hex SHA-256 of `username:password`.
    pub credential: String,
    pub role: Role,
    /// Unix seconds.
    pub created_at: u64,
    /// Inactive records are tombstones: the slot is free for reuse.
    pub active: bool,
}

impl UserRecord {
    /// Create an active record, hashing `password` into the credential.
    pub fn new(username: impl Into<String>, password: &str, role: Role) -> Self {
        let username = username.into();
        let credential = Self::digest(&username, password);
        Self {
            username,
            credential,
            role,
            created_at: unix_now(),
            active: true,
        }
    }

    fn digest(username: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether `password` matches the stored credential.
    pub fn verify_password(&self, password: &str) -> bool {
        Self::digest(&self.username, password) == self.credential
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The access rule for file reads, edits and deletes: the owner, or any
    /// administrator.
    pub fn may_access(&self, owner: &str) -> bool {
        self.username == owner || self.is_admin()
    }

    /// Turn this record into a tombstone.
    pub fn deactivate(&mut self) {
        self.active = false;
    }
}

/// Current time as unix seconds; zero if the clock is before the epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
