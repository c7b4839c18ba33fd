use crate::gate::{CredentialVerifier, VerificationEffect};
use anyhow::{anyhow, bail, Context};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};

const MIN_PASSWORD_LEN: usize = 8;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// PHC string carrying algorithm, parameters, salt and digest.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

fn password_matches(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| anyhow!("stored hash unreadable: {e}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("failed to verify password: {e}")),
    }
}

/// Operator accounts stored in the workspace database.
///
/// Checking a password reads one row and never touches the caller's session.
pub struct OperatorDirectory<'a> {
    conn: &'a Connection,
}

impl<'a> OperatorDirectory<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn count_operators(&self) -> anyhow::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM operators", [], |r| r.get(0))
            .context("failed to count operators")
    }

    pub fn create_operator(&self, email: &str, password: &str) -> anyhow::Result<String> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            bail!("email must look like name@domain");
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            bail!("password must be at least {MIN_PASSWORD_LEN} characters");
        }
        let hash = hash_password(password)?;
        let inserted = self
            .conn
            .execute(
                "INSERT INTO operators(email, password_hash, created_at)
                 VALUES(?, ?, ?)
                 ON CONFLICT(email) DO NOTHING",
                (&email, &hash, chrono::Utc::now().to_rfc3339()),
            )
            .context("failed to insert operator")?;
        if inserted == 0 {
            bail!("operator already exists: {email}");
        }
        Ok(email)
    }
}

impl CredentialVerifier for OperatorDirectory<'_> {
    fn effect(&self) -> VerificationEffect {
        VerificationEffect::SessionPreserving
    }

    fn verify_credential(&self, identifier: &str, secret: &str) -> anyhow::Result<bool> {
        let email = normalize_email(identifier);
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT password_hash FROM operators WHERE email = ?",
                [&email],
                |r| r.get(0),
            )
            .optional()
            .context("failed to read operator")?;
        match stored {
            Some(stored) => password_matches(secret, &stored),
            None => Ok(false),
        }
    }
}
