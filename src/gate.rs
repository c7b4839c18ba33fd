use crate::error::DatasetError;
use tracing::{info, warn};

/// What checking a credential does to the caller's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationEffect {
    /// Verification has no side effects.
    SessionPreserving,
    /// Verification performs a full sign-in and may replace the active session.
    Reauthenticates,
}

pub trait CredentialVerifier {
    fn effect(&self) -> VerificationEffect;

    /// `Ok(false)` means the pair was checked and rejected. `Err` means the
    /// provider could not be asked.
    fn verify_credential(&self, identifier: &str, secret: &str) -> anyhow::Result<bool>;
}

/// Proof that the gate passed. Only [`DestructiveGate::authorize`] creates one.
#[derive(Debug)]
pub struct Authorization {
    operator: String,
    effect: VerificationEffect,
}

impl Authorization {
    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn effect(&self) -> VerificationEffect {
        self.effect
    }
}

pub const RESET_PHRASE: &str = "RESET";

/// Explicit operator confirmation that a reset is intended.
#[derive(Debug, Clone, Copy)]
pub struct ResetConfirmation(());

impl ResetConfirmation {
    pub fn parse(phrase: &str) -> Result<Self, DatasetError> {
        if phrase.trim() == RESET_PHRASE {
            Ok(Self(()))
        } else {
            Err(DatasetError::ConfirmationRequired)
        }
    }
}

pub struct DestructiveGate<'v> {
    verifier: &'v dyn CredentialVerifier,
}

impl<'v> DestructiveGate<'v> {
    pub fn new(verifier: &'v dyn CredentialVerifier) -> Self {
        Self { verifier }
    }

    /// Re-checks the signed-in operator's password before a restore or reset.
    pub fn authorize(
        &self,
        current_email: &str,
        supplied_password: &str,
    ) -> Result<Authorization, DatasetError> {
        if current_email.trim().is_empty() || supplied_password.is_empty() {
            return Err(DatasetError::AccessDenied);
        }

        let effect = self.verifier.effect();
        if effect == VerificationEffect::Reauthenticates {
            warn!(
                operator = current_email,
                "credential check signs in again; the active session may be replaced"
            );
        }

        match self.verifier.verify_credential(current_email, supplied_password) {
            Ok(true) => {
                info!(operator = current_email, "destructive action authorized");
                Ok(Authorization {
                    operator: current_email.to_string(),
                    effect,
                })
            }
            Ok(false) => {
                warn!(operator = current_email, "destructive action denied");
                Err(DatasetError::AccessDenied)
            }
            Err(e) => Err(DatasetError::IdentityUnavailable(format!("{e:#}"))),
        }
    }

    pub fn is_authorized(&self, current_email: &str, supplied_password: &str) -> bool {
        self.authorize(current_email, supplied_password).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;

    struct FixedVerifier {
        email: &'static str,
        password: &'static str,
        effect: VerificationEffect,
        calls: Cell<usize>,
    }

    impl FixedVerifier {
        fn new(effect: VerificationEffect) -> Self {
            Self {
                email: "admin@school.test",
                password: "s3cret",
                effect,
                calls: Cell::new(0),
            }
        }
    }

    impl CredentialVerifier for FixedVerifier {
        fn effect(&self) -> VerificationEffect {
            self.effect
        }

        fn verify_credential(&self, identifier: &str, secret: &str) -> anyhow::Result<bool> {
            self.calls.set(self.calls.get() + 1);
            Ok(identifier == self.email && secret == self.password)
        }
    }

    struct OfflineVerifier;

    impl CredentialVerifier for OfflineVerifier {
        fn effect(&self) -> VerificationEffect {
            VerificationEffect::SessionPreserving
        }

        fn verify_credential(&self, _: &str, _: &str) -> anyhow::Result<bool> {
            Err(anyhow!("connection refused"))
        }
    }

    #[test]
    fn right_password_yields_authorization() {
        let verifier = FixedVerifier::new(VerificationEffect::SessionPreserving);
        let gate = DestructiveGate::new(&verifier);
        let auth = gate
            .authorize("admin@school.test", "s3cret")
            .expect("authorized");
        assert_eq!(auth.operator(), "admin@school.test");
        assert_eq!(auth.effect(), VerificationEffect::SessionPreserving);
    }

    #[test]
    fn wrong_password_and_wrong_email_are_indistinguishable() {
        let verifier = FixedVerifier::new(VerificationEffect::Reauthenticates);
        let gate = DestructiveGate::new(&verifier);
        let wrong_pw = gate
            .authorize("admin@school.test", "guess")
            .expect_err("denied");
        let wrong_email = gate
            .authorize("other@school.test", "s3cret")
            .expect_err("denied");
        assert_eq!(wrong_pw, DatasetError::AccessDenied);
        assert_eq!(wrong_pw.to_string(), wrong_email.to_string());
        assert!(!gate.is_authorized("admin@school.test", "guess"));
    }

    #[test]
    fn empty_password_is_denied_without_asking_the_provider() {
        let verifier = FixedVerifier::new(VerificationEffect::SessionPreserving);
        let gate = DestructiveGate::new(&verifier);
        assert_eq!(
            gate.authorize("admin@school.test", "").expect_err("denied"),
            DatasetError::AccessDenied
        );
        assert_eq!(verifier.calls.get(), 0);
    }

    #[test]
    fn provider_outage_is_not_reported_as_wrong_password() {
        let gate = DestructiveGate::new(&OfflineVerifier);
        let err = gate
            .authorize("admin@school.test", "s3cret")
            .expect_err("unavailable");
        assert!(matches!(err, DatasetError::IdentityUnavailable(_)));
    }

    #[test]
    fn reset_needs_the_exact_phrase() {
        assert!(ResetConfirmation::parse("RESET").is_ok());
        assert!(ResetConfirmation::parse(" RESET \n").is_ok());
        for phrase in ["", "reset", "yes", "RESET ALL"] {
            assert_eq!(
                ResetConfirmation::parse(phrase).expect_err(phrase),
                DatasetError::ConfirmationRequired
            );
        }
    }
}
