use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;

use crate::config::IdentityConfig;
use crate::error::{OverlayError, Result};

#[cfg(test)]
use mockall::automock;

/// Shown after a reset email was accepted.
pub const RESET_SENT_MESSAGE: &str = "SENT (CHECK SPAM)";

/// Consecutive failed sign-ins before the local provider rate-limits.
const MAX_FAILED_ATTEMPTS: u32 = 5;

pub type AuthResult = std::result::Result<(), AuthFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    InvalidCredentials,
    MissingSecret,
    RateLimited,
    AccountDisabled,
    Unknown,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::InvalidCredentials => "INVALID CREDENTIALS",
            AuthFailure::MissingSecret => "MISSING PASSWORD",
            AuthFailure::RateLimited => "TOO MANY ATTEMPTS",
            AuthFailure::AccountDisabled => "ACCOUNT DISABLED",
            AuthFailure::Unknown => "CONNECTION ERROR",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetFailure {
    IdentifierNotFound,
    InvalidIdentifier,
    Unknown,
}

impl ResetFailure {
    pub fn message(&self) -> &'static str {
        match self {
            ResetFailure::IdentifierNotFound => "EMAIL NOT REGISTERED",
            ResetFailure::InvalidIdentifier => "INVALID EMAIL",
            ResetFailure::Unknown => "SEND FAILED",
        }
    }
}

impl fmt::Display for ResetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    SignedOut,
    SignedIn { identifier: String },
}

impl IdentityState {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, IdentityState::SignedIn { .. })
    }
}

/// External identity service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, identifier: &str, secret: &str) -> AuthResult;
    async fn sign_out(&self);
    async fn password_reset(&self, identifier: &str) -> std::result::Result<(), ResetFailure>;
}

/// Process-wide identity state. Created once at startup; the presentation and the
/// session controller each register through [`IdentityHub::subscribe`].
pub struct IdentityHub {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<IdentityState>,
}

impl IdentityHub {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(IdentityState::SignedOut);
        Self { provider, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<()> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(OverlayError::Auth(AuthFailure::MissingSecret));
        }

        match self.provider.sign_in(identifier, secret).await {
            Ok(()) => {
                tracing::info!("Signed in as {}", identifier);
                self.state.send_replace(IdentityState::SignedIn {
                    identifier: identifier.to_string(),
                });
                Ok(())
            }
            Err(kind) => {
                tracing::warn!(?kind, "Sign-in failed");
                Err(OverlayError::Auth(kind))
            }
        }
    }

    pub async fn sign_out(&self) {
        self.provider.sign_out().await;
        tracing::info!("Signed out");
        self.state.send_replace(IdentityState::SignedOut);
    }

    /// Request a reset email; on success returns the message to show.
    pub async fn password_reset(&self, identifier: &str) -> Result<&'static str> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(OverlayError::Reset(ResetFailure::InvalidIdentifier));
        }
        self.provider
            .password_reset(identifier)
            .await
            .map(|()| RESET_SENT_MESSAGE)
            .map_err(|kind| {
                tracing::warn!(?kind, "Password reset failed");
                OverlayError::Reset(kind)
            })
    }
}

/// Single-account provider backed by the `identity` config section.
pub struct LocalIdentity {
    account: Option<String>,
    password: Option<String>,
    failed_attempts: AtomicU32,
}

impl LocalIdentity {
    pub fn new(cfg: &IdentityConfig) -> Self {
        Self {
            account: cfg.account.clone(),
            password: cfg.password.clone(),
            failed_attempts: AtomicU32::new(0),
        }
    }

    fn is_account(&self, identifier: &str) -> bool {
        self.account
            .as_deref()
            .is_some_and(|account| account.eq_ignore_ascii_case(identifier))
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn sign_in(&self, identifier: &str, secret: &str) -> AuthResult {
        if self.failed_attempts.load(Ordering::SeqCst) >= MAX_FAILED_ATTEMPTS {
            return Err(AuthFailure::RateLimited);
        }
        if secret.is_empty() {
            return Err(AuthFailure::MissingSecret);
        }
        let password_matches = self.password.as_deref() == Some(secret);
        if self.is_account(identifier) && password_matches {
            self.failed_attempts.store(0, Ordering::SeqCst);
            Ok(())
        } else {
            self.failed_attempts.fetch_add(1, Ordering::SeqCst);
            Err(AuthFailure::InvalidCredentials)
        }
    }

    async fn sign_out(&self) {}

    async fn password_reset(&self, identifier: &str) -> std::result::Result<(), ResetFailure> {
        if !identifier.contains('@') {
            return Err(ResetFailure::InvalidIdentifier);
        }
        if !self.is_account(identifier) {
            return Err(ResetFailure::IdentifierNotFound);
        }
        tracing::info!("Password reset requested for {}", identifier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> LocalIdentity {
        LocalIdentity::new(&IdentityConfig {
            account: Some("ana@example.com".to_string()),
            password: Some("s3cret".to_string()),
        })
    }

    #[tokio::test]
    async fn test_sign_in_publishes_state() {
        let hub = IdentityHub::new(Arc::new(local()));
        let mut rx = hub.subscribe();
        assert_eq!(*rx.borrow(), IdentityState::SignedOut);

        hub.sign_in("ana@example.com", "s3cret").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_signed_in());

        hub.sign_out().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), IdentityState::SignedOut);
    }

    #[tokio::test]
    async fn test_missing_fields_checked_before_provider() {
        let mut provider = MockIdentityProvider::new();
        provider.expect_sign_in().never();
        let hub = IdentityHub::new(Arc::new(provider));

        let err = hub.sign_in("", "pw").await.unwrap_err();
        assert!(matches!(err, OverlayError::Auth(AuthFailure::MissingSecret)));
        let err = hub.sign_in("ana@example.com", "").await.unwrap_err();
        assert!(matches!(err, OverlayError::Auth(AuthFailure::MissingSecret)));
        assert_eq!(hub.current(), IdentityState::SignedOut);
    }

    #[tokio::test]
    async fn test_provider_failure_kind_passes_through() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_sign_in()
            .returning(|_, _| Err(AuthFailure::AccountDisabled));
        let hub = IdentityHub::new(Arc::new(provider));

        let err = hub.sign_in("ana@example.com", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "sign-in failed: ACCOUNT DISABLED");
        assert_eq!(hub.current(), IdentityState::SignedOut);
    }

    #[tokio::test]
    async fn test_local_lockout_after_repeated_failures() {
        let identity = local();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert_eq!(
                identity.sign_in("ana@example.com", "wrong").await,
                Err(AuthFailure::InvalidCredentials)
            );
        }
        assert_eq!(
            identity.sign_in("ana@example.com", "s3cret").await,
            Err(AuthFailure::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_reset_does_not_lift_lockout() {
        let identity = local();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            let _ = identity.sign_in("ana@example.com", "guess").await;
        }
        assert_eq!(identity.password_reset("ana@example.com").await, Ok(()));
        assert_eq!(
            identity.sign_in("ana@example.com", "guess2").await,
            Err(AuthFailure::RateLimited)
        );
        assert_eq!(
            identity.sign_in("ana@example.com", "s3cret").await,
            Err(AuthFailure::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_password_reset_messages() {
        let hub = IdentityHub::new(Arc::new(local()));
        assert_eq!(
            hub.password_reset("ana@example.com").await.unwrap(),
            RESET_SENT_MESSAGE
        );

        let err = hub.password_reset("nobody@example.com").await.unwrap_err();
        assert_eq!(err.to_string(), "password reset failed: EMAIL NOT REGISTERED");

        let err = hub.password_reset("not-an-email").await.unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Reset(ResetFailure::InvalidIdentifier)
        ));

        let err = hub.password_reset("  ").await.unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Reset(ResetFailure::InvalidIdentifier)
        ));
    }

    #[test]
    fn test_every_kind_has_a_message() {
        for kind in [
            AuthFailure::InvalidCredentials,
            AuthFailure::MissingSecret,
            AuthFailure::RateLimited,
            AuthFailure::AccountDisabled,
            AuthFailure::Unknown,
        ] {
            assert!(!kind.message().is_empty());
        }
        assert_eq!(ResetFailure::Unknown.to_string(), "SEND FAILED");
    }
}
