//! crates/enrollment_core/src/identity.rs
//!
//! The identity provider: checks credentials and turns login sessions into a
//! [`Principal`] that every other core operation receives explicitly.

use crate::domain::{AuthSession, Principal};
use crate::ports::{DatabaseService, PasswordHasher, PortError, PortResult};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct IdentityService {
    db: Arc<dyn DatabaseService>,
    hasher: Arc<dyn PasswordHasher>,
    session_ttl: Duration,
}

impl IdentityService {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        hasher: Arc<dyn PasswordHasher>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            db,
            hasher,
            session_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Verifies an email/password pair and opens a new login session.
    /// Unknown emails and wrong passwords both yield `Unauthorized`.
    pub async fn login(&self, email: &str, password: &str) -> PortResult<(Principal, AuthSession)> {
        let email = email.trim().to_lowercase();
        let creds = match self.db.get_user_by_email(&email).await {
            Ok(creds) => creds,
            Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !self.hasher.verify_password(password, &creds.hashed_password)? {
            warn!(user_id = %creds.user_id, "Rejected login with wrong password");
            return Err(PortError::Unauthorized);
        }

        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id: creds.user_id,
            expires_at: Utc::now() + self.session_ttl,
        };
        self.db
            .create_auth_session(&session.id, session.user_id, session.expires_at)
            .await?;
        info!(user_id = %creds.user_id, "User logged in");

        let principal = Principal {
            id: creds.user_id,
            role: creds.role,
        };
        Ok((principal, session))
    }

    /// Resolves a session id to the principal behind it. The role is always read
    /// from the user record, never from the request.
    pub async fn resolve(&self, session_id: &str) -> PortResult<Principal> {
        let user_id = self.db.validate_auth_session(session_id).await?;
        let user = match self.db.get_user(user_id).await {
            Ok(user) => user,
            // the account was deleted while the session was still alive
            Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized),
            Err(e) => return Err(e),
        };
        Ok(Principal {
            id: user.id,
            role: user.role,
        })
    }

    pub async fn logout(&self, session_id: &str) -> PortResult<()> {
        self.db.delete_auth_session(session_id).await
    }
}
