//! Face enrollment and admin face login on top of [`FaceStore`].

use facegate_core::{Descriptor, EuclideanMatcher};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::rate_limiter::{LockoutPolicy, RateLimiter};
use crate::store::{AuditEntry, AuditKind, FaceStore, Role, Session, StoreError, UserRecord};

/// Authentication failures. `Display` is the reason shown to the caller.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,
    #[error("User already exists")]
    UserExists,
    #[error("Invalid face descriptor")]
    InvalidDescriptor,
    #[error("Access Denied: Admins only")]
    NotAdmin,
    #[error("Face Data Not Found")]
    FaceDataNotFound,
    #[error("Too many failed attempts. Try again in {remaining_secs}s.")]
    LockedOut { remaining_secs: u64 },
    #[error("Face Does Not Match.")]
    Mismatch,
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserExists(_) => AuthError::UserExists,
            other => AuthError::Store(other),
        }
    }
}

pub struct Authenticator {
    store: FaceStore,
    matcher: EuclideanMatcher,
    limiter: Mutex<RateLimiter>,
}

impl Authenticator {
    pub fn new(store: FaceStore, matcher: EuclideanMatcher, policy: LockoutPolicy) -> Self {
        Self {
            store,
            matcher,
            limiter: Mutex::new(RateLimiter::new(policy)),
        }
    }

    pub fn store(&self) -> &FaceStore {
        &self.store
    }

    pub async fn create_user(&self, username: &str, role: Role) -> Result<UserRecord, AuthError> {
        let user = self.store.create_user(username, role).await?;
        self.store
            .append_audit("system", "User Created", &format!("{username} ({role})"), AuditKind::System)
            .await?;
        tracing::info!(username, %role, "user created");
        Ok(user)
    }

    /// Store `descriptor` as the user's face, replacing any earlier one.
    pub async fn enroll_face(&self, username: &str, descriptor: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_user(username).await? else {
            tracing::warn!(username, "enroll: user not found");
            return Err(AuthError::UserNotFound);
        };

        let descriptor = Descriptor::decode(descriptor).map_err(|e| {
            tracing::warn!(username, error = %e, "enroll: rejected descriptor");
            AuthError::InvalidDescriptor
        })?;

        if !self.store.set_face_data(&user.uid, &descriptor).await? {
            // Deleted between lookup and write.
            return Err(AuthError::UserNotFound);
        }

        self.store
            .append_audit(username, "Face Enrolled", "face login enabled", AuditKind::Security)
            .await?;
        tracing::info!(username, "face enrolled");
        Ok(())
    }

    /// Authenticate an admin by face and open a session.
    pub async fn login_admin(&self, username: &str, descriptor: &str) -> Result<Session, AuthError> {
        let Some(user) = self.store.find_user(username).await? else {
            tracing::warn!(username, "login: user not found");
            return Err(AuthError::UserNotFound);
        };

        if !user.role.is_admin() {
            tracing::warn!(username, role = %user.role, "login: not an admin");
            return Err(AuthError::NotAdmin);
        }

        let stored = match (&user.face_data, user.has_face_auth) {
            (Some(stored), true) => stored,
            _ => {
                tracing::warn!(username, "login: no enrolled face");
                return Err(AuthError::FaceDataNotFound);
            }
        };

        // Hold the limiter across the comparison so concurrent attempts for
        // one user are counted in order.
        let mut limiter = self.limiter.lock().await;
        if let Err(remaining) = limiter.check(username) {
            tracing::warn!(username, remaining_secs = remaining.as_secs(), "login: locked out");
            return Err(AuthError::LockedOut {
                remaining_secs: remaining.as_secs().max(1),
            });
        }

        let result = self.matcher.compare_encoded(stored, descriptor);
        if !result.matched {
            limiter.record_failure(username);
            tracing::info!(username, distance = ?result.distance, "login: face mismatch");
            return Err(AuthError::Mismatch);
        }
        limiter.record_success(username);
        drop(limiter);

        let session = self.store.create_session(&user).await?;
        self.store
            .append_audit(username, "Admin Login", "face authentication", AuditKind::Security)
            .await?;
        tracing::info!(username, distance = ?result.distance, "admin logged in");
        Ok(session)
    }

    pub async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>, AuthError> {
        Ok(self.store.recent_audit(limit).await?)
    }
}
