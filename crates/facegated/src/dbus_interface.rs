use std::sync::Arc;

use zbus::interface;

use crate::auth::{AuthError, Authenticator};
use crate::rate_limiter::LockoutPolicy;
use crate::store::Role;

pub const BUS_NAME: &str = "org.facegate.Gate1";
pub const OBJECT_PATH: &str = "/org/facegate/Gate1";

/// Audit entries returned when the caller asks for none.
const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// D-Bus interface for the FaceGate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
pub struct GateService {
    pub auth: Arc<Authenticator>,
    pub match_threshold: f32,
    pub lockout: LockoutPolicy,
    /// Session bus (development mode): caller UID checks are skipped.
    pub session_bus: bool,
}

/// Retrieve the UID of the D-Bus peer identified by `sender_str` (a unique bus name).
async fn get_caller_uid(sender_str: &str, conn: &zbus::Connection) -> zbus::fdo::Result<u32> {
    let dbus_proxy = zbus::fdo::DBusProxy::new(conn)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    let bus_name = zbus::names::BusName::try_from(sender_str)
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
    dbus_proxy
        .get_connection_unix_user(bus_name)
        .await
        .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(e: AuthError) -> zbus::fdo::Error {
    match e {
        AuthError::NotAdmin | AuthError::LockedOut { .. } => {
            zbus::fdo::Error::AccessDenied(e.to_string())
        }
        AuthError::InvalidDescriptor => zbus::fdo::Error::InvalidArgs(e.to_string()),
        AuthError::Store(ref inner) => {
            tracing::error!(error = %inner, "store operation failed");
            zbus::fdo::Error::Failed(e.to_string())
        }
        _ => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

impl GateService {
    /// Root-only on the system bus.
    async fn require_root(
        &self,
        method: &str,
        header: &zbus::message::Header<'_>,
        conn: &zbus::Connection,
    ) -> zbus::fdo::Result<()> {
        if self.session_bus {
            return Ok(());
        }
        let sender = header
            .sender()
            .ok_or_else(|| zbus::fdo::Error::Failed("no sender in message".to_string()))?;
        let caller_uid = get_caller_uid(sender.as_str(), conn).await?;
        if caller_uid != 0 {
            tracing::warn!(method, caller_uid, "rejected non-root caller");
            return Err(zbus::fdo::Error::AccessDenied(format!(
                "{method} requires root"
            )));
        }
        Ok(())
    }
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Store a face descriptor (JSON array of 128 numbers) for `username`.
    async fn enroll_face(
        &self,
        username: &str,
        descriptor: &str,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<()> {
        tracing::info!(username, "enroll requested");
        self.require_root("EnrollFace", &header, conn).await?;
        self.auth
            .enroll_face(username, descriptor)
            .await
            .map_err(to_fdo)
    }

    /// Face login for admins. Returns the new session as JSON.
    async fn login_admin(&self, username: &str, descriptor: &str) -> zbus::fdo::Result<String> {
        tracing::info!(username, "admin login requested");
        let session = self
            .auth
            .login_admin(username, descriptor)
            .await
            .map_err(to_fdo)?;
        to_json(&session)
    }

    /// Provision a user. Returns the new UID.
    async fn create_user(
        &self,
        username: &str,
        role: &str,
        #[zbus(header)] header: zbus::message::Header<'_>,
        #[zbus(connection)] conn: &zbus::Connection,
    ) -> zbus::fdo::Result<String> {
        self.require_root("CreateUser", &header, conn).await?;
        let role: Role = role
            .parse()
            .map_err(|_| zbus::fdo::Error::InvalidArgs(format!("unknown role '{role}'")))?;
        let user = self
            .auth
            .create_user(username, role)
            .await
            .map_err(to_fdo)?;
        Ok(user.uid)
    }

    /// Newest audit entries as JSON. `limit` 0 means the default page.
    async fn recent_audit(&self, limit: u32) -> zbus::fdo::Result<String> {
        let limit = if limit == 0 { DEFAULT_AUDIT_LIMIT } else { limit };
        let entries = self.auth.recent_audit(limit).await.map_err(to_fdo)?;
        to_json(&entries)
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let counts = self
            .auth
            .store()
            .counts()
            .await
            .map_err(|e| to_fdo(AuthError::Store(e)))?;

        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "users": counts.users,
            "face_enrolled": counts.enrolled,
            "match_threshold": self.match_threshold,
            "lockout": {
                "max_failures": self.lockout.max_failures,
                "window_secs": self.lockout.window.as_secs(),
                "lockout_secs": self.lockout.lockout.as_secs(),
            },
            "session_bus": self.session_bus,
        })
        .to_string())
    }
}
