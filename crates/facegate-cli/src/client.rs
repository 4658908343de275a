//! Thin D-Bus client for the `org.facegate.Gate1` daemon interface.

use anyhow::{Context, Result};

const BUS_NAME: &str = "org.facegate.Gate1";
const OBJECT_PATH: &str = "/org/facegate/Gate1";
const INTERFACE: &str = "org.facegate.Gate1";

pub struct GateClient {
    conn: zbus::Connection,
}

impl GateClient {
    pub async fn connect(session_bus: bool) -> Result<Self> {
        let conn = if session_bus {
            zbus::Connection::session().await
        } else {
            zbus::Connection::system().await
        }
        .context("failed to connect to D-Bus")?;
        Ok(Self { conn })
    }

    async fn call<B>(&self, method: &str, body: &B) -> Result<zbus::Message>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        tracing::debug!(method, "calling facegated");
        self.conn
            .call_method(Some(BUS_NAME), OBJECT_PATH, Some(INTERFACE), method, body)
            .await
            .with_context(|| format!("{method} failed"))
    }

    async fn call_string<B>(&self, method: &str, body: &B) -> Result<String>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        let reply = self.call(method, body).await?;
        reply
            .body()
            .deserialize::<String>()
            .with_context(|| format!("unexpected {method} reply"))
    }

    pub async fn status(&self) -> Result<String> {
        self.call_string("Status", &()).await
    }

    pub async fn create_user(&self, username: &str, role: &str) -> Result<String> {
        self.call_string("CreateUser", &(username, role)).await
    }

    pub async fn enroll_face(&self, username: &str, descriptor: &str) -> Result<()> {
        self.call("EnrollFace", &(username, descriptor)).await?;
        Ok(())
    }

    pub async fn login_admin(&self, username: &str, descriptor: &str) -> Result<String> {
        self.call_string("LoginAdmin", &(username, descriptor)).await
    }

    pub async fn recent_audit(&self, limit: u32) -> Result<String> {
        self.call_string("RecentAudit", &(limit,)).await
    }
}
