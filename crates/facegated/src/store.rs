use std::fmt;
use std::path::Path;
use std::str::FromStr;

use facegate_core::Descriptor;
use rusqlite::OptionalExtension;
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::Connection;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;

const NONCE_LEN: usize = 12;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("face data encryption failed")]
    EncryptionFailed,
    #[error("face data decryption failed: key mismatch or corrupted data")]
    DecryptionFailed,
    #[error("invalid face data blob size: {0} bytes")]
    InvalidBlob(usize),
    #[error("unknown role in database: {0}")]
    InvalidRole(String),
    #[error("unknown audit kind in database: {0}")]
    InvalidAuditKind(String),
    #[error("encryption key I/O error: {0}")]
    KeyIo(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(StoreError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Content,
    Security,
    System,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Content => "content",
            AuditKind::Security => "security",
            AuditKind::System => "system",
        }
    }
}

impl FromStr for AuditKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(AuditKind::Content),
            "security" => Ok(AuditKind::Security),
            "system" => Ok(AuditKind::System),
            other => Err(StoreError::InvalidAuditKind(other.to_string())),
        }
    }
}

/// A user row with the face descriptor decrypted back to its portable
/// string form.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uid: String,
    pub username: String,
    pub role: Role,
    pub has_face_auth: bool,
    pub face_data: Option<String>,
    pub face_enrolled_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub admin_name: String,
    pub action: String,
    pub details: String,
    pub kind: AuditKind,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub uid: String,
    pub username: String,
    pub role: Role,
    pub created_at: String,
}

/// Counts reported by the daemon's `Status` call.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreCounts {
    pub users: u64,
    pub enrolled: u64,
}

type UserRow = (
    String,
    String,
    String,
    bool,
    Option<Vec<u8>>,
    Option<String>,
    String,
);

/// SQLite-backed user, audit and session storage.
///
/// Face descriptors are encrypted with AES-256-GCM before storage. A
/// per-installation 32-byte key is generated at first use and stored at
/// `{db_dir}/.key` (mode 0600).
#[derive(Clone)]
pub struct FaceStore {
    conn: Connection,
    enc_key: [u8; 32],
}

impl FaceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let enc_key = if db_path == Path::new(":memory:") {
            // In-memory DB (tests): use a fixed all-zeros key
            [0u8; 32]
        } else {
            let parent = db_path.parent().unwrap_or(Path::new("."));
            std::fs::create_dir_all(parent).map_err(StoreError::KeyIo)?;
            load_or_generate_key(&parent.join(".key"))?
        };

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS users (
                     uid TEXT PRIMARY KEY,
                     username TEXT NOT NULL UNIQUE,
                     role TEXT NOT NULL DEFAULT 'user',
                     has_face_auth INTEGER NOT NULL DEFAULT 0,
                     face_data BLOB,
                     face_enrolled_at TEXT,
                     created_at TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS audit_log (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     admin_name TEXT NOT NULL,
                     action TEXT NOT NULL,
                     details TEXT NOT NULL,
                     kind TEXT NOT NULL,
                     timestamp TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS sessions (
                     token TEXT PRIMARY KEY,
                     uid TEXT NOT NULL,
                     username TEXT NOT NULL,
                     role TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, enc_key })
    }

    pub async fn create_user(&self, username: &str, role: Role) -> Result<UserRecord, StoreError> {
        let record = UserRecord {
            uid: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            role,
            has_face_auth: false,
            face_data: None,
            face_enrolled_at: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let (uid, name, role_str, created_at) = (
            record.uid.clone(),
            record.username.clone(),
            role.as_str(),
            record.created_at.clone(),
        );
        let inserted = self
            .conn
            .call(move |conn| {
                let result = conn.execute(
                    "INSERT INTO users (uid, username, role, has_face_auth, created_at)
                     VALUES (?1, ?2, ?3, 0, ?4)",
                    rusqlite::params![uid, name, role_str, created_at],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        if !inserted {
            return Err(StoreError::UserExists(username.to_string()));
        }
        Ok(record)
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let username = username.to_string();

        // Fetch the raw row; decrypt outside the blocking closure
        let row: Option<UserRow> = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT uid, username, role, has_face_auth, face_data, face_enrolled_at, created_at
                         FROM users WHERE username = ?1",
                        [&username],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                                row.get(6)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((uid, username, role, has_face_auth, blob, face_enrolled_at, created_at)) = row
        else {
            return Ok(None);
        };

        let face_data = blob
            .map(|blob| self.decrypt_face_data(&blob))
            .transpose()?;

        Ok(Some(UserRecord {
            uid,
            username,
            role: role.parse()?,
            has_face_auth,
            face_data,
            face_enrolled_at,
            created_at,
        }))
    }

    /// Replace the user's descriptor and mark face login as enabled.
    /// Returns `false` if no user has `uid`.
    pub async fn set_face_data(&self, uid: &str, descriptor: &Descriptor) -> Result<bool, StoreError> {
        // Encrypt before entering the SQLite closure
        let blob = self.encrypt_face_data(&descriptor.encode())?;
        let enrolled_at = chrono::Utc::now().to_rfc3339();
        let uid = uid.to_string();

        self.conn
            .call(move |conn| {
                let affected = conn.execute(
                    "UPDATE users SET face_data = ?1, has_face_auth = 1, face_enrolled_at = ?2
                     WHERE uid = ?3",
                    rusqlite::params![blob, enrolled_at, uid],
                )?;
                Ok(affected > 0)
            })
            .await
            .map_err(StoreError::from)
    }

    pub async fn append_audit(
        &self,
        admin_name: &str,
        action: &str,
        details: &str,
        kind: AuditKind,
    ) -> Result<AuditEntry, StoreError> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let (name, act, det, ts) = (
            admin_name.to_string(),
            action.to_string(),
            details.to_string(),
            timestamp.clone(),
        );

        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO audit_log (admin_name, action, details, kind, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![name, act, det, kind.as_str(), ts],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;

        Ok(AuditEntry {
            id,
            admin_name: admin_name.to_string(),
            action: action.to_string(),
            details: details.to_string(),
            kind,
            timestamp,
        })
    }

    /// Most recent audit entries first.
    pub async fn recent_audit(&self, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        let rows: Vec<(i64, String, String, String, String, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, admin_name, action, details, kind, timestamp
                     FROM audit_log ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map([limit], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        rows.into_iter()
            .map(|(id, admin_name, action, details, kind, timestamp)| {
                Ok(AuditEntry {
                    id,
                    admin_name,
                    action,
                    details,
                    kind: kind.parse()?,
                    timestamp,
                })
            })
            .collect()
    }

    pub async fn create_session(&self, user: &UserRecord) -> Result<Session, StoreError> {
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            uid: user.uid.clone(),
            username: user.username.clone(),
            role: user.role,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let s = session.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sessions (token, uid, username, role, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![s.token, s.uid, s.username, s.role.as_str(), s.created_at],
                )?;
                Ok(())
            })
            .await?;

        Ok(session)
    }

    pub async fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.conn
            .call(|conn| {
                let counts = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(has_face_auth), 0) FROM users",
                    [],
                    |row| {
                        Ok(StoreCounts {
                            users: row.get(0)?,
                            enrolled: row.get(1)?,
                        })
                    },
                )?;
                Ok(counts)
            })
            .await
            .map_err(StoreError::from)
    }

    // ── Encryption helpers ────────────────────────────────────────────────────

    /// Output: 12-byte random nonce || ciphertext || 16-byte GCM tag.
    fn encrypt_face_data(&self, encoded: &str) -> Result<Vec<u8>, StoreError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        let ciphertext = cipher
            .encrypt(nonce, encoded.as_bytes())
            .map_err(|_| StoreError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt_face_data(&self, blob: &[u8]) -> Result<String, StoreError> {
        if blob.len() <= NONCE_LEN {
            return Err(StoreError::InvalidBlob(blob.len()));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| StoreError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| StoreError::DecryptionFailed)
    }
}

// ── Key management ────────────────────────────────────────────────────────────

/// Load the encryption key from disk, or generate and persist a new one.
/// Written with mode 0600 (owner-readable only).
fn load_or_generate_key(key_path: &Path) -> Result<[u8; 32], StoreError> {
    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(StoreError::KeyIo)?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            StoreError::KeyIo(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "encryption key file has wrong length ({} bytes, expected 32)",
                    bytes.len()
                ),
            ))
        })?;
        tracing::debug!(path = %key_path.display(), "loaded encryption key");
        Ok(key)
    } else {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(key_path)
            .map_err(StoreError::KeyIo)?;
        f.write_all(&key).map_err(StoreError::KeyIo)?;

        tracing::info!(path = %key_path.display(), "generated new AES-256 encryption key");
        Ok(key)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
