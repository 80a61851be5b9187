use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::{CogniError, Result};

/// Current schema version
///
/// v1: offline content cache and offline action queue
/// v2: cached user profile and cached message log
pub const SCHEMA_VERSION: u32 = 2;

const STORE_CONTENT: &str = "offline_content";
const STORE_ACTIONS: &str = "offline_actions";
const STORE_USER: &str = "user_profile";
const STORE_MESSAGES: &str = "messages";

/// Kind of cached remote content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Course,
    Lesson,
    Resource,
}

/// Kind of mutation queued while offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Message,
    Quiz,
    Note,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Teacher,
    Admin,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }

            fn from_column(idx: usize, value: &str) -> rusqlite::Result<Self> {
                match value {
                    $($text => Ok($ty::$variant),)+
                    other => Err(rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        Type::Text,
                        format!("unknown {} '{}'", stringify!($ty), other).into(),
                    )),
                }
            }
        }
    };
}

text_enum!(ContentType { Course => "course", Lesson => "lesson", Resource => "resource" });
text_enum!(ActionType { Message => "message", Quiz => "quiz", Note => "note" });
text_enum!(UserRole { Student => "student", Teacher => "teacher", Admin => "admin" });

/// Remote content cached for offline use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineContent {
    pub id: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub data: serde_json::Value,
    pub last_sync: DateTime<Utc>,
}

/// A mutation performed while the server was unreachable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
}

/// Local mirror of the authenticated identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Chat message kept for offline replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub id: String,
    pub content: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
    pub is_user: bool,
    pub is_read: Option<bool>,
}

/// Where and how to open the offline store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub schema_version: u32,
    pub busy_timeout: Duration,
}

impl StoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            schema_version: SCHEMA_VERSION,
            busy_timeout: Duration::from_millis(250),
        }
    }
}

impl From<&AppConfig> for StoreConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            path: config.database_path.clone(),
            schema_version: config.schema_version,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

struct IndexSpec {
    name: &'static str,
    sql: &'static str,
}

/// One collection and the schema version that introduced it
struct CollectionSpec {
    name: &'static str,
    since: u32,
    create_sql: &'static str,
    indexes: &'static [IndexSpec],
}

const COLLECTIONS: &[CollectionSpec] = &[
    CollectionSpec {
        name: STORE_CONTENT,
        since: 1,
        create_sql: "CREATE TABLE offline_content (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL CHECK(type IN ('course', 'lesson', 'resource')),
                data TEXT NOT NULL,
                last_sync TEXT NOT NULL
            )",
        indexes: &[
            IndexSpec {
                name: "idx_offline_content_type",
                sql: "CREATE INDEX idx_offline_content_type ON offline_content(type)",
            },
            IndexSpec {
                name: "idx_offline_content_last_sync",
                sql: "CREATE INDEX idx_offline_content_last_sync ON offline_content(last_sync)",
            },
        ],
    },
    CollectionSpec {
        name: STORE_ACTIONS,
        since: 1,
        create_sql: "CREATE TABLE offline_actions (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL CHECK(type IN ('message', 'quiz', 'note')),
                data TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0 CHECK(synced IN (0, 1))
            )",
        indexes: &[
            IndexSpec {
                name: "idx_offline_actions_type",
                sql: "CREATE INDEX idx_offline_actions_type ON offline_actions(type)",
            },
            // Pending queries filter on synced and replay in timestamp order
            IndexSpec {
                name: "idx_offline_actions_synced",
                sql: "CREATE INDEX idx_offline_actions_synced ON offline_actions(synced, timestamp)",
            },
        ],
    },
    CollectionSpec {
        name: STORE_USER,
        since: 2,
        create_sql: "CREATE TABLE user_profile (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('student', 'teacher', 'admin')),
                avatar TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            )",
        indexes: &[IndexSpec {
            name: "idx_user_profile_email",
            sql: "CREATE UNIQUE INDEX idx_user_profile_email ON user_profile(email)",
        }],
    },
    CollectionSpec {
        name: STORE_MESSAGES,
        since: 2,
        create_sql: "CREATE TABLE messages (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                sender TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                is_user INTEGER NOT NULL,
                is_read INTEGER
            )",
        indexes: &[IndexSpec {
            name: "idx_messages_timestamp",
            sql: "CREATE INDEX idx_messages_timestamp ON messages(timestamp)",
        }],
    },
];

/// Versioned, indexed local store for offline content, queued actions,
/// the cached user profile and the cached message log
///
/// The connection is opened lazily and re-opened whenever the file's schema
/// version no longer matches the target. Every operation runs in its own
/// transaction, so a failing step leaves nothing behind.
pub struct OfflineStore {
    config: StoreConfig,
    conn: Mutex<Option<Connection>>,
}

impl OfflineStore {
    /// Create a store handle; nothing touches the disk until `open` or the first operation
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Create a handle and open it right away
    pub fn open_at(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.open()?;
        Ok(store)
    }

    /// Ensure a ready connection at the target schema version
    ///
    /// Safe to call repeatedly. Fails with `StorageConnectionBlocked` when
    /// another connection keeps the file locked past the busy timeout.
    pub fn open(&self) -> Result<()> {
        let mut slot = self.lock()?;
        self.ensure_open(&mut slot)?;
        Ok(())
    }

    /// Schema version recorded in the database file
    pub fn schema_version(&self) -> Result<u32> {
        let mut slot = self.lock()?;
        let conn = self.ensure_open(&mut slot)?;
        read_version(conn).map_err(open_error)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| CogniError::Internal(format!("Failed to lock offline store: {}", e)))
    }

    fn ensure_open<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
        let stale = match slot.as_ref() {
            Some(conn) => read_version(conn).map_err(open_error)? != self.config.schema_version,
            None => true,
        };

        if stale {
            if slot.take().is_some() {
                log::info!("Offline store version changed underneath us - re-opening");
            }
            *slot = Some(self.connect()?);
        }

        slot.as_mut()
            .ok_or_else(|| CogniError::Internal("Offline store connection missing".to_string()))
    }

    fn connect(&self) -> Result<Connection> {
        let path = &self.config.path;
        log::info!("Opening offline store at: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CogniError::StorageConnectionError(format!(
                        "Failed to create database directory: {}",
                        e
                    ))
                })?;
            }
        }

        let mut conn = Connection::open(path).map_err(|e| {
            CogniError::StorageConnectionError(format!("Failed to open database: {}", e))
        })?;
        conn.busy_timeout(self.config.busy_timeout).map_err(open_error)?;

        upgrade(&mut conn, self.config.schema_version)?;

        log::info!("Offline store ready (schema v{})", self.config.schema_version);
        Ok(conn)
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.transact(TransactionBehavior::Immediate, f)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        self.transact(TransactionBehavior::Deferred, f)
    }

    fn transact<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut slot = self.lock()?;
        let conn = self.ensure_open(&mut slot)?;
        let tx = conn.transaction_with_behavior(behavior)?;
        // Dropping an uncommitted transaction rolls it back
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ---- offline content -------------------------------------------------

    /// Insert a content item; a duplicate id is a constraint violation
    pub fn add_content(&self, item: &OfflineContent) -> Result<()> {
        let data = serde_json::to_string(&item.data)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO offline_content (id, type, data, last_sync) VALUES (?1, ?2, ?3, ?4)",
                params![item.id, item.content_type.as_str(), data, to_sql_time(&item.last_sync)],
            )?;
            Ok(())
        })?;

        log::debug!("Cached {} content '{}'", item.content_type.as_str(), item.id);
        Ok(())
    }

    /// All cached items of one type, via the `type` index
    pub fn get_content_by_type(&self, content_type: ContentType) -> Result<Vec<OfflineContent>> {
        self.read(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, type, data, last_sync FROM offline_content
                 WHERE type = ?1
                 ORDER BY id ASC",
            )?;
            let items = stmt
                .query_map(params![content_type.as_str()], content_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
    }

    pub fn get_content(&self, id: &str) -> Result<Option<OfflineContent>> {
        self.read(|tx| {
            let item = tx
                .query_row(
                    "SELECT id, type, data, last_sync FROM offline_content WHERE id = ?1",
                    params![id],
                    content_from_row,
                )
                .optional()?;
            Ok(item)
        })
    }

    /// Upsert a content item by primary key
    pub fn update_content(&self, item: &OfflineContent) -> Result<()> {
        let data = serde_json::to_string(&item.data)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO offline_content (id, type, data, last_sync) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    type = excluded.type,
                    data = excluded.data,
                    last_sync = excluded.last_sync",
                params![item.id, item.content_type.as_str(), data, to_sql_time(&item.last_sync)],
            )?;
            Ok(())
        })?;

        log::debug!("Updated content '{}' (last sync {})", item.id, item.last_sync);
        Ok(())
    }

    pub fn count_content(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM offline_content")
    }

    // ---- offline actions -------------------------------------------------

    /// Queue an action; a duplicate id is a constraint violation
    pub fn add_action(&self, action: &OfflineAction) -> Result<()> {
        let data = serde_json::to_string(&action.data)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO offline_actions (id, type, data, timestamp, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    action.id,
                    action.action_type.as_str(),
                    data,
                    to_sql_time(&action.timestamp),
                    action.synced
                ],
            )?;
            Ok(())
        })?;

        log::debug!("Queued {} action '{}'", action.action_type.as_str(), action.id);
        Ok(())
    }

    /// Actions not yet acknowledged by the server, oldest first
    pub fn get_pending_actions(&self) -> Result<Vec<OfflineAction>> {
        self.read(|tx| {
            let mut stmt = tx.prepare(PENDING_ACTIONS_SQL)?;
            let actions = stmt
                .query_map([], action_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(actions)
        })
    }

    pub fn get_action(&self, id: &str) -> Result<Option<OfflineAction>> {
        self.read(|tx| {
            let action = tx
                .query_row(
                    "SELECT id, type, data, timestamp, synced FROM offline_actions WHERE id = ?1",
                    params![id],
                    action_from_row,
                )
                .optional()?;
            Ok(action)
        })
    }

    /// Flag an action as synced
    ///
    /// Read-modify-write inside one transaction. A missing id fails with
    /// `StorageNotFound`; an already-synced action stays synced.
    pub fn mark_action_synced(&self, id: &str) -> Result<()> {
        self.write(|tx| {
            let synced: Option<bool> = tx
                .query_row(
                    "SELECT synced FROM offline_actions WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;

            match synced {
                None => Err(CogniError::StorageNotFound(format!("offline action '{}'", id))),
                Some(true) => {
                    log::debug!("Action '{}' already synced", id);
                    Ok(())
                }
                Some(false) => {
                    tx.execute(
                        "UPDATE offline_actions SET synced = 1 WHERE id = ?1",
                        params![id],
                    )?;
                    log::debug!("Marked action '{}' as synced", id);
                    Ok(())
                }
            }
        })
    }

    pub fn count_pending_actions(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM offline_actions WHERE synced = 0")
    }

    // ---- cached user -----------------------------------------------------

    /// Upsert the cached profile; another id with the same email is a constraint violation
    pub fn save_user_profile(&self, user: &CachedUser) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO user_profile (id, name, email, role, avatar, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    role = excluded.role,
                    avatar = excluded.avatar,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                params![
                    user.id,
                    user.name,
                    user.email,
                    user.role.as_str(),
                    user.avatar,
                    to_sql_time(&user.created_at),
                    user.updated_at.as_ref().map(to_sql_time)
                ],
            )?;
            Ok(())
        })?;

        log::info!("Cached profile for user '{}'", user.id);
        Ok(())
    }

    pub fn get_user_profile(&self, id: &str) -> Result<Option<CachedUser>> {
        self.read(|tx| {
            let user = tx
                .query_row(
                    "SELECT id, name, email, role, avatar, created_at, updated_at
                     FROM user_profile WHERE id = ?1",
                    params![id],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    // ---- cached messages -------------------------------------------------

    /// Append a message; messages are never updated in place
    pub fn save_message(&self, message: &CachedMessage) -> Result<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO messages (id, content, sender, timestamp, is_user, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id,
                    message.content,
                    message.sender,
                    to_sql_time(&message.timestamp),
                    message.is_user,
                    message.is_read
                ],
            )?;
            Ok(())
        })?;

        log::debug!("Saved message '{}' from {}", message.id, message.sender);
        Ok(())
    }

    /// Whole message log in timestamp order
    pub fn get_all_messages(&self) -> Result<Vec<CachedMessage>> {
        self.read(|tx| {
            let mut stmt = tx.prepare(
                "SELECT id, content, sender, timestamp, is_user, is_read
                 FROM messages
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let messages = stmt
                .query_map([], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
    }

    pub fn count_messages(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM messages")
    }

    fn count(&self, sql: &str) -> Result<i64> {
        self.read(|tx| Ok(tx.query_row(sql, [], |row| row.get(0))?))
    }
}

/// Shared store handle for the composition root
pub type StoreState = Arc<OfflineStore>;

const PENDING_ACTIONS_SQL: &str = "SELECT id, type, data, timestamp, synced FROM offline_actions
     WHERE synced = 0
     ORDER BY timestamp ASC";

/// Bring the file up to `target`, creating only what is missing
fn upgrade(conn: &mut Connection, target: u32) -> Result<()> {
    let current = read_version(conn).map_err(open_error)?;
    check_not_newer(current, target)?;
    if current == target {
        return Ok(());
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(open_error)?;

    // Another connection may have finished the upgrade while we waited for the lock
    let current = read_version(&tx).map_err(open_error)?;
    check_not_newer(current, target)?;
    if current == target {
        tx.commit().map_err(open_error)?;
        return Ok(());
    }

    log::info!("Offline store schema: v{} -> v{}", current, target);

    for collection in COLLECTIONS.iter().filter(|c| c.since <= target) {
        if !schema_object_exists(&tx, "table", collection.name).map_err(open_error)? {
            tx.execute_batch(collection.create_sql).map_err(open_error)?;
            log::info!("Created collection '{}'", collection.name);
        }

        for index in collection.indexes {
            if !schema_object_exists(&tx, "index", index.name).map_err(open_error)? {
                tx.execute_batch(index.sql).map_err(open_error)?;
                log::debug!("Created index '{}' on '{}'", index.name, collection.name);
            }
        }
    }

    tx.pragma_update(None, "user_version", target).map_err(open_error)?;
    tx.commit().map_err(open_error)?;

    Ok(())
}

fn check_not_newer(current: u32, target: u32) -> Result<()> {
    if current > target {
        return Err(CogniError::StorageConnectionError(format!(
            "Database is at schema v{} but this build only knows v{}",
            current, target
        )));
    }
    Ok(())
}

fn read_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn schema_object_exists(conn: &Connection, kind: &str, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
        params![kind, name],
        |row| row.get(0),
    )
}

/// Errors while opening or upgrading: lock contention is "blocked", the rest is a connection error
fn open_error(err: rusqlite::Error) -> CogniError {
    match CogniError::from(err) {
        blocked @ CogniError::StorageConnectionBlocked(_) => blocked,
        other => CogniError::StorageConnectionError(other.to_string()),
    }
}

/// Fixed-width UTC text with all nine fractional digits
///
/// Lexical index order matches chronological order and values read back equal.
fn to_sql_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn content_from_row(row: &Row<'_>) -> rusqlite::Result<OfflineContent> {
    let kind: String = row.get(1)?;
    Ok(OfflineContent {
        id: row.get(0)?,
        content_type: ContentType::from_column(1, &kind)?,
        data: json_column(row, 2)?,
        last_sync: time_column(row, 3)?,
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<OfflineAction> {
    let kind: String = row.get(1)?;
    Ok(OfflineAction {
        id: row.get(0)?,
        action_type: ActionType::from_column(1, &kind)?,
        data: json_column(row, 2)?,
        timestamp: time_column(row, 3)?,
        synced: row.get(4)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<CachedUser> {
    let role: String = row.get(3)?;
    let updated_at = match row.get::<_, Option<String>>(6)? {
        Some(_) => Some(time_column(row, 6)?),
        None => None,
    };
    Ok(CachedUser {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: UserRole::from_column(3, &role)?,
        avatar: row.get(4)?,
        created_at: time_column(row, 5)?,
        updated_at,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<CachedMessage> {
    Ok(CachedMessage {
        id: row.get(0)?,
        content: row.get(1)?,
        sender: row.get(2)?,
        timestamp: time_column(row, 3)?,
        is_user: row.get(4)?,
        is_read: row.get(5)?,
    })
}
