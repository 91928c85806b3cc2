//! Navigation-token persistence: an app state goes in, an opaque token
//! comes out, and the token gives the same document back later.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::appstate::AppState;
use crate::config::StoreOptions;

mod schema;

pub trait TokenStore {
    fn store(&self, state: &AppState) -> Result<String>;

    /// `None` when the token is unknown.
    fn retrieve(&self, token: &str) -> Result<Option<AppState>>;
}

fn new_token(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple()).to_uppercase()
}

#[derive(Debug, Clone, Copy)]
pub struct WalCheckpointStats {
    pub busy_frames: i64,
    pub wal_frames: i64,
    pub checkpointed_frames: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub token: String,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct SqliteTokenStore {
    db_path: Arc<PathBuf>,
    options: Arc<StoreOptions>,
}

impl SqliteTokenStore {
    pub fn open(options: &StoreOptions) -> Result<Self> {
        let db_path = &options.database_path;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?;
        prepare_connection(&conn, options)?;
        schema::apply(&conn)?;
        Ok(Self {
            db_path: Arc::new(db_path.clone()),
            options: Arc::new(options.clone()),
        })
    }

    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<TokenRecord>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token, created_at FROM app_states ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )?;
            let records = stmt
                .query_map([limit as i64], |row| {
                    Ok(TokenRecord {
                        token: row.get(0)?,
                        created_at: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("listing stored app states")?;
            Ok(records)
        })
    }

    pub fn run_wal_health_check(&self) -> Result<WalCheckpointStats> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("PRAGMA wal_checkpoint(PASSIVE)")
                .context("preparing wal checkpoint pragma")?;
            let mut rows = stmt.query([]).context("executing wal checkpoint pragma")?;
            if let Some(row) = rows.next()? {
                Ok(WalCheckpointStats {
                    busy_frames: row.get(0)?,
                    wal_frames: row.get(1)?,
                    checkpointed_frames: row.get(2)?,
                })
            } else {
                bail!("wal checkpoint returned no rows");
            }
        })
    }
}

impl TokenStore for SqliteTokenStore {
    fn store(&self, state: &AppState) -> Result<String> {
        let payload = state.to_json().context("serializing app state")?;
        let token = new_token(&self.options.token_prefix);
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO app_states (token, payload, created_at) VALUES (?1, ?2, ?3)",
                params![token, payload, now],
            )
            .context("inserting app state")?;
            Ok(())
        })?;
        tracing::info!(%token, "app state stored");
        Ok(token)
    }

    fn retrieve(&self, token: &str) -> Result<Option<AppState>> {
        let payload: Option<String> = self.with_connection(|conn| {
            conn.query_row(
                "SELECT payload FROM app_states WHERE token = ?1",
                [token],
                |row| row.get(0),
            )
            .optional()
            .context("loading app state")
        })?;
        let Some(payload) = payload else {
            tracing::warn!(token, "unknown app state token");
            return Ok(None);
        };
        let state = AppState::from_json(&payload)
            .with_context(|| format!("parsing stored app state {token}"))?;
        tracing::debug!(token, "app state loaded");
        Ok(Some(state))
    }
}

fn prepare_connection(conn: &Connection, options: &StoreOptions) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        options.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

/// Keeps serialized documents in memory, for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    prefix: String,
    states: Mutex<IndexMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            states: Mutex::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn store(&self, state: &AppState) -> Result<String> {
        let payload = state.to_json().context("serializing app state")?;
        let token = new_token(&self.prefix);
        self.states.lock().insert(token.clone(), payload);
        Ok(token)
    }

    fn retrieve(&self, token: &str) -> Result<Option<AppState>> {
        let payload = self.states.lock().get(token).cloned();
        payload
            .map(|raw| AppState::from_json(&raw).context("parsing stored app state"))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appstate::CustomData;
    use crate::status::ItemStatus;
    use crate::variant::{SelectRange, SelectionVariant};
    use tempfile::TempDir;

    fn sample_state() -> AppState {
        let mut selection_variant = SelectionVariant::default();
        selection_variant.add_select_option("GLAccount", SelectRange::equal_to("400000"));
        AppState {
            selection_variant,
            table_variant_id: Some("ZLAYOUT".into()),
            custom_data: CustomData {
                item_status: Some(ItemStatus::Cleared),
                key_date: Some("2024-05-01".into()),
                ..CustomData::default()
            },
        }
    }

    fn open_store(root: &TempDir) -> Result<SqliteTokenStore> {
        let options = StoreOptions {
            database_path: root.path().join("data").join("tokens.db"),
            ..StoreOptions::default()
        };
        SqliteTokenStore::open(&options)
    }

    #[test]
    fn sqlite_store_round_trips_documents() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let state = sample_state();

        let token = store.store(&state)?;
        assert!(token.starts_with("AS"));
        assert_eq!(store.retrieve(&token)?, Some(state));
        assert_eq!(store.retrieve("AS-UNKNOWN")?, None);
        Ok(())
    }

    #[test]
    fn sqlite_tokens_survive_reopen() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let first = open_store(&temp)?;
        let token = first.store(&sample_state())?;
        let second_token = first.store(&AppState::default())?;
        assert_ne!(token, second_token);
        drop(first);

        let reopened = open_store(&temp)?;
        assert_eq!(reopened.retrieve(&token)?, Some(sample_state()));
        let recent = reopened.recent(10)?;
        assert_eq!(recent.len(), 2);
        let stats = reopened.run_wal_health_check()?;
        assert!(stats.busy_frames >= 0);
        Ok(())
    }

    #[test]
    fn memory_store_behaves_like_sqlite() -> anyhow::Result<()> {
        let store = MemoryTokenStore::new("T");
        assert!(store.is_empty());
        let token = store.store(&sample_state())?;
        assert!(token.starts_with('T'));
        assert_eq!(store.len(), 1);
        assert_eq!(store.retrieve(&token)?, Some(sample_state()));
        assert_eq!(store.retrieve("missing")?, None);
        Ok(())
    }
}
