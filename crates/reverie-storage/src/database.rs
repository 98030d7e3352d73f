// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: connection lifecycle, pragmas, and migration on open.

use std::path::Path;

use reverie_core::ReverieError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Handle to the SQLite database.
///
/// Wraps a [`tokio_rusqlite::Connection`], which serializes all access
/// through a single background thread. Clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply pragmas, and run
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, ReverieError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| ReverieError::StoreWrite {
                source: Box::new(e),
            })?;
        }

        let conn = Connection::open(path).await.map_err(|e| map_tr_err(e.into()))?;
        Self::setup(conn, path).await
    }

    /// Open an in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, ReverieError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| map_tr_err(e.into()))?;
        Self::setup(conn, ":memory:").await
    }

    async fn setup(conn: Connection, path: &str) -> Result<Self, ReverieError> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| {
            migrations::run_migrations(conn)
                .map_err(|e| std::io::Error::other(format!("migration failed: {e}")))
        })
        .await
        .map_err(|err| ReverieError::StoreWrite {
            source: Box::new(err),
        })?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Access the underlying connection for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), ReverieError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a `tokio_rusqlite` error into the storage error variant.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> ReverieError {
    ReverieError::StoreWrite {
        source: Box::new(err),
    }
}
