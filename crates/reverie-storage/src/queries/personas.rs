// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persona CRUD operations.

use chrono::Utc;
use reverie_core::ReverieError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::Persona;

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn row_to_persona(row: &rusqlite::Row<'_>) -> Result<Persona, rusqlite::Error> {
    Ok(Persona {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        goals: row.get(3)?,
        seeded: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Insert or update a persona keyed by name, returning the stored row.
///
/// An existing row keeps its `id`, `seeded` flag, and `created_at`; the
/// description and goals are refreshed from config on every startup.
pub async fn upsert_persona(
    db: &Database,
    name: &str,
    description: &str,
    goals: &str,
) -> Result<Persona, ReverieError> {
    let name = name.to_string();
    let description = description.to_string();
    let goals = goals.to_string();
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO personas (name, description, goals, seeded, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     description = excluded.description,
                     goals = excluded.goals,
                     updated_at = excluded.updated_at",
                params![name, description, goals, now],
            )?;
            let mut stmt = conn.prepare(
                "SELECT id, name, description, goals, seeded, created_at, updated_at
                 FROM personas WHERE name = ?1",
            )?;
            let persona = stmt.query_row(params![name], row_to_persona)?;
            Ok(persona)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a persona by name, if present.
pub async fn get_persona(db: &Database, name: &str) -> Result<Option<Persona>, ReverieError> {
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, goals, seeded, created_at, updated_at
                 FROM personas WHERE name = ?1",
            )?;
            match stmt.query_row(params![name], row_to_persona) {
                Ok(p) => Ok(Some(p)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record that a persona's seed memories have been written.
pub async fn mark_seeded(db: &Database, id: i64) -> Result<(), ReverieError> {
    let now = now_iso();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE personas SET seeded = 1, updated_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
