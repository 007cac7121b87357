// Attendance Ledger - durable, append-only record of attendance events
// Events are never mutated; deletion only happens via bulk admin export,
// outside this engine.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime, Timelike};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::Database;
use crate::store::Identity;

// ============================================================================
// ACTION
// ============================================================================

/// One step of the attendance cycle. For a given identity the ledger must
/// strictly cycle Entrada -> Colación -> Salida -> Entrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Entry,
    Break,
    Exit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Entry => "Entrada",
            Action::Break => "Colación",
            Action::Exit => "Salida",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "Entrada" => Some(Action::Entry),
            "Colación" | "Colacion" => Some(Action::Break),
            "Salida" => Some(Action::Exit),
            _ => None,
        }
    }
}

// ============================================================================
// METHOD
// ============================================================================

/// How the event was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Fingerprint,
    Manual,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Fingerprint => "Huella",
            Method::Manual => "Manual",
        }
    }

    pub fn parse(s: &str) -> Option<Method> {
        match s {
            "Huella" => Some(Method::Fingerprint),
            "Manual" => Some(Method::Manual),
            _ => None,
        }
    }
}

// ============================================================================
// ATTENDANCE EVENT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    /// Stable event identity (UUID)
    pub event_id: String,
    pub identity_id: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub action: Action,
    pub method: Method,
}

impl AttendanceEvent {
    /// Event stamped with the local clock.
    pub fn new(identity: &Identity, action: Action, method: Method) -> Self {
        let now = Local::now();
        Self::at(identity, action, method, now.date_naive(), now.time())
    }

    /// Event with an explicit timestamp (tests, backfill).
    pub fn at(
        identity: &Identity,
        action: Action,
        method: Method,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Self {
        AttendanceEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            identity_id: identity.id.clone(),
            display_name: identity.display_name.clone(),
            date,
            // Sub-second precision is dropped: the ledger stores HH:MM:SS
            time: time.with_nanosecond(0).unwrap_or(time),
            action,
            method,
        }
    }
}

// ============================================================================
// RECORD FILTER
// ============================================================================

/// Admin-surface query over the ledger.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Substring matched against identity id or display name
    pub needle: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ============================================================================
// LEDGER
// ============================================================================

/// Exclusive owner of the attendance_events table. The scan loop and the
/// action resolver only read/append through this interface.
#[derive(Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Ledger { db }
    }

    /// Append one event. The write is synchronous and durable before this
    /// returns Ok.
    pub fn append(&self, event: &AttendanceEvent) -> Result<()> {
        let conn = self.db.lock();

        conn.execute(
            "INSERT INTO attendance_events (
                event_id, identity_id, display_name, date, time, action, method
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.event_id,
                event.identity_id,
                event.display_name,
                event.date.format("%Y-%m-%d").to_string(),
                event.time.format("%H:%M:%S").to_string(),
                event.action.as_str(),
                event.method.as_str(),
            ],
        )
        .with_context(|| format!("Failed to append attendance event for {}", event.identity_id))?;

        Ok(())
    }

    /// Most recent event for an identity, by (date, time) with append order
    /// breaking ties.
    pub fn last_event_for(&self, identity_id: &str) -> Result<Option<AttendanceEvent>> {
        let conn = self.db.lock();

        let event = conn
            .query_row(
                "SELECT event_id, identity_id, display_name, date, time, action, method
                 FROM attendance_events
                 WHERE identity_id = ?1
                 ORDER BY date DESC, time DESC, seq DESC
                 LIMIT 1",
                params![identity_id],
                row_to_event,
            )
            .optional()
            .context("Failed to read last attendance event")?;

        Ok(event)
    }

    /// All events for one identity in (date, time, append) order.
    pub fn events_for(&self, identity_id: &str) -> Result<Vec<AttendanceEvent>> {
        let conn = self.db.lock();

        let mut stmt = conn.prepare(
            "SELECT event_id, identity_id, display_name, date, time, action, method
             FROM attendance_events
             WHERE identity_id = ?1
             ORDER BY date, time, seq",
        )?;

        let events = stmt
            .query_map(params![identity_id], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Full ledger in (date, time, append) order.
    pub fn all_events(&self) -> Result<Vec<AttendanceEvent>> {
        let conn = self.db.lock();

        let mut stmt = conn.prepare(
            "SELECT event_id, identity_id, display_name, date, time, action, method
             FROM attendance_events
             ORDER BY date, time, seq",
        )?;

        let events = stmt
            .query_map([], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Filtered view for the admin records screen.
    pub fn filter(&self, filter: &RecordFilter) -> Result<Vec<AttendanceEvent>> {
        let needle = filter.needle.as_ref().map(|n| n.to_lowercase());

        let events = self
            .all_events()?
            .into_iter()
            .filter(|e| {
                if let Some(n) = &needle {
                    if !e.identity_id.to_lowercase().contains(n)
                        && !e.display_name.to_lowercase().contains(n)
                    {
                        return false;
                    }
                }
                if let Some(from) = filter.from {
                    if e.date < from {
                        return false;
                    }
                }
                if let Some(to) = filter.to {
                    if e.date > to {
                        return false;
                    }
                }
                true
            })
            .collect();

        Ok(events)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.db.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM attendance_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Export the full ledger to CSV with the original record columns.
    pub fn export_csv(&self, path: &Path) -> Result<usize> {
        let events = self.all_events()?;

        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create export file {}", path.display()))?;

        wtr.write_record(["RUT", "Nombre", "Fecha", "Hora", "Accion", "Metodo"])?;
        for event in &events {
            wtr.write_record([
                event.identity_id.as_str(),
                event.display_name.as_str(),
                &event.date.format("%Y-%m-%d").to_string(),
                &event.time.format("%H:%M:%S").to_string(),
                event.action.as_str(),
                event.method.as_str(),
            ])?;
        }
        wtr.flush()?;

        Ok(events.len())
    }

    /// Plain-text attendance summary: total plus per-action counts.
    pub fn summary_report(&self) -> Result<String> {
        let conn = self.db.lock();

        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM attendance_events", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT action, COUNT(*) FROM attendance_events
             GROUP BY action ORDER BY action",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = String::new();
        report.push_str("Reporte de Asistencia\n");
        report.push_str("=====================\n\n");
        report.push_str(&format!("Total de registros: {}\n\n", total));
        report.push_str("Resumen de acciones:\n");
        for (action, count) in counts {
            report.push_str(&format!("  {}: {}\n", action, count));
        }

        Ok(report)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceEvent> {
    let date_str: String = row.get(3)?;
    let time_str: String = row.get(4)?;
    let action_str: String = row.get(5)?;
    let method_str: String = row.get(6)?;

    Ok(AttendanceEvent {
        event_id: row.get(0)?,
        identity_id: row.get(1)?,
        display_name: row.get(2)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        time: NaiveTime::parse_from_str(&time_str, "%H:%M:%S")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        action: Action::parse(&action_str).ok_or(rusqlite::Error::InvalidQuery)?,
        method: Method::parse(&method_str).ok_or(rusqlite::Error::InvalidQuery)?,
    })
}
