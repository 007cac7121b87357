// Template Store - employee roster with enrolled biometric templates
// Backed by SQLite so a successful return is crash-durable.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::Database;
use crate::matcher::Template;

// ============================================================================
// ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Teaching staff
    Docente,

    /// Assistant staff
    Asistente,

    /// Administrator
    Administrador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Docente => "Docente",
            Role::Asistente => "Asistente",
            Role::Administrador => "Administrador",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Docente" => Some(Role::Docente),
            "Asistente" => Some(Role::Asistente),
            "Administrador" => Some(Role::Administrador),
            _ => None,
        }
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// One employee record.
///
/// `id` is the business identifier (RUT) and is unique across the store.
/// `template` is either absent or the single current template - enrollment
/// overwrites, no history of prior templates is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub template: Option<Template>,
}

impl Identity {
    pub fn new(id: &str, display_name: &str, role: Role) -> Self {
        Identity {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role,
            template: None,
        }
    }

    pub fn is_enrolled(&self) -> bool {
        self.template.is_some()
    }
}

// ============================================================================
// STORE ERROR
// ============================================================================

#[derive(Debug)]
pub enum StoreError {
    /// Insert requested for an id that already exists
    DuplicateIdentity(String),

    /// No record with the given id
    NotFound(String),

    /// Underlying SQLite failure
    Storage(rusqlite::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateIdentity(id) => write!(f, "Identity already exists: {}", id),
            StoreError::NotFound(id) => write!(f, "Identity not found: {}", id),
            StoreError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Storage(e)
    }
}

// ============================================================================
// EMPLOYEE STORE
// ============================================================================

/// Roster of enrolled identities, persisted synchronously on every write.
#[derive(Clone)]
pub struct EmployeeStore {
    db: Database,
}

impl EmployeeStore {
    pub fn new(db: Database) -> Self {
        EmployeeStore { db }
    }

    /// Insert a new identity. Fails with `DuplicateIdentity` if the id is
    /// already taken; use `update` to replace an existing record.
    pub fn add(&self, identity: &Identity) -> Result<(), StoreError> {
        let conn = self.db.lock();

        let result = conn.execute(
            "INSERT INTO identities (id, display_name, role, template) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.id,
                identity.display_name,
                identity.role.as_str(),
                identity.template.as_ref().map(|t| t.as_bytes()),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateIdentity(identity.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace an existing record by id. Fails with `NotFound` if absent.
    pub fn update(&self, identity: &Identity) -> Result<(), StoreError> {
        let conn = self.db.lock();

        let changed = conn.execute(
            "UPDATE identities SET display_name = ?2, role = ?3, template = ?4 WHERE id = ?1",
            params![
                identity.id,
                identity.display_name,
                identity.role.as_str(),
                identity.template.as_ref().map(|t| t.as_bytes()),
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(identity.id.clone()));
        }
        Ok(())
    }

    /// Delete by id. Fails with `NotFound` if absent.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.db.lock();

        let changed = conn.execute("DELETE FROM identities WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Bind a template to a pre-existing record, overwriting any prior one.
    pub fn set_template(&self, id: &str, template: &Template) -> Result<(), StoreError> {
        let conn = self.db.lock();

        let changed = conn.execute(
            "UPDATE identities SET template = ?2, enrolled_at = ?3 WHERE id = ?1",
            params![id, template.as_bytes(), Utc::now().to_rfc3339()],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Identity>, StoreError> {
        let conn = self.db.lock();

        let identity = conn
            .query_row(
                "SELECT id, display_name, role, template FROM identities WHERE id = ?1",
                params![id],
                row_to_identity,
            )
            .optional()?;

        Ok(identity)
    }

    /// Snapshot of the whole roster, in stable id order. The matcher's
    /// first-wins tie-break relies on this order being deterministic.
    pub fn lookup_all(&self) -> Result<Vec<Identity>, StoreError> {
        let conn = self.db.lock();

        let mut stmt = conn.prepare(
            "SELECT id, display_name, role, template FROM identities ORDER BY id",
        )?;

        let identities = stmt
            .query_map([], row_to_identity)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(identities)
    }

    pub fn by_role(&self, role: Role) -> Result<Vec<Identity>, StoreError> {
        let conn = self.db.lock();

        let mut stmt = conn.prepare(
            "SELECT id, display_name, role, template FROM identities
             WHERE role = ?1 ORDER BY id",
        )?;

        let identities = stmt
            .query_map(params![role.as_str()], row_to_identity)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(identities)
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identity> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).ok_or(rusqlite::Error::InvalidQuery)?;
    let template: Option<Vec<u8>> = row.get(3)?;

    Ok(Identity {
        id: row.get(0)?,
        display_name: row.get(1)?,
        role,
        template: template.map(Template::from_bytes),
    })
}
