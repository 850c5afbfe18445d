//! Database session handles and the session factory.
//!
//! # Responsibility
//! - Model the closed set of session variants: a dedicated owned
//!   connection vs the shared checkout-slot connection.
//! - Select the variant at construction time so release semantics never
//!   depend on runtime inspection.
//!
//! # Invariants
//! - A `Session` is released exactly once; `release` consumes the handle.
//! - In-memory databases always use the shared slot (a second in-memory
//!   connection would see a different database).
//! - File databases hand out dedicated connections, bootstrapped the same
//!   way as the factory's own.

use crate::db::{init_db, open_db, open_db_in_memory, DbError, DbResult};
use log::{info, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where the database lives. The closed set keeps bootstrap and session
/// selection explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    /// Single-file database on disk.
    File(PathBuf),
    /// In-memory database, shared through the factory's checkout slot.
    InMemory,
}

/// Checkout slot holding the one shared connection.
#[derive(Debug, Default)]
struct SharedSlot {
    conn: Mutex<Option<Connection>>,
}

impl SharedSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        // A poisoned lock only means a panicking thread held it; the slot
        // content is still a plain Option.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take(&self) -> Option<Connection> {
        self.lock().take()
    }

    fn put_back(&self, conn: Connection) {
        *self.lock() = Some(conn);
    }
}

/// How a session must be released, fixed at construction.
enum SessionKind {
    /// Dedicated connection; release closes it.
    Owned,
    /// Checked out of the shared slot; release returns it.
    Shared(Arc<SharedSlot>),
}

/// One database session backing one unit of work.
pub struct Session {
    conn: Connection,
    kind: SessionKind,
}

impl Session {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.kind, SessionKind::Shared(_))
    }

    /// Releases the session using the variant selected at construction.
    ///
    /// Double release cannot occur (the handle is consumed). A close
    /// failure on an owned connection is reported, not swallowed.
    pub fn release(self) -> DbResult<()> {
        match self.kind {
            SessionKind::Owned => self.conn.close().map_err(|(_conn, err)| {
                warn!("event=session_release module=session status=error error={err}");
                DbError::Sqlite(err)
            }),
            SessionKind::Shared(slot) => {
                slot.put_back(self.conn);
                Ok(())
            }
        }
    }
}

/// Cheap-clone factory producing sessions against one configured database.
#[derive(Clone)]
pub struct SessionFactory {
    location: DatabaseLocation,
    shared: Arc<SharedSlot>,
}

impl SessionFactory {
    /// Bootstraps the database and returns a ready factory.
    ///
    /// Runs `init_db` once on a bootstrap connection. For in-memory
    /// databases that connection becomes the shared slot content; for file
    /// databases it is closed and later sessions open their own.
    pub fn initialize(
        location: DatabaseLocation,
        drop_existing: bool,
        load_initial_data: bool,
    ) -> DbResult<Self> {
        let mut conn = match &location {
            DatabaseLocation::File(path) => open_db(path)?,
            DatabaseLocation::InMemory => open_db_in_memory()?,
        };
        init_db(&mut conn, drop_existing, load_initial_data)?;

        let shared = Arc::new(SharedSlot::default());
        match &location {
            DatabaseLocation::File(_) => {
                if let Err((_conn, err)) = conn.close() {
                    return Err(DbError::Sqlite(err));
                }
            }
            DatabaseLocation::InMemory => shared.put_back(conn),
        }

        info!(
            "event=session_factory_init module=session status=ok shared={}",
            matches!(location, DatabaseLocation::InMemory)
        );
        Ok(Self { location, shared })
    }

    /// Produces one session; the caller owns its lifecycle via
    /// `Session::release` (normally through a unit of work).
    pub fn session(&self) -> DbResult<Session> {
        match &self.location {
            DatabaseLocation::File(path) => Ok(Session {
                conn: open_db(path)?,
                kind: SessionKind::Owned,
            }),
            DatabaseLocation::InMemory => {
                let conn = self.shared.take().ok_or(DbError::SharedSessionInUse)?;
                Ok(Session {
                    conn,
                    kind: SessionKind::Shared(Arc::clone(&self.shared)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DatabaseLocation, SessionFactory};
    use crate::db::DbError;

    #[test]
    fn in_memory_sessions_share_one_connection() {
        let factory = SessionFactory::initialize(DatabaseLocation::InMemory, false, false).unwrap();

        let session = factory.session().unwrap();
        assert!(session.is_shared());
        // Second checkout while the first is live must fail.
        assert!(matches!(
            factory.session(),
            Err(DbError::SharedSessionInUse)
        ));

        session.release().unwrap();
        let again = factory.session().unwrap();
        again.release().unwrap();
    }

    #[test]
    fn file_sessions_are_dedicated() {
        let dir = tempfile::tempdir().unwrap();
        let factory = SessionFactory::initialize(
            DatabaseLocation::File(dir.path().join("uat.sqlite3")),
            false,
            false,
        )
        .unwrap();

        let first = factory.session().unwrap();
        let second = factory.session().unwrap();
        assert!(!first.is_shared());
        assert!(!second.is_shared());
        first.release().unwrap();
        second.release().unwrap();
    }
}
