//! Monitoring state store - SQLite persistence
//!
//! Owns the five relations the monitor works against: groups, members,
//! rules, violations, watermarks. Violation inserts are uniqueness-checked
//! (see `violations::insert_violation`); that read-check-then-write is sound
//! because the monitor guarantees a single active scan per group.

pub mod groups;
pub mod schema;
pub mod violations;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{Group, Member, Rule, Violation, ViolationStatus};
use violations::NewViolation;

/// SQLite-backed state store
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database under the data directory
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join("stakewatch.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)?;

        // WAL for better concurrent read behavior
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(schema::init_schema)?;

        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(schema::init_schema)?;

        Ok(store)
    }

    /// Run a closure with the connection held
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("connection lock poisoned: {e}")))?;
        f(&conn)
    }

    // === Groups, members, rules ===

    pub fn create_group(&self, group: &Group) -> Result<()> {
        self.with_conn(|conn| groups::create_group(conn, group))
    }

    pub fn get_group(&self, id: &str) -> Result<Option<Group>> {
        self.with_conn(|conn| groups::get_group(conn, id))
    }

    pub fn active_groups(&self) -> Result<Vec<Group>> {
        self.with_conn(groups::active_groups)
    }

    pub fn deactivate_group(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| groups::deactivate_group(conn, id))
    }

    pub fn add_member(&self, member: &Member) -> Result<()> {
        self.with_conn(|conn| groups::add_member(conn, member))
    }

    pub fn group_members(&self, group_id: &str) -> Result<Vec<Member>> {
        self.with_conn(|conn| groups::group_members(conn, group_id))
    }

    pub fn add_rule(&self, rule: &Rule) -> Result<()> {
        self.with_conn(|conn| groups::add_rule(conn, rule))
    }

    pub fn group_rules(&self, group_id: &str) -> Result<Vec<Rule>> {
        self.with_conn(|conn| groups::group_rules(conn, group_id))
    }

    pub fn deactivate_rule(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| groups::deactivate_rule(conn, id))
    }

    // === Violations ===

    /// Insert a violation if no duplicate exists; returns whether a row was
    /// written. For quota violations `unresolved_window_start` bounds the
    /// "one unresolved violation per rolling window" check.
    pub fn insert_violation(
        &self,
        violation: &NewViolation,
        unresolved_window_start: Option<i64>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            violations::insert_violation(conn, violation, unresolved_window_start)
        })
    }

    pub fn get_violation(&self, id: &str) -> Result<Option<Violation>> {
        self.with_conn(|conn| violations::get_violation(conn, id))
    }

    pub fn group_violations(
        &self,
        group_id: &str,
        status: Option<ViolationStatus>,
    ) -> Result<Vec<Violation>> {
        self.with_conn(|conn| violations::group_violations(conn, group_id, status))
    }

    /// Forward-only status transition; returns false when the transition
    /// would move backward and was ignored.
    pub fn update_violation_status(
        &self,
        id: &str,
        status: ViolationStatus,
        settlement_ref: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| violations::update_status(conn, id, status, settlement_ref))
    }

    // === Watermarks ===

    pub fn watermark(&self, group_id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| violations::get_watermark(conn, group_id))
    }

    pub fn set_watermark(&self, group_id: &str, last_scan_at: i64) -> Result<()> {
        self.with_conn(|conn| violations::set_watermark(conn, group_id, last_scan_at))
    }
}
