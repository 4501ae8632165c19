//! Violation and watermark persistence
//!
//! Violation inserts enforce the idempotency invariant: one row per
//! (member, rule, post) for post-scoped rules, and at most one unresolved
//! row per (member, rule, rolling window) for quota rules.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::Result;
use crate::models::{Violation, ViolationStatus};

/// A violation about to be persisted
#[derive(Debug, Clone)]
pub struct NewViolation {
    pub id: String,
    pub group_id: String,
    pub member_id: String,
    pub rule_id: String,
    pub source_post_id: Option<String>,
    pub source_post_text: Option<String>,
    pub detail: String,
    pub detected_at: i64,
}

fn violation_from_row(row: &Row) -> std::result::Result<Violation, rusqlite::Error> {
    let status_raw: String = row.get("status")?;
    Ok(Violation {
        id: row.get("id")?,
        group_id: row.get("group_id")?,
        member_id: row.get("member_id")?,
        rule_id: row.get("rule_id")?,
        source_post_id: row.get("source_post_id")?,
        source_post_text: row.get("source_post_text")?,
        detail: row.get("detail")?,
        detected_at: row.get("detected_at")?,
        status: ViolationStatus::parse(&status_raw).unwrap_or(ViolationStatus::Pending),
        settlement_ref: row.get("settlement_ref")?,
    })
}

/// Insert a violation unless a duplicate already exists.
///
/// Returns whether a row was written. Duplicate suppression is silent; the
/// caller publishes notifications only for genuinely new rows.
pub fn insert_violation(
    conn: &Connection,
    violation: &NewViolation,
    unresolved_window_start: Option<i64>,
) -> Result<bool> {
    let duplicate = match &violation.source_post_id {
        Some(post_id) => {
            // Post-scoped: one violation per (member, rule, post), ever
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM violations
                    WHERE member_id = ? AND rule_id = ? AND source_post_id = ?
                 )",
                params![violation.member_id, violation.rule_id, post_id],
                |row| row.get::<_, i64>(0),
            )? != 0
        }
        None => {
            // Quota: one unresolved violation per (member, rule, window)
            let window_start = unresolved_window_start.unwrap_or(0);
            conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM violations
                    WHERE member_id = ? AND rule_id = ?
                      AND source_post_id IS NULL
                      AND status IN ('pending', 'approved')
                      AND detected_at >= ?
                 )",
                params![violation.member_id, violation.rule_id, window_start],
                |row| row.get::<_, i64>(0),
            )? != 0
        }
    };

    if duplicate {
        debug!(
            member_id = %violation.member_id,
            rule_id = %violation.rule_id,
            "Suppressing duplicate violation"
        );
        return Ok(false);
    }

    // OR IGNORE backstops the partial unique index on (member, rule, post)
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO violations
         (id, group_id, member_id, rule_id, source_post_id, source_post_text, detail, detected_at, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
        params![
            violation.id,
            violation.group_id,
            violation.member_id,
            violation.rule_id,
            violation.source_post_id,
            violation.source_post_text,
            violation.detail,
            violation.detected_at,
        ],
    )?;

    Ok(inserted > 0)
}

pub fn get_violation(conn: &Connection, id: &str) -> Result<Option<Violation>> {
    let violation = conn
        .query_row(
            "SELECT * FROM violations WHERE id = ?",
            params![id],
            violation_from_row,
        )
        .optional()?;
    Ok(violation)
}

pub fn group_violations(
    conn: &Connection,
    group_id: &str,
    status: Option<ViolationStatus>,
) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();

    match status {
        Some(status) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM violations WHERE group_id = ? AND status = ?
                 ORDER BY detected_at DESC",
            )?;
            let rows = stmt.query_map(params![group_id, status.as_str()], violation_from_row)?;
            for row in rows {
                violations.push(row?);
            }
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT * FROM violations WHERE group_id = ? ORDER BY detected_at DESC")?;
            let rows = stmt.query_map(params![group_id], violation_from_row)?;
            for row in rows {
                violations.push(row?);
            }
        }
    }

    Ok(violations)
}

/// Apply a forward-only status transition.
///
/// A transition that would move the status backward (or re-apply the same
/// status) is ignored and reported as `Ok(false)`, not an error.
pub fn update_status(
    conn: &Connection,
    id: &str,
    status: ViolationStatus,
    settlement_ref: Option<&str>,
) -> Result<bool> {
    let current = get_violation(conn, id)?
        .ok_or_else(|| crate::error::Error::NotFound(format!("violation {id}")))?;

    if status.rank() <= current.status.rank() {
        debug!(
            violation_id = %id,
            from = current.status.as_str(),
            to = status.as_str(),
            "Ignoring non-forward status transition"
        );
        return Ok(false);
    }

    conn.execute(
        "UPDATE violations SET status = ?, settlement_ref = COALESCE(?, settlement_ref) WHERE id = ?",
        params![status.as_str(), settlement_ref, id],
    )?;

    Ok(true)
}

// === Watermarks ===

pub fn get_watermark(conn: &Connection, group_id: &str) -> Result<Option<i64>> {
    let watermark = conn
        .query_row(
            "SELECT last_scan_at FROM watermarks WHERE group_id = ?",
            params![group_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(watermark)
}

pub fn set_watermark(conn: &Connection, group_id: &str, last_scan_at: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO watermarks (group_id, last_scan_at) VALUES (?, ?)",
        params![group_id, last_scan_at],
    )?;
    Ok(())
}
