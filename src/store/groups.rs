//! Group, member, and rule persistence

use rusqlite::{params, Connection, Row};
use tracing::warn;

use crate::error::Result;
use crate::models::{Group, Member, Rule, RuleConfig, RuleKind};

fn group_from_row(row: &Row) -> std::result::Result<Group, rusqlite::Error> {
    Ok(Group {
        id: row.get("id")?,
        name: row.get("name")?,
        creator: row.get("creator")?,
        invite_code: row.get("invite_code")?,
        entry_stake: row.get("entry_stake")?,
        created_at: row.get("created_at")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

fn member_from_row(row: &Row) -> std::result::Result<Member, rusqlite::Error> {
    Ok(Member {
        id: row.get("id")?,
        group_id: row.get("group_id")?,
        external_id: row.get("external_id")?,
        handle: row.get("handle")?,
        display_name: row.get("display_name")?,
        avatar_url: row.get("avatar_url")?,
        joined_at: row.get("joined_at")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
    })
}

pub fn create_group(conn: &Connection, group: &Group) -> Result<()> {
    conn.execute(
        "INSERT INTO groups (id, name, creator, invite_code, entry_stake, created_at, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            group.id,
            group.name,
            group.creator,
            group.invite_code,
            group.entry_stake,
            group.created_at,
            group.is_active as i64,
        ],
    )?;
    Ok(())
}

pub fn get_group(conn: &Connection, id: &str) -> Result<Option<Group>> {
    let mut stmt = conn.prepare("SELECT * FROM groups WHERE id = ?")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(group_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn active_groups(conn: &Connection) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare("SELECT * FROM groups WHERE is_active = 1 ORDER BY created_at")?;
    let groups = stmt
        .query_map([], group_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(groups)
}

/// Deactivate a group; groups are never hard-deleted
pub fn deactivate_group(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("UPDATE groups SET is_active = 0 WHERE id = ?", params![id])?;
    Ok(changed > 0)
}

pub fn add_member(conn: &Connection, member: &Member) -> Result<()> {
    conn.execute(
        "INSERT INTO members (id, group_id, external_id, handle, display_name, avatar_url, joined_at, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            member.id,
            member.group_id,
            member.external_id,
            member.handle,
            member.display_name,
            member.avatar_url,
            member.joined_at,
            member.is_active as i64,
        ],
    )?;
    Ok(())
}

pub fn group_members(conn: &Connection, group_id: &str) -> Result<Vec<Member>> {
    let mut stmt = conn
        .prepare("SELECT * FROM members WHERE group_id = ? AND is_active = 1 ORDER BY joined_at")?;
    let members = stmt
        .query_map(params![group_id], member_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(members)
}

pub fn add_rule(conn: &Connection, rule: &Rule) -> Result<()> {
    let config = serde_json::to_string(&rule.config)?;
    conn.execute(
        "INSERT INTO rules (id, group_id, kind, label, config, penalty, is_active)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            rule.id,
            rule.group_id,
            rule.kind.as_str(),
            rule.label,
            config,
            rule.penalty,
            rule.is_active as i64,
        ],
    )?;
    Ok(())
}

/// Load a group's active rules.
///
/// Rows with an unknown kind or unparseable config are logged and skipped;
/// a misconfigured rule must not abort evaluation of the others.
pub fn group_rules(conn: &Connection, group_id: &str) -> Result<Vec<Rule>> {
    let mut stmt =
        conn.prepare("SELECT * FROM rules WHERE group_id = ? AND is_active = 1 ORDER BY id")?;

    let mut rules = Vec::new();
    let mut rows = stmt.query(params![group_id])?;
    while let Some(row) = rows.next()? {
        let id: String = row.get("id")?;
        let kind_raw: String = row.get("kind")?;

        let Some(kind) = RuleKind::parse(&kind_raw) else {
            warn!(rule_id = %id, kind = %kind_raw, "Skipping rule of unknown kind");
            continue;
        };

        let config_raw: String = row.get("config")?;
        let config: RuleConfig = match serde_json::from_str(&config_raw) {
            Ok(config) => config,
            Err(e) => {
                warn!(rule_id = %id, error = %e, "Skipping rule with unparseable config");
                continue;
            }
        };

        rules.push(Rule {
            id,
            group_id: row.get("group_id")?,
            kind,
            label: row.get("label")?,
            config,
            penalty: row.get("penalty")?,
            is_active: true,
        });
    }

    Ok(rules)
}

/// Deactivate a rule; rules are immutable once created except for this
pub fn deactivate_rule(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("UPDATE rules SET is_active = 0 WHERE id = ?", params![id])?;
    Ok(changed > 0)
}
