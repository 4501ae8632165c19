//! State store integration tests
//!
//! Covers schema creation, CRUD, the violation idempotency invariant,
//! forward-only status transitions, and watermark behavior.

use tempfile::TempDir;

use stakewatch::models::{Group, Member, Rule, RuleConfig, RuleKind, ViolationStatus};
use stakewatch::store::violations::NewViolation;
use stakewatch::store::Store;

fn group(id: &str) -> Group {
    Group {
        id: id.to_string(),
        name: format!("Group {id}"),
        creator: "0xabc".to_string(),
        invite_code: format!("invite-{id}"),
        entry_stake: 0.01,
        created_at: 1_700_000_000_000,
        is_active: true,
    }
}

fn member(id: &str, group_id: &str) -> Member {
    Member {
        id: id.to_string(),
        group_id: group_id.to_string(),
        external_id: Some("alice".to_string()),
        handle: Some("alice".to_string()),
        display_name: "Alice".to_string(),
        avatar_url: None,
        joined_at: 1_700_000_000_000,
        is_active: true,
    }
}

fn word_ban_rule(id: &str, group_id: &str) -> Rule {
    Rule {
        id: id.to_string(),
        group_id: group_id.to_string(),
        kind: RuleKind::WordBan,
        label: "no swearing".to_string(),
        config: RuleConfig {
            banned_terms: vec!["dang".to_string()],
            ..Default::default()
        },
        penalty: 0.002,
        is_active: true,
    }
}

fn violation(id: &str, post: Option<&str>, detected_at: i64) -> NewViolation {
    NewViolation {
        id: id.to_string(),
        group_id: "g1".to_string(),
        member_id: "m1".to_string(),
        rule_id: "r1".to_string(),
        source_post_id: post.map(|p| p.to_string()),
        source_post_text: post.map(|_| "oh dang".to_string()),
        detail: "Banned terms found: dang".to_string(),
        detected_at,
    }
}

/// Seed one group with one member and one word-ban rule
fn seeded_store() -> Store {
    let store = Store::open_in_memory().unwrap();
    store.create_group(&group("g1")).unwrap();
    store.add_member(&member("m1", "g1")).unwrap();
    store.add_rule(&word_ban_rule("r1", "g1")).unwrap();
    store
}

#[test]
fn open_on_disk_persists_across_reopen() {
    let dir = TempDir::new().unwrap();

    {
        let store = Store::open(dir.path()).unwrap();
        store.create_group(&group("g1")).unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let loaded = store.get_group("g1").unwrap().unwrap();
    assert_eq!(loaded.name, "Group g1");
    assert!(loaded.is_active);
}

#[test]
fn active_groups_excludes_disbanded() {
    let store = Store::open_in_memory().unwrap();
    store.create_group(&group("g1")).unwrap();
    store.create_group(&group("g2")).unwrap();

    assert!(store.deactivate_group("g1").unwrap());
    assert!(!store.deactivate_group("missing").unwrap());

    let active = store.active_groups().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "g2");

    // Disbanded groups stay readable, never hard-deleted
    assert!(store.get_group("g1").unwrap().is_some());
}

#[test]
fn duplicate_invite_code_is_rejected() {
    let store = Store::open_in_memory().unwrap();
    store.create_group(&group("g1")).unwrap();

    let mut dup = group("g2");
    dup.invite_code = "invite-g1".to_string();
    assert!(store.create_group(&dup).is_err());
}

#[test]
fn rules_round_trip_with_config_json() {
    let store = seeded_store();

    let rules = store.group_rules("g1").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].kind, RuleKind::WordBan);
    assert_eq!(rules[0].config.banned_terms, vec!["dang"]);

    assert!(store.deactivate_rule("r1").unwrap());
    assert!(store.group_rules("g1").unwrap().is_empty());
}

#[test]
fn unknown_rule_kind_is_skipped_not_fatal() {
    let store = seeded_store();

    // A row written by a future version with a kind this build doesn't know
    store
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO rules (id, group_id, kind, label, config, penalty)
                 VALUES ('r-future', 'g1', 'sentiment', 'be nice', '{}', 0.001)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let rules = store.group_rules("g1").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "r1");
}

#[test]
fn malformed_rule_config_is_skipped_not_fatal() {
    let store = seeded_store();

    store
        .with_conn(|conn| {
            conn.execute(
                "INSERT INTO rules (id, group_id, kind, label, config, penalty)
                 VALUES ('r-broken', 'g1', 'word_ban', 'broken', 'not json', 0.001)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

    let rules = store.group_rules("g1").unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "r1");
}

#[test]
fn post_scoped_violation_is_inserted_exactly_once() {
    let store = seeded_store();

    assert!(store
        .insert_violation(&violation("v1", Some("p1"), 1_700_000_100_000), None)
        .unwrap());

    // Same (member, rule, post) replayed: suppressed, not an error
    assert!(!store
        .insert_violation(&violation("v2", Some("p1"), 1_700_000_200_000), None)
        .unwrap());

    // Different post: new row
    assert!(store
        .insert_violation(&violation("v3", Some("p2"), 1_700_000_200_000), None)
        .unwrap());

    let rows = store.group_violations("g1", None).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn quota_violation_is_unique_per_unresolved_window() {
    let store = seeded_store();
    let now = 1_700_000_000_000i64;
    let window_start = now - 168 * 3_600_000;

    assert!(store
        .insert_violation(&violation("v1", None, now), Some(window_start))
        .unwrap());

    // Unresolved violation inside the window: suppressed
    assert!(!store
        .insert_violation(&violation("v2", None, now + 60_000), Some(window_start))
        .unwrap());

    // Once settled, a fresh quota violation may be recorded
    assert!(store
        .update_violation_status("v1", ViolationStatus::Applied, Some("0xsettle"))
        .unwrap());
    assert!(store
        .insert_violation(&violation("v3", None, now + 120_000), Some(window_start))
        .unwrap());
}

#[test]
fn quota_violation_outside_window_is_new() {
    let store = seeded_store();
    let now = 1_700_000_000_000i64;
    let week = 168 * 3_600_000i64;

    assert!(store
        .insert_violation(&violation("v1", None, now), Some(now - week))
        .unwrap());

    // A scan one window later no longer sees the old row as unresolved-in-window
    let later = now + week + 1;
    assert!(store
        .insert_violation(&violation("v2", None, later), Some(later - week))
        .unwrap());
}

#[test]
fn status_transitions_are_forward_only() {
    let store = seeded_store();
    store
        .insert_violation(&violation("v1", Some("p1"), 1_700_000_000_000), None)
        .unwrap();

    // pending -> approved -> applied
    assert!(store
        .update_violation_status("v1", ViolationStatus::Approved, None)
        .unwrap());
    assert!(store
        .update_violation_status("v1", ViolationStatus::Applied, Some("0xtx"))
        .unwrap());

    let row = store.get_violation("v1").unwrap().unwrap();
    assert_eq!(row.status, ViolationStatus::Applied);
    assert_eq!(row.settlement_ref.as_deref(), Some("0xtx"));

    // Backward and repeated transitions are ignored
    assert!(!store
        .update_violation_status("v1", ViolationStatus::Pending, None)
        .unwrap());
    assert!(!store
        .update_violation_status("v1", ViolationStatus::Applied, None)
        .unwrap());
    let row = store.get_violation("v1").unwrap().unwrap();
    assert_eq!(row.status, ViolationStatus::Applied);
    assert_eq!(row.settlement_ref.as_deref(), Some("0xtx"));
}

#[test]
fn approved_may_be_skipped() {
    let store = seeded_store();
    store
        .insert_violation(&violation("v1", Some("p1"), 1_700_000_000_000), None)
        .unwrap();

    assert!(store
        .update_violation_status("v1", ViolationStatus::Applied, Some("0xtx"))
        .unwrap());
    let row = store.get_violation("v1").unwrap().unwrap();
    assert_eq!(row.status, ViolationStatus::Applied);
}

#[test]
fn unknown_violation_status_update_is_not_found() {
    let store = seeded_store();
    assert!(store
        .update_violation_status("missing", ViolationStatus::Approved, None)
        .is_err());
}

#[test]
fn violations_filter_by_status() {
    let store = seeded_store();
    store
        .insert_violation(&violation("v1", Some("p1"), 1_700_000_000_000), None)
        .unwrap();
    store
        .insert_violation(&violation("v2", Some("p2"), 1_700_000_100_000), None)
        .unwrap();
    store
        .update_violation_status("v1", ViolationStatus::Approved, None)
        .unwrap();

    let pending = store
        .group_violations("g1", Some(ViolationStatus::Pending))
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "v2");

    let all = store.group_violations("g1", None).unwrap();
    assert_eq!(all.len(), 2);
    // Newest first
    assert_eq!(all[0].id, "v2");
}

#[test]
fn watermark_set_and_replace() {
    let store = seeded_store();

    assert_eq!(store.watermark("g1").unwrap(), None);

    store.set_watermark("g1", 1_700_000_000_000).unwrap();
    assert_eq!(store.watermark("g1").unwrap(), Some(1_700_000_000_000));

    store.set_watermark("g1", 1_700_000_500_000).unwrap();
    assert_eq!(store.watermark("g1").unwrap(), Some(1_700_000_500_000));
}
