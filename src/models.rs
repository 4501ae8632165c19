//! Domain types shared across the store, monitor, and API layers
//!
//! All timestamps are epoch milliseconds (UTC).

use serde::{Deserialize, Serialize};

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A staking circle with shared rules and a pooled penalty amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    /// Wallet or account identifier of the creator
    pub creator: String,
    pub invite_code: String,
    pub entry_stake: f64,
    pub created_at: i64,
    pub is_active: bool,
}

/// A participant in a group, optionally linked to an external social identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub group_id: String,
    /// External social identifier; members without one are never polled
    pub external_id: Option<String>,
    /// Public handle on the social platform
    pub handle: Option<String>,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub joined_at: i64,
    pub is_active: bool,
}

impl Member {
    /// Name used in notifications and logs
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            self.handle.as_deref().unwrap_or(&self.id)
        } else {
            &self.display_name
        }
    }
}

/// Rule kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    WordBan,
    PostQuota,
    Custom,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::WordBan => "word_ban",
            RuleKind::PostQuota => "post_quota",
            RuleKind::Custom => "custom",
        }
    }

    /// Lenient parse; `None` means an unknown kind the caller should skip
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "word_ban" => Some(RuleKind::WordBan),
            "post_quota" => Some(RuleKind::PostQuota),
            "custom" => Some(RuleKind::Custom),
            _ => None,
        }
    }
}

/// Kind-specific rule configuration, stored as a JSON column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Word-ban: terms that must not appear in a post
    #[serde(default)]
    pub banned_terms: Vec<String>,
    /// Post-quota: minimum posts per rolling window
    #[serde(default)]
    pub min_posts: Option<u32>,
    /// Post-quota: window length in hours (default one week)
    #[serde(default)]
    pub window_hours: Option<u32>,
    /// Custom: free-text description
    #[serde(default)]
    pub description: Option<String>,
}

/// A configured condition with an associated penalty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub group_id: String,
    pub kind: RuleKind,
    pub label: String,
    pub config: RuleConfig,
    pub penalty: f64,
    pub is_active: bool,
}

/// Violation status; transitions are forward-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Pending,
    Approved,
    Applied,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationStatus::Pending => "pending",
            ViolationStatus::Approved => "approved",
            ViolationStatus::Applied => "applied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ViolationStatus::Pending),
            "approved" => Some(ViolationStatus::Approved),
            "applied" => Some(ViolationStatus::Applied),
            _ => None,
        }
    }

    /// Ordering rank for the forward-only transition check
    pub fn rank(&self) -> u8 {
        match self {
            ViolationStatus::Pending => 0,
            ViolationStatus::Approved => 1,
            ViolationStatus::Applied => 2,
        }
    }
}

/// A recorded instance of a member breaching a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub group_id: String,
    pub member_id: String,
    pub rule_id: String,
    /// Triggering post reference; quota violations have none
    pub source_post_id: Option<String>,
    pub source_post_text: Option<String>,
    pub detail: String,
    pub detected_at: i64,
    pub status: ViolationStatus,
    /// Ledger reference once a penalty was applied
    pub settlement_ref: Option<String>,
}

/// A normalized post from the external feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub timestamp: i64,
    pub author_id: String,
}

/// Event pushed to subscribers when a violation is recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub violation_id: String,
    pub group_id: String,
    pub group_name: String,
    pub member_id: String,
    pub member_name: String,
    pub rule_id: String,
    pub rule_label: String,
    pub source_post_id: Option<String>,
    pub source_post_text: Option<String>,
    pub detail: String,
    pub penalty: f64,
    pub detected_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_kind_round_trip() {
        for kind in [RuleKind::WordBan, RuleKind::PostQuota, RuleKind::Custom] {
            assert_eq!(RuleKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(RuleKind::parse("sentiment"), None);
    }

    #[test]
    fn status_ordering() {
        assert!(ViolationStatus::Pending.rank() < ViolationStatus::Approved.rank());
        assert!(ViolationStatus::Approved.rank() < ViolationStatus::Applied.rank());
        assert_eq!(ViolationStatus::parse("revoked"), None);
    }

    #[test]
    fn rule_config_accepts_partial_json() {
        let config: RuleConfig =
            serde_json::from_str(r#"{"bannedTerms": ["dang", "heck"]}"#).unwrap();
        assert_eq!(config.banned_terms.len(), 2);
        assert_eq!(config.min_posts, None);
    }
}
