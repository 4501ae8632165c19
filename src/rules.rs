//! Rule evaluator - stateless scoring of posts against group rules
//!
//! Pure functions only; the monitor loop owns fetching, persistence, and
//! notification. Evaluation never panics on malformed input, it degrades
//! to "not violated" with a diagnostic detail.

use tracing::warn;

use crate::models::{Member, Post, Rule, RuleKind};

/// Result of evaluating one word-ban rule against one post
#[derive(Debug, Clone, PartialEq)]
pub struct WordBanOutcome {
    pub violated: bool,
    pub matched_terms: Vec<String>,
    pub detail: Option<String>,
}

/// Result of evaluating one quota rule against a member's trailing window
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaOutcome {
    pub violated: bool,
    pub actual_count: u32,
    pub required_count: u32,
    pub detail: Option<String>,
}

/// Result of evaluating a custom rule; currently always inert
#[derive(Debug, Clone, PartialEq)]
pub struct CustomOutcome {
    pub violated: bool,
    pub detail: Option<String>,
}

/// A violation surfaced by evaluation, not yet persisted
#[derive(Debug, Clone)]
pub struct Detection {
    pub rule_id: String,
    pub rule_label: String,
    pub penalty: f64,
    pub source_post_id: Option<String>,
    pub source_post_text: Option<String>,
    pub detail: String,
}

/// Default quota window: one week
pub const DEFAULT_QUOTA_WINDOW_HOURS: u32 = 168;

/// Human-readable window length; sub-daily windows are shown in hours
fn window_label(window_hours: u32) -> String {
    if window_hours >= 24 && window_hours % 24 == 0 {
        format!("{} days", window_hours / 24)
    } else {
        format!("{} hours", window_hours)
    }
}

/// Whether `c` is part of a word for boundary purposes
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Case-insensitive whole-word containment check.
///
/// A term must not match as a substring of a longer word: "dang" matches
/// "oh dang" but not "dangerous".
fn contains_whole_word(text_lower: &str, term_lower: &str) -> bool {
    if term_lower.is_empty() {
        return false;
    }

    for (start, matched) in text_lower.match_indices(term_lower) {
        let before_ok = text_lower[..start]
            .chars()
            .next_back()
            .map(|c| !is_word_char(c))
            .unwrap_or(true);
        let after_ok = text_lower[start + matched.len()..]
            .chars()
            .next()
            .map(|c| !is_word_char(c))
            .unwrap_or(true);

        if before_ok && after_ok {
            return true;
        }
    }

    false
}

/// Evaluate one post against a word-ban term list.
///
/// Returns every matched term, not just the first; the caller attaches all
/// matched terms to a single violation record for the post.
pub fn evaluate_word_ban(post_text: &str, banned_terms: &[String]) -> WordBanOutcome {
    if banned_terms.is_empty() {
        return WordBanOutcome {
            violated: false,
            matched_terms: Vec::new(),
            detail: Some("no banned terms configured".to_string()),
        };
    }
    if post_text.is_empty() {
        return WordBanOutcome {
            violated: false,
            matched_terms: Vec::new(),
            detail: None,
        };
    }

    let text_lower = post_text.to_lowercase();
    let matched: Vec<String> = banned_terms
        .iter()
        .filter(|term| contains_whole_word(&text_lower, &term.to_lowercase()))
        .cloned()
        .collect();

    if matched.is_empty() {
        WordBanOutcome {
            violated: false,
            matched_terms: Vec::new(),
            detail: None,
        }
    } else {
        let detail = format!("Banned terms found: {}", matched.join(", "));
        WordBanOutcome {
            violated: true,
            matched_terms: matched,
            detail: Some(detail),
        }
    }
}

/// Evaluate a post-quota rule over a trailing window anchored at `now`.
///
/// Counts posts with a timestamp inside `[now - window, now]`; violated when
/// the count falls short of the minimum.
pub fn evaluate_quota(
    posts_in_window: &[Post],
    minimum_required: u32,
    window_hours: u32,
    now: i64,
) -> QuotaOutcome {
    if minimum_required == 0 {
        return QuotaOutcome {
            violated: false,
            actual_count: posts_in_window.len() as u32,
            required_count: 0,
            detail: Some("quota of zero posts can never be violated".to_string()),
        };
    }

    let window_start = now - (window_hours as i64) * 60 * 60 * 1000;
    let actual_count = posts_in_window
        .iter()
        .filter(|p| p.timestamp >= window_start && p.timestamp <= now)
        .count() as u32;

    let violated = actual_count < minimum_required;
    let detail = violated.then(|| {
        format!(
            "Posted {}/{} required posts in the last {}",
            actual_count,
            minimum_required,
            window_label(window_hours)
        )
    });

    QuotaOutcome {
        violated,
        actual_count,
        required_count: minimum_required,
        detail,
    }
}

/// Reserved extension point; custom rules never flag a violation yet.
pub fn evaluate_custom(_post_text: &str, _config: &crate::models::RuleConfig) -> CustomOutcome {
    CustomOutcome {
        violated: false,
        detail: Some("custom rule checking not yet implemented".to_string()),
    }
}

/// Evaluate all of a group's rules for one member.
///
/// Post-scoped rules (word-ban, custom) run over `fresh_posts` — the posts
/// newer than the group watermark. The quota rule runs once per member over
/// `window_posts`, the member's full recent history, because a quota is a
/// rate over time rather than an event.
pub fn evaluate_member(
    member: &Member,
    fresh_posts: &[Post],
    window_posts: &[Post],
    rules: &[Rule],
    now: i64,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for rule in rules {
        match rule.kind {
            RuleKind::WordBan => {
                for post in fresh_posts {
                    let outcome = evaluate_word_ban(&post.text, &rule.config.banned_terms);
                    if outcome.violated {
                        detections.push(Detection {
                            rule_id: rule.id.clone(),
                            rule_label: rule.label.clone(),
                            penalty: rule.penalty,
                            source_post_id: Some(post.id.clone()),
                            source_post_text: Some(post.text.clone()),
                            detail: outcome.detail.unwrap_or_default(),
                        });
                    }
                }
            }
            RuleKind::PostQuota => {
                let minimum = rule.config.min_posts.unwrap_or(0);
                let window_hours = rule
                    .config
                    .window_hours
                    .unwrap_or(DEFAULT_QUOTA_WINDOW_HOURS);
                let outcome = evaluate_quota(window_posts, minimum, window_hours, now);
                if outcome.violated {
                    detections.push(Detection {
                        rule_id: rule.id.clone(),
                        rule_label: rule.label.clone(),
                        penalty: rule.penalty,
                        source_post_id: None,
                        source_post_text: None,
                        detail: outcome.detail.unwrap_or_default(),
                    });
                }
            }
            RuleKind::Custom => {
                for post in fresh_posts {
                    let outcome = evaluate_custom(&post.text, &rule.config);
                    if outcome.violated {
                        detections.push(Detection {
                            rule_id: rule.id.clone(),
                            rule_label: rule.label.clone(),
                            penalty: rule.penalty,
                            source_post_id: Some(post.id.clone()),
                            source_post_text: Some(post.text.clone()),
                            detail: outcome.detail.unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }

    if !detections.is_empty() {
        warn!(
            member = %member.label(),
            count = detections.len(),
            "Member violations detected"
        );
    }

    detections
}
