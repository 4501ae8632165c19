//! Group monitor loop
//!
//! Drives the violation-detection pipeline: on every scheduler tick, each
//! active group is scanned — members' recent posts are fetched, filtered to
//! the window past the group watermark, evaluated against the group's rules,
//! and genuinely new violations are persisted and published to the hub.
//!
//! Concurrency contract: a group never has two scans in flight at once. The
//! scheduled tick skips a busy group; a manual trigger gets a conflict
//! error. Different groups may scan concurrently (a manual scan may overlap
//! the scheduled loop working on another group).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::feed::FeedSource;
use crate::models::{now_millis, Group, Post, ViolationEvent};
use crate::notify::Hub;
use crate::rules::{self, DEFAULT_QUOTA_WINDOW_HOURS};
use crate::store::violations::NewViolation;
use crate::store::Store;

/// Outcome of one group scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub group_id: String,
    pub members_scanned: usize,
    pub new_violations: usize,
    /// True when the group had no members or no rules and the scan was a no-op
    pub skipped: bool,
}

impl ScanSummary {
    fn skipped(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            members_scanned: 0,
            new_violations: 0,
            skipped: true,
        }
    }
}

/// Releases the per-group in-flight slot when the scan ends, on any path
struct ScanGuard<'a> {
    monitor: &'a Monitor,
    group_id: String,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.monitor.in_flight.lock() {
            in_flight.remove(&self.group_id);
        }
    }
}

/// The monitor orchestrator
pub struct Monitor {
    config: MonitorConfig,
    /// Posts requested per member per scan
    page_limit: u32,
    store: Arc<Store>,
    feed: Arc<dyn FeedSource>,
    hub: Arc<Hub>,
    /// Group ids with a scan currently running
    in_flight: Mutex<HashSet<String>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        page_limit: u32,
        store: Arc<Store>,
        feed: Arc<dyn FeedSource>,
        hub: Arc<Hub>,
    ) -> Self {
        Self {
            config,
            page_limit,
            store,
            feed,
            hub,
            in_flight: Mutex::new(HashSet::new()),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Run the scheduled loop until `stop` is called.
    ///
    /// The first tick fires immediately, then every `poll_interval_secs`.
    /// No tick error escapes this loop; the scheduler keeps ticking until
    /// explicitly stopped.
    pub async fn run(&self) {
        if !self.config.enabled {
            info!("Monitor loop is disabled, not starting");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        if let Ok(mut slot) = self.shutdown_tx.lock() {
            *slot = Some(shutdown_tx);
        }

        info!(
            interval_secs = self.config.poll_interval_secs,
            "Monitor loop started"
        );

        let mut tick = interval(self.config.poll_interval());

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Monitor loop shutting down");
                    break;
                }
            }
        }
    }

    /// Stop the scheduled loop
    pub async fn stop(&self) {
        let tx = self
            .shutdown_tx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(tx) = tx {
            let _ = tx.send(()).await;
        }
    }

    /// Scan every active group once, sequentially with a small delay between
    /// groups to respect upstream rate limits.
    async fn tick(&self) {
        let groups = match self.store.active_groups() {
            Ok(groups) => groups,
            Err(e) => {
                error!(error = %e, "Failed to load active groups, skipping tick");
                return;
            }
        };

        debug!(count = groups.len(), "Tick: scanning active groups");

        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.inter_group_delay_ms)).await;
            }

            match self.scan_group(group).await {
                Ok(summary) if summary.skipped => {
                    debug!(group_id = %group.id, "Group skipped (no members or rules)");
                }
                Ok(summary) => {
                    debug!(
                        group_id = %group.id,
                        members = summary.members_scanned,
                        new_violations = summary.new_violations,
                        "Group scan complete"
                    );
                }
                Err(Error::ScanInFlight(_)) => {
                    debug!(group_id = %group.id, "Previous scan still running, skipping");
                }
                Err(e) => {
                    // Group-fatal: this group's watermark stays put and the
                    // next tick re-scans the same window
                    error!(group_id = %group.id, error = %e, "Group scan failed");
                }
            }
        }
    }

    /// On-demand scan of a single group, honoring the same per-group
    /// exclusivity as the scheduled loop.
    pub async fn trigger_scan(&self, group_id: &str) -> Result<ScanSummary> {
        let group = self
            .store
            .get_group(group_id)?
            .ok_or_else(|| Error::NotFound(format!("group {group_id}")))?;

        if !group.is_active {
            return Err(Error::NotFound(format!("group {group_id} is not active")));
        }

        self.scan_group(&group).await
    }

    /// Scan one group; fails with `ScanInFlight` when a scan is running.
    pub async fn scan_group(&self, group: &Group) -> Result<ScanSummary> {
        let _guard = self.try_begin(&group.id)?;
        self.scan_inner(group).await
    }

    /// Claim the in-flight slot for a group
    fn try_begin(&self, group_id: &str) -> Result<ScanGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|e| Error::Internal(format!("in-flight lock poisoned: {e}")))?;

        if !in_flight.insert(group_id.to_string()) {
            return Err(Error::ScanInFlight(group_id.to_string()));
        }

        Ok(ScanGuard {
            monitor: self,
            group_id: group_id.to_string(),
        })
    }

    async fn scan_inner(&self, group: &Group) -> Result<ScanSummary> {
        let scan_started_at = now_millis();

        let members = self.store.group_members(&group.id)?;
        let rules = self.store.group_rules(&group.id)?;

        if members.is_empty() || rules.is_empty() {
            return Ok(ScanSummary::skipped(&group.id));
        }

        // First-run bootstrap: look back a bounded window, not full history
        let watermark = match self.store.watermark(&group.id)? {
            Some(watermark) => watermark,
            None => scan_started_at - (self.config.bootstrap_window_hours as i64) * 3_600_000,
        };

        info!(
            group_id = %group.id,
            group = %group.name,
            members = members.len(),
            rules = rules.len(),
            "Scanning group"
        );

        let mut members_scanned = 0;
        let mut new_violations = 0;

        for member in &members {
            let Some(external_id) = &member.external_id else {
                debug!(member = %member.label(), "Member has no external id, not polled");
                continue;
            };

            // Upstream-transient: one member's fetch failure must not abort
            // the scan for the rest of the group
            let posts = match self.feed.fetch_recent(external_id, self.page_limit).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(
                        member = %member.label(),
                        error = %e,
                        "Feed fetch failed, skipping member until next tick"
                    );
                    continue;
                }
            };
            members_scanned += 1;

            // Post-scoped rules see only posts past the watermark; quota
            // rules see the full recent page (a rate over time, not an event)
            let fresh: Vec<Post> = posts
                .iter()
                .filter(|p| p.timestamp > watermark)
                .cloned()
                .collect();

            debug!(
                member = %member.label(),
                fresh = fresh.len(),
                total = posts.len(),
                "Fetched member posts"
            );

            let detections = rules::evaluate_member(member, &fresh, &posts, &rules, scan_started_at);

            for detection in detections {
                // Quota dedupe is bounded by the rule's rolling window
                let window_start = detection.source_post_id.is_none().then(|| {
                    let hours = rules
                        .iter()
                        .find(|r| r.id == detection.rule_id)
                        .and_then(|r| r.config.window_hours)
                        .unwrap_or(DEFAULT_QUOTA_WINDOW_HOURS);
                    scan_started_at - (hours as i64) * 3_600_000
                });

                let violation = NewViolation {
                    id: format!("vio-{}", Uuid::new_v4()),
                    group_id: group.id.clone(),
                    member_id: member.id.clone(),
                    rule_id: detection.rule_id.clone(),
                    source_post_id: detection.source_post_id.clone(),
                    source_post_text: detection.source_post_text.clone(),
                    detail: detection.detail.clone(),
                    detected_at: scan_started_at,
                };

                if self.store.insert_violation(&violation, window_start)? {
                    new_violations += 1;
                    info!(
                        group_id = %group.id,
                        member = %member.label(),
                        rule = %detection.rule_label,
                        detail = %detection.detail,
                        "Violation recorded"
                    );

                    let event = ViolationEvent {
                        violation_id: violation.id,
                        group_id: group.id.clone(),
                        group_name: group.name.clone(),
                        member_id: member.id.clone(),
                        member_name: member.label().to_string(),
                        rule_id: detection.rule_id,
                        rule_label: detection.rule_label,
                        source_post_id: detection.source_post_id,
                        source_post_text: detection.source_post_text,
                        detail: detection.detail,
                        penalty: detection.penalty,
                        detected_at: scan_started_at,
                    };
                    self.hub.publish(&group.id, event).await;
                }
            }
        }

        // Advance only after the whole group processed without a fatal
        // error; anchored at scan start so mid-scan posts land next tick
        self.store.set_watermark(&group.id, scan_started_at)?;

        Ok(ScanSummary {
            group_id: group.id.clone(),
            members_scanned,
            new_violations,
            skipped: false,
        })
    }
}
