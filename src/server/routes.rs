//! API route handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SharedState;
use crate::error::{Error, Result};
use crate::models::{
    now_millis, Group, Member, Rule, RuleConfig, RuleKind, Violation, ViolationStatus,
};
use crate::monitor::ScanSummary;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

// === Group registration ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub joined_at: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInput {
    #[serde(default)]
    pub id: Option<String>,
    pub kind: RuleKind,
    pub label: String,
    #[serde(default)]
    pub config: RuleConfig,
    pub penalty: f64,
}

/// POST /api/groups request body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterGroupRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub creator: String,
    #[serde(default)]
    pub invite_code: Option<String>,
    pub entry_stake: f64,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub members: Vec<MemberInput>,
    #[serde(default)]
    pub rules: Vec<RuleInput>,
}

#[derive(Serialize)]
pub struct RegisterGroupResponse {
    pub group: Group,
    pub members: usize,
    pub rules: usize,
}

/// POST /api/groups - register a group with inline members and rules
pub async fn register_group(
    State(state): State<SharedState>,
    Json(req): Json<RegisterGroupRequest>,
) -> Result<Json<RegisterGroupResponse>> {
    if req.name.trim().is_empty() {
        return Err(Error::Config("group name must not be empty".to_string()));
    }

    let now = now_millis();
    let group = Group {
        id: req.id.unwrap_or_else(|| format!("grp-{}", Uuid::new_v4())),
        name: req.name,
        creator: req.creator,
        invite_code: req
            .invite_code
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()[..8].to_string()),
        entry_stake: req.entry_stake,
        created_at: req.created_at.unwrap_or(now),
        is_active: true,
    };
    state.store.create_group(&group)?;

    let member_count = req.members.len();
    for input in req.members {
        let member = Member {
            id: input.id.unwrap_or_else(|| format!("mem-{}", Uuid::new_v4())),
            group_id: group.id.clone(),
            external_id: input.external_id,
            handle: input.handle.map(|h| h.trim_start_matches('@').to_string()),
            display_name: input.display_name,
            avatar_url: input.avatar_url,
            joined_at: input.joined_at.unwrap_or(now),
            is_active: true,
        };
        state.store.add_member(&member)?;
    }

    let rule_count = req.rules.len();
    for input in req.rules {
        let rule = Rule {
            id: input.id.unwrap_or_else(|| format!("rule-{}", Uuid::new_v4())),
            group_id: group.id.clone(),
            kind: input.kind,
            label: input.label,
            config: input.config,
            penalty: input.penalty,
            is_active: true,
        };
        state.store.add_rule(&rule)?;
    }

    tracing::info!(group_id = %group.id, group = %group.name, "Registered group");

    Ok(Json(RegisterGroupResponse {
        group,
        members: member_count,
        rules: rule_count,
    }))
}

// === Group dashboard ===

#[derive(Serialize)]
pub struct GroupDashboard {
    pub group: Group,
    pub members: Vec<Member>,
    pub rules: Vec<Rule>,
    pub violations: Vec<Violation>,
}

/// GET /api/groups/:id
pub async fn group_dashboard(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<GroupDashboard>> {
    let group = state
        .store
        .get_group(&id)?
        .ok_or_else(|| Error::NotFound(format!("group {id}")))?;

    Ok(Json(GroupDashboard {
        members: state.store.group_members(&id)?,
        rules: state.store.group_rules(&id)?,
        violations: state.store.group_violations(&id, None)?,
        group,
    }))
}

#[derive(Deserialize)]
pub struct ViolationFilter {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct ViolationList {
    pub violations: Vec<Violation>,
}

/// GET /api/groups/:id/violations?status=
pub async fn group_violations(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(filter): Query<ViolationFilter>,
) -> Result<Json<ViolationList>> {
    let status = match filter.status.as_deref() {
        Some(raw) => Some(
            ViolationStatus::parse(raw)
                .ok_or_else(|| Error::Config(format!("unknown violation status: {raw}")))?,
        ),
        None => None,
    };

    Ok(Json(ViolationList {
        violations: state.store.group_violations(&id, status)?,
    }))
}

/// POST /api/groups/:id/scan - on-demand scan outside the normal schedule
pub async fn trigger_scan(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ScanSummary>> {
    let summary = state.monitor.trigger_scan(&id).await?;
    Ok(Json(summary))
}

#[derive(Serialize)]
pub struct UpdatedResponse {
    pub updated: bool,
}

/// POST /api/groups/:id/disband - deactivate, never hard-delete
pub async fn disband_group(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UpdatedResponse>> {
    if !state.store.deactivate_group(&id)? {
        return Err(Error::NotFound(format!("group {id}")));
    }
    tracing::info!(group_id = %id, "Group disbanded");
    Ok(Json(UpdatedResponse { updated: true }))
}

// === Violation status transitions ===

/// POST /api/violations/:id/approve
pub async fn approve_violation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UpdatedResponse>> {
    let updated = state
        .store
        .update_violation_status(&id, ViolationStatus::Approved, None)?;
    Ok(Json(UpdatedResponse { updated }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedRequest {
    pub settlement_ref: String,
}

/// POST /api/violations/:id/applied - the external ledger reports a settled
/// penalty back with its settlement reference
pub async fn apply_violation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<AppliedRequest>,
) -> Result<Json<UpdatedResponse>> {
    let updated = state.store.update_violation_status(
        &id,
        ViolationStatus::Applied,
        Some(&req.settlement_ref),
    )?;
    Ok(Json(UpdatedResponse { updated }))
}

/// POST /api/rules/:id/deactivate
pub async fn deactivate_rule(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UpdatedResponse>> {
    if !state.store.deactivate_rule(&id)? {
        return Err(Error::NotFound(format!("rule {id}")));
    }
    Ok(Json(UpdatedResponse { updated: true }))
}
