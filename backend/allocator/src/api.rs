//! Axum REST API handlers.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! { "success": bool, "message": string, "data": object }
//! ```
//!
//! Validation failures carry their own message and an empty `data`.
//! Every other failure collapses to `"error: something went wrong"` with
//! the machine-readable cause in `data`.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::db;
use crate::distribution::MerkleDistribution;
use crate::errors::{AllocatorError, Result};
use crate::service::Allocator;
use crate::types::ProjectId;

pub const MISSING_SUMMARY_PARAMS: &str = "error: missing parameter chainId, roundId, or projectId";
pub const GENERIC_FAILURE: &str = "error: something went wrong";

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub allocator: Allocator,
}

// ─────────────────────────────────────────────────────────
// Response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    pub data: Value,
}

impl ApiResponse {
    fn ok(message: &str, data: impl Serialize) -> (StatusCode, Self) {
        match serde_json::to_value(data) {
            Ok(data) => (
                StatusCode::OK,
                ApiResponse {
                    success: true,
                    message: message.to_string(),
                    data,
                },
            ),
            Err(e) => Self::failure(&AllocatorError::Json(e)),
        }
    }

    fn failure(err: &AllocatorError) -> (StatusCode, Self) {
        if let AllocatorError::Validation(_) = err {
            return (
                StatusCode::BAD_REQUEST,
                ApiResponse {
                    success: false,
                    message: err.cause(),
                    data: json!({}),
                },
            );
        }

        let status = match err {
            AllocatorError::NotFound(_) => StatusCode::NOT_FOUND,
            AllocatorError::InvalidTransition(_) => StatusCode::CONFLICT,
            AllocatorError::UnsupportedStrategy(_) => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_computation() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {err}");
        }
        (
            status,
            ApiResponse {
                success: false,
                message: GENERIC_FAILURE.to_string(),
                data: Value::String(err.cause()),
            },
        )
    }

    fn from_result<T: Serialize>(message: &str, result: Result<T>) -> (StatusCode, Self) {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(e) => Self::failure(&e),
        }
    }
}

fn respond((status, body): (StatusCode, ApiResponse)) -> Response {
    (status, Json(body)).into_response()
}

// ─────────────────────────────────────────────────────────
// Parameter parsing
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    pub chain_id: Option<String>,
    pub round_id: Option<String>,
    pub project_id: Option<String>,
}

fn present(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_chain_id(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| AllocatorError::Validation(format!("invalid chainId {raw:?}")))
}

fn parse_index(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| AllocatorError::Validation(format!("invalid index {raw:?}")))
}

// ─────────────────────────────────────────────────────────
// Handler bodies (transport-free, used by tests)
// ─────────────────────────────────────────────────────────

pub async fn project_summary_response(
    allocator: &Allocator,
    params: &SummaryParams,
) -> (StatusCode, ApiResponse) {
    let (Some(chain_id), Some(round_id), Some(project_id)) = (
        present(&params.chain_id),
        present(&params.round_id),
        present(&params.project_id),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse {
                success: false,
                message: MISSING_SUMMARY_PARAMS.to_string(),
                data: json!({}),
            },
        );
    };

    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        let project_id: ProjectId = project_id.parse()?;
        allocator
            .project_summary(chain_id, round_id, &project_id)
            .await
    }
    .await;

    ApiResponse::from_result("fetched project summary successfully", result)
}

pub async fn matches_response(
    allocator: &Allocator,
    chain_id: &str,
    round_id: &str,
) -> (StatusCode, ApiResponse) {
    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        allocator.compute_matching(chain_id, round_id).await
    }
    .await;
    ApiResponse::from_result("computed matching successfully", result)
}

pub async fn commit_response(
    state: &ApiState,
    chain_id: &str,
    round_id: &str,
) -> (StatusCode, ApiResponse) {
    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        let matching = state.allocator.compute_matching(chain_id, round_id).await?;
        let tree = MerkleDistribution::build(matching.results)?;
        let created = db::insert_distribution(&state.pool, chain_id, round_id, &tree).await?;
        info!(
            "Committed distribution {} for round {round_id} ({} leaves, new: {created})",
            tree.root(),
            tree.len()
        );
        Ok::<_, AllocatorError>(tree.artifact())
    }
    .await;
    ApiResponse::from_result("committed distribution successfully", result)
}

pub async fn distribution_response(
    state: &ApiState,
    chain_id: &str,
    round_id: &str,
) -> (StatusCode, ApiResponse) {
    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        db::latest_distribution(&state.pool, chain_id, round_id)
            .await?
            .ok_or_else(|| AllocatorError::NotFound(format!("distribution for round {round_id}")))
    }
    .await;
    ApiResponse::from_result("fetched distribution successfully", result)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProofResponse {
    root: String,
    leaf: crate::types::DistributionEntry,
    proof: Vec<crate::types::Hash>,
}

pub async fn proof_response(
    state: &ApiState,
    chain_id: &str,
    round_id: &str,
    index: &str,
) -> (StatusCode, ApiResponse) {
    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        let index = parse_index(index)?;
        let stored = db::latest_distribution(&state.pool, chain_id, round_id)
            .await?
            .ok_or_else(|| AllocatorError::NotFound(format!("distribution for round {round_id}")))?;
        let tree = stored.tree()?;
        let proof = tree
            .proof_for(index)
            .ok_or_else(|| AllocatorError::NotFound(format!("leaf {index}")))?;
        Ok::<_, AllocatorError>(ProofResponse {
            root: stored.root.clone(),
            leaf: tree.leaves()[index as usize].clone(),
            proof,
        })
    }
    .await;
    ApiResponse::from_result("fetched proof successfully", result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub root: String,
    pub tx_hash: String,
}

pub async fn publish_response(
    state: &ApiState,
    chain_id: &str,
    round_id: &str,
    req: &PublishRequest,
) -> (StatusCode, ApiResponse) {
    let result = async {
        let chain_id = parse_chain_id(chain_id)?;
        if req.tx_hash.trim().is_empty() {
            return Err(AllocatorError::Validation("missing parameter txHash".to_string()));
        }
        let root: crate::types::Hash = req.root.parse()?;
        db::mark_published(
            &state.pool,
            chain_id,
            round_id,
            &root.to_string(),
            req.tx_hash.trim(),
        )
        .await
    }
    .await;
    ApiResponse::from_result("published distribution successfully", result)
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /data/summary?chainId=&roundId=&projectId=`
pub async fn get_project_summary(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SummaryParams>,
) -> Response {
    respond(project_summary_response(&state.allocator, &params).await)
}

/// `GET /rounds/:chain_id/:round_id/matches`
pub async fn get_round_matches(
    State(state): State<Arc<ApiState>>,
    Path((chain_id, round_id)): Path<(String, String)>,
) -> Response {
    respond(matches_response(&state.allocator, &chain_id, &round_id).await)
}

/// `POST /rounds/:chain_id/:round_id/distribution`
pub async fn commit_distribution(
    State(state): State<Arc<ApiState>>,
    Path((chain_id, round_id)): Path<(String, String)>,
) -> Response {
    respond(commit_response(&state, &chain_id, &round_id).await)
}

/// `GET /rounds/:chain_id/:round_id/distribution`
pub async fn get_distribution(
    State(state): State<Arc<ApiState>>,
    Path((chain_id, round_id)): Path<(String, String)>,
) -> Response {
    respond(distribution_response(&state, &chain_id, &round_id).await)
}

/// `GET /rounds/:chain_id/:round_id/distribution/proofs/:index`
pub async fn get_proof(
    State(state): State<Arc<ApiState>>,
    Path((chain_id, round_id, index)): Path<(String, String, String)>,
) -> Response {
    respond(proof_response(&state, &chain_id, &round_id, &index).await)
}

/// `POST /rounds/:chain_id/:round_id/distribution/publish`
pub async fn publish_distribution(
    State(state): State<Arc<ApiState>>,
    Path((chain_id, round_id)): Path<(String, String)>,
    Json(req): Json<PublishRequest>,
) -> Response {
    respond(publish_response(&state, &chain_id, &round_id, &req).await)
}
