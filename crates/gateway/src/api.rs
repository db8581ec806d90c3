//! REST API over the store and the policy service.
//!
//! Endpoints:
//!
//! - `GET|POST /api/companies`, `GET|PUT|DELETE /api/companies/{id}`
//! - `GET|POST /api/transactions`, `GET|PUT|DELETE /api/transactions/{id}`
//! - `GET /api/policies`, `POST /api/policies/generate`
//! - `GET|DELETE /api/policies/{id}`, `GET /api/policies/{id}/export`
//! - `GET|PATCH /api/policies/{id}/sections/{name}`
//! - `POST /api/policies/{id}/sections/{name}/regenerate`
//! - `POST /api/policies/{id}/review`

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use tpforge_core::company::{Company, NewCompany};
use tpforge_core::policy::{GeneratePolicyRequest, Policy, PolicySummary, ReviewRequest};
use tpforge_core::section::{SectionName, SectionResult};
use tpforge_core::store::Store;
use tpforge_core::transaction::{NewTransaction, Transaction};
use tpforge_pipeline::PolicyService;

use crate::error::ApiError;

pub struct ApiState {
    pub service: Arc<PolicyService>,
}

pub type SharedApiState = Arc<ApiState>;

impl ApiState {
    fn store(&self) -> &Arc<dyn Store> {
        self.service.store()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the `/api` router. Nest this under "/api" in the main router.
pub fn api_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/companies", get(list_companies).post(create_company))
        .route(
            "/companies/{id}",
            get(get_company).put(update_company).delete(delete_company),
        )
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route(
            "/transactions/{id}",
            get(get_transaction)
                .put(update_transaction)
                .delete(delete_transaction),
        )
        .route("/policies", get(list_policies))
        .route("/policies/generate", post(generate_policy))
        .route("/policies/{id}", get(get_policy).delete(delete_policy))
        .route("/policies/{id}/export", get(export_policy))
        .route(
            "/policies/{id}/sections/{name}",
            get(get_section).patch(update_section),
        )
        .route(
            "/policies/{id}/sections/{name}/regenerate",
            post(regenerate_section),
        )
        .route("/policies/{id}/review", post(submit_review))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompanyFilter {
    company_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct SectionUpdateRequest {
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SectionResponse {
    pub policy_id: i64,
    pub section_name: SectionName,
    pub title: String,
    pub section: SectionResult,
    pub version: u32,
    pub needs_attention: bool,
}

impl SectionResponse {
    fn from_policy(policy: &Policy, name: SectionName) -> Self {
        Self {
            policy_id: policy.id,
            section_name: name,
            title: name.title().to_string(),
            section: policy.sections.get(name).clone(),
            version: policy.version,
            needs_attention: policy.needs_attention(),
        }
    }
}

fn parse_section(name: &str) -> ApiResult<SectionName> {
    name.parse().map_err(|e: String| ApiError::not_found(e))
}

fn deleted(what: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("{what} deleted successfully"),
    })
}

// ── Companies ─────────────────────────────────────────────────────────────

async fn list_companies(State(state): State<SharedApiState>) -> ApiResult<Json<Vec<Company>>> {
    Ok(Json(state.store().list_companies().await?))
}

async fn create_company(
    State(state): State<SharedApiState>,
    Json(input): Json<NewCompany>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    input.validate()?;
    let company = state.store().create_company(input).await?;
    info!(company_id = company.id, name = %company.name, "Company created");
    Ok((StatusCode::CREATED, Json(company)))
}

async fn get_company(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Company>> {
    state
        .store()
        .get_company(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Company not found"))
}

async fn update_company(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(input): Json<NewCompany>,
) -> ApiResult<Json<Company>> {
    input.validate()?;
    Ok(Json(state.store().update_company(id, input).await?))
}

async fn delete_company(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if state.store().delete_company(id).await? {
        info!(company_id = id, "Company deleted");
        Ok(deleted("Company"))
    } else {
        Err(ApiError::not_found("Company not found"))
    }
}

// ── Transactions ──────────────────────────────────────────────────────────

async fn list_transactions(
    State(state): State<SharedApiState>,
    Query(filter): Query<CompanyFilter>,
) -> ApiResult<Json<Vec<Transaction>>> {
    Ok(Json(state.store().list_transactions(filter.company_id).await?))
}

async fn create_transaction(
    State(state): State<SharedApiState>,
    Json(input): Json<NewTransaction>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    input.validate()?;
    let tx = state.store().create_transaction(input).await?;
    info!(transaction_id = tx.id, company_id = tx.company_id, "Transaction created");
    Ok((StatusCode::CREATED, Json(tx)))
}

async fn get_transaction(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Transaction>> {
    state
        .store()
        .get_transaction(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Transaction not found"))
}

async fn update_transaction(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(input): Json<NewTransaction>,
) -> ApiResult<Json<Transaction>> {
    input.validate()?;
    Ok(Json(state.store().update_transaction(id, input).await?))
}

async fn delete_transaction(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    if state.store().delete_transaction(id).await? {
        Ok(deleted("Transaction"))
    } else {
        Err(ApiError::not_found("Transaction not found"))
    }
}

// ── Policies ──────────────────────────────────────────────────────────────

async fn list_policies(
    State(state): State<SharedApiState>,
    Query(filter): Query<CompanyFilter>,
) -> ApiResult<Json<Vec<PolicySummary>>> {
    let policies = state.store().list_policies(filter.company_id).await?;
    Ok(Json(policies.iter().map(PolicySummary::from).collect()))
}

async fn generate_policy(
    State(state): State<SharedApiState>,
    Json(request): Json<GeneratePolicyRequest>,
) -> ApiResult<(StatusCode, Json<Policy>)> {
    let policy = state.service.generate_policy(&request).await?;
    Ok((StatusCode::CREATED, Json(policy)))
}

async fn get_policy(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Policy>> {
    Ok(Json(state.service.get_policy(id).await?))
}

async fn delete_policy(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    state.service.delete_policy(id).await?;
    info!(policy_id = id, "Policy deleted");
    Ok(deleted("Policy"))
}

async fn export_policy(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let markdown = state.service.export_markdown(id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    ))
}

async fn get_section(
    State(state): State<SharedApiState>,
    Path((id, name)): Path<(i64, String)>,
) -> ApiResult<Json<SectionResponse>> {
    let name = parse_section(&name)?;
    let policy = state.service.get_policy(id).await?;
    Ok(Json(SectionResponse::from_policy(&policy, name)))
}

async fn update_section(
    State(state): State<SharedApiState>,
    Path((id, name)): Path<(i64, String)>,
    Json(body): Json<SectionUpdateRequest>,
) -> ApiResult<Json<SectionResponse>> {
    let name = parse_section(&name)?;
    let policy = state.service.update_section(id, name, &body.content).await?;
    Ok(Json(SectionResponse::from_policy(&policy, name)))
}

async fn regenerate_section(
    State(state): State<SharedApiState>,
    Path((id, name)): Path<(i64, String)>,
) -> ApiResult<Json<SectionResponse>> {
    let name = parse_section(&name)?;
    let policy = state.service.regenerate_section(id, name).await?;
    Ok(Json(SectionResponse::from_policy(&policy, name)))
}

async fn submit_review(
    State(state): State<SharedApiState>,
    Path(id): Path<i64>,
    Json(review): Json<ReviewRequest>,
) -> ApiResult<Json<PolicySummary>> {
    let policy = state.service.submit_review(id, &review).await?;
    Ok(Json(PolicySummary::from(&policy)))
}
