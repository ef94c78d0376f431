use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::calculator::StandardRewardResult;
use super::domain::{
    Band, CloudRateTable, Employee, EmployeeId, HealthPlan, InsuranceKind, Office, OfficeId,
    RateTableDraft, YearMonth, Yen,
};
use super::repository::{HistoryRepository, OfficeRepository, RateTableRepository, RepositoryError};
use super::service::{CommitRequest, StandardRewardService, StandardRewardServiceError};
use super::session::{SessionContext, SessionError};

type SharedService<T, H> = Arc<StandardRewardService<T, H>>;

/// Router builder exposing rate table maintenance and standard reward endpoints.
pub fn standard_reward_router<T, H>(service: SharedService<T, H>) -> Router
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    Router::new()
        .route("/api/v1/offices/:office_id", put(upsert_office_handler::<T, H>))
        .route(
            "/api/v1/offices/:office_id/employees/:employee_id",
            put(upsert_employee_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/rate-tables",
            get(list_tables_handler::<T, H>).post(save_table_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/rate-tables/seed",
            post(seed_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/standard-reward/calculate",
            post(calculate_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/standard-reward/export",
            get(export_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/employees/:employee_id/standard-reward-histories",
            post(commit_handler::<T, H>),
        )
        .route(
            "/api/v1/offices/:office_id/employees/:employee_id/standard-reward",
            get(effective_handler::<T, H>),
        )
        .route(
            "/api/v1/cloud/rate-tables",
            post(publish_cloud_handler::<T, H>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct OfficeBody {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) health_plan: Option<HealthPlan>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmployeeBody {
    pub(crate) employee_code: String,
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KindQuery {
    pub(crate) kind: InsuranceKind,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OverwriteQuery {
    #[serde(default)]
    pub(crate) overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeedBody {
    pub(crate) kind: InsuranceKind,
    pub(crate) year: u16,
    #[serde(default)]
    pub(crate) overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloudPresetBody {
    pub(crate) kind: InsuranceKind,
    pub(crate) year: u16,
    #[serde(default)]
    pub(crate) pref_code: Option<String>,
    pub(crate) effective_from: YearMonth,
    pub(crate) rate: f64,
    #[serde(default)]
    pub(crate) bands: Vec<Band>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalculateBody {
    pub(crate) salary: Yen,
    #[serde(default)]
    pub(crate) decision_month: Option<YearMonth>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AsOfQuery {
    pub(crate) as_of: YearMonth,
}

/// Calculator output plus whether the confirm step may commit it.
#[derive(Debug, Serialize)]
pub struct CalculationView {
    #[serde(flatten)]
    pub result: StandardRewardResult,
    pub can_commit: bool,
}

fn authorize<T, H>(
    service: &StandardRewardService<T, H>,
    headers: &HeaderMap,
    office_id: &OfficeId,
    edit: bool,
) -> Result<SessionContext, Response>
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let session = service
        .session(headers)
        .map_err(|err| error_response(err.into()))?;
    let permitted = if edit {
        session.require_edit(office_id)
    } else {
        session.require_view(office_id)
    };
    permitted.map_err(|err| error_response(err.into()))?;
    Ok(session)
}

pub(crate) async fn upsert_office_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OfficeBody>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    let session = match authorize(&service, &headers, &office_id, true) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let office = Office {
        id: office_id,
        name: body.name,
        health_plan: body.health_plan,
    };
    match service.upsert_office(&session, office) {
        Ok(office) => (StatusCode::OK, Json(office)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn upsert_employee_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path((office_id, employee_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<EmployeeBody>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    let session = match authorize(&service, &headers, &office_id, true) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let employee = Employee {
        id: EmployeeId(employee_id),
        office_id,
        employee_code: body.employee_code,
        name: body.name,
    };
    match service.upsert_employee(&session, employee) {
        Ok(employee) => (StatusCode::OK, Json(employee)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_tables_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    Query(query): Query<KindQuery>,
    headers: HeaderMap,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    if let Err(response) = authorize(&service, &headers, &office_id, false) {
        return response;
    }
    match service.rate_tables(&office_id, query.kind) {
        Ok(tables) => (StatusCode::OK, Json(tables)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn save_table_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    Query(query): Query<OverwriteQuery>,
    headers: HeaderMap,
    Json(draft): Json<RateTableDraft>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    let session = match authorize(&service, &headers, &office_id, true) {
        Ok(session) => session,
        Err(response) => return response,
    };
    match service.save_rate_table(&session, &office_id, draft, query.overwrite) {
        Ok(outcome) => {
            let status = if outcome.replaced {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn seed_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SeedBody>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    let session = match authorize(&service, &headers, &office_id, true) {
        Ok(session) => session,
        Err(response) => return response,
    };
    match service.seed_from_cloud(&session, &office_id, body.kind, body.year, body.overwrite) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn publish_cloud_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    headers: HeaderMap,
    Json(body): Json<CloudPresetBody>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let session = match service.session(&headers) {
        Ok(session) => session,
        Err(err) => return error_response(err.into()),
    };
    let table = CloudRateTable {
        kind: body.kind,
        year: body.year,
        pref_code: body.pref_code,
        effective_from: body.effective_from,
        rate: body.rate,
        bands: body.bands,
        updated_at: Utc::now(),
    };
    match service.publish_cloud_table(&session, table) {
        Ok(table) => (StatusCode::CREATED, Json(table)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn calculate_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<CalculateBody>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    if let Err(response) = authorize(&service, &headers, &office_id, false) {
        return response;
    }
    match service.calculate(&office_id, body.salary, body.decision_month) {
        Ok(result) => {
            let can_commit = result.can_commit();
            (StatusCode::OK, Json(CalculationView { result, can_commit })).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn commit_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path((office_id, employee_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<CommitRequest>,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    let session = match authorize(&service, &headers, &office_id, true) {
        Ok(session) => session,
        Err(response) => return response,
    };
    let employee_id = EmployeeId(employee_id);
    match service.commit(&session, &office_id, &employee_id, request) {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn effective_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path((office_id, employee_id)): Path<(String, String)>,
    Query(query): Query<AsOfQuery>,
    headers: HeaderMap,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    if let Err(response) = authorize(&service, &headers, &office_id, false) {
        return response;
    }
    match service.effective_rewards(&office_id, &EmployeeId(employee_id), query.as_of) {
        Ok(rewards) => (StatusCode::OK, Json(rewards)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn export_handler<T, H>(
    State(service): State<SharedService<T, H>>,
    Path(office_id): Path<String>,
    Query(query): Query<AsOfQuery>,
    headers: HeaderMap,
) -> Response
where
    T: RateTableRepository + OfficeRepository + 'static,
    H: HistoryRepository + 'static,
{
    let office_id = OfficeId(office_id);
    if let Err(response) = authorize(&service, &headers, &office_id, false) {
        return response;
    }
    match service.export_snapshot(&office_id, query.as_of) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: StandardRewardServiceError) -> Response {
    let status = match &err {
        StandardRewardServiceError::Session(
            SessionError::MissingIdentity | SessionError::UnknownUser(_),
        ) => StatusCode::UNAUTHORIZED,
        StandardRewardServiceError::Session(
            SessionError::Forbidden(_) | SessionError::AdminOnly,
        ) => StatusCode::FORBIDDEN,
        StandardRewardServiceError::OfficeNotFound(_)
        | StandardRewardServiceError::EmployeeNotFound(_) => StatusCode::NOT_FOUND,
        StandardRewardServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        StandardRewardServiceError::DuplicateTable { existing_id, .. } => {
            let payload = json!({
                "error": err.to_string(),
                "existing_id": existing_id,
            });
            return (StatusCode::CONFLICT, Json(payload)).into_response();
        }
        StandardRewardServiceError::CommitBlocked(result) => {
            let payload = json!({
                "error": err.to_string(),
                "result": result,
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
        }
        StandardRewardServiceError::InvalidBands(_)
        | StandardRewardServiceError::InvalidDraft(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StandardRewardServiceError::Session(SessionError::Directory(_))
        | StandardRewardServiceError::Repository(_)
        | StandardRewardServiceError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": err.to_string() });
    (status, Json(payload)).into_response()
}
