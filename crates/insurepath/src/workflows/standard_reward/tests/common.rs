use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::standard_reward::domain::{
    Band, DecisionKind, Employee, EmployeeId, HealthPlan, HistoryId, InsuranceKind, Office,
    OfficeId, RateTable, RateTableDraft, RateTableId, StandardRewardHistory, YearMonth, Yen,
    NO_UPPER_LIMIT,
};
use crate::workflows::standard_reward::repository::{
    HistoryRepository, OfficeRepository, RateTableRepository, RepositoryError, TableWrite,
};
use crate::workflows::standard_reward::session::{
    ProfileDirectory, SessionContext, UserProfile, UserRole, USER_ID_HEADER,
};
use crate::workflows::standard_reward::{
    standard_reward_router, CloudRateTable, MemoryDocumentStore, StandardRewardService,
};

pub(super) type MemoryService = StandardRewardService<MemoryDocumentStore, MemoryDocumentStore>;

pub(super) const OFFICE: &str = "office-1";
pub(super) const OTHER_OFFICE: &str = "office-2";
pub(super) const EMPLOYEE: &str = "emp-001";

pub(super) fn ym(raw: &str) -> YearMonth {
    raw.parse().expect("valid year-month")
}

pub(super) fn stamp(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn office_id() -> OfficeId {
    OfficeId(OFFICE.to_string())
}

pub(super) fn employee_id() -> EmployeeId {
    EmployeeId(EMPLOYEE.to_string())
}

pub(super) fn tokyo() -> HealthPlan {
    HealthPlan::Kyokai {
        pref_code: "13".to_string(),
    }
}

pub(super) fn office(plan: Option<HealthPlan>) -> Office {
    Office {
        id: office_id(),
        name: "Shinjuku Branch".to_string(),
        health_plan: plan,
    }
}

pub(super) fn band(grade: u16, lower: Yen, upper: Yen, standard: Yen) -> Band {
    Band {
        grade,
        lower_limit: lower,
        upper_limit: upper,
        standard_monthly: standard,
    }
}

/// Ten-grade ladder starting at zero with an open-ended top grade.
pub(super) fn ladder() -> Vec<Band> {
    vec![
        band(1, 0, 63_000, 58_000),
        band(2, 63_000, 73_000, 68_000),
        band(3, 73_000, 83_000, 78_000),
        band(4, 83_000, 93_000, 88_000),
        band(5, 93_000, 101_000, 98_000),
        band(6, 101_000, 107_000, 104_000),
        band(7, 107_000, 114_000, 110_000),
        band(8, 114_000, 122_000, 118_000),
        band(9, 122_000, 130_000, 126_000),
        band(10, 130_000, NO_UPPER_LIMIT, 134_000),
    ]
}

/// Same shape as [`ladder`] but with a 58,000 yen floor under grade 1.
pub(super) fn floored_ladder() -> Vec<Band> {
    let mut bands = ladder();
    bands[0].lower_limit = 58_000;
    bands
}

pub(super) fn table(
    id: &str,
    kind: InsuranceKind,
    plan: Option<HealthPlan>,
    month: &str,
    bands: Vec<Band>,
) -> RateTable {
    RateTable {
        id: RateTableId(id.to_string()),
        office_id: office_id(),
        kind,
        plan,
        effective_from: ym(month),
        rate: 0.1,
        bands,
        created_at: stamp(1),
        updated_at: stamp(1),
    }
}

pub(super) fn draft(
    kind: InsuranceKind,
    plan: Option<HealthPlan>,
    month: &str,
    bands: Vec<Band>,
) -> RateTableDraft {
    RateTableDraft {
        kind,
        plan,
        effective_from: ym(month),
        rate: match kind {
            InsuranceKind::Health => 0.0998,
            InsuranceKind::Care => 0.016,
            InsuranceKind::Pension => 0.183,
        },
        bands,
    }
}

pub(super) fn history(
    id: &str,
    kind: InsuranceKind,
    applied_from: &str,
    grade: u16,
) -> StandardRewardHistory {
    StandardRewardHistory {
        id: HistoryId(id.to_string()),
        employee_id: employee_id(),
        office_id: office_id(),
        kind,
        applied_from: ym(applied_from),
        grade,
        standard_monthly_reward: i64::from(grade) * 10_000,
        decision_kind: DecisionKind::Regular,
        note: None,
        created_at: stamp(1),
    }
}

pub(super) fn cloud_table(
    kind: InsuranceKind,
    pref_code: Option<&str>,
    month: &str,
    bands: Vec<Band>,
) -> CloudRateTable {
    let effective_from = ym(month);
    CloudRateTable {
        kind,
        year: effective_from.year(),
        pref_code: pref_code.map(str::to_string),
        effective_from,
        rate: 0.1,
        bands,
        updated_at: stamp(2),
    }
}

fn profile(uid: &str, role: UserRole, office: Option<&str>) -> UserProfile {
    UserProfile {
        uid: uid.to_string(),
        display_name: format!("{uid} (test)"),
        role,
        office_id: office.map(|id| OfficeId(id.to_string())),
    }
}

pub(super) fn admin_profile() -> UserProfile {
    profile("admin-1", UserRole::Admin, None)
}

pub(super) fn hr_profile() -> UserProfile {
    profile("hr-1", UserRole::Hr, Some(OFFICE))
}

pub(super) fn admin_session() -> SessionContext {
    SessionContext::new(admin_profile())
}

pub(super) fn hr_session() -> SessionContext {
    SessionContext::new(hr_profile())
}

pub(super) fn headers_for(uid: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_ID_HEADER,
        HeaderValue::from_str(uid).expect("ascii uid"),
    );
    headers
}

/// Service over one shared in-memory store with the office, one employee, and users for
/// each role registered. The office starts on kyokai Tokyo with no tables.
pub(super) fn build_service() -> (Arc<MemoryService>, MemoryDocumentStore) {
    let store = MemoryDocumentStore::new();
    store
        .upsert_office(office(Some(tokyo())))
        .expect("office stored");
    store
        .upsert_employee(Employee {
            id: employee_id(),
            office_id: office_id(),
            employee_code: "E-001".to_string(),
            name: "Sato Hanako".to_string(),
        })
        .expect("employee stored");
    for user in [
        admin_profile(),
        hr_profile(),
        profile("staff-1", UserRole::Employee, Some(OFFICE)),
        profile("hr-2", UserRole::Hr, Some(OTHER_OFFICE)),
    ] {
        store.upsert_profile(user).expect("profile stored");
    }

    let service = StandardRewardService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    );
    (Arc::new(service), store)
}

/// [`build_service`] plus health and pension ladders effective from 2024-03.
pub(super) fn build_service_with_tables() -> (Arc<MemoryService>, MemoryDocumentStore) {
    let (service, store) = build_service();
    let session = hr_session();
    service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Health, Some(tokyo()), "2024-03", ladder()),
            false,
        )
        .expect("health table saved");
    service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-03", floored_ladder()),
            false,
        )
        .expect("pension table saved");
    (service, store)
}

pub(super) fn router_with_service(service: Arc<MemoryService>) -> Router {
    standard_reward_router(service)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}

/// Table repository whose backing store is offline.
pub(super) struct UnavailableTables;

impl OfficeRepository for UnavailableTables {
    fn fetch_office(&self, _id: &OfficeId) -> Result<Option<Office>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn upsert_office(&self, _office: Office) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }
}

impl RateTableRepository for UnavailableTables {
    fn tables_for_office(
        &self,
        _office_id: &OfficeId,
        _kind: InsuranceKind,
    ) -> Result<Vec<RateTable>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn save_table(
        &self,
        _table: RateTable,
        _overwrite: bool,
    ) -> Result<TableWrite, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn cloud_tables(
        &self,
        _kind: InsuranceKind,
        _year: u16,
    ) -> Result<Vec<CloudRateTable>, RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }

    fn save_cloud_table(&self, _table: CloudRateTable) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("offline".to_string()))
    }
}
