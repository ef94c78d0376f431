use insurepath::config::BootstrapConfig;
use insurepath::error::AppError;
use insurepath::workflows::rate_import::{ImportSummary, RateTableImporter};
use insurepath::workflows::standard_reward::{
    HealthPlan, InsuranceKind, MemoryDocumentStore, Office, OfficeId, OfficeRepository,
    ProfileDirectory, RateTableDraft, SessionContext, StandardRewardService,
    StandardRewardServiceError, UserProfile, UserRole, YearMonth,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type RewardService = StandardRewardService<MemoryDocumentStore, MemoryDocumentStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Service backed by a single in-memory document store for every repository role.
pub(crate) fn in_memory_service(store: &MemoryDocumentStore) -> Arc<RewardService> {
    Arc::new(StandardRewardService::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    ))
}

/// Session used for startup imports. Never stored in the directory, so no request can
/// present it.
pub(crate) fn system_session() -> SessionContext {
    SessionContext::new(UserProfile {
        uid: "system".to_string(),
        display_name: "Startup import".to_string(),
        role: UserRole::Admin,
        office_id: None,
    })
}

/// Health plan implied by the first health table of an import, if any.
pub(crate) fn plan_from_drafts(drafts: &[RateTableDraft]) -> Option<HealthPlan> {
    drafts
        .iter()
        .find(|draft| draft.kind == InsuranceKind::Health)
        .and_then(|draft| draft.plan.clone())
}

/// Register the bootstrap office, the administrator, and any configured rate tables.
pub(crate) fn bootstrap(
    store: &MemoryDocumentStore,
    service: &RewardService,
    config: &BootstrapConfig,
) -> Result<Option<ImportSummary>, AppError> {
    let office_id = OfficeId(config.office_id.clone());
    let drafts = match &config.rate_table_csv {
        Some(path) => Some(RateTableImporter::from_path(path)?),
        None => None,
    };

    store
        .upsert_office(Office {
            id: office_id.clone(),
            name: config.office_id.clone(),
            health_plan: drafts.as_deref().and_then(plan_from_drafts),
        })
        .map_err(StandardRewardServiceError::from)?;

    if let Some(uid) = &config.admin_uid {
        store
            .upsert_profile(UserProfile {
                uid: uid.clone(),
                display_name: "Administrator".to_string(),
                role: UserRole::Admin,
                office_id: None,
            })
            .map_err(StandardRewardServiceError::from)?;
        info!(uid = %uid, "bootstrap administrator registered");
    }

    let summary = match drafts {
        Some(drafts) => Some(RateTableImporter::apply(
            service,
            &system_session(),
            &office_id,
            drafts,
        )?),
        None => None,
    };
    Ok(summary)
}

pub(crate) fn parse_year_month(raw: &str) -> Result<YearMonth, String> {
    raw.parse::<YearMonth>().map_err(|err| err.to_string())
}
