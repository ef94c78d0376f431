use crate::infra::{in_memory_service, plan_from_drafts, system_session, RewardService};
use chrono::{Datelike, Local};
use clap::Args;
use insurepath::error::AppError;
use insurepath::workflows::rate_import::RateTableImporter;
use insurepath::workflows::standard_reward::{
    format_yen, CommitRequest, DecisionKind, Employee, EmployeeId, HealthPlan, InsuranceKind,
    MemoryDocumentStore, Office, OfficeId, OfficeRepository, ProfileDirectory, SessionContext,
    StandardRewardResult, StandardRewardServiceError, UserProfile, UserRole, YearMonth, Yen,
};
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_RATE_TABLES: &str = include_str!("../data/sample_rate_tables.csv");

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Monthly salary in yen used for the walkthrough.
    #[arg(long, default_value_t = 300_000)]
    pub(crate) salary: Yen,
    /// Decision month (YYYY-MM). Defaults to the current month.
    #[arg(long, value_parser = crate::infra::parse_year_month)]
    pub(crate) month: Option<YearMonth>,
}

#[derive(Args, Debug)]
pub(crate) struct CalculateArgs {
    /// Monthly salary in yen
    #[arg(long)]
    pub(crate) salary: Yen,
    /// Decision month (YYYY-MM)
    #[arg(long, value_parser = crate::infra::parse_year_month)]
    pub(crate) month: YearMonth,
    /// Rate table CSV to calculate against
    #[arg(long)]
    pub(crate) rate_tables: PathBuf,
    /// Kyokai prefecture code of the office. Defaults to the plan of the first health table.
    #[arg(long, conflicts_with = "kumiai")]
    pub(crate) pref_code: Option<String>,
    /// Treat the office as enrolled in a union-managed (kumiai) plan
    #[arg(long)]
    pub(crate) kumiai: bool,
}

pub(crate) fn run_calculate(args: CalculateArgs) -> Result<(), AppError> {
    let salary = args.salary;
    let month = args.month;
    let result = calculate_from_csv(args)?;

    println!("Standard reward for {} as of {}", format_yen(salary), month);
    render_result(&result);
    Ok(())
}

pub(crate) fn calculate_from_csv(args: CalculateArgs) -> Result<StandardRewardResult, AppError> {
    let CalculateArgs {
        salary,
        month,
        rate_tables,
        pref_code,
        kumiai,
    } = args;

    let drafts = RateTableImporter::from_path(rate_tables)?;
    let plan = match (pref_code, kumiai) {
        (Some(pref_code), _) => Some(HealthPlan::Kyokai { pref_code }),
        (None, true) => Some(HealthPlan::Kumiai { union_code: None }),
        (None, false) => plan_from_drafts(&drafts),
    };

    let store = MemoryDocumentStore::new();
    let service = in_memory_service(&store);
    let office_id = OfficeId("cli".to_string());
    store
        .upsert_office(Office {
            id: office_id.clone(),
            name: "Command line".to_string(),
            health_plan: plan,
        })
        .map_err(StandardRewardServiceError::from)?;
    RateTableImporter::apply(&service, &system_session(), &office_id, drafts)?;

    Ok(service.calculate(&office_id, salary, Some(month))?)
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { salary, month } = args;
    let month = match month {
        Some(month) => month,
        None => current_month()?,
    };

    println!("Standard reward demo");
    let (service, session, office_id) = demo_office()?;

    println!("\nRate tables (kyokai Tokyo)");
    for kind in [
        InsuranceKind::Health,
        InsuranceKind::Care,
        InsuranceKind::Pension,
    ] {
        let tables = service.rate_tables(&office_id, kind)?;
        let months: Vec<String> = tables
            .iter()
            .map(|table| format!("{} @ {:.2}%", table.effective_from, table.rate * 100.0))
            .collect();
        println!("  {:<16} {}", kind.label(), months.join(", "));
    }

    println!("\nCalculation for {} in {}", format_yen(salary), month);
    let result = service.calculate(&office_id, salary, Some(month))?;
    render_result(&result);

    let employee_id = EmployeeId("demo-001".to_string());
    if result.can_commit() {
        let outcome = service.commit(
            &session,
            &office_id,
            &employee_id,
            CommitRequest {
                salary,
                decision_month: month,
                decision_kind: DecisionKind::Regular,
                note: Some("demo walkthrough".to_string()),
            },
        )?;
        println!("\nCommitted history entries");
        for entry in &outcome.entries {
            println!(
                "  {:<16} grade {:>2}  {:>10}  from {}",
                entry.kind.label(),
                entry.grade,
                format_yen(entry.standard_monthly_reward),
                entry.applied_from
            );
        }
    } else {
        println!("\nResult cannot be committed; fix the errors above first.");
    }

    let early = YearMonth::new(2019, 4).map_err(|err| AppError::Input(err.to_string()))?;
    println!("\nCalculation before any table took effect ({early})");
    render_result(&service.calculate(&office_id, salary, Some(early))?);

    println!("\nSnapshot export as of {month}");
    print!("{}", service.export_snapshot(&office_id, month)?);

    Ok(())
}

fn demo_office() -> Result<(Arc<RewardService>, SessionContext, OfficeId), AppError> {
    let store = MemoryDocumentStore::new();
    let service = in_memory_service(&store);
    let office_id = OfficeId("office-demo".to_string());
    store
        .upsert_office(Office {
            id: office_id.clone(),
            name: "Demo Trading Co.".to_string(),
            health_plan: Some(HealthPlan::Kyokai {
                pref_code: "13".to_string(),
            }),
        })
        .map_err(StandardRewardServiceError::from)?;
    let hr = UserProfile {
        uid: "demo-hr".to_string(),
        display_name: "Demo HR".to_string(),
        role: UserRole::Hr,
        office_id: Some(office_id.clone()),
    };
    store.upsert_profile(hr.clone()).map_err(StandardRewardServiceError::from)?;
    let session = SessionContext::new(hr);

    service.upsert_employee(
        &session,
        Employee {
            id: EmployeeId("demo-001".to_string()),
            office_id: office_id.clone(),
            employee_code: "001".to_string(),
            name: "Yamada Hanako".to_string(),
        },
    )?;

    let drafts = RateTableImporter::from_reader(SAMPLE_RATE_TABLES.as_bytes())?;
    RateTableImporter::apply(&service, &session, &office_id, drafts)?;

    Ok((service, session, office_id))
}

fn current_month() -> Result<YearMonth, AppError> {
    let today = Local::now().date_naive();
    let year = u16::try_from(today.year()).unwrap_or(u16::MAX);
    let month = u8::try_from(today.month()).unwrap_or(1);
    YearMonth::new(year, month).map_err(|err| AppError::Input(err.to_string()))
}

fn render_result(result: &StandardRewardResult) {
    for (kind, error) in [
        (InsuranceKind::Health, &result.errors.health),
        (InsuranceKind::Pension, &result.errors.pension),
    ] {
        match (result.resolved(kind), error) {
            (Some((grade, standard)), _) => println!(
                "  {:<16} grade {:>2}  {:>10}",
                kind.label(),
                grade,
                format_yen(standard)
            ),
            (None, Some(error)) => println!("  {:<16} error: {}", kind.label(), error),
            (None, None) => println!("  {:<16} nothing to compute", kind.label()),
        }
    }
    println!(
        "  commit allowed: {}",
        if result.can_commit() { "yes" } else { "no" }
    );
}
