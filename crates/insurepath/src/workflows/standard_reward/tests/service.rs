use super::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

use crate::workflows::standard_reward::domain::{
    DecisionKind, Employee, EmployeeId, HealthPlan, InsuranceKind, Office, OfficeId,
};
use crate::workflows::standard_reward::repository::{HistoryRepository, RateTableRepository};
use crate::workflows::standard_reward::service::{
    CommitRequest, SeedOutcome, StandardRewardService, StandardRewardServiceError,
};
use crate::workflows::standard_reward::session::{SessionContext, SessionError};
use crate::workflows::standard_reward::{BandTableError, MemoryDocumentStore};

fn commit_request(salary: i64, month: &str, note: Option<&str>) -> CommitRequest {
    CommitRequest {
        salary,
        decision_month: ym(month),
        decision_kind: DecisionKind::Regular,
        note: note.map(str::to_string),
    }
}

#[test]
fn saving_a_second_table_for_the_same_month_needs_overwrite() {
    let (service, _) = build_service();
    let session = hr_session();
    let first = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-09", ladder()),
            false,
        )
        .expect("first save");
    assert!(!first.replaced);

    let duplicate = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-09", floored_ladder()),
            false,
        )
        .expect_err("duplicate rejected");
    match duplicate {
        StandardRewardServiceError::DuplicateTable {
            kind,
            effective_from,
            existing_id,
        } => {
            assert_eq!(kind, InsuranceKind::Pension);
            assert_eq!(effective_from, ym("2024-09"));
            assert_eq!(existing_id, first.table.id);
        }
        other => panic!("expected duplicate, got {other:?}"),
    }

    let replaced = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-09", floored_ladder()),
            true,
        )
        .expect("overwrite");
    assert!(replaced.replaced);
    assert_eq!(replaced.table.id, first.table.id);
    assert_eq!(replaced.table.created_at, first.table.created_at);

    let tables = service
        .rate_tables(&office_id(), InsuranceKind::Pension)
        .expect("list");
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].bands[0].lower_limit, 58_000);
}

#[test]
fn kumiai_union_codes_are_separate_partitions_on_save() {
    let (service, _) = build_service();
    let session = hr_session();
    for union in ["U-100", "U-200"] {
        service
            .save_rate_table(
                &session,
                &office_id(),
                draft(
                    InsuranceKind::Health,
                    Some(HealthPlan::Kumiai {
                        union_code: Some(union.to_string()),
                    }),
                    "2025-04",
                    ladder(),
                ),
                false,
            )
            .expect("distinct union saved");
    }

    let tables = service
        .rate_tables(&office_id(), InsuranceKind::Health)
        .expect("list");
    assert_eq!(tables.len(), 2);
}

#[test]
fn listing_returns_newest_effective_month_first() {
    let (service, _) = build_service_with_tables();
    service
        .save_rate_table(
            &hr_session(),
            &office_id(),
            draft(InsuranceKind::Health, Some(tokyo()), "2025-03", ladder()),
            false,
        )
        .expect("save");

    let months: Vec<String> = service
        .rate_tables(&office_id(), InsuranceKind::Health)
        .expect("list")
        .iter()
        .map(|table| table.effective_from.to_string())
        .collect();
    assert_eq!(months, vec!["2025-03", "2024-03"]);
}

#[test]
fn drafts_are_validated_before_storage() {
    let (service, _) = build_service();
    let session = hr_session();

    let missing_plan = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Health, None, "2024-03", ladder()),
            false,
        )
        .expect_err("plan required");
    assert!(matches!(
        missing_plan,
        StandardRewardServiceError::InvalidDraft(_)
    ));

    let banded_care = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Care, None, "2024-03", ladder()),
            false,
        )
        .expect_err("care has no bands");
    assert!(matches!(
        banded_care,
        StandardRewardServiceError::InvalidDraft(_)
    ));

    let gapped = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(
                InsuranceKind::Pension,
                None,
                "2024-03",
                vec![band(1, 0, 63_000, 58_000), band(2, 64_000, 73_000, 68_000)],
            ),
            false,
        )
        .expect_err("gap rejected");
    assert!(matches!(
        gapped,
        StandardRewardServiceError::InvalidBands(BandTableError::Gap { .. })
    ));

    let mut bad_rate = draft(InsuranceKind::Care, None, "2024-03", Vec::new());
    bad_rate.rate = 1.6;
    assert!(matches!(
        service.save_rate_table(&session, &office_id(), bad_rate, false),
        Err(StandardRewardServiceError::InvalidBands(
            BandTableError::RateOutOfRange(_)
        ))
    ));

    service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Care, None, "2024-03", Vec::new()),
            false,
        )
        .expect("care rate saved");
}

#[test]
fn writes_require_edit_rights_on_the_office() {
    let (service, _) = build_service();
    let other_hr = service
        .session(&headers_for("hr-2"))
        .expect("known user");
    let error = service
        .save_rate_table(
            &other_hr,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-03", ladder()),
            false,
        )
        .expect_err("forbidden");
    assert!(matches!(
        error,
        StandardRewardServiceError::Session(SessionError::Forbidden(_))
    ));

    let staff = service
        .session(&headers_for("staff-1"))
        .expect("known user");
    assert!(matches!(
        service.commit(
            &staff,
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-06", None)
        ),
        Err(StandardRewardServiceError::Session(SessionError::Forbidden(_)))
    ));
}

#[test]
fn seeding_copies_presets_for_the_office_prefecture() {
    let (service, _) = build_service();
    let admin = admin_session();
    for preset in [
        cloud_table(InsuranceKind::Health, Some("13"), "2025-03", ladder()),
        cloud_table(InsuranceKind::Health, Some("27"), "2025-03", ladder()),
        cloud_table(InsuranceKind::Pension, None, "2025-09", ladder()),
    ] {
        service
            .publish_cloud_table(&admin, preset)
            .expect("preset published");
    }

    let hr = hr_session();
    let seeded = service
        .seed_from_cloud(&hr, &office_id(), InsuranceKind::Health, 2025, false)
        .expect("seed");
    assert_eq!(
        seeded,
        SeedOutcome {
            created: 1,
            overwritten: 0,
            skipped: 0
        }
    );
    let tables = service
        .rate_tables(&office_id(), InsuranceKind::Health)
        .expect("list");
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].plan, Some(tokyo()));

    let again = service
        .seed_from_cloud(&hr, &office_id(), InsuranceKind::Health, 2025, false)
        .expect("reseed");
    assert_eq!(again.skipped, 1);
    let forced = service
        .seed_from_cloud(&hr, &office_id(), InsuranceKind::Health, 2025, true)
        .expect("overwrite seed");
    assert_eq!(forced.overwritten, 1);

    let pension = service
        .seed_from_cloud(&hr, &office_id(), InsuranceKind::Pension, 2025, false)
        .expect("pension seed");
    assert_eq!(pension.created, 1);
}

#[test]
fn kumiai_offices_cannot_seed_health_presets() {
    let (service, store) = build_service();
    let admin = admin_session();
    service
        .upsert_office(
            &admin,
            Office {
                id: office_id(),
                name: "Union Office".to_string(),
                health_plan: Some(HealthPlan::Kumiai { union_code: None }),
            },
        )
        .expect("office updated");

    let error = service
        .seed_from_cloud(&admin, &office_id(), InsuranceKind::Health, 2025, false)
        .expect_err("kumiai rejected");
    assert!(matches!(error, StandardRewardServiceError::InvalidDraft(_)));
    assert!(store
        .tables_for_office(&office_id(), InsuranceKind::Health)
        .expect("scan")
        .is_empty());
}

#[test]
fn only_admins_publish_cloud_presets() {
    let (service, _) = build_service();
    let error = service
        .publish_cloud_table(
            &hr_session(),
            cloud_table(InsuranceKind::Pension, None, "2025-09", ladder()),
        )
        .expect_err("admin only");
    assert!(matches!(
        error,
        StandardRewardServiceError::Session(SessionError::AdminOnly)
    ));

    let mismatched = service
        .publish_cloud_table(&admin_session(), {
            let mut preset = cloud_table(InsuranceKind::Pension, None, "2025-09", ladder());
            preset.year = 2024;
            preset
        })
        .expect_err("year mismatch");
    assert!(matches!(
        mismatched,
        StandardRewardServiceError::InvalidDraft(_)
    ));
}

#[test]
fn commit_appends_one_entry_per_resolved_kind() {
    let (service, store) = build_service_with_tables();
    let outcome = service
        .commit(
            &hr_session(),
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-09", Some("annual review")),
        )
        .expect("commit");

    assert_eq!(outcome.entries.len(), 2);
    let health = &outcome.entries[0];
    assert_eq!(health.kind, InsuranceKind::Health);
    assert_eq!(health.applied_from, ym("2024-09"));
    assert_eq!(health.grade, 3);
    assert_eq!(health.standard_monthly_reward, 78_000);
    assert_eq!(health.note.as_deref(), Some("annual review"));
    assert_eq!(outcome.entries[1].kind, InsuranceKind::Pension);

    let stored = store
        .histories_for_employee(&employee_id())
        .expect("histories");
    assert_eq!(stored, outcome.entries);
}

#[test]
fn history_is_append_only_across_decisions() {
    let (service, store) = build_service_with_tables();
    let session = hr_session();
    let first = service
        .commit(
            &session,
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-09", None),
        )
        .expect("first commit");
    service
        .commit(
            &session,
            &office_id(),
            &employee_id(),
            commit_request(140_000, "2025-01", None),
        )
        .expect("second commit");

    let stored = store
        .histories_for_employee(&employee_id())
        .expect("histories");
    assert_eq!(stored.len(), 4);
    assert!(stored.contains(&first.entries[0]));
    assert!(stored.contains(&first.entries[1]));

    let in_2024 = service
        .effective_rewards(&office_id(), &employee_id(), ym("2024-12"))
        .expect("effective");
    assert_eq!(in_2024.health.map(|entry| entry.grade), Some(3));
    let in_2025 = service
        .effective_rewards(&office_id(), &employee_id(), ym("2025-06"))
        .expect("effective");
    assert_eq!(in_2025.pension.map(|entry| entry.grade), Some(10));
}

#[test]
fn commit_is_blocked_when_any_kind_errors() {
    let (service, store) = build_service();
    service
        .save_rate_table(
            &hr_session(),
            &office_id(),
            draft(InsuranceKind::Health, Some(tokyo()), "2024-03", ladder()),
            false,
        )
        .expect("health only");

    let error = service
        .commit(
            &hr_session(),
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-09", None),
        )
        .expect_err("blocked");
    match error {
        StandardRewardServiceError::CommitBlocked(result) => {
            assert_eq!(result.health_grade, Some(3));
            assert!(result.errors.pension.is_some());
        }
        other => panic!("expected blocked commit, got {other:?}"),
    }
    assert!(store
        .histories_for_employee(&employee_id())
        .expect("histories")
        .is_empty());
}

#[test]
fn commit_requires_an_employee_of_the_office() {
    let (service, store) = build_service_with_tables();
    store
        .upsert_employee(Employee {
            id: EmployeeId("emp-elsewhere".to_string()),
            office_id: OfficeId(OTHER_OFFICE.to_string()),
            employee_code: "X-1".to_string(),
            name: "Elsewhere".to_string(),
        })
        .expect("stored");

    let error = service
        .commit(
            &admin_session(),
            &office_id(),
            &EmployeeId("emp-elsewhere".to_string()),
            commit_request(75_000, "2024-09", None),
        )
        .expect_err("wrong office");
    assert!(matches!(
        error,
        StandardRewardServiceError::EmployeeNotFound(_)
    ));
}

#[test]
fn stored_history_omits_absent_notes() {
    let (service, store) = build_service_with_tables();
    let outcome = service
        .commit(
            &hr_session(),
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-09", None),
        )
        .expect("commit");

    let document = store
        .document("standard_reward_histories", &outcome.entries[0].id.0)
        .expect("stored document");
    let fields = document.as_object().expect("object document");
    assert!(!fields.contains_key("note"));
    assert_eq!(fields["applied_from"], "2024-09");
    assert_eq!(fields["decision_kind"], "regular");
}

#[test]
fn export_lists_each_employee_with_effective_grades() {
    let (service, _) = build_service_with_tables();
    service
        .upsert_employee(
            &hr_session(),
            Employee {
                id: EmployeeId("emp-002".to_string()),
                office_id: office_id(),
                employee_code: "E-002".to_string(),
                name: "Suzuki Taro".to_string(),
            },
        )
        .expect("employee saved");
    service
        .commit(
            &hr_session(),
            &office_id(),
            &employee_id(),
            commit_request(75_000, "2024-09", None),
        )
        .expect("commit");

    let csv = service
        .export_snapshot(&office_id(), ym("2024-12"))
        .expect("export");
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "employee_code,name,as_of,health_grade,health_standard_monthly,health_applied_from,\
         pension_grade,pension_standard_monthly,pension_applied_from"
    );
    assert_eq!(lines[1], "E-001,Sato Hanako,2024-12,3,78000,2024-09,3,78000,2024-09");
    assert_eq!(lines[2], "E-002,Suzuki Taro,2024-12,,,,,,");
}

#[test]
fn unknown_office_is_reported() {
    let (service, _) = build_service();
    let error = service
        .calculate(&OfficeId("nowhere".to_string()), 75_000, Some(ym("2024-06")))
        .expect_err("unknown office");
    assert!(matches!(error, StandardRewardServiceError::OfficeNotFound(_)));
}

#[test]
fn repository_outages_propagate() {
    let store = MemoryDocumentStore::new();
    let service = StandardRewardService::new(
        Arc::new(UnavailableTables),
        Arc::new(store.clone()),
        Arc::new(store),
    );
    let session = SessionContext::new(admin_profile());
    let error = service
        .save_rate_table(
            &session,
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-03", ladder()),
            false,
        )
        .expect_err("offline");
    assert!(matches!(error, StandardRewardServiceError::Repository(_)));
}

#[test]
fn concurrent_saves_store_one_table_per_partition() {
    for _ in 0..50 {
        let (service, store) = build_service();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    service.save_rate_table(
                        &hr_session(),
                        &office_id(),
                        draft(InsuranceKind::Pension, None, "2024-04", ladder()),
                        false,
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("saver thread"))
            .collect();
        let saved = results.iter().filter(|result| result.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|result| {
                matches!(
                    result,
                    Err(StandardRewardServiceError::DuplicateTable { .. })
                )
            })
            .count();
        assert_eq!(saved, 1);
        assert_eq!(duplicates, 7);
        assert_eq!(
            store
                .tables_for_office(&office_id(), InsuranceKind::Pension)
                .expect("scan")
                .len(),
            1
        );
    }
}

#[test]
fn stored_tables_carry_their_effective_month_keys() {
    let (service, store) = build_service();
    let saved = service
        .save_rate_table(
            &hr_session(),
            &office_id(),
            draft(InsuranceKind::Pension, None, "2024-09", ladder()),
            false,
        )
        .expect("saved");

    let document = store
        .document("rate_tables", &saved.table.id.0)
        .expect("document stored");
    assert_eq!(document["effective_year"], 2024);
    assert_eq!(document["effective_month"], 9);
    assert_eq!(document["effective_year_month"], 202409);
    assert_eq!(document["effective_from"], "2024-09");
}

#[test]
fn export_for_an_office_without_employees_still_has_headers() {
    let (service, _) = build_service();
    service
        .upsert_office(
            &admin_session(),
            Office {
                id: OfficeId(OTHER_OFFICE.to_string()),
                name: "Empty Branch".to_string(),
                health_plan: None,
            },
        )
        .expect("office stored");

    let csv = service
        .export_snapshot(&OfficeId(OTHER_OFFICE.to_string()), ym("2024-12"))
        .expect("export");
    assert_eq!(
        csv,
        "employee_code,name,as_of,health_grade,health_standard_monthly,health_applied_from,\
         pension_grade,pension_standard_monthly,pension_applied_from\n"
    );
}

#[test]
fn cloud_presets_must_match_prefecture_scoping() {
    let (service, _) = build_service();
    let admin = admin_session();

    let health_without_pref = service
        .publish_cloud_table(
            &admin,
            cloud_table(InsuranceKind::Health, None, "2025-03", ladder()),
        )
        .expect_err("health needs a prefecture");
    assert!(matches!(
        health_without_pref,
        StandardRewardServiceError::InvalidDraft(_)
    ));

    for kind in [InsuranceKind::Pension, InsuranceKind::Care] {
        let bands = if kind == InsuranceKind::Care {
            Vec::new()
        } else {
            ladder()
        };
        let error = service
            .publish_cloud_table(&admin, cloud_table(kind, Some("13"), "2025-03", bands))
            .expect_err("nationwide presets take no prefecture");
        assert!(matches!(error, StandardRewardServiceError::InvalidDraft(_)));
    }

    service
        .publish_cloud_table(
            &admin,
            cloud_table(InsuranceKind::Health, Some("13"), "2025-03", ladder()),
        )
        .expect("kyokai preset accepted");
}
