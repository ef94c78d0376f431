use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::domain::{
    Band, CloudRateTable, Employee, EmployeeId, HealthPlan, InsuranceKind, Office, OfficeId,
    RateTable, StandardRewardHistory,
};
use super::repository::{
    HistoryRepository, OfficeRepository, RateTableRepository, RepositoryError, TableWrite,
};
use super::sanitize::{Payload, ToDocument};
use super::session::{ProfileDirectory, UserProfile};

const OFFICES: &str = "offices";
const RATE_TABLES: &str = "rate_tables";
const CLOUD_RATE_TABLES: &str = "cloud_rate_tables";
const HISTORIES: &str = "standard_reward_histories";
const EMPLOYEES: &str = "employees";
const USERS: &str = "users";

type Collections = BTreeMap<&'static str, BTreeMap<String, Value>>;

/// In-process document store: named collections of JSON documents keyed by id.
///
/// Writes are sanitized payloads, reads decode the stored JSON back into records, so the
/// store behaves like the hosted document database the console talks to.
#[derive(Debug, Default, Clone)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<Collections>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored document, as written after sanitizing.
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.lock()
            .ok()?
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Collections>, RepositoryError> {
        self.collections
            .lock()
            .map_err(|_| RepositoryError::Unavailable("document store lock poisoned".to_string()))
    }

    fn write(
        &self,
        collection: &'static str,
        id: &str,
        payload: Payload,
    ) -> Result<(), RepositoryError> {
        let document = payload.sanitize();
        self.lock()?
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    fn insert_new(
        &self,
        collection: &'static str,
        id: &str,
        payload: Payload,
    ) -> Result<(), RepositoryError> {
        let document = payload.sanitize();
        let mut guard = self.lock()?;
        let documents = guard.entry(collection).or_default();
        if documents.contains_key(id) {
            return Err(RepositoryError::Conflict);
        }
        documents.insert(id.to_string(), document);
        Ok(())
    }

    fn read<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, RepositoryError> {
        let guard = self.lock()?;
        let document = guard
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned();
        drop(guard);

        document
            .map(|value| serde_json::from_value(value).map_err(RepositoryError::from))
            .transpose()
    }

    fn scan<T, F>(&self, collection: &str, keep: F) -> Result<Vec<T>, RepositoryError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let documents: Vec<Value> = self
            .lock()?
            .get(collection)
            .map(|documents| documents.values().cloned().collect())
            .unwrap_or_default();

        let mut records = Vec::new();
        for value in documents {
            let record: T = serde_json::from_value(value)?;
            if keep(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl OfficeRepository for MemoryDocumentStore {
    fn fetch_office(&self, id: &OfficeId) -> Result<Option<Office>, RepositoryError> {
        self.read(OFFICES, &id.0)
    }

    fn upsert_office(&self, office: Office) -> Result<(), RepositoryError> {
        self.write(OFFICES, &office.id.0, office.to_document())
    }
}

impl RateTableRepository for MemoryDocumentStore {
    fn tables_for_office(
        &self,
        office_id: &OfficeId,
        kind: InsuranceKind,
    ) -> Result<Vec<RateTable>, RepositoryError> {
        self.scan(RATE_TABLES, |table: &RateTable| {
            &table.office_id == office_id && table.kind == kind
        })
    }

    fn save_table(
        &self,
        mut table: RateTable,
        overwrite: bool,
    ) -> Result<TableWrite, RepositoryError> {
        let mut guard = self.lock()?;
        let documents = guard.entry(RATE_TABLES).or_default();

        let mut holder = None;
        for value in documents.values() {
            let stored: RateTable = serde_json::from_value(value.clone())?;
            if stored.same_partition(&table) {
                holder = Some(stored);
                break;
            }
        }

        let replaced = match holder {
            Some(stored) if !overwrite => return Ok(TableWrite::Duplicate(stored.id)),
            Some(stored) => {
                table.id = stored.id;
                table.created_at = stored.created_at;
                true
            }
            None => false,
        };

        documents.insert(table.id.0.clone(), table.to_document().sanitize());
        Ok(if replaced {
            TableWrite::Replaced(table)
        } else {
            TableWrite::Created(table)
        })
    }

    fn cloud_tables(
        &self,
        kind: InsuranceKind,
        year: u16,
    ) -> Result<Vec<CloudRateTable>, RepositoryError> {
        self.scan(CLOUD_RATE_TABLES, |table: &CloudRateTable| {
            table.kind == kind && table.year == year
        })
    }

    fn save_cloud_table(&self, table: CloudRateTable) -> Result<(), RepositoryError> {
        self.write(CLOUD_RATE_TABLES, &table.key(), table.to_document())
    }
}

impl HistoryRepository for MemoryDocumentStore {
    fn append_history(
        &self,
        entry: StandardRewardHistory,
    ) -> Result<StandardRewardHistory, RepositoryError> {
        self.insert_new(HISTORIES, &entry.id.0, entry.to_document())?;
        Ok(entry)
    }

    fn histories_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<StandardRewardHistory>, RepositoryError> {
        let mut entries = self.scan(HISTORIES, |entry: &StandardRewardHistory| {
            &entry.employee_id == employee_id
        })?;
        entries.sort_by(|left, right| {
            left.applied_from
                .cmp(&right.applied_from)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(entries)
    }

    fn fetch_employee(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        self.read(EMPLOYEES, &id.0)
    }

    fn employees_for_office(&self, office_id: &OfficeId) -> Result<Vec<Employee>, RepositoryError> {
        let mut employees = self.scan(EMPLOYEES, |employee: &Employee| {
            &employee.office_id == office_id
        })?;
        employees.sort_by(|left, right| left.employee_code.cmp(&right.employee_code));
        Ok(employees)
    }

    fn upsert_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        self.write(EMPLOYEES, &employee.id.0, employee.to_document())
    }
}

impl ProfileDirectory for MemoryDocumentStore {
    fn profile(&self, uid: &str) -> Result<Option<UserProfile>, RepositoryError> {
        self.read(USERS, uid)
    }

    fn upsert_profile(&self, profile: UserProfile) -> Result<(), RepositoryError> {
        self.write(USERS, &profile.uid, profile.to_document())
    }
}

fn plan_payload(plan: &HealthPlan) -> Payload {
    match plan {
        HealthPlan::Kyokai { pref_code } => Payload::object()
            .field("plan_type", plan.plan_type())
            .field("pref_code", pref_code.as_str())
            .build(),
        HealthPlan::Kumiai { union_code } => Payload::object()
            .field("plan_type", plan.plan_type())
            .field("union_code", union_code.clone())
            .build(),
    }
}

fn bands_payload(bands: &[Band]) -> Payload {
    Payload::Array(
        bands
            .iter()
            .map(|band| {
                Payload::object()
                    .field("grade", band.grade)
                    .field("lower_limit", band.lower_limit)
                    .field("upper_limit", band.upper_limit)
                    .field("standard_monthly", band.standard_monthly)
                    .build()
            })
            .collect(),
    )
}

impl ToDocument for Office {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("id", self.id.0.as_str())
            .field("name", self.name.as_str())
            .field("health_plan", self.health_plan.as_ref().map(plan_payload))
            .build()
    }
}

impl ToDocument for RateTable {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("id", self.id.0.as_str())
            .field("office_id", self.office_id.0.as_str())
            .field("kind", self.kind.as_str())
            .field("plan", self.plan.as_ref().map(plan_payload))
            .field("effective_from", self.effective_from.to_string())
            .field("effective_year", self.effective_year())
            .field("effective_month", u16::from(self.effective_month()))
            .field("effective_year_month", self.effective_year_month())
            .field("rate", self.rate)
            .field("bands", bands_payload(&self.bands))
            .field("created_at", self.created_at.to_rfc3339())
            .field("updated_at", self.updated_at.to_rfc3339())
            .build()
    }
}

impl ToDocument for CloudRateTable {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("kind", self.kind.as_str())
            .field("year", self.year)
            .field("pref_code", self.pref_code.clone())
            .field("effective_from", self.effective_from.to_string())
            .field("rate", self.rate)
            .field("bands", bands_payload(&self.bands))
            .field("updated_at", self.updated_at.to_rfc3339())
            .build()
    }
}

impl ToDocument for StandardRewardHistory {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("id", self.id.0.as_str())
            .field("employee_id", self.employee_id.0.as_str())
            .field("office_id", self.office_id.0.as_str())
            .field("kind", self.kind.as_str())
            .field("applied_from", self.applied_from.to_string())
            .field("grade", self.grade)
            .field("standard_monthly_reward", self.standard_monthly_reward)
            .field("decision_kind", self.decision_kind.as_str())
            .field("note", self.note.clone())
            .field("created_at", self.created_at.to_rfc3339())
            .build()
    }
}

impl ToDocument for Employee {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("id", self.id.0.as_str())
            .field("office_id", self.office_id.0.as_str())
            .field("employee_code", self.employee_code.as_str())
            .field("name", self.name.as_str())
            .build()
    }
}

impl ToDocument for UserProfile {
    fn to_document(&self) -> Payload {
        Payload::object()
            .field("uid", self.uid.as_str())
            .field("display_name", self.display_name.as_str())
            .field("role", self.role.as_str())
            .field("office_id", self.office_id.as_ref().map(|id| id.0.as_str()))
            .build()
    }
}
