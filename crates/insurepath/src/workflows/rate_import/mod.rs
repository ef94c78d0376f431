//! Bulk import of office rate tables from CSV.
//!
//! Columns: `kind,plan_type,plan_code,effective_from,rate,grade,lower_limit,upper_limit,standard_monthly`.
//! A blank `upper_limit` marks the open-ended top band; care rows leave the band columns empty.

mod parser;

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::workflows::standard_reward::{
    HistoryRepository, OfficeId, OfficeRepository, RateTableDraft, RateTableRepository,
    SessionContext, StandardRewardService, StandardRewardServiceError,
};

#[derive(Debug)]
pub enum RateTableImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { line: u64, reason: String },
}

impl std::fmt::Display for RateTableImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateTableImportError::Io(err) => write!(f, "failed to read rate table CSV: {}", err),
            RateTableImportError::Csv(err) => write!(f, "invalid rate table CSV data: {}", err),
            RateTableImportError::InvalidRow { line, reason } => {
                write!(f, "rate table CSV line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for RateTableImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RateTableImportError::Io(err) => Some(err),
            RateTableImportError::Csv(err) => Some(err),
            RateTableImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for RateTableImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RateTableImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<parser::ParseError> for RateTableImportError {
    fn from(err: parser::ParseError) -> Self {
        match err {
            parser::ParseError::Csv(err) => Self::Csv(err),
            parser::ParseError::Row(row) => Self::InvalidRow {
                line: row.line,
                reason: row.reason,
            },
        }
    }
}

/// Counts of what an import wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub replaced: usize,
}

pub struct RateTableImporter;

impl RateTableImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<RateTableDraft>, RateTableImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<RateTableDraft>, RateTableImportError> {
        Ok(parser::parse_drafts(reader)?)
    }

    /// Save every draft for the office, replacing tables already registered for the
    /// same kind, plan, and month. Nothing is written unless every draft is valid.
    pub fn apply<T, H>(
        service: &StandardRewardService<T, H>,
        session: &SessionContext,
        office_id: &OfficeId,
        drafts: Vec<RateTableDraft>,
    ) -> Result<ImportSummary, StandardRewardServiceError>
    where
        T: RateTableRepository + OfficeRepository + 'static,
        H: HistoryRepository + 'static,
    {
        let mut summary = ImportSummary::default();
        for outcome in service.save_rate_tables(session, office_id, drafts, true)? {
            if outcome.replaced {
                summary.replaced += 1;
            } else {
                summary.created += 1;
            }
        }

        info!(
            office = %office_id,
            created = summary.created,
            replaced = summary.replaced,
            "rate tables imported"
        );
        Ok(summary)
    }
}
