use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::workflows::standard_reward::{
    Band, HealthPlan, InsuranceKind, RateTableDraft, YearMonth, Yen, NO_UPPER_LIMIT,
};

/// A row that failed to parse, with the 1-based line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RowError {
    pub(crate) line: u64,
    pub(crate) reason: String,
}

#[derive(Debug)]
pub(crate) enum ParseError {
    Csv(csv::Error),
    Row(RowError),
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct RateRow {
    kind: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    plan_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    plan_code: Option<String>,
    effective_from: String,
    rate: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    grade: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    lower_limit: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    upper_limit: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    standard_monthly: Option<String>,
}

#[derive(Debug)]
struct ParsedRow {
    kind: InsuranceKind,
    plan: Option<HealthPlan>,
    effective_from: YearMonth,
    rate: f64,
    band: Option<Band>,
}

/// Parse the import CSV into drafts. Consecutive rows sharing kind, plan, and month
/// collapse into one draft whose bands keep row order.
pub(crate) fn parse_drafts<R: Read>(reader: R) -> Result<Vec<RateTableDraft>, ParseError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut drafts: Vec<RateTableDraft> = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let row: RateRow = record.deserialize(Some(&headers))?;
        let parsed = parse_row(row).map_err(|reason| ParseError::Row(RowError { line, reason }))?;

        match drafts.last_mut() {
            Some(draft)
                if draft.kind == parsed.kind
                    && draft.plan == parsed.plan
                    && draft.effective_from == parsed.effective_from =>
            {
                if draft.rate != parsed.rate {
                    return Err(ParseError::Row(RowError {
                        line,
                        reason: format!(
                            "rate {} differs from {} earlier in the same table",
                            parsed.rate, draft.rate
                        ),
                    }));
                }
                draft.bands.extend(parsed.band);
            }
            _ => drafts.push(RateTableDraft {
                kind: parsed.kind,
                plan: parsed.plan,
                effective_from: parsed.effective_from,
                rate: parsed.rate,
                bands: parsed.band.into_iter().collect(),
            }),
        }
    }

    Ok(drafts)
}

fn parse_row(row: RateRow) -> Result<ParsedRow, String> {
    let kind: InsuranceKind = row.kind.parse().map_err(|err| format!("{err}"))?;
    let effective_from: YearMonth = row
        .effective_from
        .parse()
        .map_err(|err| format!("effective_from: {err}"))?;
    let rate: f64 = row
        .rate
        .parse()
        .map_err(|_| format!("rate '{}' is not a number", row.rate))?;
    let plan = parse_plan(row.plan_type.as_deref(), row.plan_code)?;

    let band = match (
        row.grade.as_deref(),
        row.lower_limit.as_deref(),
        row.upper_limit.as_deref(),
        row.standard_monthly.as_deref(),
    ) {
        (None, None, None, None) => None,
        (Some(grade), Some(lower), upper, Some(standard)) => Some(Band {
            grade: grade
                .parse()
                .map_err(|_| format!("grade '{grade}' is not a whole number"))?,
            lower_limit: parse_yen("lower_limit", lower)?,
            upper_limit: match upper {
                Some(upper) => parse_yen("upper_limit", upper)?,
                None => NO_UPPER_LIMIT,
            },
            standard_monthly: parse_yen("standard_monthly", standard)?,
        }),
        _ => {
            return Err(
                "band rows need grade, lower_limit, and standard_monthly".to_string(),
            )
        }
    };

    Ok(ParsedRow {
        kind,
        plan,
        effective_from,
        rate,
        band,
    })
}

fn parse_plan(plan_type: Option<&str>, plan_code: Option<String>) -> Result<Option<HealthPlan>, String> {
    match plan_type.map(str::to_ascii_lowercase).as_deref() {
        None => match plan_code {
            Some(_) => Err("plan_code given without plan_type".to_string()),
            None => Ok(None),
        },
        Some("kyokai") => plan_code
            .map(|pref_code| Some(HealthPlan::Kyokai { pref_code }))
            .ok_or_else(|| "kyokai tables need a prefecture code".to_string()),
        Some("kumiai") => Ok(Some(HealthPlan::Kumiai {
            union_code: plan_code,
        })),
        Some(other) => Err(format!("unknown plan_type '{other}'")),
    }
}

fn parse_yen(column: &str, value: &str) -> Result<Yen, String> {
    let digits: String = value.chars().filter(|c| *c != ',').collect();
    digits
        .parse()
        .map_err(|_| format!("{column} '{value}' is not a yen amount"))
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
