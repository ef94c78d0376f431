use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Amount in the smallest currency unit (integer yen).
pub type Yen = i64;

/// Upper limit stored on the top band, standing in for "no ceiling".
pub const NO_UPPER_LIMIT: Yen = 999_999_999;

/// Renders an amount as `¥1,234,567`.
pub fn format_yen(amount: Yen) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    if amount < 0 {
        format!("-¥{grouped}")
    } else {
        format!("¥{grouped}")
    }
}

/// Calendar month in fixed-width `YYYY-MM` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: u16,
    month: u8,
}

impl YearMonth {
    pub fn new(year: u16, month: u8) -> Result<Self, YearMonthError> {
        if !(1900..=9999).contains(&year) {
            return Err(YearMonthError::YearOutOfRange(year));
        }
        if !(1..=12).contains(&month) {
            return Err(YearMonthError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    pub const fn year(self) -> u16 {
        self.year
    }

    pub const fn month(self) -> u8 {
        self.month
    }

    /// Integer sort key `year * 100 + month`, e.g. `202403`.
    pub const fn key(self) -> u32 {
        self.year as u32 * 100 + self.month as u32
    }

    pub fn from_key(key: u32) -> Result<Self, YearMonthError> {
        let year = u16::try_from(key / 100).map_err(|_| YearMonthError::Malformed(key.to_string()))?;
        let month = (key % 100) as u8;
        Self::new(year, month)
    }

    /// The following month, or `None` past December 9999.
    pub fn succ(self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year.checked_add(1)?, 1).ok()
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// The preceding month, or `None` before January 1900.
    pub fn pred(self) -> Option<Self> {
        if self.month == 1 {
            Self::new(self.year.checked_sub(1)?, 12).ok()
        } else {
            Some(Self {
                year: self.year,
                month: self.month - 1,
            })
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let bytes = trimmed.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(index, byte)| index == 4 || byte.is_ascii_digit());
        if !well_formed {
            return Err(YearMonthError::Malformed(raw.to_string()));
        }

        let year = trimmed[..4]
            .parse::<u16>()
            .map_err(|_| YearMonthError::Malformed(raw.to_string()))?;
        let month = trimmed[5..]
            .parse::<u8>()
            .map_err(|_| YearMonthError::Malformed(raw.to_string()))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = YearMonthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum YearMonthError {
    #[error("'{0}' is not a YYYY-MM year-month")]
    Malformed(String),
    #[error("year {0} is outside 1900..=9999")]
    YearOutOfRange(u16),
    #[error("month {0} is outside 1..=12")]
    MonthOutOfRange(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsuranceKind {
    Health,
    Care,
    Pension,
}

impl InsuranceKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Care => "care",
            Self::Pension => "pension",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Health => "health insurance",
            Self::Care => "care insurance",
            Self::Pension => "welfare pension",
        }
    }

    /// Care premiums are a flat rate on the health grade; only health and pension carry bands.
    pub const fn has_bands(self) -> bool {
        !matches!(self, Self::Care)
    }

    /// Health tables are partitioned by the office's plan; the others are not.
    pub const fn is_plan_scoped(self) -> bool {
        matches!(self, Self::Health)
    }
}

impl fmt::Display for InsuranceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsuranceKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "health" => Ok(Self::Health),
            "care" => Ok(Self::Care),
            "pension" => Ok(Self::Pension),
            other => Err(format!("unknown insurance kind '{other}'")),
        }
    }
}

/// Health insurance plan the office is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "plan_type", rename_all = "snake_case")]
pub enum HealthPlan {
    /// Japan Health Insurance Association; rates vary by prefecture.
    Kyokai { pref_code: String },
    /// Society-managed health insurance union.
    Kumiai {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        union_code: Option<String>,
    },
}

impl HealthPlan {
    pub const fn plan_type(&self) -> &'static str {
        match self {
            Self::Kyokai { .. } => "kyokai",
            Self::Kumiai { .. } => "kumiai",
        }
    }

    /// Whether a table registered under `table_plan` applies to an office on `self`.
    /// Kumiai tables are not partitioned by union code for lookups.
    pub fn selects(&self, table_plan: &HealthPlan) -> bool {
        match (self, table_plan) {
            (Self::Kyokai { pref_code: office }, Self::Kyokai { pref_code: table }) => {
                office == table
            }
            (Self::Kumiai { .. }, Self::Kumiai { .. }) => true,
            _ => false,
        }
    }

    /// Identity used for the duplicate check on save, where the union code does count.
    pub fn same_partition(&self, other: &HealthPlan) -> bool {
        match (self, other) {
            (Self::Kumiai { union_code: left }, Self::Kumiai { union_code: right }) => {
                left == right
            }
            _ => self.selects(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfficeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RateTableId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryId(pub String);

macro_rules! display_id {
    ($($name:ident),+) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

display_id!(OfficeId, EmployeeId, RateTableId, HistoryId);

/// Employer establishment registered for social insurance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub name: String,
    #[serde(default)]
    pub health_plan: Option<HealthPlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub office_id: OfficeId,
    pub employee_code: String,
    pub name: String,
}

/// One grade of a banded rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub grade: u16,
    pub lower_limit: Yen,
    pub upper_limit: Yen,
    pub standard_monthly: Yen,
}

impl Band {
    pub const fn contains(&self, salary: Yen) -> bool {
        self.lower_limit <= salary && salary <= self.upper_limit
    }
}

/// Office-scoped rate table for one insurance kind, effective from a month onward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub id: RateTableId,
    pub office_id: OfficeId,
    pub kind: InsuranceKind,
    /// Present on health tables only.
    #[serde(default)]
    pub plan: Option<HealthPlan>,
    pub effective_from: YearMonth,
    /// Premium rate as a fraction in `[0, 1]`.
    pub rate: f64,
    #[serde(default)]
    pub bands: Vec<Band>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateTable {
    pub fn effective_year(&self) -> u16 {
        self.effective_from.year()
    }

    pub fn effective_month(&self) -> u8 {
        self.effective_from.month()
    }

    pub fn effective_year_month(&self) -> u32 {
        self.effective_from.key()
    }

    /// Whether `other` occupies the same office, kind, month, and plan partition. At most
    /// one stored table may hold a partition.
    pub fn same_partition(&self, other: &RateTable) -> bool {
        self.office_id == other.office_id
            && self.kind == other.kind
            && self.effective_from == other.effective_from
            && match (&self.plan, &other.plan) {
                (Some(left), Some(right)) => left.same_partition(right),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Admin-entered table contents before an id and timestamps are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTableDraft {
    pub kind: InsuranceKind,
    #[serde(default)]
    pub plan: Option<HealthPlan>,
    pub effective_from: YearMonth,
    pub rate: f64,
    #[serde(default)]
    pub bands: Vec<Band>,
}

/// System-wide preset table that office tables can be seeded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudRateTable {
    pub kind: InsuranceKind,
    pub year: u16,
    /// Prefecture for kyokai health presets; `None` for nationwide tables.
    #[serde(default)]
    pub pref_code: Option<String>,
    pub effective_from: YearMonth,
    pub rate: f64,
    #[serde(default)]
    pub bands: Vec<Band>,
    pub updated_at: DateTime<Utc>,
}

impl CloudRateTable {
    /// Document key: `{kind}-{year}` or `{kind}-{year}-{pref_code}`.
    pub fn key(&self) -> String {
        match &self.pref_code {
            Some(pref) => format!("{}-{}-{}", self.kind, self.year, pref),
            None => format!("{}-{}", self.kind, self.year),
        }
    }
}

/// How a standard reward decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Determined on acquiring insurance eligibility.
    Acquisition,
    /// Annual determination from April to June pay.
    Regular,
    /// Revision after a significant fixed-wage change.
    Interim,
    Bonus,
    Other,
}

impl DecisionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquisition => "acquisition",
            Self::Regular => "regular",
            Self::Interim => "interim",
            Self::Bonus => "bonus",
            Self::Other => "other",
        }
    }
}

/// Recorded standard monthly reward for one employee and insurance kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRewardHistory {
    pub id: HistoryId,
    pub employee_id: EmployeeId,
    pub office_id: OfficeId,
    pub kind: InsuranceKind,
    pub applied_from: YearMonth,
    pub grade: u16,
    pub standard_monthly_reward: Yen,
    pub decision_kind: DecisionKind,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}
