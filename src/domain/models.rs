// =====================
// Domain models
// =====================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type PersonCode = String;

/// A code string that does not belong to one of the fixed alphabets
/// (rotation groups, shift codes, origins, statuses).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} `{value}`")]
pub struct UnknownCode {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownCode {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

// --- Rotation group ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RotationGroup {
    A,
    B,
    C,
    D,
    /// Paired 5/7 group working only shifts 1 and 2
    E,
}

impl RotationGroup {
    pub const ALL: [RotationGroup; 5] = [
        RotationGroup::A,
        RotationGroup::B,
        RotationGroup::C,
        RotationGroup::D,
        RotationGroup::E,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationGroup::A => "A",
            RotationGroup::B => "B",
            RotationGroup::C => "C",
            RotationGroup::D => "D",
            RotationGroup::E => "E",
        }
    }

    pub fn is_paired(&self) -> bool {
        matches!(self, RotationGroup::E)
    }

    /// Day offset into the 8-day cycle. `None` for the paired group,
    /// which does not follow the cycle.
    pub fn phase_offset(&self) -> Option<i64> {
        match self {
            RotationGroup::A => Some(0),
            RotationGroup::B => Some(2),
            RotationGroup::C => Some(4),
            RotationGroup::D => Some(6),
            RotationGroup::E => None,
        }
    }
}

impl FromStr for RotationGroup {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        RotationGroup::ALL
            .into_iter()
            .find(|g| g.as_str() == wanted)
            .ok_or_else(|| UnknownCode::new("rotation group", s))
    }
}

impl fmt::Display for RotationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Shift code ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShiftCode {
    #[serde(rename = "1")]
    First,
    #[serde(rename = "2")]
    Second,
    #[serde(rename = "3")]
    Third,
    #[serde(rename = "R")]
    Rest,
    /// Paid leave
    #[serde(rename = "C")]
    Leave,
    #[serde(rename = "M")]
    Sick,
    /// Any other absence
    #[serde(rename = "A")]
    Other,
}

impl ShiftCode {
    pub const ALL: [ShiftCode; 7] = [
        ShiftCode::First,
        ShiftCode::Second,
        ShiftCode::Third,
        ShiftCode::Rest,
        ShiftCode::Leave,
        ShiftCode::Sick,
        ShiftCode::Other,
    ];

    /// The 8-day cycle followed by the standard groups.
    pub const STANDARD_CYCLE: [ShiftCode; 8] = [
        ShiftCode::First,
        ShiftCode::First,
        ShiftCode::Second,
        ShiftCode::Second,
        ShiftCode::Third,
        ShiftCode::Third,
        ShiftCode::Rest,
        ShiftCode::Rest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftCode::First => "1",
            ShiftCode::Second => "2",
            ShiftCode::Third => "3",
            ShiftCode::Rest => "R",
            ShiftCode::Leave => "C",
            ShiftCode::Sick => "M",
            ShiftCode::Other => "A",
        }
    }

    pub fn is_work(&self) -> bool {
        matches!(self, ShiftCode::First | ShiftCode::Second | ShiftCode::Third)
    }

    pub fn is_absence(&self) -> bool {
        matches!(self, ShiftCode::Leave | ShiftCode::Sick | ShiftCode::Other)
    }
}

impl FromStr for ShiftCode {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1" => Ok(ShiftCode::First),
            "2" => Ok(ShiftCode::Second),
            "3" => Ok(ShiftCode::Third),
            "R" => Ok(ShiftCode::Rest),
            "C" => Ok(ShiftCode::Leave),
            "M" => Ok(ShiftCode::Sick),
            "A" => Ok(ShiftCode::Other),
            _ => Err(UnknownCode::new("shift code", s)),
        }
    }
}

impl fmt::Display for ShiftCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Origin / status tags ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftOrigin {
    Generated,
    Imported,
    Manual,
    /// Written by a leave period; removed again when the period is cleared
    Leave,
}

impl ShiftOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftOrigin::Generated => "generated",
            ShiftOrigin::Imported => "imported",
            ShiftOrigin::Manual => "manual",
            ShiftOrigin::Leave => "leave",
        }
    }
}

impl FromStr for ShiftOrigin {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(ShiftOrigin::Generated),
            "imported" => Ok(ShiftOrigin::Imported),
            "manual" => Ok(ShiftOrigin::Manual),
            "leave" => Ok(ShiftOrigin::Leave),
            _ => Err(UnknownCode::new("shift origin", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonStatus {
    Active,
    Inactive,
}

impl PersonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonStatus::Active => "active",
            PersonStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for PersonStatus {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PersonStatus::Active),
            "inactive" => Ok(PersonStatus::Inactive),
            _ => Err(UnknownCode::new("person status", s)),
        }
    }
}

// --- Person ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub code: PersonCode,
    pub name: String,
    pub group: RotationGroup,
    pub entry_date: NaiveDate,
    pub status: PersonStatus,
}

impl Person {
    pub fn is_active(&self) -> bool {
        self.status == PersonStatus::Active
    }
}

/// Administrative input for creating or updating a person.
/// Every field but the code may be omitted on update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRecord {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<PersonStatus>,
}

impl PersonRecord {
    pub fn new(code: &str, name: &str, group: &str) -> Self {
        Self {
            code: code.to_string(),
            name: Some(name.to_string()),
            group: Some(group.to_string()),
            ..Default::default()
        }
    }

    pub fn with_entry_date(mut self, entry_date: NaiveDate) -> Self {
        self.entry_date = Some(entry_date);
        self
    }
}

/// Identifiers are compared upper-cased and trimmed.
pub fn normalize_code(code: &str) -> PersonCode {
    code.trim().to_uppercase()
}

// --- Shift assignment ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftAssignment {
    pub person_code: PersonCode,
    pub date: NaiveDate,
    pub shift_code: ShiftCode,
    pub origin: ShiftOrigin,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `None` when `end` is before `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn day_count(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let range = *self;
        self.start.iter_days().take_while(move |d| range.contains(*d))
    }
}

/// Aggregate for one statistics period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStats {
    pub total_active_people: u32,
    /// Every shift code seen in the period, including rest and absences.
    pub counts_by_shift_code: BTreeMap<ShiftCode, u32>,
    /// Worked shifts (1/2/3) per rotation group.
    pub counts_by_group: BTreeMap<RotationGroup, u32>,
}

/// One person's totals for a statistics period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonStats {
    pub person: Person,
    pub period: DateRange,
    pub counts_by_shift_code: BTreeMap<ShiftCode, u32>,
    /// Days on shift 1, 2 or 3.
    pub worked_days: u32,
}

impl PersonStats {
    pub fn count(&self, code: ShiftCode) -> u32 {
        self.counts_by_shift_code.get(&code).copied().unwrap_or(0)
    }
}

/// Authoritative dataset adopted wholesale on a full resync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub people: Vec<Person>,
    #[serde(default)]
    pub assignments: Vec<ShiftAssignment>,
}

// --- Import collaborator contract ---

/// One normalized person row handed over by the import collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub code: String,
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub entry_date: Option<NaiveDate>,
}

/// One shift row handed over by the import collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedShift {
    pub person_code: String,
    pub date: NaiveDate,
    pub shift_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: u32,
    pub skipped: u32,
    /// One message per erroring row, prefixed with its position.
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn total(&self) -> u32 {
        self.imported + self.skipped + self.errors.len() as u32
    }
}

#[cfg(test)]
mod models_tests {
    use super::*;

    #[test]
    fn codes_are_case_normalized() {
        assert_eq!(normalize_code("  a01 "), "A01");
        assert_eq!(" e ".parse::<RotationGroup>(), Ok(RotationGroup::E));
        assert_eq!("r".parse::<ShiftCode>(), Ok(ShiftCode::Rest));
        assert!("F".parse::<RotationGroup>().is_err());
        assert!("X".parse::<ShiftCode>().is_err());
    }

    #[test]
    fn shift_codes_serialize_as_single_characters() {
        let json = serde_json::to_string(&ShiftCode::ALL).unwrap();
        assert_eq!(json, r#"["1","2","3","R","C","M","A"]"#);
    }

    #[test]
    fn date_range_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let range = DateRange::new(start, end).unwrap();

        assert_eq!(range.day_count(), 4);
        assert_eq!(range.days().count(), 4);
        assert!(range.contains(end));
        assert!(DateRange::new(end, start).is_none());
    }
}
