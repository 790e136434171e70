use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::models::{Person, ShiftAssignment, ShiftCode, ShiftOrigin};

/// One day of one person, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyShiftDto {
    pub date: NaiveDate,
    pub shift_code: ShiftCode,
    pub origin: ShiftOrigin,
}

impl From<&ShiftAssignment> for DailyShiftDto {
    fn from(a: &ShiftAssignment) -> Self {
        Self {
            date: a.date,
            shift_code: a.shift_code,
            origin: a.origin,
        }
    }
}

/// A person and their days within the requested month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonScheduleDto {
    pub person: Person,
    pub days: Vec<DailyShiftDto>, // ordered by date
}

/// Result of the monthly schedule command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyScheduleResult {
    pub year: i32,
    pub month: u32,
    pub people: Vec<PersonScheduleDto>,
}

impl MonthlyScheduleResult {
    pub fn shift_of(&self, code: &str, date: NaiveDate) -> Option<ShiftCode> {
        self.people
            .iter()
            .find(|p| p.person.code == code)?
            .days
            .iter()
            .find(|d| d.date == date)
            .map(|d| d.shift_code)
    }
}
