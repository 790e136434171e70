use chrono::{Datelike, NaiveDate};

use crate::domain::models::{RotationGroup, ShiftCode};

/// Length of the standard A-D cycle.
pub const CYCLE_LENGTH: i64 = 8;

/// Derives the shift of one person on one date.
///
/// - `entry_date`: effective start of the person's rotation
/// - `pair_index` / `pair_size`: position of the person among the active
///   members of a paired group. Ignored by the standard groups.
///
/// Total and pure: every input has an answer and nothing but the arguments
/// is read.
pub fn compute_shift(
    group: RotationGroup,
    entry_date: NaiveDate,
    target_date: NaiveDate,
    pair_index: usize,
    pair_size: usize,
) -> ShiftCode {
    match group.phase_offset() {
        Some(offset) => standard_cycle_shift(entry_date, target_date, offset),
        None => paired_shift(target_date, pair_index, pair_size),
    }
}

/// Same as [`compute_shift`] but starting from a raw group code.
/// An unrecognized group rests every day.
pub fn compute_shift_for_code(
    group_code: &str,
    entry_date: NaiveDate,
    target_date: NaiveDate,
    pair_index: usize,
    pair_size: usize,
) -> ShiftCode {
    match group_code.parse::<RotationGroup>() {
        Ok(group) => compute_shift(group, entry_date, target_date, pair_index, pair_size),
        Err(_) => ShiftCode::Rest,
    }
}

/// Index into the 8-day cycle. `rem_euclid` keeps dates before the entry
/// date inside `[0, 8)`.
pub fn cycle_index(entry_date: NaiveDate, target_date: NaiveDate, offset: i64) -> usize {
    let days = target_date.signed_duration_since(entry_date).num_days();
    (days + offset).rem_euclid(CYCLE_LENGTH) as usize
}

fn standard_cycle_shift(entry_date: NaiveDate, target_date: NaiveDate, offset: i64) -> ShiftCode {
    ShiftCode::STANDARD_CYCLE[cycle_index(entry_date, target_date, offset)]
}

/// 5/7 rotation with shifts 1 and 2 only.
///
/// ```text
///             Mo Tu We Th Fr Sa Su
/// odd  week   1  2  1  2  1  R  R    member 0
///             2  1  2  1  2  R  R    member 1
/// even week   2  1  2  1  2  R  R    member 0
///             1  2  1  2  1  R  R    member 1
/// ```
fn paired_shift(target_date: NaiveDate, pair_index: usize, pair_size: usize) -> ShiftCode {
    if pair_index >= pair_size {
        return ShiftCode::Rest;
    }

    let weekday = target_date.weekday().num_days_from_monday();
    if weekday >= 5 {
        return ShiftCode::Rest;
    }

    let iso_week = target_date.iso_week().week();
    let odd_week = iso_week % 2 == 1;
    let even_day = weekday % 2 == 0;

    match pair_index {
        0 => pick(odd_week == even_day),
        1 => pick(odd_week != even_day),
        // beyond the pair: plain round robin keyed on the week
        n => pick((n as u32 + iso_week) % 2 == 0),
    }
}

fn pick(first: bool) -> ShiftCode {
    if first {
        ShiftCode::First
    } else {
        ShiftCode::Second
    }
}
