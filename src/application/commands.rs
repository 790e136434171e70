use chrono::NaiveDate;

use crate::application::dto::{DailyShiftDto, MonthlyScheduleResult, PersonScheduleDto};
use crate::application::sync_queue::DrainReport;
use crate::application::time::month_range;
use crate::domain::models::*;
use crate::domain::mutation::PendingMutation;
use crate::error::{Result, ScheduleError};
use crate::AppServices;

// Every write goes through the schedule store, which appends the matching
// mutation to the sync log in the same transaction. A failed write enqueues
// nothing and a failed append undoes the write.

// --- People ---

pub async fn get_person(services: &AppServices, code: &str) -> Result<Person> {
    Ok(services.schedule.get_person(code).await?)
}

pub async fn list_people(services: &AppServices, include_inactive: bool) -> Result<Vec<Person>> {
    Ok(services.schedule.list_people(include_inactive).await?)
}

pub async fn upsert_person(services: &AppServices, record: PersonRecord) -> Result<Person> {
    Ok(services.schedule.upsert_person(record).await?.into_person())
}

pub async fn soft_delete_person(services: &AppServices, code: &str) -> Result<Person> {
    Ok(services.schedule.soft_delete_person(code).await?)
}

// --- Shifts ---

pub async fn get_shifts(
    services: &AppServices,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ShiftAssignment>> {
    let range = date_range(start, end)?;
    Ok(services.schedule.get_shifts(code, range).await?)
}

pub async fn set_manual_shift(
    services: &AppServices,
    code: &str,
    date: NaiveDate,
    shift_code: &str,
) -> Result<ShiftAssignment> {
    let shift_code = parse_shift_code(shift_code)?;
    Ok(services.schedule.set_manual_shift(code, date, shift_code).await?)
}

pub async fn record_absence(
    services: &AppServices,
    code: &str,
    date: NaiveDate,
    kind: &str,
) -> Result<ShiftAssignment> {
    let kind = parse_shift_code(kind)?;
    Ok(services.schedule.record_absence(code, date, kind).await?)
}

/// Leave from `start` to `end` inclusive; Sundays stay rest.
pub async fn record_leave_period(
    services: &AppServices,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ShiftAssignment>> {
    let range = date_range(start, end)?;
    Ok(services.schedule.record_leave_period(code, range).await?)
}

/// Returns how many leave rows were removed, Sundays included.
pub async fn clear_leave_period(
    services: &AppServices,
    code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<u64> {
    let range = date_range(start, end)?;
    Ok(services.schedule.clear_leave_period(code, range).await?)
}

/// Returns `false` when both people already held the same shift.
pub async fn swap_shifts(
    services: &AppServices,
    code_a: &str,
    code_b: &str,
    date: NaiveDate,
) -> Result<bool> {
    Ok(services.schedule.swap_shifts(code_a, code_b, date).await?.is_some())
}

// --- Import / export collaborators ---

pub async fn import_people(services: &AppServices, rows: Vec<ImportRow>) -> Result<ImportReport> {
    let (report, _) = services.schedule.import_people(rows).await?;
    Ok(report)
}

pub async fn import_assignments(
    services: &AppServices,
    rows: Vec<ImportedShift>,
) -> Result<ImportReport> {
    let (report, _) = services.schedule.import_assignments(rows).await?;
    Ok(report)
}

/// Every active person with their shifts for `month` (1-12) of `year`.
pub async fn monthly_schedule(
    services: &AppServices,
    year: i32,
    month: u32,
) -> Result<MonthlyScheduleResult> {
    let range = month_range(year, month)?;
    let mut people = Vec::new();

    for person in services.schedule.list_people(false).await? {
        let days = services
            .schedule
            .get_shifts(&person.code, range)
            .await?
            .iter()
            .map(DailyShiftDto::from)
            .collect();
        people.push(PersonScheduleDto { person, days });
    }

    Ok(MonthlyScheduleResult { year, month, people })
}

/// Aggregate statistics for `month` (1-12) of `year`.
pub async fn statistics(services: &AppServices, month: u32, year: i32) -> Result<ScheduleStats> {
    let range = month_range(year, month)?;
    Ok(services.schedule.aggregate_stats(range).await?)
}

/// One person's statistics for `month` (1-12) of `year`.
pub async fn person_statistics(
    services: &AppServices,
    code: &str,
    month: u32,
    year: i32,
) -> Result<PersonStats> {
    let range = month_range(year, month)?;
    Ok(services.schedule.person_stats(code, range).await?)
}

// --- Sync ---

pub fn set_online(services: &AppServices, online: bool) -> bool {
    services.connectivity.set_online(online)
}

pub async fn pending_mutations(services: &AppServices) -> Result<Vec<PendingMutation>> {
    Ok(services.sync.pending().await?)
}

/// User-triggered drain. A dataset returned by the remote is adopted once
/// nothing local is left to deliver.
pub async fn manual_sync(services: &AppServices) -> Result<DrainReport> {
    let report = services.sync.manual_drain().await?;
    if let Some(dataset) = &report.dataset {
        if services.sync.is_empty().await? {
            services.schedule.replace_all(dataset).await?;
        } else {
            tracing::info!("remote dataset not adopted, local mutations still pending");
        }
    }
    Ok(report)
}

/// Replaces the local people and assignments with the remote dataset.
///
/// Pending local mutations are drained first. When some remain the local
/// state is kept and a validation error is returned.
pub async fn full_resync(services: &AppServices) -> Result<Dataset> {
    let Some(remote) = services.sync.remote().cloned() else {
        return Err(ScheduleError::Validation("no remote endpoint configured".to_string()).into());
    };
    if !services.sync.is_online() {
        return Err(ScheduleError::Validation("cannot resync while offline".to_string()).into());
    }

    if !services.sync.is_empty().await? {
        services.sync.drain().await?;
        let remaining = services.sync.len().await?;
        if remaining > 0 {
            return Err(ScheduleError::Validation(format!(
                "{remaining} local mutations are still pending, resync refused"
            ))
            .into());
        }
    }

    let dataset = remote.fetch_dataset().await?;
    services.schedule.replace_all(&dataset).await?;
    Ok(dataset)
}

fn parse_shift_code(code: &str) -> Result<ShiftCode> {
    Ok(code
        .parse::<ShiftCode>()
        .map_err(|e| ScheduleError::Validation(e.to_string()))?)
}

fn date_range(start: NaiveDate, end: NaiveDate) -> Result<DateRange> {
    Ok(DateRange::new(start, end).ok_or_else(|| {
        ScheduleError::Validation(format!("range start {start} is after its end {end}"))
    })?)
}
