use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::OwnedMutexGuard;

use crate::domain::models::*;
use crate::domain::mutation::{Mutation, PendingMutation};
use crate::domain::rotation::compute_shift;
use crate::error::ScheduleError;
use crate::infrastructure::mutation_log::{append_on, AppendHook};

type LockMap = HashMap<PersonCode, Arc<tokio::sync::Mutex<()>>>;

/// Owns people and their shift assignments.
///
/// Missing assignments are derived by the rotation engine the first time
/// they are read and persisted with the `generated` origin.
///
/// With an outbox attached, every local write appends the mutation that
/// records it to `pending_mutations` in the same transaction.
pub struct ScheduleStore {
    pool: SqlitePool,
    default_entry_date: NaiveDate,
    // one writer at a time per person
    person_locks: Mutex<LockMap>,
    outbox: Option<AppendHook>,
}

/// Result of [`ScheduleStore::upsert_person`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Person),
    Updated(Person),
    /// The stored record already matched.
    Unchanged(Person),
}

impl UpsertOutcome {
    pub fn into_person(self) -> Person {
        match self {
            UpsertOutcome::Created(p) | UpsertOutcome::Updated(p) | UpsertOutcome::Unchanged(p) => p,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged(_))
    }
}

// =====================
// Row structs
// =====================

#[derive(FromRow)]
struct PersonRow {
    code: String,
    name: String,
    rotation_group: String,
    entry_date: NaiveDate,
    status: String,
}

impl TryFrom<PersonRow> for Person {
    type Error = UnknownCode;

    fn try_from(row: PersonRow) -> Result<Self, Self::Error> {
        Ok(Person {
            group: row.rotation_group.parse()?,
            status: row.status.parse()?,
            code: row.code,
            name: row.name,
            entry_date: row.entry_date,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    person_code: String,
    shift_date: NaiveDate,
    shift_code: String,
    origin: String,
}

impl TryFrom<AssignmentRow> for ShiftAssignment {
    type Error = UnknownCode;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(ShiftAssignment {
            shift_code: row.shift_code.parse()?,
            origin: row.origin.parse()?,
            person_code: row.person_code,
            date: row.shift_date,
        })
    }
}

/// Exclusive hold on one person. The map entry goes away with the last holder.
struct PersonGuard<'a> {
    locks: &'a Mutex<LockMap>,
    code: PersonCode,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PersonGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(&self.code).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.code);
        }
    }
}

/// Write transaction plus the mutations it appended, announced on commit.
struct JournaledTx<'s> {
    tx: Transaction<'static, Sqlite>,
    outbox: Option<&'s AppendHook>,
    appended: Vec<PendingMutation>,
}

impl JournaledTx<'_> {
    async fn record(&mut self, mutation: Mutation) -> Result<(), ScheduleError> {
        if self.outbox.is_some() {
            let item = append_on(&mut self.tx, &mutation).await?;
            self.appended.push(item);
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), ScheduleError> {
        self.tx.commit().await?;
        if let Some(hook) = self.outbox {
            for item in &self.appended {
                hook(item);
            }
        }
        Ok(())
    }
}

impl ScheduleStore {
    pub fn new(pool: SqlitePool, default_entry_date: NaiveDate) -> Self {
        Self {
            pool,
            default_entry_date,
            person_locks: Mutex::new(HashMap::new()),
            outbox: None,
        }
    }

    /// Records every local write in the mutation log. `on_append` sees each
    /// appended item once its transaction has committed.
    pub fn with_outbox(mut self, on_append: AppendHook) -> Self {
        self.outbox = Some(on_append);
        self
    }

    // =================================================================
    // 1. People
    // =================================================================

    pub async fn get_person(&self, code: &str) -> Result<Person, ScheduleError> {
        let code = normalize_code(code);
        let mut conn = self.pool.acquire().await?;
        fetch_person(&mut conn, &code)
            .await?
            .ok_or(ScheduleError::NotFound(code))
    }

    /// People ordered by group then code.
    pub async fn list_people(&self, include_inactive: bool) -> Result<Vec<Person>, ScheduleError> {
        let sql = if include_inactive {
            "SELECT code, name, rotation_group, entry_date, status FROM people
             ORDER BY rotation_group, code"
        } else {
            "SELECT code, name, rotation_group, entry_date, status FROM people
             WHERE status = 'active' ORDER BY rotation_group, code"
        };

        let rows: Vec<PersonRow> = sqlx::query_as(sql).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Person::try_from(row).map_err(ScheduleError::from))
            .collect()
    }

    /// Creates the person, or updates it in place when the code exists.
    ///
    /// On update every omitted field keeps its stored value. A new group or
    /// entry date drops the person's generated rows so they are derived again.
    pub async fn upsert_person(&self, record: PersonRecord) -> Result<UpsertOutcome, ScheduleError> {
        let code = normalize_code(&record.code);
        if code.is_empty() {
            return Err(ScheduleError::Validation("person code is required".to_string()));
        }

        let name = record
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let group = match record.group.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            Some(g) => Some(
                g.parse::<RotationGroup>()
                    .map_err(|e| ScheduleError::Validation(e.to_string()))?,
            ),
            None => None,
        };

        let _held = self.lock_person(&code).await;

        let mut tx = self.begin_journaled().await?;
        let existing = fetch_person(&mut tx.tx, &code).await?;

        let person = match &existing {
            Some(current) => Person {
                code: code.clone(),
                name: name.unwrap_or_else(|| current.name.clone()),
                group: group.unwrap_or(current.group),
                entry_date: record.entry_date.unwrap_or(current.entry_date),
                status: record.status.unwrap_or(current.status),
            },
            None => Person {
                name: name.ok_or_else(|| {
                    ScheduleError::Validation(format!("name is required to create `{code}`"))
                })?,
                group: group.ok_or_else(|| {
                    ScheduleError::Validation(format!("rotation group is required to create `{code}`"))
                })?,
                code: code.clone(),
                entry_date: record.entry_date.unwrap_or(self.default_entry_date),
                status: record.status.unwrap_or(PersonStatus::Active),
            },
        };

        if existing.as_ref() == Some(&person) {
            return Ok(UpsertOutcome::Unchanged(person));
        }

        sqlx::query(
            "INSERT INTO people (code, name, rotation_group, entry_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (code) DO UPDATE SET
                name = excluded.name,
                rotation_group = excluded.rotation_group,
                entry_date = excluded.entry_date,
                status = excluded.status",
        )
        .bind(&person.code)
        .bind(&person.name)
        .bind(person.group.as_str())
        .bind(person.entry_date)
        .bind(person.status.as_str())
        .execute(&mut *tx.tx)
        .await?;

        if let Some(current) = &existing {
            if current.group != person.group || current.entry_date != person.entry_date {
                let cleared = clear_generated(&mut tx.tx, &person.code).await?;
                tracing::debug!("cleared {cleared} generated rows of {}", person.code);
            }
        }

        let was_paired = existing.as_ref().is_some_and(is_paired_member);
        if was_paired != is_paired_member(&person) {
            clear_paired_roster(&mut tx.tx, &person.code).await?;
        }

        tx.record(Mutation::PersonUpsert { person: person.clone() }).await?;
        tx.commit().await?;

        match existing {
            Some(_) => {
                tracing::info!("person {} updated", person.code);
                Ok(UpsertOutcome::Updated(person))
            }
            None => {
                tracing::info!("person {} created in group {}", person.code, person.group);
                Ok(UpsertOutcome::Created(person))
            }
        }
    }

    /// Flips the status to inactive. Shift history is kept.
    pub async fn soft_delete_person(&self, code: &str) -> Result<Person, ScheduleError> {
        let code = normalize_code(code);
        let _held = self.lock_person(&code).await;

        let mut tx = self.begin_journaled().await?;
        let current = fetch_person(&mut tx.tx, &code)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(code.clone()))?;

        if !current.is_active() {
            return Ok(current);
        }

        sqlx::query("UPDATE people SET status = 'inactive' WHERE code = ?1")
            .bind(&code)
            .execute(&mut *tx.tx)
            .await?;

        if is_paired_member(&current) {
            clear_paired_roster(&mut tx.tx, &code).await?;
        }

        tx.record(Mutation::PersonSoftDelete { code: code.clone() }).await?;
        tx.commit().await?;
        tracing::info!("person {code} marked inactive");

        Ok(Person {
            status: PersonStatus::Inactive,
            ..current
        })
    }

    // =================================================================
    // 2. Shifts
    // =================================================================

    /// Assignments of one person over `range`, ordered by date.
    ///
    /// Dates without a stored row are derived and persisted in the same
    /// transaction, so concurrent callers never insert the same row twice and
    /// a failed write leaves nothing behind. Inactive people only get their
    /// stored history back.
    pub async fn get_shifts(
        &self,
        code: &str,
        range: DateRange,
    ) -> Result<Vec<ShiftAssignment>, ScheduleError> {
        let code = normalize_code(code);
        let _held = self.lock_person(&code).await;

        // most reads find every row stored and never need the write lock
        {
            let mut conn = self.pool.acquire().await?;
            let (person, stored) = fetch_schedule(&mut conn, &code, range).await?;
            if !person.is_active() || stored.len() == range.day_count() {
                return Ok(stored);
            }
        }

        let mut tx = self.begin_write().await?;
        let (person, stored) = fetch_schedule(&mut tx, &code, range).await?;
        if !person.is_active() || stored.len() == range.day_count() {
            return Ok(stored);
        }

        let known: HashSet<NaiveDate> = stored.iter().map(|a| a.date).collect();
        let (pair_index, pair_size) = pair_position(&mut tx, &person).await?;

        let mut generated = 0usize;
        for date in range.days().filter(|d| !known.contains(d)) {
            let shift = compute_shift(person.group, person.entry_date, date, pair_index, pair_size);
            generated += sqlx::query(
                "INSERT INTO shift_assignments (person_code, shift_date, shift_code, origin)
                 VALUES (?1, ?2, ?3, 'generated')
                 ON CONFLICT (person_code, shift_date) DO NOTHING",
            )
            .bind(&code)
            .bind(date)
            .bind(shift.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;
        }

        let rows = fetch_range(&mut tx, &code, range).await?;
        tx.commit().await?;

        tracing::debug!(
            "generated {generated} shifts for {code} ({} to {})",
            range.start,
            range.end
        );
        Ok(rows)
    }

    /// Writes a manual shift over whatever the date held.
    pub async fn set_manual_shift(
        &self,
        code: &str,
        date: NaiveDate,
        shift_code: ShiftCode,
    ) -> Result<ShiftAssignment, ScheduleError> {
        self.write_override(code, date, shift_code, ShiftOrigin::Manual).await
    }

    /// Leave, sickness or other absence ("C" / "M" / "A") on one date.
    pub async fn record_absence(
        &self,
        code: &str,
        date: NaiveDate,
        kind: ShiftCode,
    ) -> Result<ShiftAssignment, ScheduleError> {
        if !kind.is_absence() {
            return Err(ScheduleError::Validation(format!(
                "`{kind}` is not an absence code (use C, M or A)"
            )));
        }
        self.write_override(code, date, kind, ShiftOrigin::Manual).await
    }

    /// Exchanges the effective shifts of two people on `date`.
    /// Returns `None` when both already hold the same shift.
    pub async fn swap_shifts(
        &self,
        code_a: &str,
        code_b: &str,
        date: NaiveDate,
    ) -> Result<Option<(ShiftAssignment, ShiftAssignment)>, ScheduleError> {
        let code_a = normalize_code(code_a);
        let code_b = normalize_code(code_b);
        if code_a == code_b {
            return Err(ScheduleError::Validation("cannot swap a person with themselves".to_string()));
        }

        // derive both rows first, generation takes the person lock itself
        let day = DateRange::single(date);
        self.get_shifts(&code_a, day).await?;
        self.get_shifts(&code_b, day).await?;

        let (low, high) = if code_a < code_b { (&code_a, &code_b) } else { (&code_b, &code_a) };
        let _low = self.lock_person(low).await;
        let _high = self.lock_person(high).await;

        let mut tx = self.begin_journaled().await?;
        let shift_a = effective_shift(&mut tx.tx, &code_a, date).await?;
        let shift_b = effective_shift(&mut tx.tx, &code_b, date).await?;
        if shift_a == shift_b {
            return Ok(None);
        }

        let a = upsert_assignment(&mut tx.tx, &code_a, date, shift_b, ShiftOrigin::Manual).await?;
        let b = upsert_assignment(&mut tx.tx, &code_b, date, shift_a, ShiftOrigin::Manual).await?;
        tx.record(Mutation::ShiftOverride { assignment: a.clone() }).await?;
        tx.record(Mutation::ShiftOverride { assignment: b.clone() }).await?;
        tx.commit().await?;

        tracing::info!("swapped {code_a} ({shift_a}) and {code_b} ({shift_b}) on {date}");
        Ok(Some((a, b)))
    }

    /// Puts `code` on leave over `range`: "C" on every day but Sundays,
    /// which stay rest. Returns the rows written, ordered by date.
    pub async fn record_leave_period(
        &self,
        code: &str,
        range: DateRange,
    ) -> Result<Vec<ShiftAssignment>, ScheduleError> {
        let code = normalize_code(code);
        let _held = self.lock_person(&code).await;

        let mut tx = self.begin_journaled().await?;
        fetch_active(&mut tx.tx, &code).await?;

        let mut written = Vec::with_capacity(range.day_count());
        for date in range.days() {
            let shift = if date.weekday() == Weekday::Sun {
                ShiftCode::Rest
            } else {
                ShiftCode::Leave
            };
            let assignment = upsert_assignment(&mut tx.tx, &code, date, shift, ShiftOrigin::Leave).await?;
            tx.record(Mutation::ShiftOverride { assignment: assignment.clone() }).await?;
            written.push(assignment);
        }
        tx.commit().await?;

        let leave_days = written.iter().filter(|a| a.shift_code == ShiftCode::Leave).count();
        tracing::info!(
            "leave recorded for {code} from {} to {}: {leave_days} leave days",
            range.start,
            range.end
        );
        Ok(written)
    }

    /// Removes the leave rows of `code` inside `range`. The rotation is
    /// derived again for those dates on the next read. Returns how many leave
    /// rows went away, Sunday rest rows included.
    pub async fn clear_leave_period(&self, code: &str, range: DateRange) -> Result<u64, ScheduleError> {
        let code = normalize_code(code);
        let _held = self.lock_person(&code).await;

        let mut tx = self.begin_journaled().await?;
        fetch_person(&mut tx.tx, &code)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(code.clone()))?;

        let leave_rows = sqlx::query(
            "DELETE FROM shift_assignments
             WHERE person_code = ?1 AND shift_date >= ?2 AND shift_date <= ?3 AND origin = 'leave'",
        )
        .bind(&code)
        .bind(range.start)
        .bind(range.end)
        .execute(&mut *tx.tx)
        .await?
        .rows_affected();
        if leave_rows == 0 {
            return Ok(0);
        }

        // generated neighbours go too, so the whole range is derived afresh
        sqlx::query(
            "DELETE FROM shift_assignments
             WHERE person_code = ?1 AND shift_date >= ?2 AND shift_date <= ?3 AND origin = 'generated'",
        )
        .bind(&code)
        .bind(range.start)
        .bind(range.end)
        .execute(&mut *tx.tx)
        .await?;

        tx.record(Mutation::LeaveCleared { code: code.clone(), range }).await?;
        tx.commit().await?;

        tracing::info!("leave cleared for {code} from {} to {}", range.start, range.end);
        Ok(leave_rows)
    }

    async fn write_override(
        &self,
        code: &str,
        date: NaiveDate,
        shift_code: ShiftCode,
        origin: ShiftOrigin,
    ) -> Result<ShiftAssignment, ScheduleError> {
        let code = normalize_code(code);
        let _held = self.lock_person(&code).await;

        let mut tx = self.begin_journaled().await?;
        fetch_active(&mut tx.tx, &code).await?;
        let assignment = upsert_assignment(&mut tx.tx, &code, date, shift_code, origin).await?;
        tx.record(Mutation::ShiftOverride { assignment: assignment.clone() }).await?;
        tx.commit().await?;
        Ok(assignment)
    }

    // =================================================================
    // 3. Statistics
    // =================================================================

    /// Totals over `period`, built only from [`Self::get_shifts`] results.
    pub async fn aggregate_stats(&self, period: DateRange) -> Result<ScheduleStats, ScheduleError> {
        let people = self.list_people(false).await?;
        let mut stats = ScheduleStats {
            total_active_people: people.len() as u32,
            ..Default::default()
        };

        for person in &people {
            for assignment in self.get_shifts(&person.code, period).await? {
                *stats.counts_by_shift_code.entry(assignment.shift_code).or_insert(0) += 1;
                if assignment.shift_code.is_work() {
                    *stats.counts_by_group.entry(person.group).or_insert(0) += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Totals of one person over `period`, built from [`Self::get_shifts`]
    /// like the aggregate. Inactive people are counted on their history.
    pub async fn person_stats(&self, code: &str, period: DateRange) -> Result<PersonStats, ScheduleError> {
        let person = self.get_person(code).await?;
        let mut counts_by_shift_code = BTreeMap::new();
        let mut worked_days = 0;

        for assignment in self.get_shifts(&person.code, period).await? {
            *counts_by_shift_code.entry(assignment.shift_code).or_insert(0) += 1;
            if assignment.shift_code.is_work() {
                worked_days += 1;
            }
        }

        Ok(PersonStats {
            person,
            period,
            counts_by_shift_code,
            worked_days,
        })
    }

    // =================================================================
    // 4. Import / full resync
    // =================================================================

    /// Each row goes through [`Self::upsert_person`]. Repeated codes in the
    /// batch and rows that change nothing are counted as skipped. Returns the
    /// people that were created or changed.
    pub async fn import_people(
        &self,
        rows: Vec<ImportRow>,
    ) -> Result<(ImportReport, Vec<Person>), ScheduleError> {
        let mut report = ImportReport::default();
        let mut changed = Vec::new();
        let mut seen = HashSet::new();

        for (index, row) in rows.into_iter().enumerate() {
            let code = normalize_code(&row.code);
            if !seen.insert(code.clone()) {
                report.skipped += 1;
                continue;
            }

            let record = PersonRecord {
                code,
                name: Some(row.name),
                group: Some(row.group),
                entry_date: row.entry_date,
                status: None,
            };
            match self.upsert_person(record).await {
                Ok(outcome) if outcome.is_change() => {
                    report.imported += 1;
                    changed.push(outcome.into_person());
                }
                Ok(_) => report.skipped += 1,
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => report.errors.push(format!("row {}: {e}", index + 1)),
            }
        }

        tracing::info!(
            "people import: {} rows, {} imported, {} skipped, {} errors",
            report.total(),
            report.imported,
            report.skipped,
            report.errors.len()
        );
        Ok((report, changed))
    }

    /// Stores externally supplied shifts with the `imported` origin,
    /// replacing existing rows for the same dates.
    pub async fn import_assignments(
        &self,
        rows: Vec<ImportedShift>,
    ) -> Result<(ImportReport, Vec<ShiftAssignment>), ScheduleError> {
        let mut report = ImportReport::default();
        let mut written = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let shift_code = match row.shift_code.parse::<ShiftCode>() {
                Ok(s) => s,
                Err(e) => {
                    report.errors.push(format!("row {}: {e}", index + 1));
                    continue;
                }
            };
            match self
                .write_override(&row.person_code, row.date, shift_code, ShiftOrigin::Imported)
                .await
            {
                Ok(assignment) => {
                    report.imported += 1;
                    written.push(assignment);
                }
                Err(e) if e.is_storage() => return Err(e),
                Err(e) => report.errors.push(format!("row {}: {e}", index + 1)),
            }
        }

        tracing::info!(
            "shift import: {} of {} rows written",
            report.imported,
            report.total()
        );
        Ok((report, written))
    }

    /// Adopts an authoritative dataset wholesale: both local collections are
    /// replaced in one transaction.
    pub async fn replace_all(&self, dataset: &Dataset) -> Result<(), ScheduleError> {
        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM shift_assignments").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM people").execute(&mut *tx).await?;

        for person in &dataset.people {
            let code = normalize_code(&person.code);
            if code.is_empty() {
                return Err(ScheduleError::Validation("dataset contains an empty person code".to_string()));
            }
            sqlx::query(
                "INSERT INTO people (code, name, rotation_group, entry_date, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&code)
            .bind(&person.name)
            .bind(person.group.as_str())
            .bind(person.entry_date)
            .bind(person.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for assignment in &dataset.assignments {
            let code = normalize_code(&assignment.person_code);
            upsert_assignment(&mut tx, &code, assignment.date, assignment.shift_code, assignment.origin)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            "adopted remote dataset: {} people, {} assignments",
            dataset.people.len(),
            dataset.assignments.len()
        );
        Ok(())
    }

    async fn lock_person(&self, code: &str) -> PersonGuard<'_> {
        let lock = {
            let mut locks = self.person_locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(code.to_string()).or_default().clone()
        };
        PersonGuard {
            locks: &self.person_locks,
            code: code.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    // Takes the database write lock up front. A deferred transaction that
    // reads and then writes fails with SQLITE_BUSY when another writer got
    // in between; this one waits for the busy timeout instead.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, ScheduleError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    async fn begin_journaled(&self) -> Result<JournaledTx<'_>, ScheduleError> {
        Ok(JournaledTx {
            tx: self.begin_write().await?,
            outbox: self.outbox.as_ref(),
            appended: Vec::new(),
        })
    }
}

// =====================
// Connection-level helpers (usable inside a transaction)
// =====================

async fn fetch_person(conn: &mut SqliteConnection, code: &str) -> Result<Option<Person>, ScheduleError> {
    let row: Option<PersonRow> = sqlx::query_as(
        "SELECT code, name, rotation_group, entry_date, status FROM people WHERE code = ?1",
    )
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Person::try_from).transpose()?)
}

async fn fetch_active(conn: &mut SqliteConnection, code: &str) -> Result<Person, ScheduleError> {
    let person = fetch_person(conn, code)
        .await?
        .ok_or_else(|| ScheduleError::NotFound(code.to_string()))?;
    if person.is_active() {
        Ok(person)
    } else {
        Err(ScheduleError::Validation(format!("person `{code}` is inactive")))
    }
}

/// The person and whatever is stored for them over `range`.
async fn fetch_schedule(
    conn: &mut SqliteConnection,
    code: &str,
    range: DateRange,
) -> Result<(Person, Vec<ShiftAssignment>), ScheduleError> {
    let person = fetch_person(conn, code)
        .await?
        .ok_or_else(|| ScheduleError::NotFound(code.to_string()))?;
    let stored = fetch_range(conn, code, range).await?;
    Ok((person, stored))
}

/// Stored shift of an active person on `date`.
async fn effective_shift(conn: &mut SqliteConnection, code: &str, date: NaiveDate) -> Result<ShiftCode, ScheduleError> {
    fetch_active(conn, code).await?;
    fetch_range(conn, code, DateRange::single(date))
        .await?
        .first()
        .map(|a| a.shift_code)
        .ok_or_else(|| ScheduleError::Validation(format!("`{code}` has no shift on {date}")))
}

async fn fetch_range(
    conn: &mut SqliteConnection,
    code: &str,
    range: DateRange,
) -> Result<Vec<ShiftAssignment>, ScheduleError> {
    let rows: Vec<AssignmentRow> = sqlx::query_as(
        "SELECT person_code, shift_date, shift_code, origin FROM shift_assignments
         WHERE person_code = ?1 AND shift_date >= ?2 AND shift_date <= ?3
         ORDER BY shift_date ASC",
    )
    .bind(code)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| ShiftAssignment::try_from(row).map_err(ScheduleError::from))
        .collect()
}

async fn upsert_assignment(
    conn: &mut SqliteConnection,
    code: &str,
    date: NaiveDate,
    shift_code: ShiftCode,
    origin: ShiftOrigin,
) -> Result<ShiftAssignment, ScheduleError> {
    sqlx::query(
        "INSERT INTO shift_assignments (person_code, shift_date, shift_code, origin)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (person_code, shift_date) DO UPDATE SET
            shift_code = excluded.shift_code,
            origin = excluded.origin",
    )
    .bind(code)
    .bind(date)
    .bind(shift_code.as_str())
    .bind(origin.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(ShiftAssignment {
        person_code: code.to_string(),
        date,
        shift_code,
        origin,
    })
}

/// Position of `person` among the active paired-group members ordered by
/// code, and the size of that roster. `(0, 0)` for standard groups.
async fn pair_position(conn: &mut SqliteConnection, person: &Person) -> Result<(usize, usize), ScheduleError> {
    if !person.group.is_paired() {
        return Ok((0, 0));
    }

    let roster: Vec<String> = sqlx::query_scalar(
        "SELECT code FROM people WHERE rotation_group = ?1 AND status = 'active' ORDER BY code",
    )
    .bind(person.group.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let index = roster.iter().position(|c| c == &person.code).unwrap_or(roster.len());
    Ok((index, roster.len()))
}

async fn clear_generated(conn: &mut SqliteConnection, code: &str) -> Result<u64, ScheduleError> {
    Ok(sqlx::query("DELETE FROM shift_assignments WHERE person_code = ?1 AND origin = 'generated'")
        .bind(code)
        .execute(&mut *conn)
        .await?
        .rows_affected())
}

/// The active paired roster changed, so pair indexes may have moved: the
/// generated rows of every active member are dropped and derived again on read.
async fn clear_paired_roster(conn: &mut SqliteConnection, changed_code: &str) -> Result<u64, ScheduleError> {
    let cleared = sqlx::query(
        "DELETE FROM shift_assignments
         WHERE origin = 'generated'
           AND person_code IN (
               SELECT code FROM people WHERE rotation_group = ?1 AND status = 'active'
           )",
    )
    .bind(RotationGroup::E.as_str())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    tracing::debug!("paired roster changed by {changed_code}, cleared {cleared} generated rows");
    Ok(cleared)
}

fn is_paired_member(person: &Person) -> bool {
    person.group.is_paired() && person.is_active()
}
