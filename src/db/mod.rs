mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

use crate::clock::Clock;
use crate::conflict::{BookingSource, ConflictChecker, RecurrencePattern, RecurringRule, ScanMode};
use crate::error::ReservationError;
use crate::models::*;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const RESERVATION_COLUMNS: &str = "id, user_id, laboratory_id, reservation_date, start_time, end_time,
     purpose, num_students, course_code, subject, section, status, is_recurring,
     recurrence_pattern, recurrence_end_date, created_at, updated_at";

const SCHEDULE_COLUMNS: &str = "id, laboratory_id, subject_code, subject_name, instructor_name, section,
     day_of_week, start_time, end_time, schedule_type, effective_from, effective_until,
     is_active, notes, created_at, academic_term_id";

const TERM_COLUMNS: &str =
    "id, academic_year_id, name, start_date, end_date, is_current, created_at";

const EQUIPMENT_COLUMNS: &str = "id, user_id, equipment_name, purpose, requested_from, requested_until,
     status, returned_at, return_condition, return_notes, created_at";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "lab-reservations")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("reservations.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ============================================================
    // Laboratory operations
    // ============================================================

    pub fn get_all_laboratories(&self) -> Result<Vec<Laboratory>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, capacity, status, created_at, updated_at
             FROM laboratories ORDER BY name",
        )?;

        let labs = stmt
            .query_map([], row_to_laboratory)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(labs)
    }

    pub fn get_laboratory(&self, id: Uuid) -> Result<Option<Laboratory>> {
        query_laboratory(&self.lock(), id)
    }

    pub fn create_laboratory(&self, input: CreateLaboratoryInput) -> Result<Laboratory> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let status = input.status.unwrap_or(LaboratoryStatus::Active);

        conn.execute(
            "INSERT INTO laboratories (id, name, capacity, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                input.capacity,
                status.as_str(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )
        .with_context(|| format!("Failed to create laboratory {}", input.name))?;

        Ok(Laboratory {
            id,
            name: input.name,
            capacity: input.capacity,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    // ============================================================
    // Reservation operations
    // ============================================================

    /// Validate and store a reservation request.
    ///
    /// The laboratory lookup, the conflict check and the insert share one
    /// immediate transaction, so two overlapping requests cannot both pass the check. Recurring
    /// requests are checked on every date they would occupy.
    pub fn create_reservation(
        &self,
        laboratory_id: Uuid,
        input: CreateReservationInput,
        clock: &dyn Clock,
    ) -> Result<LaboratoryReservation, ReservationError> {
        let request = input.validate(clock.today())?;

        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin reservation transaction")?;

        let lab = query_laboratory(&tx, laboratory_id)?
            .ok_or(ReservationError::NotFound("Laboratory"))?;
        if lab.status != LaboratoryStatus::Active {
            return Err(ReservationError::Validation(format!(
                "Laboratory {} is not available for reservations",
                lab.name
            )));
        }

        let source = ConnectionSource(&tx);
        let checker = ConflictChecker::new(&source);
        let input = request.input;
        let conflict = match request.recurrence {
            Some((pattern, until)) => {
                let rule = RecurringRule::pattern(
                    laboratory_id,
                    request.range,
                    pattern,
                    input.reservation_date,
                    until,
                );
                checker
                    .check_recurring_conflicts(&rule, ScanMode::FirstOnly)?
                    .into_iter()
                    .next()
                    .map(|c| c.conflict_type)
            }
            None => {
                let result =
                    checker.check_conflicts(laboratory_id, input.reservation_date, &request.range)?;
                result.has_conflict.then_some(result.conflict_type)
            }
        };
        if let Some(conflict_type) = conflict {
            tracing::info!(
                laboratory_id = %laboratory_id,
                date = %input.reservation_date,
                conflict = conflict_type.as_str(),
                "Rejected conflicting reservation request"
            );
            return Err(ReservationError::Conflict(conflict_type));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let (pattern, until) = match request.recurrence {
            Some((pattern, until)) => (Some(pattern), Some(until)),
            None => (None, None),
        };

        tx.execute(
            &format!(
                "INSERT INTO laboratory_reservations ({RESERVATION_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                id.to_string(),
                input.user_id.to_string(),
                laboratory_id.to_string(),
                format_date(input.reservation_date),
                hhmm::format(&request.range.start()),
                hhmm::format(&request.range.end()),
                input.purpose.trim(),
                input.num_students,
                &input.course_code,
                &input.subject,
                &input.section,
                ReservationStatus::Pending.as_str(),
                pattern.is_some(),
                pattern.map(|p| p.as_str()),
                until.map(format_date),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .context("Failed to insert reservation")?;
        tx.commit().context("Failed to commit reservation")?;

        tracing::info!(
            reservation_id = %id,
            laboratory_id = %laboratory_id,
            date = %input.reservation_date,
            "Reservation submitted"
        );

        Ok(LaboratoryReservation {
            id,
            user_id: input.user_id,
            laboratory_id,
            reservation_date: input.reservation_date,
            start_time: request.range.start(),
            end_time: request.range.end(),
            purpose: input.purpose.trim().to_string(),
            num_students: input.num_students,
            course_code: input.course_code,
            subject: input.subject,
            section: input.section,
            status: ReservationStatus::Pending,
            is_recurring: pattern.is_some(),
            recurrence_pattern: pattern,
            recurrence_end_date: until,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_reservation(&self, id: Uuid) -> Result<Option<LaboratoryReservation>> {
        query_reservation(&self.lock(), id)
    }

    /// Reservations matching `filter`, newest date first, later start first
    /// within a date.
    pub fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<LaboratoryReservation>> {
        let mut sql = format!("SELECT {RESERVATION_COLUMNS} FROM laboratory_reservations WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();

        if let Some(user_id) = filter.user_id {
            sql.push_str(" AND user_id = ?");
            args.push(user_id.to_string());
        }
        if let Some(laboratory_id) = filter.laboratory_id {
            sql.push_str(" AND laboratory_id = ?");
            args.push(laboratory_id.to_string());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(from) = filter.from_date {
            sql.push_str(" AND reservation_date >= ?");
            args.push(format_date(from));
        }
        if let Some(to) = filter.to_date {
            sql.push_str(" AND reservation_date <= ?");
            args.push(format_date(to));
        }
        sql.push_str(" ORDER BY reservation_date DESC, start_time DESC");

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let reservations = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_reservation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reservations)
    }

    pub fn approve_reservation(&self, id: Uuid) -> Result<LaboratoryReservation, ReservationError> {
        self.review_reservation(id, ReservationStatus::Approved)
    }

    pub fn reject_reservation(&self, id: Uuid) -> Result<LaboratoryReservation, ReservationError> {
        self.review_reservation(id, ReservationStatus::Rejected)
    }

    fn review_reservation(
        &self,
        id: Uuid,
        next: ReservationStatus,
    ) -> Result<LaboratoryReservation, ReservationError> {
        let updated = self.transition_reservation(id, |existing| existing.status.review(next))?;
        tracing::info!(reservation_id = %id, status = next.as_str(), "Reservation reviewed");
        Ok(updated)
    }

    /// Cancel a reservation on behalf of `requester`.
    pub fn cancel_reservation(
        &self,
        id: Uuid,
        requester: Uuid,
        clock: &dyn Clock,
    ) -> Result<LaboratoryReservation, ReservationError> {
        let updated = self.transition_reservation(id, |existing| {
            existing.ensure_cancellable(requester, clock.now())?;
            Ok(ReservationStatus::Cancelled)
        })?;
        tracing::info!(
            reservation_id = %id,
            user_id = %requester,
            laboratory_id = %updated.laboratory_id,
            date = %updated.reservation_date,
            "Reservation cancelled"
        );
        Ok(updated)
    }

    /// Read a reservation, let `decide` pick its next status, and write it,
    /// all in one immediate transaction. The update only matches the status
    /// `decide` saw.
    fn transition_reservation(
        &self,
        id: Uuid,
        decide: impl FnOnce(&LaboratoryReservation) -> Result<ReservationStatus, ReservationError>,
    ) -> Result<LaboratoryReservation, ReservationError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin status transaction")?;

        let mut reservation =
            query_reservation(&tx, id)?.ok_or(ReservationError::NotFound("Reservation"))?;
        let status = decide(&reservation)?;
        let now = Utc::now();

        let rows = tx
            .execute(
                "UPDATE laboratory_reservations SET status = ?, updated_at = ?
                 WHERE id = ? AND status = ?",
                (
                    status.as_str(),
                    now.to_rfc3339(),
                    id.to_string(),
                    reservation.status.as_str(),
                ),
            )
            .context("Failed to update reservation status")?;
        if rows == 0 {
            return Err(ReservationError::InvalidTransition {
                entity: "reservation",
                action: "update",
                status: reservation.status.as_str(),
            });
        }
        tx.commit().context("Failed to commit reservation status")?;

        reservation.status = status;
        reservation.updated_at = now;
        Ok(reservation)
    }

    /// Non-cancelled reservations of a laboratory in one month, as calendar
    /// events ordered by date and start time.
    pub fn get_calendar_events(
        &self,
        laboratory_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<CalendarEvent>, ReservationError> {
        let lab = self
            .get_laboratory(laboratory_id)?
            .ok_or(ReservationError::NotFound("Laboratory"))?;
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            ReservationError::Validation(format!("invalid calendar month {year}-{month}"))
        })?;
        let last = last_day_of_month(first);

        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {RESERVATION_COLUMNS} FROM laboratory_reservations
                 WHERE laboratory_id = ? AND reservation_date >= ? AND reservation_date <= ?
                   AND status != 'cancelled'
                 ORDER BY reservation_date, start_time"
            ))
            .context("Failed to prepare calendar query")?;
        let events = stmt
            .query_map(
                (laboratory_id.to_string(), format_date(first), format_date(last)),
                row_to_reservation,
            )
            .context("Failed to query calendar")?
            .map(|r| r.map(|reservation| CalendarEvent::new(&reservation, &lab.name)))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read calendar rows")?;
        Ok(events)
    }

    // ============================================================
    // Class schedule operations
    // ============================================================

    pub fn create_schedule(
        &self,
        laboratory_id: Uuid,
        input: CreateScheduleInput,
    ) -> Result<ClassSchedule, ReservationError> {
        let conn = self.lock();
        query_laboratory(&conn, laboratory_id)?.ok_or(ReservationError::NotFound("Laboratory"))?;
        let term = match input.academic_term_id {
            Some(term_id) => Some(
                query_term(&conn, term_id)?.ok_or(ReservationError::NotFound("Academic term"))?,
            ),
            None => None,
        };

        let schedule = input.into_schedule(laboratory_id, term.as_ref(), Utc::now())?;
        conn.execute(
            &format!(
                "INSERT INTO class_schedules ({SCHEDULE_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                schedule.id.to_string(),
                laboratory_id.to_string(),
                &schedule.subject_code,
                &schedule.subject_name,
                &schedule.instructor_name,
                &schedule.section,
                schedule.day_of_week,
                hhmm::format(&schedule.start_time),
                hhmm::format(&schedule.end_time),
                schedule.schedule_type.as_str(),
                schedule.effective_from.map(format_date),
                schedule.effective_until.map(format_date),
                schedule.is_active,
                &schedule.notes,
                schedule.created_at.to_rfc3339(),
                schedule.academic_term_id.map(|id| id.to_string()),
            ],
        )
        .context("Failed to insert class schedule")?;

        tracing::info!(
            schedule_id = %schedule.id,
            laboratory_id = %laboratory_id,
            day_of_week = schedule.day_of_week,
            "Class schedule created"
        );
        Ok(schedule)
    }

    /// Change a class schedule in place, including toggling `is_active`.
    pub fn update_schedule(
        &self,
        id: Uuid,
        input: UpdateScheduleInput,
    ) -> Result<ClassSchedule, ReservationError> {
        input.check_window_source()?;

        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin schedule update")?;

        let mut schedule =
            query_schedule(&tx, id)?.ok_or(ReservationError::NotFound("Schedule"))?;
        let term = match input.academic_term_id {
            Some(term_id) => Some(
                query_term(&tx, term_id)?.ok_or(ReservationError::NotFound("Academic term"))?,
            ),
            None => None,
        };
        schedule.apply(input);
        if let Some(term) = &term {
            schedule.attach_term(term);
        }
        let range = schedule.validate()?;
        schedule.start_time = range.start();
        schedule.end_time = range.end();

        tx.execute(
            "UPDATE class_schedules SET
                subject_code = ?, subject_name = ?, instructor_name = ?, section = ?,
                day_of_week = ?, start_time = ?, end_time = ?, schedule_type = ?,
                effective_from = ?, effective_until = ?, academic_term_id = ?,
                is_active = ?, notes = ?
             WHERE id = ?",
            params![
                &schedule.subject_code,
                &schedule.subject_name,
                &schedule.instructor_name,
                &schedule.section,
                schedule.day_of_week,
                hhmm::format(&schedule.start_time),
                hhmm::format(&schedule.end_time),
                schedule.schedule_type.as_str(),
                schedule.effective_from.map(format_date),
                schedule.effective_until.map(format_date),
                schedule.academic_term_id.map(|id| id.to_string()),
                schedule.is_active,
                &schedule.notes,
                id.to_string(),
            ],
        )
        .context("Failed to update class schedule")?;
        tx.commit().context("Failed to commit schedule update")?;

        tracing::info!(schedule_id = %id, is_active = schedule.is_active, "Class schedule updated");
        Ok(schedule)
    }

    pub fn get_schedules_by_laboratory(&self, laboratory_id: Uuid) -> Result<Vec<ClassSchedule>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules
             WHERE laboratory_id = ? ORDER BY day_of_week, start_time"
        ))?;
        let schedules = stmt
            .query_map([laboratory_id.to_string()], row_to_schedule)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(schedules)
    }

    pub fn delete_schedule(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM class_schedules WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Academic calendar operations
    // ============================================================

    pub fn create_academic_year(
        &self,
        input: CreateAcademicYearInput,
    ) -> Result<AcademicYear, ReservationError> {
        input.validate()?;

        let conn = self.lock();
        let taken: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM academic_years WHERE name = ?)",
                [&input.name],
                |row| row.get(0),
            )
            .context("Failed to check academic year name")?;
        if taken {
            return Err(ReservationError::Validation(format!(
                "academic year {} already exists",
                input.name
            )));
        }

        let year = AcademicYear {
            id: Uuid::new_v4(),
            name: input.name,
            start_date: input.start_date,
            end_date: input.end_date,
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO academic_years (id, name, start_date, end_date, created_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                year.id.to_string(),
                &year.name,
                format_date(year.start_date),
                format_date(year.end_date),
                year.created_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to create academic year {}", year.name))?;

        tracing::info!(academic_year_id = %year.id, name = %year.name, "Academic year created");
        Ok(year)
    }

    /// All academic years, newest first, each with its terms in date order.
    pub fn get_academic_years(&self) -> Result<Vec<AcademicYearWithTerms>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, start_date, end_date, created_at
             FROM academic_years ORDER BY start_date DESC",
        )?;
        let years = stmt
            .query_map([], row_to_academic_year)?
            .collect::<Result<Vec<_>, _>>()?;

        years
            .into_iter()
            .map(|year| -> Result<AcademicYearWithTerms> {
                let terms = query_terms_of_year(&conn, year.id)?;
                Ok(AcademicYearWithTerms { year, terms })
            })
            .collect()
    }

    pub fn get_academic_year(&self, id: Uuid) -> Result<Option<AcademicYearWithTerms>> {
        let conn = self.lock();
        let Some(year) = query_academic_year(&conn, id)? else {
            return Ok(None);
        };
        let terms = query_terms_of_year(&conn, id)?;
        Ok(Some(AcademicYearWithTerms { year, terms }))
    }

    /// Add a term to a year. A term created as current replaces the previous
    /// current term.
    pub fn create_academic_term(
        &self,
        academic_year_id: Uuid,
        input: CreateAcademicTermInput,
    ) -> Result<AcademicTerm, ReservationError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin academic term insert")?;

        let year = query_academic_year(&tx, academic_year_id)?
            .ok_or(ReservationError::NotFound("Academic year"))?;
        input.validate(&year)?;

        let taken: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM academic_terms WHERE academic_year_id = ? AND name = ?)",
                params![academic_year_id.to_string(), &input.name],
                |row| row.get(0),
            )
            .context("Failed to check academic term name")?;
        if taken {
            return Err(ReservationError::Validation(format!(
                "term {} already exists in {}",
                input.name, year.name
            )));
        }

        if input.is_current {
            clear_current_term(&tx)?;
        }

        let term = AcademicTerm {
            id: Uuid::new_v4(),
            academic_year_id,
            name: input.name,
            start_date: input.start_date,
            end_date: input.end_date,
            is_current: input.is_current,
            created_at: Utc::now(),
        };
        tx.execute(
            &format!("INSERT INTO academic_terms ({TERM_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
            params![
                term.id.to_string(),
                academic_year_id.to_string(),
                &term.name,
                format_date(term.start_date),
                format_date(term.end_date),
                term.is_current,
                term.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert academic term")?;
        tx.commit().context("Failed to commit academic term")?;

        tracing::info!(
            academic_term_id = %term.id,
            academic_year_id = %academic_year_id,
            is_current = term.is_current,
            "Academic term created"
        );
        Ok(term)
    }

    pub fn get_academic_term(&self, id: Uuid) -> Result<Option<AcademicTerm>> {
        query_term(&self.lock(), id)
    }

    pub fn get_current_term(&self) -> Result<Option<AcademicTerm>> {
        let conn = self.lock();
        let term = conn
            .query_row(
                &format!("SELECT {TERM_COLUMNS} FROM academic_terms WHERE is_current = 1"),
                [],
                row_to_academic_term,
            )
            .optional()?;
        Ok(term)
    }

    /// Make `id` the only current term.
    pub fn set_current_term(&self, id: Uuid) -> Result<AcademicTerm, ReservationError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin current term update")?;

        let mut term = query_term(&tx, id)?.ok_or(ReservationError::NotFound("Academic term"))?;
        clear_current_term(&tx)?;
        tx.execute(
            "UPDATE academic_terms SET is_current = 1 WHERE id = ?",
            [id.to_string()],
        )
        .context("Failed to mark academic term current")?;
        tx.commit().context("Failed to commit current term update")?;

        term.is_current = true;
        tracing::info!(academic_term_id = %id, name = %term.name, "Current academic term changed");
        Ok(term)
    }

    // ============================================================
    // Equipment request operations
    // ============================================================

    pub fn create_equipment_request(
        &self,
        input: CreateEquipmentRequestInput,
    ) -> Result<EquipmentRequest, ReservationError> {
        input.validate()?;

        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO equipment_requests
                (id, user_id, equipment_name, purpose, requested_from, requested_until, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                input.user_id.to_string(),
                &input.equipment_name,
                &input.purpose,
                format_datetime(input.requested_from),
                format_datetime(input.requested_until),
                EquipmentRequestStatus::Pending.as_str(),
                now.to_rfc3339(),
            ),
        )
        .context("Failed to insert equipment request")?;

        Ok(EquipmentRequest {
            id,
            user_id: input.user_id,
            equipment_name: input.equipment_name,
            purpose: input.purpose,
            requested_from: input.requested_from,
            requested_until: input.requested_until,
            status: EquipmentRequestStatus::Pending,
            returned_at: None,
            return_condition: None,
            return_notes: None,
            created_at: now,
        })
    }

    pub fn get_equipment_request(&self, id: Uuid) -> Result<Option<EquipmentRequest>> {
        query_equipment_request(&self.lock(), id)
    }

    pub fn approve_equipment_request(&self, id: Uuid) -> Result<EquipmentRequest, ReservationError> {
        self.transition_equipment_request(id, EquipmentRequestStatus::Approved, None)
    }

    pub fn reject_equipment_request(&self, id: Uuid) -> Result<EquipmentRequest, ReservationError> {
        self.transition_equipment_request(id, EquipmentRequestStatus::Rejected, None)
    }

    pub fn return_equipment(
        &self,
        id: Uuid,
        input: ReturnEquipmentInput,
        clock: &dyn Clock,
    ) -> Result<EquipmentRequest, ReservationError> {
        self.transition_equipment_request(
            id,
            EquipmentRequestStatus::Returned,
            Some((clock.now(), input)),
        )
    }

    fn transition_equipment_request(
        &self,
        id: Uuid,
        next: EquipmentRequestStatus,
        returned: Option<(NaiveDateTime, ReturnEquipmentInput)>,
    ) -> Result<EquipmentRequest, ReservationError> {
        let mut conn = self.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Failed to begin equipment request transaction")?;

        let mut request = query_equipment_request(&tx, id)?
            .ok_or(ReservationError::NotFound("Equipment request"))?;
        let previous = request.status;
        request.status = previous.transition(next)?;
        if let Some((at, input)) = returned {
            request.returned_at = Some(at);
            request.return_condition = input.return_condition;
            request.return_notes = input.return_notes;
        }

        let rows = tx
            .execute(
                "UPDATE equipment_requests
                 SET status = ?, returned_at = ?, return_condition = ?, return_notes = ?
                 WHERE id = ? AND status = ?",
                (
                    request.status.as_str(),
                    request.returned_at.map(format_datetime),
                    &request.return_condition,
                    &request.return_notes,
                    id.to_string(),
                    previous.as_str(),
                ),
            )
            .context("Failed to update equipment request")?;
        if rows == 0 {
            return Err(ReservationError::InvalidTransition {
                entity: "equipment request",
                action: "update",
                status: previous.as_str(),
            });
        }
        tx.commit().context("Failed to commit equipment request")?;

        tracing::info!(request_id = %id, status = request.status.as_str(), "Equipment request updated");
        Ok(request)
    }

    /// Approved, unreturned requests whose period ended before `now`.
    pub fn get_overdue_equipment_requests(&self, now: NaiveDateTime) -> Result<Vec<EquipmentRequest>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment_requests
             WHERE status = 'approved' AND returned_at IS NULL AND requested_until < ?
             ORDER BY requested_until"
        ))?;
        let requests = stmt
            .query_map([format_datetime(now)], row_to_equipment_request)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(requests.into_iter().filter(|r| r.is_overdue(now)).collect())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl BookingSource for Database {
    fn reservations_on(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<LaboratoryReservation>> {
        ConnectionSource(&self.lock()).reservations_on(resource_id, date)
    }

    fn recurring_reservations_covering(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<LaboratoryReservation>> {
        ConnectionSource(&self.lock()).recurring_reservations_covering(resource_id, date)
    }

    fn class_schedules_on(&self, resource_id: Uuid, day_of_week: u8) -> Result<Vec<ClassSchedule>> {
        ConnectionSource(&self.lock()).class_schedules_on(resource_id, day_of_week)
    }
}

/// Booking reads against a borrowed connection, so a check can run inside
/// an open transaction.
struct ConnectionSource<'a>(&'a Connection);

impl BookingSource for ConnectionSource<'_> {
    fn reservations_on(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<LaboratoryReservation>> {
        let mut stmt = self.0.prepare(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM laboratory_reservations
             WHERE laboratory_id = ? AND reservation_date = ? AND is_recurring = 0
             ORDER BY start_time"
        ))?;
        let rows = stmt
            .query_map((resource_id.to_string(), format_date(date)), row_to_reservation)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read reservations")?;
        Ok(rows)
    }

    fn recurring_reservations_covering(
        &self,
        resource_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<LaboratoryReservation>> {
        let mut stmt = self.0.prepare(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM laboratory_reservations
             WHERE laboratory_id = ?1 AND is_recurring = 1
               AND reservation_date <= ?2 AND recurrence_end_date >= ?2
             ORDER BY start_time"
        ))?;
        let rows = stmt
            .query_map((resource_id.to_string(), format_date(date)), row_to_reservation)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read recurring reservations")?;
        Ok(rows)
    }

    fn class_schedules_on(&self, resource_id: Uuid, day_of_week: u8) -> Result<Vec<ClassSchedule>> {
        let mut stmt = self.0.prepare(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM class_schedules
             WHERE laboratory_id = ? AND day_of_week = ?
             ORDER BY start_time"
        ))?;
        let rows = stmt
            .query_map((resource_id.to_string(), day_of_week), row_to_schedule)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read class schedules")?;
        Ok(rows)
    }
}

// ============================================================
// Single-row lookups, usable inside a transaction
// ============================================================

fn query_laboratory(conn: &Connection, id: Uuid) -> Result<Option<Laboratory>> {
    let lab = conn
        .query_row(
            "SELECT id, name, capacity, status, created_at, updated_at
             FROM laboratories WHERE id = ?",
            [id.to_string()],
            row_to_laboratory,
        )
        .optional()?;
    Ok(lab)
}

fn query_reservation(conn: &Connection, id: Uuid) -> Result<Option<LaboratoryReservation>> {
    let reservation = conn
        .query_row(
            &format!("SELECT {RESERVATION_COLUMNS} FROM laboratory_reservations WHERE id = ?"),
            [id.to_string()],
            row_to_reservation,
        )
        .optional()?;
    Ok(reservation)
}

fn query_schedule(conn: &Connection, id: Uuid) -> Result<Option<ClassSchedule>> {
    let schedule = conn
        .query_row(
            &format!("SELECT {SCHEDULE_COLUMNS} FROM class_schedules WHERE id = ?"),
            [id.to_string()],
            row_to_schedule,
        )
        .optional()?;
    Ok(schedule)
}

fn query_equipment_request(conn: &Connection, id: Uuid) -> Result<Option<EquipmentRequest>> {
    let request = conn
        .query_row(
            &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment_requests WHERE id = ?"),
            [id.to_string()],
            row_to_equipment_request,
        )
        .optional()?;
    Ok(request)
}

fn query_academic_year(conn: &Connection, id: Uuid) -> Result<Option<AcademicYear>> {
    let year = conn
        .query_row(
            "SELECT id, name, start_date, end_date, created_at
             FROM academic_years WHERE id = ?",
            [id.to_string()],
            row_to_academic_year,
        )
        .optional()?;
    Ok(year)
}

fn query_term(conn: &Connection, id: Uuid) -> Result<Option<AcademicTerm>> {
    let term = conn
        .query_row(
            &format!("SELECT {TERM_COLUMNS} FROM academic_terms WHERE id = ?"),
            [id.to_string()],
            row_to_academic_term,
        )
        .optional()?;
    Ok(term)
}

fn query_terms_of_year(conn: &Connection, academic_year_id: Uuid) -> Result<Vec<AcademicTerm>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TERM_COLUMNS} FROM academic_terms
         WHERE academic_year_id = ? ORDER BY start_date"
    ))?;
    let terms = stmt
        .query_map([academic_year_id.to_string()], row_to_academic_term)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(terms)
}

fn clear_current_term(conn: &Connection) -> Result<()> {
    conn.execute("UPDATE academic_terms SET is_current = 0 WHERE is_current = 1", [])
        .context("Failed to clear current academic term")?;
    Ok(())
}

// ============================================================
// Row mapping
// ============================================================

fn row_to_laboratory(row: &Row) -> rusqlite::Result<Laboratory> {
    Ok(Laboratory {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        capacity: row.get(2)?,
        status: get_enum(row, 3, LaboratoryStatus::from_str)?,
        created_at: get_timestamp(row, 4)?,
        updated_at: get_timestamp(row, 5)?,
    })
}

fn row_to_reservation(row: &Row) -> rusqlite::Result<LaboratoryReservation> {
    let recurrence_pattern = match row.get::<_, Option<String>>(13)? {
        Some(s) => Some(
            s.parse::<RecurrencePattern>()
                .map_err(|e| conversion_error(13, e))?,
        ),
        None => None,
    };
    Ok(LaboratoryReservation {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        laboratory_id: get_uuid(row, 2)?,
        reservation_date: get_date(row, 3)?,
        start_time: get_time(row, 4)?,
        end_time: get_time(row, 5)?,
        purpose: row.get(6)?,
        num_students: row.get(7)?,
        course_code: row.get(8)?,
        subject: row.get(9)?,
        section: row.get(10)?,
        status: get_enum(row, 11, ReservationStatus::from_str)?,
        is_recurring: row.get(12)?,
        recurrence_pattern,
        recurrence_end_date: get_opt_date(row, 14)?,
        created_at: get_timestamp(row, 15)?,
        updated_at: get_timestamp(row, 16)?,
    })
}

fn row_to_schedule(row: &Row) -> rusqlite::Result<ClassSchedule> {
    Ok(ClassSchedule {
        id: get_uuid(row, 0)?,
        laboratory_id: get_uuid(row, 1)?,
        subject_code: row.get(2)?,
        subject_name: row.get(3)?,
        instructor_name: row.get(4)?,
        section: row.get(5)?,
        day_of_week: row.get(6)?,
        start_time: get_time(row, 7)?,
        end_time: get_time(row, 8)?,
        schedule_type: get_enum(row, 9, ScheduleType::from_str)?,
        effective_from: get_opt_date(row, 10)?,
        effective_until: get_opt_date(row, 11)?,
        is_active: row.get(12)?,
        notes: row.get(13)?,
        created_at: get_timestamp(row, 14)?,
        academic_term_id: get_opt_uuid(row, 15)?,
    })
}

fn row_to_equipment_request(row: &Row) -> rusqlite::Result<EquipmentRequest> {
    Ok(EquipmentRequest {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        equipment_name: row.get(2)?,
        purpose: row.get(3)?,
        requested_from: get_datetime(row, 4)?,
        requested_until: get_datetime(row, 5)?,
        status: get_enum(row, 6, EquipmentRequestStatus::from_str)?,
        returned_at: match row.get::<_, Option<String>>(7)? {
            Some(s) => Some(parse_datetime(7, &s)?),
            None => None,
        },
        return_condition: row.get(8)?,
        return_notes: row.get(9)?,
        created_at: get_timestamp(row, 10)?,
    })
}

fn row_to_academic_year(row: &Row) -> rusqlite::Result<AcademicYear> {
    Ok(AcademicYear {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        start_date: get_date(row, 2)?,
        end_date: get_date(row, 3)?,
        created_at: get_timestamp(row, 4)?,
    })
}

fn row_to_academic_term(row: &Row) -> rusqlite::Result<AcademicTerm> {
    Ok(AcademicTerm {
        id: get_uuid(row, 0)?,
        academic_year_id: get_uuid(row, 1)?,
        name: row.get(2)?,
        start_date: get_date(row, 3)?,
        end_date: get_date(row, 4)?,
        is_current: row.get(5)?,
        created_at: get_timestamp(row, 6)?,
    })
}

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
}

fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

fn get_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => Uuid::parse_str(&s)
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

fn get_enum<T>(row: &Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    parse(&s).ok_or_else(|| conversion_error(idx, format!("unknown value: {s}")))
}

fn get_date(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn get_opt_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

fn get_time(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let s: String = row.get(idx)?;
    hhmm::parse(&s).map_err(|e| conversion_error(idx, e))
}

fn get_datetime(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    parse_datetime(idx, &s)
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn get_timestamp(row: &Row, idx: usize) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let s: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_datetime(at: NaiveDateTime) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_day_handles_december_and_leap_years() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(last_day_of_month(d(2025, 12, 1)), d(2025, 12, 31));
        assert_eq!(last_day_of_month(d(2024, 2, 1)), d(2024, 2, 29));
        assert_eq!(last_day_of_month(d(2025, 4, 1)), d(2025, 4, 30));
    }

    #[test]
    fn file_backed_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reservations.db");

        let db = Database::open(path.clone()).unwrap();
        db.migrate().unwrap();
        let lab = db
            .create_laboratory(CreateLaboratoryInput {
                name: "ComLab 1".to_string(),
                capacity: 40,
                status: None,
            })
            .unwrap();
        drop(db);

        let reopened = Database::open(path).unwrap();
        reopened.migrate().unwrap();
        let found = reopened.get_laboratory(lab.id).unwrap().unwrap();
        assert_eq!(found.name, "ComLab 1");
        assert_eq!(found.status, LaboratoryStatus::Active);
    }
}
