//! Domain types for the booking system:
//! - Patient: patient identity with contact validation
//! - MedicalTest: immutable reference data with a duration
//! - Booking: a reserved test slot with its lifecycle state machine
//! - TimeSlot: derived availability bookkeeping
//! - BookingRequest: a candidate booking before validation

use crate::error::BookingError;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

/// Two half-open intervals `[s1, e1)` and `[s2, e2)` intersect iff
/// `s1 < e2 && s2 < e1`.
pub fn intervals_overlap(
    s1: NaiveDateTime,
    e1: NaiveDateTime,
    s2: NaiveDateTime,
    e2: NaiveDateTime,
) -> bool {
    s1 < e2 && s2 < e1
}

/// Validate the contact number shape: `07` followed by eight digits.
pub fn validate_contact(contact: &str) -> Result<(), BookingError> {
    let well_formed = contact.len() == 10
        && contact.starts_with("07")
        && contact.chars().all(|c| c.is_ascii_digit());

    if well_formed {
        Ok(())
    } else {
        Err(BookingError::InvalidContact(contact.to_string()))
    }
}

/// Represents a patient in the booking system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub age: u32,
    pub contact: String,
    pub email: Option<String>,
    /// Linked authenticated account, if the patient registered themselves.
    pub account: Option<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Local>,
}

impl Patient {
    /// Create a new patient with validation.
    pub fn new(
        name: String,
        age: u32,
        contact: String,
        email: Option<String>,
    ) -> Result<Self, BookingError> {
        validate_contact(&contact)?;

        Ok(Patient {
            id: Uuid::new_v4(),
            name,
            age,
            contact,
            email,
            account: None,
            active: true,
            created_at: Local::now(),
        })
    }

    pub fn with_account(mut self, account: Uuid) -> Self {
        self.account = Some(account);
        self
    }
}

impl std::fmt::Display for Patient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.contact)
    }
}

/// A diagnostic test offered by the hospitals. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicalTest {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub duration_minutes: u32,
    pub active: bool,
}

impl MedicalTest {
    /// Create a new test. Duration must be a positive number of minutes.
    pub fn new(name: String, description: Option<String>, duration_minutes: u32) -> Option<Self> {
        if name.trim().is_empty() || duration_minutes == 0 {
            return None;
        }

        Some(MedicalTest {
            id: Uuid::new_v4(),
            name,
            description,
            duration_minutes,
            active: true,
        })
    }
}

/// Booking lifecycle states. `Cancelled` is the soft-deleted state; the
/// `active` notion is derived from it, never stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingStatus {
    Pending,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }

    pub fn name(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

/// A candidate booking, as submitted by the caller layer. The conflict
/// engine validates it before any `Booking` comes into existence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub patient_id: Uuid,
    pub test_id: Uuid,
    pub hospital: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

/// A reserved test slot. The test duration is snapshotted at acceptance so
/// overlap scans never need a catalog join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub test_id: Uuid,
    pub hospital: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub status: BookingStatus,
    pub created_at: DateTime<Local>,
    pub cancelled_at: Option<DateTime<Local>>,
    pub cancelled_by: Option<String>,
}

impl Booking {
    pub fn new(request: &BookingRequest, duration_minutes: u32) -> Self {
        Booking {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            test_id: request.test_id,
            hospital: request.hospital.clone(),
            date: request.date,
            time: request.time,
            duration_minutes,
            status: BookingStatus::Pending,
            created_at: Local::now(),
            cancelled_at: None,
            cancelled_by: None,
        }
    }

    /// Derived projection: active iff not cancelled.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn end(&self) -> NaiveDateTime {
        self.start() + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Check whether this booking's occupied interval intersects
    /// `[start, end)`.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        intervals_overlap(self.start(), self.end(), start, end)
    }

    /// Soft delete: move to `Cancelled` and stamp the cancellation metadata.
    pub fn cancel(&mut self, actor: &str, at: DateTime<Local>) {
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(at);
        self.cancelled_by = Some(actor.to_string());
    }

    /// Reverse a soft delete: back to `Pending`, cancellation fields cleared.
    pub fn reinstate(&mut self) {
        self.status = BookingStatus::Pending;
        self.cancelled_at = None;
        self.cancelled_by = None;
    }
}

impl std::fmt::Display for Booking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} on {} at {} [{}]",
            self.hospital,
            self.date,
            self.time.format("%H:%M"),
            self.status.name()
        )
    }
}

/// Availability bookkeeping at fixed 30-minute granularity, so staff can
/// browse free slots without scanning all bookings. The coordinate is the
/// booking's start time; the occupied interval still depends on the test
/// duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSlot {
    pub hospital: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub available: bool,
    pub booking_id: Option<Uuid>,
}
