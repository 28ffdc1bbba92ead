//! Rejection taxonomy for the booking engine.
//!
//! Every variant is an expected, recoverable, user-facing outcome; none is
//! fatal to the process. The calling layer renders the `Display` messages to
//! the end user and never sees raw storage errors.

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    /// Date outside the allowed booking window (or a closed day).
    #[error("invalid booking date {date}: {reason}")]
    InvalidDateRange { date: NaiveDate, reason: String },

    /// Time outside hospital operating hours.
    #[error("booking time {time} is outside hospital hours ({open} to {close})")]
    InvalidTimeRange {
        time: NaiveTime,
        open: NaiveTime,
        close: NaiveTime,
    },

    /// An identical active booking already exists for this patient.
    #[error("this patient already has an active booking for this test at the selected date and time")]
    DuplicateBooking,

    /// The requested interval collides with another active booking.
    #[error("the requested time overlaps an existing booking at {hospital} on {date}")]
    SlotOverlap { hospital: String, date: NaiveDate },

    /// The storage constraint fired after the local check passed: another
    /// writer took the slot first. The caller should ask the user for a new
    /// time rather than retry blindly.
    #[error("the slot was taken by another booking while this one was being processed")]
    ConcurrentConflict,

    /// Referenced booking, patient, or test does not exist (or is inactive).
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Contact number fails the 07XXXXXXXX shape check.
    #[error("contact number must start with 07 and be exactly 10 digits (e.g. 0712345678)")]
    InvalidContact(String),

    /// An active patient with the same contact number is already registered.
    #[error("an active patient with contact number {0} is already registered")]
    DuplicatePatient(String),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        BookingError::NotFound { entity, id }
    }
}
