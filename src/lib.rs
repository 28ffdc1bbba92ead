//! Hospital diagnostic-test booking engine.
//!
//! Patients (or staff on their behalf) reserve a test slot at a hospital on
//! a given date and time. The [`engine::ConflictEngine`] decides whether a
//! proposed booking is permitted given existing bookings, test durations,
//! operating hours, and soft-delete state, and keeps the time-slot
//! bookkeeping in step with accepted bookings.

pub mod auth;
pub mod engine;
pub mod error;
pub mod models;
pub mod policy;
pub mod repository;

pub use engine::{ConflictEngine, InMemoryEngine};
pub use error::BookingError;
pub use models::{Booking, BookingRequest, BookingStatus, MedicalTest, Patient, TimeSlot};
pub use policy::BookingPolicy;
