//! Storage seams for the conflict engine.
//!
//! The engine talks to bookings, the test catalog, the slot bookkeeping, and
//! the patient directory only through these traits. The default
//! implementations are in-memory hash maps with scan-based queries; a store
//! with native interval indexing can replace the overlap query without the
//! engine noticing.

use crate::error::BookingError;
use crate::models::{Booking, MedicalTest, Patient, TimeSlot};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Commit-time failures a storage backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The active-booking uniqueness constraint fired. This is the
    /// authoritative guard against two writers racing past the same
    /// conflict check.
    #[error("a conflicting active record already exists")]
    UniqueConstraintViolation,
    #[error("record not found")]
    NotFound,
}

/// Read/write access to the set of bookings, active and cancelled.
pub trait BookingRepository {
    /// Point lookup: does an active booking exist with this exact
    /// (patient, test, date, time) tuple?
    fn find_active_by_tuple(
        &self,
        patient_id: Uuid,
        test_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> bool;

    /// All active bookings at `hospital` on `date` whose occupied interval
    /// intersects `[start, end)`, excluding `exclude` (used when a booking
    /// is re-validated against everyone but itself).
    fn find_active_overlapping(
        &self,
        hospital: &str,
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<Uuid>,
    ) -> Vec<Booking>;

    /// Persist a new booking. Fails with `UniqueConstraintViolation` when
    /// another active booking already holds the same tuple.
    fn create(&self, booking: Booking) -> Result<Booking, RepositoryError>;

    fn get(&self, id: Uuid) -> Option<Booking>;

    /// Soft delete: flip the booking to `Cancelled` and stamp the
    /// cancellation metadata. Fails when the booking is missing or already
    /// cancelled.
    fn soft_delete(&self, id: Uuid, actor: &str) -> Result<Booking, RepositoryError>;

    /// Reverse a soft delete. Re-checks the tuple constraint against the
    /// other active bookings before reactivating.
    fn restore(&self, id: Uuid) -> Result<Booking, RepositoryError>;

    /// Permanent removal; the record is gone entirely.
    fn hard_delete(&self, id: Uuid) -> Result<Booking, RepositoryError>;

    /// All bookings for a patient, newest date first.
    fn by_patient(&self, patient_id: Uuid) -> Vec<Booking>;

    /// Active bookings at a hospital on a day, ordered by time.
    fn on_day(&self, hospital: &str, date: NaiveDate) -> Vec<Booking>;
}

/// Lookup into the immutable test reference data.
pub trait TestCatalog {
    fn get(&self, test_id: Uuid) -> Option<MedicalTest>;

    fn duration_minutes(&self, test_id: Uuid) -> Option<u32> {
        self.get(test_id).map(|t| t.duration_minutes)
    }

    fn all_active(&self) -> Vec<MedicalTest>;
}

/// Availability bookkeeping, one row per (hospital, date, time) coordinate.
pub trait TimeSlotRepository {
    /// Mark the slot occupied by `booking_id`, creating the row if absent.
    fn upsert(
        &self,
        hospital: &str,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        booking_id: Uuid,
    );

    /// Free every slot held by `booking_id` (available again, link cleared).
    fn release(&self, booking_id: Uuid);

    fn get(&self, hospital: &str, date: NaiveDate, time: NaiveTime) -> Option<TimeSlot>;

    /// Occupied slots at a hospital on a day, ordered by time.
    fn occupied(&self, hospital: &str, date: NaiveDate) -> Vec<TimeSlot>;
}

/// Patient registration and lookup.
pub trait PatientRegistry {
    /// Register a patient. Rejects a malformed contact number and any
    /// contact number already held by an active patient.
    fn register(
        &self,
        name: String,
        age: u32,
        contact: String,
        email: Option<String>,
    ) -> Result<Patient, BookingError>;

    fn get(&self, id: Uuid) -> Option<Patient>;

    fn find_active_by_contact(&self, contact: &str) -> Option<Patient>;

    /// Soft delete; frees the contact number for re-registration.
    fn deactivate(&self, id: Uuid) -> Result<(), RepositoryError>;

    fn all_active(&self) -> Vec<Patient>;
}

// A poisoned lock only means another thread panicked mid-operation; the maps
// themselves stay structurally valid, so recover the guard.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory booking store. The tuple constraint is re-checked under the
/// store's own lock at `create` and `restore` time, so a second writer that
/// passed the engine's check fails at commit.
#[derive(Default)]
pub struct InMemoryBookingStore {
    inner: Mutex<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tuple_taken(
        map: &HashMap<Uuid, Booking>,
        patient_id: Uuid,
        test_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<Uuid>,
    ) -> bool {
        map.values().any(|b| {
            b.is_active()
                && Some(b.id) != exclude
                && b.patient_id == patient_id
                && b.test_id == test_id
                && b.date == date
                && b.time == time
        })
    }
}

impl BookingRepository for InMemoryBookingStore {
    fn find_active_by_tuple(
        &self,
        patient_id: Uuid,
        test_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    ) -> bool {
        let map = relock(&self.inner);
        Self::tuple_taken(&map, patient_id, test_id, date, time, None)
    }

    fn find_active_overlapping(
        &self,
        hospital: &str,
        date: NaiveDate,
        start: NaiveDateTime,
        end: NaiveDateTime,
        exclude: Option<Uuid>,
    ) -> Vec<Booking> {
        let map = relock(&self.inner);
        let mut clashes: Vec<Booking> = map
            .values()
            .filter(|b| {
                b.is_active()
                    && Some(b.id) != exclude
                    && b.hospital == hospital
                    && b.date == date
                    && b.overlaps(start, end)
            })
            .cloned()
            .collect();
        clashes.sort_by_key(|b| b.time);
        clashes
    }

    fn create(&self, booking: Booking) -> Result<Booking, RepositoryError> {
        let mut map = relock(&self.inner);
        if Self::tuple_taken(
            &map,
            booking.patient_id,
            booking.test_id,
            booking.date,
            booking.time,
            None,
        ) {
            return Err(RepositoryError::UniqueConstraintViolation);
        }
        map.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn get(&self, id: Uuid) -> Option<Booking> {
        relock(&self.inner).get(&id).cloned()
    }

    fn soft_delete(&self, id: Uuid, actor: &str) -> Result<Booking, RepositoryError> {
        let mut map = relock(&self.inner);
        let booking = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if !booking.is_active() {
            return Err(RepositoryError::NotFound);
        }
        booking.cancel(actor, Local::now());
        Ok(booking.clone())
    }

    fn restore(&self, id: Uuid) -> Result<Booking, RepositoryError> {
        let mut map = relock(&self.inner);
        let target = map.get(&id).ok_or(RepositoryError::NotFound)?.clone();
        if target.is_active() {
            return Ok(target);
        }
        if Self::tuple_taken(
            &map,
            target.patient_id,
            target.test_id,
            target.date,
            target.time,
            Some(id),
        ) {
            return Err(RepositoryError::UniqueConstraintViolation);
        }
        let booking = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        booking.reinstate();
        Ok(booking.clone())
    }

    fn hard_delete(&self, id: Uuid) -> Result<Booking, RepositoryError> {
        relock(&self.inner)
            .remove(&id)
            .ok_or(RepositoryError::NotFound)
    }

    fn by_patient(&self, patient_id: Uuid) -> Vec<Booking> {
        let map = relock(&self.inner);
        let mut bookings: Vec<Booking> = map
            .values()
            .filter(|b| b.patient_id == patient_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| std::cmp::Reverse((b.date, b.time)));
        bookings
    }

    fn on_day(&self, hospital: &str, date: NaiveDate) -> Vec<Booking> {
        let map = relock(&self.inner);
        let mut bookings: Vec<Booking> = map
            .values()
            .filter(|b| b.is_active() && b.hospital == hospital && b.date == date)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.time);
        bookings
    }
}

/// In-memory test catalog.
#[derive(Default)]
pub struct InMemoryTestCatalog {
    inner: Mutex<HashMap<Uuid, MedicalTest>>,
}

impl InMemoryTestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the standard diagnostic panel.
    pub fn with_standard_panel() -> Self {
        let catalog = Self::new();
        for (name, minutes) in [
            ("Blood Test", 15),
            ("X-Ray", 20),
            ("ECG", 15),
            ("Ultrasound", 30),
            ("CT Scan", 45),
            ("MRI Scan", 60),
        ] {
            if let Some(test) = MedicalTest::new(name.to_string(), None, minutes) {
                catalog.add(test);
            }
        }
        catalog
    }

    pub fn add(&self, test: MedicalTest) {
        relock(&self.inner).insert(test.id, test);
    }
}

impl TestCatalog for InMemoryTestCatalog {
    fn get(&self, test_id: Uuid) -> Option<MedicalTest> {
        relock(&self.inner).get(&test_id).cloned()
    }

    fn all_active(&self) -> Vec<MedicalTest> {
        let map = relock(&self.inner);
        let mut tests: Vec<MedicalTest> = map.values().filter(|t| t.active).cloned().collect();
        tests.sort_by(|a, b| a.name.cmp(&b.name));
        tests
    }
}

type SlotKey = (String, NaiveDate, NaiveTime);

/// In-memory slot bookkeeping keyed by (hospital, date, time).
#[derive(Default)]
pub struct InMemorySlotStore {
    inner: Mutex<HashMap<SlotKey, TimeSlot>>,
}

impl InMemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeSlotRepository for InMemorySlotStore {
    fn upsert(
        &self,
        hospital: &str,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: u32,
        booking_id: Uuid,
    ) {
        let mut map = relock(&self.inner);
        let slot = map
            .entry((hospital.to_string(), date, time))
            .or_insert_with(|| TimeSlot {
                hospital: hospital.to_string(),
                date,
                time,
                duration_minutes,
                available: true,
                booking_id: None,
            });
        slot.duration_minutes = duration_minutes;
        slot.available = false;
        slot.booking_id = Some(booking_id);
    }

    fn release(&self, booking_id: Uuid) {
        let mut map = relock(&self.inner);
        for slot in map.values_mut() {
            if slot.booking_id == Some(booking_id) {
                slot.available = true;
                slot.booking_id = None;
            }
        }
    }

    fn get(&self, hospital: &str, date: NaiveDate, time: NaiveTime) -> Option<TimeSlot> {
        relock(&self.inner)
            .get(&(hospital.to_string(), date, time))
            .cloned()
    }

    fn occupied(&self, hospital: &str, date: NaiveDate) -> Vec<TimeSlot> {
        let map = relock(&self.inner);
        let mut slots: Vec<TimeSlot> = map
            .values()
            .filter(|s| !s.available && s.hospital == hospital && s.date == date)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.time);
        slots
    }
}

/// In-memory patient directory enforcing one active patient per contact
/// number.
#[derive(Default)]
pub struct InMemoryPatientDirectory {
    inner: Mutex<HashMap<Uuid, Patient>>,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, patient: Patient) {
        relock(&self.inner).insert(patient.id, patient);
    }
}

impl PatientRegistry for InMemoryPatientDirectory {
    fn register(
        &self,
        name: String,
        age: u32,
        contact: String,
        email: Option<String>,
    ) -> Result<Patient, BookingError> {
        let patient = Patient::new(name, age, contact, email)?;
        let mut map = relock(&self.inner);
        if map.values().any(|p| p.active && p.contact == patient.contact) {
            return Err(BookingError::DuplicatePatient(patient.contact));
        }
        map.insert(patient.id, patient.clone());
        Ok(patient)
    }

    fn get(&self, id: Uuid) -> Option<Patient> {
        relock(&self.inner).get(&id).cloned()
    }

    fn find_active_by_contact(&self, contact: &str) -> Option<Patient> {
        let map = relock(&self.inner);
        map.values().find(|p| p.active && p.contact == contact).cloned()
    }

    fn deactivate(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut map = relock(&self.inner);
        let patient = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        patient.active = false;
        Ok(())
    }

    fn all_active(&self) -> Vec<Patient> {
        let map = relock(&self.inner);
        let mut patients: Vec<Patient> = map.values().filter(|p| p.active).cloned().collect();
        patients.sort_by(|a, b| a.name.cmp(&b.name));
        patients
    }
}
