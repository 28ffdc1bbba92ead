//! The booking conflict engine.
//!
//! Given a candidate (patient, test, hospital, date, time) request and read
//! access to existing bookings, the engine decides accept or reject and, on
//! acceptance, keeps the slot bookkeeping in step. Rejections are the
//! structured [`BookingError`] taxonomy; the caller layer never sees raw
//! storage errors.
//!
//! The engine is authorization-agnostic: gate calls with [`crate::auth`]
//! before they reach it.

use crate::error::BookingError;
use crate::models::{Booking, BookingRequest, MedicalTest, Patient};
use crate::policy::BookingPolicy;
use crate::repository::{
    BookingRepository, InMemoryBookingStore, InMemoryPatientDirectory, InMemorySlotStore,
    InMemoryTestCatalog, PatientRegistry, RepositoryError, TestCatalog, TimeSlotRepository,
};
use chrono::{Duration, Local, NaiveDate, NaiveTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Conflict engine over the four storage seams. Fields are public so the
/// caller layer can reach the read paths directly; all writes go through the
/// engine's operations.
pub struct ConflictEngine<B, C, S, P> {
    pub bookings: B,
    pub catalog: C,
    pub slots: S,
    pub patients: P,
    pub policy: BookingPolicy,
}

/// Engine wired to the in-memory default stores.
pub type InMemoryEngine =
    ConflictEngine<InMemoryBookingStore, InMemoryTestCatalog, InMemorySlotStore, InMemoryPatientDirectory>;

impl InMemoryEngine {
    /// In-memory engine with an empty booking store and patient directory
    /// and the standard test panel.
    pub fn in_memory(policy: BookingPolicy) -> Self {
        ConflictEngine {
            bookings: InMemoryBookingStore::new(),
            catalog: InMemoryTestCatalog::with_standard_panel(),
            slots: InMemorySlotStore::new(),
            patients: InMemoryPatientDirectory::new(),
            policy,
        }
    }
}

impl<B, C, S, P> ConflictEngine<B, C, S, P>
where
    B: BookingRepository,
    C: TestCatalog,
    S: TimeSlotRepository,
    P: PatientRegistry,
{
    pub fn new(bookings: B, catalog: C, slots: S, patients: P, policy: BookingPolicy) -> Self {
        ConflictEngine {
            bookings,
            catalog,
            slots,
            patients,
            policy,
        }
    }

    /// Run the full validation pipeline and, if every check passes, persist
    /// the booking and claim its slot.
    ///
    /// The pipeline order is: referenced records exist → date window →
    /// operating hours → exact duplicate → interval overlap. Nothing is
    /// written before all checks pass, so a rejection leaves no partial
    /// state behind.
    pub fn attempt_booking(&self, request: &BookingRequest) -> Result<Booking, BookingError> {
        debug!(
            patient = %request.patient_id,
            test = %request.test_id,
            hospital = %request.hospital,
            date = %request.date,
            time = %request.time.format("%H:%M"),
            "validating booking request"
        );

        let patient = self.active_patient(request.patient_id)?;
        let test = self.active_test(request.test_id)?;

        let today = Local::now().date_naive();
        self.policy.check_date(request.date, today)?;
        self.policy.check_time(request.time)?;

        if self.bookings.find_active_by_tuple(
            request.patient_id,
            request.test_id,
            request.date,
            request.time,
        ) {
            debug!(patient = %patient.id, "duplicate active booking for the same tuple");
            return Err(BookingError::DuplicateBooking);
        }

        let start = request.date.and_time(request.time);
        let end = start + Duration::minutes(i64::from(test.duration_minutes));
        let clashes =
            self.bookings
                .find_active_overlapping(&request.hospital, request.date, start, end, None);
        if !clashes.is_empty() {
            warn!(
                hospital = %request.hospital,
                date = %request.date,
                clashes = clashes.len(),
                "time-slot collision"
            );
            return Err(BookingError::SlotOverlap {
                hospital: request.hospital.clone(),
                date: request.date,
            });
        }

        // The store re-checks the tuple constraint at commit; losing that
        // race is a ConcurrentConflict, not a duplicate the user produced.
        let booking = self
            .bookings
            .create(Booking::new(request, test.duration_minutes))
            .map_err(|_| BookingError::ConcurrentConflict)?;

        self.slots.upsert(
            &booking.hospital,
            booking.date,
            booking.time,
            booking.duration_minutes,
            booking.id,
        );

        info!(booking = %booking.id, patient = %patient.id, "booking accepted");
        Ok(booking)
    }

    /// Soft delete. Succeeds iff the booking exists and is currently
    /// active; never re-runs the overlap check.
    pub fn cancel_booking(&self, id: Uuid, actor: &str) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .soft_delete(id, actor)
            .map_err(|_| BookingError::not_found("booking", id))?;

        self.slots.release(booking.id);
        info!(booking = %booking.id, actor, "booking cancelled");
        Ok(booking)
    }

    /// Re-activate a cancelled booking. The overlap check runs again against
    /// the current active set, excluding the booking itself, because the
    /// slot may have been taken in the meantime; if it was, the booking
    /// stays cancelled.
    pub fn attempt_restore(&self, id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .bookings
            .get(id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;

        if booking.is_active() {
            debug!(booking = %id, "restore requested for an already-active booking");
            return Ok(booking);
        }

        let clashes = self.bookings.find_active_overlapping(
            &booking.hospital,
            booking.date,
            booking.start(),
            booking.end(),
            Some(booking.id),
        );
        if !clashes.is_empty() {
            warn!(booking = %id, clashes = clashes.len(), "restore blocked: slot now occupied");
            return Err(BookingError::SlotOverlap {
                hospital: booking.hospital.clone(),
                date: booking.date,
            });
        }

        let restored = self.bookings.restore(id).map_err(|e| match e {
            RepositoryError::UniqueConstraintViolation => BookingError::DuplicateBooking,
            RepositoryError::NotFound => BookingError::not_found("booking", id),
        })?;

        self.slots.upsert(
            &restored.hospital,
            restored.date,
            restored.time,
            restored.duration_minutes,
            restored.id,
        );

        info!(booking = %restored.id, "booking restored");
        Ok(restored)
    }

    /// Administrative permanent removal. Any slot link is cleared so the
    /// bookkeeping table carries no dangling reference.
    pub fn hard_delete_booking(&self, id: Uuid) -> Result<(), BookingError> {
        let booking = self
            .bookings
            .hard_delete(id)
            .map_err(|_| BookingError::not_found("booking", id))?;

        self.slots.release(booking.id);
        info!(booking = %id, "booking permanently removed");
        Ok(())
    }

    /// Free start times on the policy's slot grid at a hospital on a day.
    pub fn free_slots(&self, hospital: &str, date: NaiveDate) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.policy.slot_minutes));
        let mut free = Vec::new();
        let mut time = self.policy.opening_time;

        while time <= self.policy.closing_time {
            let start = date.and_time(time);
            if self
                .bookings
                .find_active_overlapping(hospital, date, start, start + step, None)
                .is_empty()
            {
                free.push(time);
            }
            time = time + step;
        }
        free
    }

    pub fn bookings_for_patient(&self, patient_id: Uuid) -> Vec<Booking> {
        self.bookings.by_patient(patient_id)
    }

    pub fn bookings_on(&self, hospital: &str, date: NaiveDate) -> Vec<Booking> {
        self.bookings.on_day(hospital, date)
    }

    fn active_patient(&self, id: Uuid) -> Result<Patient, BookingError> {
        self.patients
            .get(id)
            .filter(|p| p.active)
            .ok_or_else(|| BookingError::not_found("patient", id))
    }

    fn active_test(&self, id: Uuid) -> Result<MedicalTest, BookingError> {
        self.catalog
            .get(id)
            .filter(|t| t.active)
            .ok_or_else(|| BookingError::not_found("test", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, TimeSlot};
    use chrono::{Datelike, NaiveDateTime, Weekday};

    /// Weekend policy off so relative test dates never trip the weekday rule;
    /// the weekday rule has its own test below.
    fn engine() -> InMemoryEngine {
        InMemoryEngine::in_memory(BookingPolicy::open_all_week())
    }

    fn days_out(days: i64) -> NaiveDate {
        Local::now().date_naive() + Duration::days(days)
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn register(engine: &InMemoryEngine, name: &str, contact: &str) -> Patient {
        engine
            .patients
            .register(name.into(), 30, contact.into(), None)
            .unwrap()
    }

    fn test_named(engine: &InMemoryEngine, name: &str) -> MedicalTest {
        engine
            .catalog
            .all_active()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap()
    }

    fn request(patient: &Patient, test: &MedicalTest, hospital: &str, date: NaiveDate, time: NaiveTime) -> BookingRequest {
        BookingRequest {
            patient_id: patient.id,
            test_id: test.id,
            hospital: hospital.into(),
            date,
            time,
        }
    }

    // Accept a first booking, then reject the identical tuple.
    #[test]
    fn duplicate_tuple_is_rejected() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");
        let r = request(&asha, &blood, "Central", days_out(5), t(9, 0));

        let booking = engine.attempt_booking(&r).unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.duration_minutes, 15);

        assert_eq!(engine.attempt_booking(&r), Err(BookingError::DuplicateBooking));
    }

    // A 60-minute MRI at 09:00 blocks a 09:15 blood test at the same
    // hospital even though the (date, time) pair differs.
    #[test]
    fn variable_durations_collide_across_start_times() {
        let engine = engine();
        let x = register(&engine, "Patient X", "0711111111");
        let y = register(&engine, "Patient Y", "0722222222");
        let mri = test_named(&engine, "MRI Scan");
        let blood = test_named(&engine, "Blood Test");
        let date = days_out(5);

        engine
            .attempt_booking(&request(&x, &mri, "Central", date, t(9, 0)))
            .unwrap();

        let result = engine.attempt_booking(&request(&y, &blood, "Central", date, t(9, 15)));
        assert!(matches!(result, Err(BookingError::SlotOverlap { .. })));

        // a different hospital is a different resource
        engine
            .attempt_booking(&request(&y, &blood, "Westside", date, t(9, 15)))
            .unwrap();
    }

    // Yesterday and 31 days out both fall outside the window.
    #[test]
    fn date_window_is_enforced() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        for date in [days_out(-1), days_out(31)] {
            let result = engine.attempt_booking(&request(&asha, &blood, "Central", date, t(9, 0)));
            assert!(matches!(result, Err(BookingError::InvalidDateRange { .. })));
        }
    }

    // 07:30 and 17:30 fall outside operating hours.
    #[test]
    fn operating_hours_are_enforced() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        for time in [t(7, 30), t(17, 30)] {
            let result = engine.attempt_booking(&request(&asha, &blood, "Central", days_out(5), time));
            assert!(matches!(result, Err(BookingError::InvalidTimeRange { .. })));
        }
    }

    #[test]
    fn weekend_dates_are_rejected_under_the_default_policy() {
        let engine = InMemoryEngine::in_memory(BookingPolicy::default());
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        let today = Local::now().date_naive();
        let to_saturday = (7 + 5 - today.weekday().num_days_from_monday() as i64) % 7;
        let saturday = today + Duration::days(to_saturday);
        assert_eq!(saturday.weekday(), Weekday::Sat);

        let result = engine.attempt_booking(&request(&asha, &blood, "Central", saturday, t(9, 0)));
        assert!(matches!(result, Err(BookingError::InvalidDateRange { .. })));
    }

    #[test]
    fn unknown_patient_and_test_are_rejected_before_any_write() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        let ghost = BookingRequest {
            patient_id: Uuid::new_v4(),
            test_id: blood.id,
            hospital: "Central".into(),
            date: days_out(5),
            time: t(9, 0),
        };
        assert!(matches!(
            engine.attempt_booking(&ghost),
            Err(BookingError::NotFound { entity: "patient", .. })
        ));

        let no_such_test = BookingRequest {
            patient_id: asha.id,
            test_id: Uuid::new_v4(),
            hospital: "Central".into(),
            date: days_out(5),
            time: t(9, 0),
        };
        assert!(matches!(
            engine.attempt_booking(&no_such_test),
            Err(BookingError::NotFound { entity: "test", .. })
        ));

        assert!(engine.bookings_on("Central", days_out(5)).is_empty());
    }

    // Cancel then restore with no intervening conflict round-trips.
    #[test]
    fn cancel_then_restore_round_trips() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        let booking = engine
            .attempt_booking(&request(&asha, &blood, "Central", days_out(5), t(9, 0)))
            .unwrap();

        let cancelled = engine.cancel_booking(booking.id, "staff").unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert!(engine
            .slots
            .get("Central", booking.date, booking.time)
            .unwrap()
            .available);

        let restored = engine.attempt_restore(booking.id).unwrap();
        assert_eq!(restored.status, BookingStatus::Pending);
        assert!(restored.cancelled_at.is_none());
        assert!(restored.cancelled_by.is_none());
        assert_eq!(
            (restored.patient_id, restored.test_id, restored.date, restored.time),
            (booking.patient_id, booking.test_id, booking.date, booking.time)
        );
        assert!(!engine
            .slots
            .get("Central", booking.date, booking.time)
            .unwrap()
            .available);
    }

    // A new occupant at the same coordinate blocks restoration.
    #[test]
    fn restore_is_blocked_by_a_new_occupant() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let bea = register(&engine, "Bea", "0722222222");
        let blood = test_named(&engine, "Blood Test");
        let date = days_out(5);

        let original = engine
            .attempt_booking(&request(&asha, &blood, "Central", date, t(9, 0)))
            .unwrap();
        engine.cancel_booking(original.id, "staff").unwrap();

        engine
            .attempt_booking(&request(&bea, &blood, "Central", date, t(9, 0)))
            .unwrap();

        assert!(matches!(
            engine.attempt_restore(original.id),
            Err(BookingError::SlotOverlap { .. })
        ));
        assert!(!engine.bookings.get(original.id).unwrap().is_active());
    }

    #[test]
    fn cancelling_twice_or_cancelling_nothing_reports_not_found() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        assert!(matches!(
            engine.cancel_booking(Uuid::new_v4(), "staff"),
            Err(BookingError::NotFound { .. })
        ));

        let booking = engine
            .attempt_booking(&request(&asha, &blood, "Central", days_out(5), t(9, 0)))
            .unwrap();
        engine.cancel_booking(booking.id, "staff").unwrap();
        assert!(matches!(
            engine.cancel_booking(booking.id, "staff"),
            Err(BookingError::NotFound { .. })
        ));
    }

    #[test]
    fn hard_delete_purges_booking_and_slot_link() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let blood = test_named(&engine, "Blood Test");

        let booking = engine
            .attempt_booking(&request(&asha, &blood, "Central", days_out(5), t(9, 0)))
            .unwrap();

        engine.hard_delete_booking(booking.id).unwrap();
        assert!(engine.bookings.get(booking.id).is_none());
        let slot = engine.slots.get("Central", booking.date, booking.time).unwrap();
        assert!(slot.available);
        assert!(slot.booking_id.is_none());
    }

    // Over a burst of requests, whatever was accepted is pairwise
    // tuple-unique and interval-disjoint per hospital/day.
    #[test]
    fn accepted_set_is_unique_and_overlap_free() {
        let engine = engine();
        let patients: Vec<Patient> = (1..=4)
            .map(|i| register(&engine, &format!("Patient {i}"), &format!("07{i}{i}{i}{i}{i}{i}{i}{i}")))
            .collect();
        let tests = engine.catalog.all_active();
        let date = days_out(5);

        for patient in &patients {
            for test in &tests {
                for hour in 9..12 {
                    let _ = engine.attempt_booking(&request(patient, test, "Central", date, t(hour, 0)));
                }
            }
        }

        let accepted = engine.bookings_on("Central", date);
        assert!(!accepted.is_empty());
        for (i, a) in accepted.iter().enumerate() {
            for b in accepted.iter().skip(i + 1) {
                assert_ne!(
                    (a.patient_id, a.test_id, a.date, a.time),
                    (b.patient_id, b.test_id, b.date, b.time),
                    "uniqueness violated"
                );
                assert!(
                    !a.overlaps(b.start(), b.end()),
                    "overlap between {} and {}",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn free_slots_shrink_as_bookings_land() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let mri = test_named(&engine, "MRI Scan");
        let date = days_out(5);

        // 08:00..=17:00 on a 30-minute grid is 19 start times
        assert_eq!(engine.free_slots("Central", date).len(), 19);

        engine
            .attempt_booking(&request(&asha, &mri, "Central", date, t(9, 0)))
            .unwrap();

        let free = engine.free_slots("Central", date);
        assert_eq!(free.len(), 17);
        assert!(!free.contains(&t(9, 0)));
        assert!(!free.contains(&t(9, 30)));
        assert!(free.contains(&t(10, 0)));
    }

    // A store whose commit-time constraint fires even though the scans saw
    // nothing models the two-writers race; the engine must surface it as
    // ConcurrentConflict.
    struct RacingStore;

    impl BookingRepository for RacingStore {
        fn find_active_by_tuple(&self, _: Uuid, _: Uuid, _: NaiveDate, _: NaiveTime) -> bool {
            false
        }
        fn find_active_overlapping(
            &self,
            _: &str,
            _: NaiveDate,
            _: NaiveDateTime,
            _: NaiveDateTime,
            _: Option<Uuid>,
        ) -> Vec<Booking> {
            Vec::new()
        }
        fn create(&self, _: Booking) -> Result<Booking, RepositoryError> {
            Err(RepositoryError::UniqueConstraintViolation)
        }
        fn get(&self, _: Uuid) -> Option<Booking> {
            None
        }
        fn soft_delete(&self, _: Uuid, _: &str) -> Result<Booking, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        fn restore(&self, _: Uuid) -> Result<Booking, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        fn hard_delete(&self, _: Uuid) -> Result<Booking, RepositoryError> {
            Err(RepositoryError::NotFound)
        }
        fn by_patient(&self, _: Uuid) -> Vec<Booking> {
            Vec::new()
        }
        fn on_day(&self, _: &str, _: NaiveDate) -> Vec<Booking> {
            Vec::new()
        }
    }

    #[test]
    fn losing_the_commit_race_surfaces_as_concurrent_conflict() {
        let directory = InMemoryPatientDirectory::new();
        let asha = directory
            .register("Asha".into(), 34, "0711111111".into(), None)
            .unwrap();
        let catalog = InMemoryTestCatalog::with_standard_panel();
        let blood = catalog
            .all_active()
            .into_iter()
            .find(|t| t.name == "Blood Test")
            .unwrap();

        let engine = ConflictEngine::new(
            RacingStore,
            catalog,
            InMemorySlotStore::new(),
            directory,
            BookingPolicy::open_all_week(),
        );

        let result = engine.attempt_booking(&BookingRequest {
            patient_id: asha.id,
            test_id: blood.id,
            hospital: "Central".into(),
            date: days_out(5),
            time: t(9, 0),
        });
        assert_eq!(result, Err(BookingError::ConcurrentConflict));

        // and no slot was claimed for the failed commit
        assert!(engine.slots.get("Central", days_out(5), t(9, 0)).is_none());
    }

    #[test]
    fn slot_bookkeeping_links_the_occupying_booking() {
        let engine = engine();
        let asha = register(&engine, "Asha", "0711111111");
        let ultrasound = test_named(&engine, "Ultrasound");
        let date = days_out(5);

        let booking = engine
            .attempt_booking(&request(&asha, &ultrasound, "Central", date, t(10, 0)))
            .unwrap();

        let occupied = engine.slots.occupied("Central", date);
        assert_eq!(
            occupied,
            vec![TimeSlot {
                hospital: "Central".into(),
                date,
                time: t(10, 0),
                duration_minutes: 30,
                available: false,
                booking_id: Some(booking.id),
            }]
        );
    }
}
