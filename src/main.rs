//! Interactive staff console for the hospital test-booking system.
//!
//! Provides a menu-driven interface for registering patients, creating,
//! cancelling and restoring bookings, and browsing free time slots, all
//! backed by the in-memory stores.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime, Weekday};
use medbook::auth::{self, Action, Actor, Resource, Role};
use medbook::repository::{PatientRegistry, TestCatalog};
use medbook::{Booking, BookingPolicy, BookingRequest, InMemoryEngine, MedicalTest, Patient};
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

struct BookingConsole {
    engine: InMemoryEngine,
    actor: Actor,
    running: bool,
}

impl BookingConsole {
    fn new(role: Role) -> Self {
        BookingConsole {
            engine: InMemoryEngine::in_memory(BookingPolicy::default()),
            actor: Actor::new(Uuid::new_v4(), role),
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       HOSPITAL TEST BOOKING SYSTEM");
        println!("{}", "=".repeat(60));
    }

    fn print_menu(&self) {
        println!("\n--- Main Menu ---");
        println!("1. Register patient");
        println!("2. View test catalog");
        println!("3. Create booking");
        println!("4. View bookings for a patient");
        println!("5. Cancel booking");
        println!("6. Restore booking");
        println!("7. Browse free slots");
        println!("8. Hard delete booking (admin)");
        println!("9. Run demo");
        println!("0. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        io::stdout().flush().unwrap();

        let mut input = String::new();
        io::stdin().read_line(&mut input).unwrap();
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i32>) -> i32 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i32>() {
                return value;
            }
            println!("Please enter a valid number");
        }
    }

    fn get_date_input(&self, prompt: &str, default: NaiveDate) -> NaiveDate {
        loop {
            let input = self.get_input(prompt, Some(&default.to_string()));
            match NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
                Ok(date) => return date,
                Err(_) => println!("Please enter a date as YYYY-MM-DD"),
            }
        }
    }

    fn get_time_input(&self) -> NaiveTime {
        loop {
            let hour = self.get_int_input("Hour (0-23)", Some(9));
            let minute = self.get_int_input("Minute (0-59)", Some(0));
            if let Some(time) = NaiveTime::from_hms_opt(hour as u32, minute as u32, 0) {
                return time;
            }
            println!("Please enter a valid time");
        }
    }

    fn pick_patient(&self) -> Option<Patient> {
        let patients = self.engine.patients.all_active();
        if patients.is_empty() {
            println!("\nNo registered patients. Register one first (option 1)");
            return None;
        }

        println!("\nPatients:");
        for (i, patient) in patients.iter().enumerate() {
            println!("  {}. {}", i + 1, patient);
        }

        let choice = self.get_int_input("Select patient (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > patients.len() {
            return None;
        }
        Some(patients[choice as usize - 1].clone())
    }

    fn pick_test(&self) -> Option<MedicalTest> {
        let tests = self.engine.catalog.all_active();

        println!("\nAvailable tests:");
        for (i, test) in tests.iter().enumerate() {
            println!("  {}. {} ({} min)", i + 1, test.name, test.duration_minutes);
        }

        let choice = self.get_int_input("Select test (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > tests.len() {
            return None;
        }
        Some(tests[choice as usize - 1].clone())
    }

    fn pick_booking(&self, patient: &Patient, active_only: bool) -> Option<Booking> {
        let bookings: Vec<Booking> = self
            .engine
            .bookings_for_patient(patient.id)
            .into_iter()
            .filter(|b| !active_only || b.is_active())
            .collect();

        if bookings.is_empty() {
            println!("\nNo matching bookings for {}", patient.name);
            return None;
        }

        println!("\nBookings for {}:", patient.name);
        for (i, booking) in bookings.iter().enumerate() {
            let test_name = self
                .engine
                .catalog
                .get(booking.test_id)
                .map(|t| t.name)
                .unwrap_or_else(|| "unknown test".to_string());
            println!("  {}. {} - {}", i + 1, test_name, booking);
        }

        let choice = self.get_int_input("Select booking (0 to go back)", Some(0));
        if choice <= 0 || choice as usize > bookings.len() {
            return None;
        }
        Some(bookings[choice as usize - 1].clone())
    }

    fn booking_resource(&self, booking: &Booking) -> Resource {
        let owner_account = self
            .engine
            .patients
            .get(booking.patient_id)
            .and_then(|p| p.account);
        Resource::Booking { owner_account }
    }

    fn register_patient(&mut self) {
        println!("\n--- Register Patient ---");

        let name = self.get_input("Patient name", None);
        let age = self.get_int_input("Age", Some(30));
        let contact = self.get_input("Contact number (07XXXXXXXX)", None);
        let email = self.get_input("Email (optional)", Some(""));
        let email = if email.is_empty() { None } else { Some(email) };

        match self
            .engine
            .patients
            .register(name, age.max(0) as u32, contact, email)
        {
            Ok(patient) => println!("\nRegistered {}", patient),
            Err(e) => println!("\nRegistration failed: {}", e),
        }
    }

    fn view_catalog(&self) {
        println!("\n--- Test Catalog ---");
        for test in self.engine.catalog.all_active() {
            println!("  {:12} {} min", test.name, test.duration_minutes);
        }
    }

    fn create_booking(&mut self) {
        println!("\n--- Create Booking ---");

        let patient = match self.pick_patient() {
            Some(p) => p,
            None => return,
        };
        let test = match self.pick_test() {
            Some(t) => t,
            None => return,
        };
        let hospital = self.get_input("Hospital name", Some("Central"));
        let tomorrow = Local::now().date_naive() + Duration::days(1);
        let date = self.get_date_input("Booking date", tomorrow);
        let time = self.get_time_input();

        let request = BookingRequest {
            patient_id: patient.id,
            test_id: test.id,
            hospital,
            date,
            time,
        };

        match self.engine.attempt_booking(&request) {
            Ok(booking) => {
                println!("\nBooking confirmed for {}", patient.name);
                println!("  {} at {}", test.name, booking);
            }
            Err(e) => println!("\nBooking rejected: {}", e),
        }
    }

    fn view_bookings(&self) {
        println!("\n--- View Bookings ---");

        if let Some(patient) = self.pick_patient() {
            let bookings = self.engine.bookings_for_patient(patient.id);
            if bookings.is_empty() {
                println!("\nNo bookings for {}", patient.name);
                return;
            }

            println!("\nBookings for {}:", patient.name);
            for booking in bookings {
                let test_name = self
                    .engine
                    .catalog
                    .get(booking.test_id)
                    .map(|t| t.name)
                    .unwrap_or_else(|| "unknown test".to_string());
                println!("  {} - {}", test_name, booking);
            }
        }
    }

    fn cancel_booking(&mut self) {
        println!("\n--- Cancel Booking ---");

        let patient = match self.pick_patient() {
            Some(p) => p,
            None => return,
        };
        let booking = match self.pick_booking(&patient, true) {
            Some(b) => b,
            None => return,
        };

        if !auth::can(&self.actor, Action::CancelBooking, &self.booking_resource(&booking)) {
            println!("\nNot permitted for your role");
            return;
        }

        match self.engine.cancel_booking(booking.id, "console") {
            Ok(_) => println!("\nBooking cancelled; the slot is free again"),
            Err(e) => println!("\nCancellation failed: {}", e),
        }
    }

    fn restore_booking(&mut self) {
        println!("\n--- Restore Booking ---");

        let patient = match self.pick_patient() {
            Some(p) => p,
            None => return,
        };
        let booking = match self.pick_booking(&patient, false) {
            Some(b) => b,
            None => return,
        };

        if !auth::can(&self.actor, Action::RestoreBooking, &self.booking_resource(&booking)) {
            println!("\nNot permitted for your role");
            return;
        }

        match self.engine.attempt_restore(booking.id) {
            Ok(restored) => println!("\nBooking restored: {}", restored),
            Err(e) => println!("\nRestore rejected: {}", e),
        }
    }

    fn browse_free_slots(&self) {
        println!("\n--- Free Slots ---");

        let hospital = self.get_input("Hospital name", Some("Central"));
        let tomorrow = Local::now().date_naive() + Duration::days(1);
        let date = self.get_date_input("Date", tomorrow);

        let free = self.engine.free_slots(&hospital, date);
        if free.is_empty() {
            println!("\nNo free slots at {} on {}", hospital, date);
            return;
        }

        println!("\nFree slots at {} on {}:", hospital, date);
        for time in free {
            println!("  {}", time.format("%H:%M"));
        }
    }

    fn hard_delete_booking(&mut self) {
        println!("\n--- Hard Delete Booking ---");

        let patient = match self.pick_patient() {
            Some(p) => p,
            None => return,
        };
        let booking = match self.pick_booking(&patient, false) {
            Some(b) => b,
            None => return,
        };

        if !auth::can(
            &self.actor,
            Action::HardDeleteBooking,
            &self.booking_resource(&booking),
        ) {
            println!("\nHard delete is admin-only");
            return;
        }

        let confirm = self.get_input("Permanently delete? (y/n)", Some("n"));
        if confirm.to_lowercase() != "y" {
            return;
        }

        match self.engine.hard_delete_booking(booking.id) {
            Ok(()) => println!("\nBooking permanently removed"),
            Err(e) => println!("\nHard delete failed: {}", e),
        }
    }

    fn run_demo(&mut self) {
        println!("\n--- Running Demo ---");

        let asha = match self
            .engine
            .patients
            .register("Asha".to_string(), 34, "0711111111".to_string(), None)
        {
            Ok(p) => p,
            Err(e) => {
                println!("Demo patient already present? {}", e);
                return;
            }
        };
        let yusuf = self
            .engine
            .patients
            .register("Yusuf".to_string(), 52, "0722222222".to_string(), None)
            .expect("demo contact is unique");

        let tests = self.engine.catalog.all_active();
        let blood = tests.iter().find(|t| t.name == "Blood Test").expect("seeded");
        let mri = tests.iter().find(|t| t.name == "MRI Scan").expect("seeded");

        let date = next_open_date(5);
        println!("Demo date: {} at Central hospital", date);

        let first = BookingRequest {
            patient_id: asha.id,
            test_id: blood.id,
            hospital: "Central".to_string(),
            date,
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        match self.engine.attempt_booking(&first) {
            Ok(b) => println!("  Asha / Blood Test 09:00 -> accepted ({})", b.status.name()),
            Err(e) => println!("  Asha / Blood Test 09:00 -> {}", e),
        }

        // the identical tuple again
        match self.engine.attempt_booking(&first) {
            Ok(_) => println!("  duplicate -> unexpectedly accepted"),
            Err(e) => println!("  duplicate -> rejected: {}", e),
        }

        // a 60-minute MRI at 10:00 ...
        let mri_request = BookingRequest {
            patient_id: yusuf.id,
            test_id: mri.id,
            hospital: "Central".to_string(),
            date,
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        };
        match self.engine.attempt_booking(&mri_request) {
            Ok(_) => println!("  Yusuf / MRI Scan 10:00 -> accepted"),
            Err(e) => println!("  Yusuf / MRI Scan 10:00 -> {}", e),
        }

        // ... blocks a 10:15 blood test even though the start times differ
        let clashing = BookingRequest {
            patient_id: asha.id,
            test_id: blood.id,
            hospital: "Central".to_string(),
            date,
            time: NaiveTime::from_hms_opt(10, 15, 0).unwrap(),
        };
        match self.engine.attempt_booking(&clashing) {
            Ok(_) => println!("  Asha / Blood Test 10:15 -> unexpectedly accepted"),
            Err(e) => println!("  Asha / Blood Test 10:15 -> rejected: {}", e),
        }

        let free = self.engine.free_slots("Central", date);
        println!("\n{} free 30-minute slots remain on {}", free.len(), date);
        println!("\nNote: the MRI occupies 10:00-11:00, so the 10:15 blood");
        println!("test was rejected even though no booking starts at 10:15.");
    }

    fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(9));

            match choice {
                1 => self.register_patient(),
                2 => self.view_catalog(),
                3 => self.create_booking(),
                4 => self.view_bookings(),
                5 => self.cancel_booking(),
                6 => self.restore_booking(),
                7 => self.browse_free_slots(),
                8 => self.hard_delete_booking(),
                9 => self.run_demo(),
                0 => {
                    self.running = false;
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

/// First weekday at least `days_out` days ahead, so demo bookings pass the
/// default weekend-closure policy.
fn next_open_date(days_out: i64) -> NaiveDate {
    let mut date = Local::now().date_naive() + Duration::days(days_out);
    while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        date = date + Duration::days(1);
    }
    date
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("medbook=info")),
        )
        .init();

    let mut console = BookingConsole::new(Role::Staff);
    let role = console.get_input("Start as (staff/admin)", Some("staff"));
    if role.eq_ignore_ascii_case("admin") {
        console.actor = Actor::new(console.actor.id, Role::Admin);
    }

    console.run();
}
