//! Role-based authorization, kept outside the conflict engine.
//!
//! One uniform capability check replaces scattered per-operation role
//! gating: callers ask `can(actor, action, resource)` before invoking the
//! engine, and the engine itself operates purely on validated domain
//! inputs.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Staff,
    Patient,
}

/// Who is acting. For patients, `id` is the account linked to their patient
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Actor { id, role }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateBooking,
    ViewBooking,
    CancelBooking,
    RestoreBooking,
    HardDeleteBooking,
    RegisterPatient,
    BrowseSlots,
}

/// What is being acted on. `owner_account` is the account linked to the
/// patient the booking belongs to, when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Booking { owner_account: Option<Uuid> },
    Directory,
}

/// Capability check. Admins can do everything; staff everything except hard
/// delete; patients only act on bookings owned by their own account.
pub fn can(actor: &Actor, action: Action, resource: &Resource) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Staff => !matches!(action, Action::HardDeleteBooking),
        Role::Patient => match (action, resource) {
            (
                Action::CreateBooking
                | Action::ViewBooking
                | Action::CancelBooking
                | Action::RestoreBooking,
                Resource::Booking { owner_account },
            ) => *owner_account == Some(actor.id),
            (Action::BrowseSlots, _) => true,
            _ => false,
        },
    }
}
