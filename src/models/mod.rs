//! Domain models for the laboratory reservation service.
//!
//! # Core Concepts
//!
//! ## Bookings
//!
//! - [`LaboratoryReservation`]: A request to use a laboratory on a date, optionally
//!   repeating daily, weekly or monthly until an end date.
//! - [`ClassSchedule`]: A weekly class that occupies a laboratory on one day of the week.
//! - [`BookingInterval`]: The concrete slot a reservation or schedule occupies on one date.
//!   Conflict detection works exclusively on these.
//! - [`CheckConflictRequest`] and [`CheckRecurringConflictsRequest`]: Conflict-check
//!   request and response bodies of the HTTP API.
//!
//! ## Academic calendar
//!
//! - [`AcademicYear`] and [`AcademicTerm`]: Terms bound the dates a linked
//!   [`ClassSchedule`] runs. At most one term is current.
//!
//! ## Borrowing
//!
//! - [`EquipmentRequest`]: A request to borrow equipment, with a derived "overdue" state.

mod academic;
mod check;
mod equipment;
mod interval;
mod laboratory;
mod reservation;
mod schedule;

pub use academic::*;
pub use check::*;
pub use equipment::*;
pub use interval::*;
pub use laboratory::*;
pub use reservation::*;
pub use schedule::*;
