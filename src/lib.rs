//! Computer laboratory reservations with booking conflict detection.
//!
//! The [`conflict`] module holds the core check; [`db`] stores reservations,
//! class schedules and equipment requests in SQLite; [`api`] exposes both
//! over HTTP.

pub mod api;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod db;
pub mod error;
pub mod models;

pub use error::ReservationError;
