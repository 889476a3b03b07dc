mod handlers;
mod middleware;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::clock::{Clock, SystemClock};
use crate::db::Database;

pub use middleware::SecurityConfig;

/// Shared state for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub clock: Arc<dyn Clock>,
}

/// Router with the system clock and no authentication.
pub fn create_router(db: Database) -> Router {
    create_router_with(db, Arc::new(SystemClock), SecurityConfig::disabled())
}

pub fn create_router_with(db: Database, clock: Arc<dyn Clock>, security: SecurityConfig) -> Router {
    let protected = Router::new()
        // Conflict checks
        .route("/reservation/check-conflict", post(handlers::check_conflict))
        .route(
            "/reservation/check-recurring-conflicts",
            post(handlers::check_recurring_conflicts),
        )
        // Laboratories
        .route("/laboratories", get(handlers::list_laboratories))
        .route("/laboratories", post(handlers::create_laboratory))
        .route("/laboratories/{id}", get(handlers::get_laboratory))
        .route("/laboratories/{id}/calendar", get(handlers::get_calendar))
        .route("/laboratories/{id}/reservations", post(handlers::create_reservation))
        .route("/laboratories/{id}/schedules", get(handlers::list_schedules))
        .route("/laboratories/{id}/schedules", post(handlers::create_schedule))
        // Reservations
        .route("/reservations", get(handlers::list_reservations))
        .route("/reservations/{id}", get(handlers::get_reservation))
        .route("/reservations/{id}/approve", post(handlers::approve_reservation))
        .route("/reservations/{id}/reject", post(handlers::reject_reservation))
        .route("/reservations/{id}/cancel", post(handlers::cancel_reservation))
        // Class schedules
        .route(
            "/schedules/{id}",
            put(handlers::update_schedule).delete(handlers::delete_schedule),
        )
        // Academic calendar
        .route("/academic-years", get(handlers::list_academic_years))
        .route("/academic-years", post(handlers::create_academic_year))
        .route("/academic-years/{id}", get(handlers::get_academic_year))
        .route("/academic-years/{id}/terms", post(handlers::create_academic_term))
        .route("/academic-terms/current", get(handlers::get_current_term))
        .route("/academic-terms/{id}/set-current", post(handlers::set_current_term))
        // Equipment requests
        .route("/equipment-requests", post(handlers::create_equipment_request))
        .route("/equipment-requests/overdue", get(handlers::list_overdue_equipment_requests))
        .route("/equipment-requests/{id}", get(handlers::get_equipment_request))
        .route("/equipment-requests/{id}/approve", post(handlers::approve_equipment_request))
        .route("/equipment-requests/{id}/reject", post(handlers::reject_equipment_request))
        .route("/equipment-requests/{id}/return", post(handlers::return_equipment))
        .route_layer(from_fn_with_state(security.clone(), middleware::auth_middleware));

    let api = protected.route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security.cors_layer()),
        )
        .with_state(AppState { db, clock })
}
