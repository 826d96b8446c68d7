pub mod auth;
pub mod courses;
pub mod enrollments;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod users;

pub use middleware::require_auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the API router. Everything except login, logout and the health check sits
/// behind the session middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(rest::health_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/courses",
            get(courses::list_courses_handler).post(courses::create_course_handler),
        )
        .route(
            "/courses/{id}",
            get(courses::get_course_handler)
                .put(courses::update_course_handler)
                .delete(courses::delete_course_handler),
        )
        .route(
            "/enrollments",
            get(enrollments::list_enrollments_handler).post(enrollments::enroll_handler),
        )
        .route(
            "/enrollments/{id}",
            get(enrollments::get_enrollment_handler)
                .put(enrollments::update_enrollment_handler)
                .delete(enrollments::delete_enrollment_handler),
        )
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_student_handler),
        )
        .route(
            "/users/{id}",
            get(users::get_user_handler).delete(users::delete_user_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
