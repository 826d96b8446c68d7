//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification, plus the liveness check.

use axum::Json;
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::web::{auth, courses, enrollments, users};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        courses::list_courses_handler,
        courses::create_course_handler,
        courses::get_course_handler,
        courses::update_course_handler,
        courses::delete_course_handler,
        enrollments::list_enrollments_handler,
        enrollments::enroll_handler,
        enrollments::get_enrollment_handler,
        enrollments::update_enrollment_handler,
        enrollments::delete_enrollment_handler,
        users::list_users_handler,
        users::create_student_handler,
        users::get_user_handler,
        users::delete_user_handler,
    ),
    components(
        schemas(
            HealthResponse,
            auth::LoginRequest,
            auth::AuthResponse,
            courses::CreateCourseRequest,
            courses::UpdateCourseRequest,
            courses::CourseResponse,
            courses::RosterEntryResponse,
            enrollments::EnrollRequest,
            enrollments::UpdateEnrollmentRequest,
            enrollments::EnrollmentResponse,
            users::CreateStudentRequest,
            users::UserResponse,
            users::UserSummaryResponse,
            users::UserDetailResponse,
            users::UserEnrollmentResponse,
            users::EnrolledCourseResponse,
        )
    ),
    tags(
        (name = "Course Enrollment API", description = "Courses, students and capacity-limited enrollment.")
    )
)]
pub struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// GET /health - Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_covers_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/auth/login",
            "/auth/logout",
            "/auth/me",
            "/courses",
            "/courses/{id}",
            "/enrollments",
            "/enrollments/{id}",
            "/users",
            "/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let schemas = doc.components.expect("components").schemas;
        assert!(schemas.contains_key("RosterEntryResponse"));
        assert!(schemas.contains_key("UserDetailResponse"));
    }
}
