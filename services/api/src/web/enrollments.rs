//! services/api/src/web/enrollments.rs
//!
//! Enrollment endpoints. Every state change goes through the `EnrollmentManager`,
//! which serializes admissions per course.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use enrollment_core::{Enrollment, EnrollmentFilter, EnrollmentStatus, Principal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct EnrollRequest {
    /// Defaults to the authenticated student.
    pub student_id: Option<Uuid>,
    pub course_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateEnrollmentRequest {
    #[schema(value_type = String, example = "DROPPED")]
    pub status: EnrollmentStatus,
}

#[derive(Deserialize, IntoParams)]
pub struct EnrollmentQuery {
    pub student_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// `ACTIVE` or `DROPPED`.
    #[param(value_type = Option<String>)]
    pub status: Option<EnrollmentStatus>,
    /// Order by `enrolled_at`, newest first. Defaults to true.
    #[serde(default = "default_newest_first")]
    pub newest_first: bool,
}

fn default_newest_first() -> bool {
    true
}

impl From<EnrollmentQuery> for EnrollmentFilter {
    fn from(q: EnrollmentQuery) -> Self {
        EnrollmentFilter {
            student_id: q.student_id,
            course_id: q.course_id,
            status: q.status,
            newest_first: q.newest_first,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    #[schema(value_type = String, example = "ACTIVE")]
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
}

impl From<Enrollment> for EnrollmentResponse {
    fn from(e: Enrollment) -> Self {
        Self {
            id: e.id,
            student_id: e.student_id,
            course_id: e.course_id,
            status: e.status,
            enrolled_at: e.enrolled_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /enrollments - List enrollments matching a filter
#[utoipa::path(
    get,
    path = "/enrollments",
    params(EnrollmentQuery),
    responses(
        (status = 200, description = "Matching enrollments", body = [EnrollmentResponse]),
        (status = 403, description = "Students may only list their own enrollments")
    )
)]
pub async fn list_enrollments_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<EnrollmentQuery>,
) -> ApiResult<Json<Vec<EnrollmentResponse>>> {
    let enrollments = state
        .enrollments
        .list_enrollments(&principal, query.into())
        .await?;
    Ok(Json(enrollments.into_iter().map(Into::into).collect()))
}

/// POST /enrollments - Enroll a student in a course
#[utoipa::path(
    post,
    path = "/enrollments",
    request_body = EnrollRequest,
    responses(
        (status = 201, description = "Student enrolled", body = EnrollmentResponse),
        (status = 403, description = "Caller may not enroll this student here"),
        (status = 404, description = "Student or course not found"),
        (status = 409, description = "Course full or student already enrolled"),
        (status = 422, description = "Named user is not a STUDENT")
    )
)]
pub async fn enroll_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<EnrollRequest>,
) -> ApiResult<(StatusCode, Json<EnrollmentResponse>)> {
    let student_id = req.student_id.unwrap_or(principal.id);
    let enrollment = state
        .enrollments
        .enroll(&principal, student_id, req.course_id)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment.into())))
}

/// GET /enrollments/{id} - Fetch one enrollment
#[utoipa::path(
    get,
    path = "/enrollments/{id}",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    responses(
        (status = 200, description = "Enrollment found", body = EnrollmentResponse),
        (status = 403, description = "Not visible to the caller"),
        (status = 404, description = "Enrollment not found")
    )
)]
pub async fn get_enrollment_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnrollmentResponse>> {
    let enrollment = state.enrollments.get_enrollment(&principal, id).await?;
    Ok(Json(enrollment.into()))
}

/// PUT /enrollments/{id} - Drop or re-activate an enrollment
#[utoipa::path(
    put,
    path = "/enrollments/{id}",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    request_body = UpdateEnrollmentRequest,
    responses(
        (status = 200, description = "Enrollment updated", body = EnrollmentResponse),
        (status = 403, description = "Caller may not change this enrollment"),
        (status = 404, description = "Enrollment not found"),
        (status = 409, description = "Course full")
    )
)]
pub async fn update_enrollment_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateEnrollmentRequest>,
) -> ApiResult<Json<EnrollmentResponse>> {
    let enrollment = state
        .enrollments
        .update_status(&principal, id, req.status)
        .await?;
    Ok(Json(enrollment.into()))
}

/// DELETE /enrollments/{id} - Remove an enrollment record outright
#[utoipa::path(
    delete,
    path = "/enrollments/{id}",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    responses(
        (status = 204, description = "Enrollment deleted"),
        (status = 403, description = "Only the course's teacher may delete"),
        (status = 404, description = "Enrollment not found")
    )
)]
pub async fn delete_enrollment_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.enrollments.delete_enrollment(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
