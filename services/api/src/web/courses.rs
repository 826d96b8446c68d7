//! services/api/src/web/courses.rs
//!
//! Course catalogue endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use enrollment_core::{
    CourseDetail, CourseUpdate, NewCourse, Principal, RosterEntry, DEFAULT_MAX_STUDENTS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;
use crate::web::users::UserSummaryResponse;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: Option<String>,
    /// Defaults to the authenticated teacher.
    pub teacher_id: Option<Uuid>,
    /// Defaults to 50.
    pub max_students: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub max_students: Option<i32>,
}

#[derive(Deserialize, IntoParams)]
pub struct CourseQuery {
    /// Only courses taught by this teacher.
    pub teacher_id: Option<Uuid>,
}

#[derive(Serialize, ToSchema)]
pub struct RosterEntryResponse {
    pub enrollment_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub student: UserSummaryResponse,
}

impl From<RosterEntry> for RosterEntryResponse {
    fn from(entry: RosterEntry) -> Self {
        Self {
            enrollment_id: entry.enrollment_id,
            enrolled_at: entry.enrolled_at,
            student: entry.student.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub teacher: UserSummaryResponse,
    pub max_students: i32,
    pub active_count: i64,
    pub seats_left: i64,
    /// ACTIVE enrollments with their students, oldest first. Only sent to teachers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roster: Option<Vec<RosterEntryResponse>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CourseDetail> for CourseResponse {
    fn from(detail: CourseDetail) -> Self {
        let seats_left = detail.summary.seats_left();
        let course = detail.summary.course;
        Self {
            id: course.id,
            title: course.title,
            description: course.description,
            teacher_id: course.teacher_id,
            teacher: detail.teacher.into(),
            max_students: course.max_students,
            active_count: detail.summary.active_count,
            seats_left,
            roster: detail
                .roster
                .map(|r| r.into_iter().map(Into::into).collect()),
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /courses - List courses with their teacher, active counts and rosters
#[utoipa::path(
    get,
    path = "/courses",
    params(CourseQuery),
    responses(
        (status = 200, description = "Courses, newest first", body = [CourseResponse]),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CourseQuery>,
) -> ApiResult<Json<Vec<CourseResponse>>> {
    let courses = state
        .courses
        .list_course_details(&principal, query.teacher_id)
        .await?;
    Ok(Json(courses.into_iter().map(Into::into).collect()))
}

/// POST /courses - Create a course taught by the caller
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Caller may not create this course"),
        (status = 404, description = "Teacher not found or not a TEACHER")
    )
)]
pub async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateCourseRequest>,
) -> ApiResult<(StatusCode, Json<CourseResponse>)> {
    let input = NewCourse {
        title: req.title,
        description: req.description,
        teacher_id: req.teacher_id.unwrap_or(principal.id),
        max_students: req.max_students.unwrap_or(DEFAULT_MAX_STUDENTS),
    };
    let course = state.courses.create_course(&principal, input).await?;
    let detail = state.courses.course_detail(&principal, course.id).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

/// GET /courses/{id} - Course detail with seat availability and roster
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course found", body = CourseResponse),
        (status = 404, description = "Course not found")
    )
)]
pub async fn get_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CourseResponse>> {
    let detail = state.courses.course_detail(&principal, id).await?;
    Ok(Json(detail.into()))
}

/// PUT /courses/{id} - Update title, description or capacity
#[utoipa::path(
    put,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Course updated", body = CourseResponse),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn update_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCourseRequest>,
) -> ApiResult<Json<CourseResponse>> {
    let update = CourseUpdate {
        title: req.title,
        description: req.description,
        max_students: req.max_students,
    };
    state.courses.update_course(&principal, id, update).await?;
    let detail = state.courses.course_detail(&principal, id).await?;
    Ok(Json(detail.into()))
}

/// DELETE /courses/{id} - Delete a course with no active enrollments
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 403, description = "Caller does not own the course"),
        (status = 404, description = "Course not found"),
        (status = 409, description = "Course still has active enrollments")
    )
)]
pub async fn delete_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.courses.delete_course(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
