//! services/api/src/web/users.rs
//!
//! Account management. Teachers create and remove student accounts; anyone may
//! read their own record.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use enrollment_core::{
    EnrollmentStatus, NewStudent, Principal, Role, User, UserDetail, UserEnrollment,
    UserSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::web::state::AppState;

#[derive(Deserialize, ToSchema)]
pub struct CreateStudentRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, IntoParams)]
pub struct UserQuery {
    /// `STUDENT` or `TEACHER`.
    #[param(value_type = Option<String>)]
    pub role: Option<Role>,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(value_type = String, example = "STUDENT")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// A user as embedded in other records.
#[derive(Serialize, ToSchema)]
pub struct UserSummaryResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<UserSummary> for UserSummaryResponse {
    fn from(user: UserSummary) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EnrolledCourseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct UserEnrollmentResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "ACTIVE")]
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub course: EnrolledCourseResponse,
}

impl From<UserEnrollment> for UserEnrollmentResponse {
    fn from(row: UserEnrollment) -> Self {
        Self {
            id: row.enrollment.id,
            status: row.enrollment.status,
            enrolled_at: row.enrollment.enrolled_at,
            course: EnrolledCourseResponse {
                id: row.course.id,
                title: row.course.title,
                description: row.course.description,
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserDetailResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(value_type = String, example = "STUDENT")]
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub enrollment_count: i64,
    pub courses_taught: i64,
    /// Every enrollment the user holds, newest first.
    pub enrollments: Vec<UserEnrollmentResponse>,
}

impl From<UserDetail> for UserDetailResponse {
    fn from(detail: UserDetail) -> Self {
        let user = detail.user;
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
            enrollment_count: detail.enrollments.len() as i64,
            courses_taught: detail.courses_taught,
            enrollments: detail.enrollments.into_iter().map(Into::into).collect(),
        }
    }
}

/// GET /users - List accounts, optionally by role
#[utoipa::path(
    get,
    path = "/users",
    params(UserQuery),
    responses(
        (status = 200, description = "Accounts, newest first", body = [UserResponse]),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.users.list_users(&principal, query.role).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// POST /users - Create a student account
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = UserResponse),
        (status = 400, description = "Validation failed or email in use"),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn create_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateStudentRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let input = NewStudent {
        name: req.name,
        email: req.email,
        password: req.password,
    };
    let user = state.users.create_student(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /users/{id} - Fetch an account with its enrollments
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = UserDetailResponse),
        (status = 403, description = "Students may only read themselves"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<UserDetailResponse>> {
    let detail = state.users.get_user_detail(&principal, id).await?;
    Ok(Json(detail.into()))
}

/// DELETE /users/{id} - Delete a student account and its enrollments
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Teachers only; teacher accounts cannot be deleted"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.users.delete_user(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
