//! crates/enrollment_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the concrete persistent store and password hashing scheme.

use crate::domain::{
    Course, CourseSummary, CourseUpdate, Enrollment, EnrollmentFilter, EnrollmentStatus,
    RosterEntry, Role, User, UserCredentials, UserEnrollment, UserSummary,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflicting write: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistent Store
//=========================================================================================

/// Fields needed to insert a user row.
#[derive(Debug, Clone)]
pub struct UserRecordInput<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub hashed_password: &'a str,
    pub role: Role,
}

/// Fields needed to insert a course row.
#[derive(Debug, Clone)]
pub struct CourseRecordInput<'a> {
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub teacher_id: Uuid,
    pub max_students: i32,
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(&self, input: UserRecordInput<'_>) -> PortResult<User>;

    async fn get_user(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>>;

    /// Ids with no matching user are skipped.
    async fn user_summaries(&self, user_ids: &[Uuid]) -> PortResult<Vec<UserSummary>>;

    /// Removes the user and, through the store's cascade, their enrollments.
    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Auth Methods ---
    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Course Management ---
    async fn create_course(&self, input: CourseRecordInput<'_>) -> PortResult<Course>;

    async fn get_course(&self, course_id: Uuid) -> PortResult<CourseSummary>;

    /// Newest course first.
    async fn list_courses(&self, teacher_id: Option<Uuid>) -> PortResult<Vec<CourseSummary>>;

    async fn update_course(&self, course_id: Uuid, update: &CourseUpdate) -> PortResult<Course>;

    // --- Enrollment Reads ---
    async fn get_enrollment(&self, enrollment_id: Uuid) -> PortResult<Enrollment>;

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> PortResult<Vec<Enrollment>>;

    /// ACTIVE enrollments of the given courses joined with their students, oldest seat first.
    async fn active_rosters(&self, course_ids: &[Uuid]) -> PortResult<Vec<RosterEntry>>;

    /// Every enrollment the student holds joined with its course, newest first.
    async fn user_enrollments(&self, student_id: Uuid) -> PortResult<Vec<UserEnrollment>>;

    /// Administrative removal. Does not take the course lock; it can only free a seat.
    async fn delete_enrollment(&self, enrollment_id: Uuid) -> PortResult<()>;

    // --- Course Critical Section ---

    /// Opens the critical section for one course. Returns `NotFound` if the course
    /// does not exist once the lock is held. Every write that can raise the course's
    /// active count, or delete the course, must go through the returned handle.
    async fn lock_course(&self, course_id: Uuid) -> PortResult<Box<dyn CourseTransaction>>;
}

/// Exclusive access to a single course's enrollments.
///
/// Reads observe the latest committed state plus this handle's own writes. Dropping the
/// handle without calling [`CourseTransaction::commit`] discards every write.
#[async_trait]
pub trait CourseTransaction: Send {
    /// The course as read when the lock was taken.
    fn course(&self) -> &Course;

    async fn count_active(&mut self) -> PortResult<i64>;

    async fn find_enrollment(&mut self, student_id: Uuid) -> PortResult<Option<Enrollment>>;

    /// Looks up an enrollment by id, restricted to this course.
    async fn get_enrollment(&mut self, enrollment_id: Uuid) -> PortResult<Option<Enrollment>>;

    /// Inserts a new ACTIVE row. Fails with `Conflict` if the pair already has a row.
    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> PortResult<Enrollment>;

    /// Sets the status of an existing row, optionally refreshing `enrolled_at`.
    async fn set_status(
        &mut self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
        enrolled_at: Option<DateTime<Utc>>,
    ) -> PortResult<Enrollment>;

    /// Deletes the course together with its remaining (non-active) enrollments.
    async fn delete_course(&mut self) -> PortResult<()>;

    async fn commit(self: Box<Self>) -> PortResult<()>;
}

//=========================================================================================
// Identity
//=========================================================================================

pub trait PasswordHasher: Send + Sync {
    /// Produces a self-describing hash string suitable for storage.
    fn hash_password(&self, password: &str) -> PortResult<String>;

    fn verify_password(&self, password: &str, hashed: &str) -> PortResult<bool>;
}
