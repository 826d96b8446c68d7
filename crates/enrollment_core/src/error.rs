//! crates/enrollment_core/src/error.rs
//!
//! Domain errors surfaced by the core services. Each variant has a stable code so
//! callers can branch on the kind rather than on the message.

use crate::domain::Role;
use crate::ports::PortError;
use uuid::Uuid;
use validator::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("User {user_id} does not have the {expected} role")]
    InvalidRole { user_id: Uuid, expected: Role },

    #[error("Course {course_id} is full")]
    CourseFull { course_id: Uuid },

    #[error("Student {student_id} is already enrolled in course {course_id}")]
    AlreadyEnrolled { student_id: Uuid, course_id: Uuid },

    #[error("Course {course_id} still has {active} active enrollment(s)")]
    HasActiveEnrollments { course_id: Uuid, active: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An unexpected failure from the persistent store.
    #[error(transparent)]
    Store(#[from] PortError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_FAILED",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::InvalidRole { .. } => "INVALID_ROLE",
            CoreError::CourseFull { .. } => "COURSE_FULL",
            CoreError::AlreadyEnrolled { .. } => "ALREADY_ENROLLED",
            CoreError::HasActiveEnrollments { .. } => "HAS_ACTIVE_ENROLLMENTS",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::Store(_) => "INTERNAL_ERROR",
        }
    }

    /// Builds a mapper that turns a store `NotFound` into a typed domain `NotFound`
    /// and passes every other port error through as a storage failure.
    pub fn or_not_found(entity: &'static str, id: Uuid) -> impl FnOnce(PortError) -> CoreError {
        move |e| match e {
            PortError::NotFound(_) => CoreError::NotFound { entity, id },
            other => CoreError::Store(other),
        }
    }
}

impl From<ValidationErrors> for CoreError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{field} is invalid"),
                })
            })
            .collect();
        messages.sort();
        CoreError::Validation(messages.join("; "))
    }
}
