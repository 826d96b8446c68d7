//! crates/enrollment_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Capacity given to a course when the creator does not pick one.
pub const DEFAULT_MAX_STUDENTS: i32 = 50;

//=========================================================================================
// Roles and the authenticated principal
//=========================================================================================

/// The role a user holds. Fixed when the user is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STUDENT" => Ok(Role::Student),
            "TEACHER" => Ok(Role::Teacher),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The authenticated caller of a core operation, as yielded by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn student(id: Uuid) -> Self {
        Self { id, role: Role::Student }
    }

    pub fn teacher(id: Uuid) -> Self {
        Self { id, role: Role::Teacher }
    }
}

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// The public face of a user when embedded in another record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Input for a teacher registering a new student account.
#[derive(Debug, Clone, Validate)]
pub struct NewStudent {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

//=========================================================================================
// Courses
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub max_students: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A course together with its live count of active enrollments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseSummary {
    pub course: Course,
    pub active_count: i64,
}

impl CourseSummary {
    pub fn seats_left(&self) -> i64 {
        (i64::from(self.course.max_students) - self.active_count).max(0)
    }
}

/// One occupied seat: an ACTIVE enrollment and the student holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub enrollment_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub student: UserSummary,
}

/// A course as shown to a caller. `roster` is only filled in for teachers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDetail {
    pub summary: CourseSummary,
    pub teacher: UserSummary,
    pub roster: Option<Vec<RosterEntry>>,
}

#[derive(Debug, Clone, Validate)]
pub struct NewCourse {
    #[validate(length(min = 1, message = "Course title is required"))]
    pub title: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    #[validate(range(min = 1, message = "Max students must be at least 1"))]
    pub max_students: i32,
}

impl NewCourse {
    pub fn new(title: impl Into<String>, teacher_id: Uuid) -> Self {
        Self {
            title: title.into(),
            description: None,
            teacher_id,
            max_students: DEFAULT_MAX_STUDENTS,
        }
    }
}

/// A partial update to a course. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Validate)]
pub struct CourseUpdate {
    #[validate(length(min = 1, message = "Course title is required"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Max students must be at least 1"))]
    pub max_students: Option<i32>,
}

//=========================================================================================
// Enrollments
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnrollmentStatus {
    Active,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "ACTIVE",
            EnrollmentStatus::Dropped => "DROPPED",
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(EnrollmentStatus::Active),
            "DROPPED" => Ok(EnrollmentStatus::Dropped),
            other => Err(format!("unknown enrollment status '{other}'")),
        }
    }
}

/// A student's membership in a course. One row per (student, course) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: EnrollmentStatus,
    /// Refreshed every time the row becomes ACTIVE.
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }
}

/// Structured filter for listing enrollments. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub student_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    pub status: Option<EnrollmentStatus>,
    pub newest_first: bool,
}

impl EnrollmentFilter {
    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.student_id.map_or(true, |id| enrollment.student_id == id)
            && self.course_id.map_or(true, |id| enrollment.course_id == id)
            && self.status.map_or(true, |s| enrollment.status == s)
    }
}

/// The course side of one of a user's enrollments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRef {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEnrollment {
    pub enrollment: Enrollment,
    pub course: CourseRef,
}

/// A user with every enrollment they hold, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDetail {
    pub user: User,
    pub enrollments: Vec<UserEnrollment>,
    pub courses_taught: i64,
}
