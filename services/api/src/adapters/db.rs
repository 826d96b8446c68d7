//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! The course critical section is a transaction that opens with
//! `SELECT ... FOR UPDATE` on the course row. Every admission for that course queues
//! behind it, so the active count read inside the transaction cannot go stale before
//! the insert/update commits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollment_core::domain::{
    Course, CourseRef, CourseSummary, CourseUpdate, Enrollment, EnrollmentFilter,
    EnrollmentStatus, RosterEntry, Role, User, UserCredentials, UserEnrollment, UserSummary,
};
use enrollment_core::ports::{
    CourseRecordInput, CourseTransaction, DatabaseService, PortError, PortResult,
    UserRecordInput,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const USER_COLUMNS: &str = "id, name, email, role, created_at";
const COURSE_COLUMNS: &str =
    "id, title, description, teacher_id, max_students, created_at, updated_at";
const COURSE_SUMMARY_COLUMNS: &str = "c.id, c.title, c.description, c.teacher_id, \
     c.max_students, c.created_at, c.updated_at, \
     (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id AND e.status = 'ACTIVE') \
     AS active_count";
const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, status, enrolled_at";

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> PortResult<User> {
        Ok(User {
            id: self.id,
            name: self.name,
            email: self.email,
            role: parse_role(&self.role)?,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    hashed_password: String,
    role: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> PortResult<UserCredentials> {
        Ok(UserCredentials {
            user_id: self.id,
            email: self.email,
            hashed_password: self.hashed_password,
            role: parse_role(&self.role)?,
        })
    }
}

#[derive(FromRow)]
struct CourseRecord {
    id: Uuid,
    title: String,
    description: Option<String>,
    teacher_id: Uuid,
    max_students: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl CourseRecord {
    fn to_domain(self) -> Course {
        Course {
            id: self.id,
            title: self.title,
            description: self.description,
            teacher_id: self.teacher_id,
            max_students: self.max_students,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CourseSummaryRecord {
    #[sqlx(flatten)]
    course: CourseRecord,
    active_count: i64,
}
impl CourseSummaryRecord {
    fn to_domain(self) -> CourseSummary {
        CourseSummary {
            course: self.course.to_domain(),
            active_count: self.active_count,
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRecord {
    id: Uuid,
    student_id: Uuid,
    course_id: Uuid,
    status: String,
    enrolled_at: DateTime<Utc>,
}
impl EnrollmentRecord {
    fn to_domain(self) -> PortResult<Enrollment> {
        Ok(Enrollment {
            id: self.id,
            student_id: self.student_id,
            course_id: self.course_id,
            status: self
                .status
                .parse::<EnrollmentStatus>()
                .map_err(PortError::Unexpected)?,
            enrolled_at: self.enrolled_at,
        })
    }
}

#[derive(FromRow)]
struct UserSummaryRecord {
    id: Uuid,
    name: String,
    email: String,
}
impl UserSummaryRecord {
    fn to_domain(self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct RosterRecord {
    enrollment_id: Uuid,
    course_id: Uuid,
    enrolled_at: DateTime<Utc>,
    student_id: Uuid,
    student_name: String,
    student_email: String,
}
impl RosterRecord {
    fn to_domain(self) -> RosterEntry {
        RosterEntry {
            enrollment_id: self.enrollment_id,
            course_id: self.course_id,
            enrolled_at: self.enrolled_at,
            student: UserSummary {
                id: self.student_id,
                name: self.student_name,
                email: self.student_email,
            },
        }
    }
}

#[derive(FromRow)]
struct UserEnrollmentRecord {
    #[sqlx(flatten)]
    enrollment: EnrollmentRecord,
    course_title: String,
    course_description: Option<String>,
}
impl UserEnrollmentRecord {
    fn to_domain(self) -> PortResult<UserEnrollment> {
        let enrollment = self.enrollment.to_domain()?;
        Ok(UserEnrollment {
            course: CourseRef {
                id: enrollment.course_id,
                title: self.course_title,
                description: self.course_description,
            },
            enrollment,
        })
    }
}

fn parse_role(raw: &str) -> PortResult<Role> {
    raw.parse::<Role>().map_err(PortError::Unexpected)
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn has_sqlstate(e: &sqlx::Error, code: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(code))
}

/// PostgreSQL unique constraint violation: error code 23505.
fn is_unique_violation(e: &sqlx::Error) -> bool {
    has_sqlstate(e, "23505")
}

/// PostgreSQL foreign key violation: error code 23503.
fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    has_sqlstate(e, "23503")
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, input: UserRecordInput<'_>) -> PortResult<User> {
        let query = format!(
            "INSERT INTO users (id, name, email, hashed_password, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(input.name)
            .bind(input.email)
            .bind(input.hashed_password)
            .bind(input.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PortError::Conflict(format!("email {} already registered", input.email))
                } else {
                    unexpected(e)
                }
            })?;
        record.to_domain()
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?
            .to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, hashed_password, role FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?
        .to_domain()
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR role = $1) \
             ORDER BY created_at DESC"
        );
        let records = sqlx::query_as::<_, UserRecord>(&query)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn user_summaries(&self, user_ids: &[Uuid]) -> PortResult<Vec<UserSummary>> {
        let records = sqlx::query_as::<_, UserSummaryRecord>(
            "SELECT id, name, email FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_course(&self, input: CourseRecordInput<'_>) -> PortResult<Course> {
        let query = format!(
            "INSERT INTO courses (id, title, description, teacher_id, max_students) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {COURSE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, CourseRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(input.title)
            .bind(input.description)
            .bind(input.teacher_id)
            .bind(input.max_students)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<CourseSummary> {
        let query = format!("SELECT {COURSE_SUMMARY_COLUMNS} FROM courses c WHERE c.id = $1");
        let record = sqlx::query_as::<_, CourseSummaryRecord>(&query)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))?;
        Ok(record.to_domain())
    }

    async fn list_courses(&self, teacher_id: Option<Uuid>) -> PortResult<Vec<CourseSummary>> {
        let query = format!(
            "SELECT {COURSE_SUMMARY_COLUMNS} FROM courses c \
             WHERE ($1::uuid IS NULL OR c.teacher_id = $1) \
             ORDER BY c.created_at DESC"
        );
        let records = sqlx::query_as::<_, CourseSummaryRecord>(&query)
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_course(&self, course_id: Uuid, update: &CourseUpdate) -> PortResult<Course> {
        let query = format!(
            "UPDATE courses SET \
                 title = COALESCE($2, title), \
                 description = COALESCE($3, description), \
                 max_students = COALESCE($4, max_students), \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {COURSE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, CourseRecord>(&query)
            .bind(course_id)
            .bind(update.title.as_deref())
            .bind(update.description.as_deref())
            .bind(update.max_students)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))?;
        Ok(record.to_domain())
    }

    async fn get_enrollment(&self, enrollment_id: Uuid) -> PortResult<Enrollment> {
        let query = format!("SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1");
        sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(enrollment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))?
            .to_domain()
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> PortResult<Vec<Enrollment>> {
        let query = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments \
             WHERE ($1::uuid IS NULL OR student_id = $1) \
               AND ($2::uuid IS NULL OR course_id = $2) \
               AND ($3::text IS NULL OR status = $3) \
             ORDER BY CASE WHEN $4 THEN enrolled_at END DESC"
        );
        let records = sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(filter.student_id)
            .bind(filter.course_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.newest_first)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn active_rosters(&self, course_ids: &[Uuid]) -> PortResult<Vec<RosterEntry>> {
        let records = sqlx::query_as::<_, RosterRecord>(
            "SELECT e.id AS enrollment_id, e.course_id, e.enrolled_at, \
                    u.id AS student_id, u.name AS student_name, u.email AS student_email \
             FROM enrollments e JOIN users u ON u.id = e.student_id \
             WHERE e.course_id = ANY($1) AND e.status = 'ACTIVE' \
             ORDER BY e.enrolled_at ASC",
        )
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn user_enrollments(&self, student_id: Uuid) -> PortResult<Vec<UserEnrollment>> {
        let records = sqlx::query_as::<_, UserEnrollmentRecord>(
            "SELECT e.id, e.student_id, e.course_id, e.status, e.enrolled_at, \
                    c.title AS course_title, c.description AS course_description \
             FROM enrollments e JOIN courses c ON c.id = e.course_id \
             WHERE e.student_id = $1 \
             ORDER BY e.enrolled_at DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn delete_enrollment(&self, enrollment_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM enrollments WHERE id = $1")
            .bind(enrollment_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Enrollment {} not found",
                enrollment_id
            )));
        }
        Ok(())
    }

    async fn lock_course(&self, course_id: Uuid) -> PortResult<Box<dyn CourseTransaction>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let query = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1 FOR UPDATE");
        let course = sqlx::query_as::<_, CourseRecord>(&query)
            .bind(course_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))?
            .to_domain();
        Ok(Box::new(PgCourseTransaction { tx, course }))
    }
}

//=========================================================================================
// Course Critical Section
//=========================================================================================

/// Holds the row lock on one course until committed or dropped (rolled back).
struct PgCourseTransaction {
    tx: Transaction<'static, Postgres>,
    course: Course,
}

#[async_trait]
impl CourseTransaction for PgCourseTransaction {
    fn course(&self) -> &Course {
        &self.course
    }

    async fn count_active(&mut self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM enrollments WHERE course_id = $1 AND status = 'ACTIVE'",
        )
        .bind(self.course.id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)
    }

    async fn find_enrollment(&mut self, student_id: Uuid) -> PortResult<Option<Enrollment>> {
        let query = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE course_id = $1 AND student_id = $2"
        );
        sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(self.course.id)
            .bind(student_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(unexpected)?
            .map(|r| r.to_domain())
            .transpose()
    }

    async fn get_enrollment(&mut self, enrollment_id: Uuid) -> PortResult<Option<Enrollment>> {
        let query = format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM enrollments WHERE id = $1 AND course_id = $2"
        );
        sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(enrollment_id)
            .bind(self.course.id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(unexpected)?
            .map(|r| r.to_domain())
            .transpose()
    }

    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> PortResult<Enrollment> {
        let query = format!(
            "INSERT INTO enrollments (id, student_id, course_id, status, enrolled_at) \
             VALUES ($1, $2, $3, 'ACTIVE', $4) RETURNING {ENROLLMENT_COLUMNS}"
        );
        let course_id = self.course.id;
        sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(course_id)
            .bind(enrolled_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    PortError::Conflict(format!(
                        "student {} already has an enrollment in course {}",
                        student_id, course_id
                    ))
                } else if is_foreign_key_violation(&e) {
                    // The student row went away after the caller looked it up.
                    PortError::NotFound(format!("User {} not found", student_id))
                } else {
                    unexpected(e)
                }
            })?
            .to_domain()
    }

    async fn set_status(
        &mut self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
        enrolled_at: Option<DateTime<Utc>>,
    ) -> PortResult<Enrollment> {
        let query = format!(
            "UPDATE enrollments SET status = $3, enrolled_at = COALESCE($4, enrolled_at) \
             WHERE id = $1 AND course_id = $2 RETURNING {ENROLLMENT_COLUMNS}"
        );
        sqlx::query_as::<_, EnrollmentRecord>(&query)
            .bind(enrollment_id)
            .bind(self.course.id)
            .bind(status.as_str())
            .bind(enrolled_at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))?
            .to_domain()
    }

    async fn delete_course(&mut self) -> PortResult<()> {
        // Remaining (dropped) enrollments go with it through ON DELETE CASCADE.
        sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(self.course.id)
            .execute(&mut *self.tx)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let this = *self;
        this.tx.commit().await.map_err(unexpected)
    }
}
