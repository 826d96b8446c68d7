//! crates/enrollment_core/src/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port. Used by the test
//! suites and for running the service without PostgreSQL.
//!
//! Course critical sections are a per-course `tokio::sync::Mutex` whose owned guard
//! lives inside the transaction handle. Writes made through a handle are staged and
//! only become visible on commit.

use crate::domain::{
    AuthSession, Course, CourseRef, CourseSummary, CourseUpdate, Enrollment, EnrollmentFilter,
    EnrollmentStatus, RosterEntry, Role, User, UserCredentials, UserEnrollment, UserSummary,
};
use crate::ports::{
    CourseRecordInput, CourseTransaction, DatabaseService, PortError, PortResult,
    UserRecordInput,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    hashed_password: String,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, StoredUser>,
    auth_sessions: HashMap<String, AuthSession>,
    courses: HashMap<Uuid, Course>,
    enrollments: HashMap<Uuid, Enrollment>,
}

impl Tables {
    fn active_count(&self, course_id: Uuid) -> i64 {
        self.enrollments
            .values()
            .filter(|e| e.course_id == course_id && e.is_active())
            .count() as i64
    }

    fn summary(&self, course: &Course) -> CourseSummary {
        CourseSummary {
            course: course.clone(),
            active_count: self.active_count(course.id),
        }
    }
}

type CourseLocks = Mutex<HashMap<Uuid, Arc<Mutex<()>>>>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    course_locks: Arc<CourseLocks>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn create_user(&self, input: UserRecordInput<'_>) -> PortResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.user.email == input.email) {
            return Err(PortError::Conflict(format!(
                "email {} already registered",
                input.email
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            name: input.name.to_string(),
            email: input.email.to_string(),
            role: input.role,
            created_at: Utc::now(),
        };
        tables.users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                hashed_password: input.hashed_password.to_string(),
            },
        );
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        self.tables
            .read()
            .await
            .users
            .get(&user_id)
            .map(|u| u.user.clone())
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables
            .read()
            .await
            .users
            .values()
            .find(|u| u.user.email == email)
            .map(|u| UserCredentials {
                user_id: u.user.id,
                email: u.user.email.clone(),
                hashed_password: u.hashed_password.clone(),
                role: u.user.role,
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn list_users(&self, role: Option<Role>) -> PortResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.user.role == r))
            .map(|u| u.user.clone())
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn user_summaries(&self, user_ids: &[Uuid]) -> PortResult<Vec<UserSummary>> {
        let tables = self.tables.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .map(|u| UserSummary::from(&u.user))
            .collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        tables.enrollments.retain(|_, e| e.student_id != user_id);
        tables.auth_sessions.retain(|_, s| s.user_id != user_id);
        Ok(())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        self.tables.write().await.auth_sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let mut tables = self.tables.write().await;
        match tables.auth_sessions.get(session_id) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            Some(_) => {
                tables.auth_sessions.remove(session_id);
                Err(PortError::Unauthorized)
            }
            None => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        self.tables.write().await.auth_sessions.remove(session_id);
        Ok(())
    }

    async fn create_course(&self, input: CourseRecordInput<'_>) -> PortResult<Course> {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: input.title.to_string(),
            description: input.description.map(str::to_string),
            teacher_id: input.teacher_id,
            max_students: input.max_students,
            created_at: now,
            updated_at: now,
        };
        self.tables
            .write()
            .await
            .courses
            .insert(course.id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, course_id: Uuid) -> PortResult<CourseSummary> {
        let tables = self.tables.read().await;
        tables
            .courses
            .get(&course_id)
            .map(|c| tables.summary(c))
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))
    }

    async fn list_courses(&self, teacher_id: Option<Uuid>) -> PortResult<Vec<CourseSummary>> {
        let tables = self.tables.read().await;
        let mut courses: Vec<CourseSummary> = tables
            .courses
            .values()
            .filter(|c| teacher_id.map_or(true, |t| c.teacher_id == t))
            .map(|c| tables.summary(c))
            .collect();
        courses.sort_by(|a, b| b.course.created_at.cmp(&a.course.created_at));
        Ok(courses)
    }

    async fn update_course(&self, course_id: Uuid, update: &CourseUpdate) -> PortResult<Course> {
        let mut tables = self.tables.write().await;
        let course = tables
            .courses
            .get_mut(&course_id)
            .ok_or_else(|| PortError::NotFound(format!("Course {} not found", course_id)))?;
        if let Some(title) = &update.title {
            course.title = title.clone();
        }
        if let Some(description) = &update.description {
            course.description = Some(description.clone());
        }
        if let Some(max_students) = update.max_students {
            course.max_students = max_students;
        }
        course.updated_at = Utc::now();
        Ok(course.clone())
    }

    async fn get_enrollment(&self, enrollment_id: Uuid) -> PortResult<Enrollment> {
        self.tables
            .read()
            .await
            .enrollments
            .get(&enrollment_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))
    }

    async fn list_enrollments(&self, filter: &EnrollmentFilter) -> PortResult<Vec<Enrollment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        if filter.newest_first {
            rows.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        }
        Ok(rows)
    }

    async fn active_rosters(&self, course_ids: &[Uuid]) -> PortResult<Vec<RosterEntry>> {
        let tables = self.tables.read().await;
        let mut roster: Vec<RosterEntry> = tables
            .enrollments
            .values()
            .filter(|e| e.is_active() && course_ids.contains(&e.course_id))
            .filter_map(|e| {
                let student = tables.users.get(&e.student_id)?;
                Some(RosterEntry {
                    enrollment_id: e.id,
                    course_id: e.course_id,
                    enrolled_at: e.enrolled_at,
                    student: UserSummary::from(&student.user),
                })
            })
            .collect();
        roster.sort_by(|a, b| a.enrolled_at.cmp(&b.enrolled_at));
        Ok(roster)
    }

    async fn user_enrollments(&self, student_id: Uuid) -> PortResult<Vec<UserEnrollment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<UserEnrollment> = tables
            .enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .filter_map(|e| {
                let course = tables.courses.get(&e.course_id)?;
                Some(UserEnrollment {
                    enrollment: e.clone(),
                    course: CourseRef {
                        id: course.id,
                        title: course.title.clone(),
                        description: course.description.clone(),
                    },
                })
            })
            .collect();
        rows.sort_by(|a, b| b.enrollment.enrolled_at.cmp(&a.enrollment.enrolled_at));
        Ok(rows)
    }

    async fn delete_enrollment(&self, enrollment_id: Uuid) -> PortResult<()> {
        self.tables
            .write()
            .await
            .enrollments
            .remove(&enrollment_id)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Enrollment {} not found", enrollment_id)))
    }

    async fn lock_course(&self, course_id: Uuid) -> PortResult<Box<dyn CourseTransaction>> {
        let not_found = || PortError::NotFound(format!("Course {} not found", course_id));
        if !self.tables.read().await.courses.contains_key(&course_id) {
            return Err(not_found());
        }

        let lock = {
            let mut locks = self.course_locks.lock().await;
            locks.entry(course_id).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;

        // Re-read under the lock: a previous holder may have deleted the course.
        let course = self.tables.read().await.courses.get(&course_id).cloned();
        let Some(course) = course else {
            let mut locks = self.course_locks.lock().await;
            if locks.get(&course_id).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
                locks.remove(&course_id);
            }
            return Err(not_found());
        };

        Ok(Box::new(MemoryCourseTransaction {
            tables: self.tables.clone(),
            course_locks: self.course_locks.clone(),
            course,
            staged: HashMap::new(),
            inserted: HashSet::new(),
            delete_course: false,
            _guard: guard,
        }))
    }
}

//=========================================================================================
// Course Critical Section
//=========================================================================================

struct MemoryCourseTransaction {
    tables: Arc<RwLock<Tables>>,
    course_locks: Arc<CourseLocks>,
    course: Course,
    staged: HashMap<Uuid, Enrollment>,
    inserted: HashSet<Uuid>,
    delete_course: bool,
    _guard: OwnedMutexGuard<()>,
}

impl MemoryCourseTransaction {
    /// Committed rows for this course overlaid with this handle's staged writes.
    async fn rows(&self) -> Vec<Enrollment> {
        let tables = self.tables.read().await;
        tables
            .enrollments
            .values()
            .filter(|e| e.course_id == self.course.id && !self.staged.contains_key(&e.id))
            .cloned()
            .chain(self.staged.values().cloned())
            .collect()
    }
}

#[async_trait]
impl CourseTransaction for MemoryCourseTransaction {
    fn course(&self) -> &Course {
        &self.course
    }

    async fn count_active(&mut self) -> PortResult<i64> {
        Ok(self.rows().await.iter().filter(|e| e.is_active()).count() as i64)
    }

    async fn find_enrollment(&mut self, student_id: Uuid) -> PortResult<Option<Enrollment>> {
        Ok(self
            .rows()
            .await
            .into_iter()
            .find(|e| e.student_id == student_id))
    }

    async fn get_enrollment(&mut self, enrollment_id: Uuid) -> PortResult<Option<Enrollment>> {
        Ok(self.rows().await.into_iter().find(|e| e.id == enrollment_id))
    }

    async fn insert_enrollment(
        &mut self,
        student_id: Uuid,
        enrolled_at: DateTime<Utc>,
    ) -> PortResult<Enrollment> {
        if self.find_enrollment(student_id).await?.is_some() {
            return Err(PortError::Conflict(format!(
                "student {} already has an enrollment in course {}",
                student_id, self.course.id
            )));
        }
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            student_id,
            course_id: self.course.id,
            status: EnrollmentStatus::Active,
            enrolled_at,
        };
        self.inserted.insert(enrollment.id);
        self.staged.insert(enrollment.id, enrollment.clone());
        Ok(enrollment)
    }

    async fn set_status(
        &mut self,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
        enrolled_at: Option<DateTime<Utc>>,
    ) -> PortResult<Enrollment> {
        let mut enrollment = self.get_enrollment(enrollment_id).await?.ok_or_else(|| {
            PortError::NotFound(format!("Enrollment {} not found", enrollment_id))
        })?;
        enrollment.status = status;
        if let Some(at) = enrolled_at {
            enrollment.enrolled_at = at;
        }
        self.staged.insert(enrollment_id, enrollment.clone());
        Ok(enrollment)
    }

    async fn delete_course(&mut self) -> PortResult<()> {
        self.delete_course = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let this = *self;
        let mut tables = this.tables.write().await;
        let course_id = this.course.id;
        if this.delete_course {
            tables.courses.remove(&course_id);
            tables.enrollments.retain(|_, e| e.course_id != course_id);
            drop(tables);
            // Waiters still hold their own handle to the mutex and will find the
            // course gone once they acquire it.
            this.course_locks.lock().await.remove(&course_id);
            return Ok(());
        }
        // Neither users nor enrollment rows are guarded by the course lock, so check
        // that everything this handle touched is still there before applying any of it.
        for (id, enrollment) in &this.staged {
            if this.inserted.contains(id) {
                if !tables.users.contains_key(&enrollment.student_id) {
                    return Err(PortError::NotFound(format!(
                        "User {} not found",
                        enrollment.student_id
                    )));
                }
            } else if !tables.enrollments.contains_key(id) {
                return Err(PortError::NotFound(format!("Enrollment {} not found", id)));
            }
        }
        tables.enrollments.extend(this.staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    async fn seeded() -> (MemoryStore, Course, User) {
        let store = MemoryStore::new();
        let teacher = store
            .create_user(UserRecordInput {
                name: "Teacher",
                email: "teacher@example.com",
                hashed_password: "hash",
                role: Role::Teacher,
            })
            .await
            .unwrap();
        let student = store
            .create_user(UserRecordInput {
                name: "Student",
                email: "student@example.com",
                hashed_password: "hash",
                role: Role::Student,
            })
            .await
            .unwrap();
        let course = store
            .create_course(CourseRecordInput {
                title: "Course",
                description: Some("desc"),
                teacher_id: teacher.id,
                max_students: 2,
            })
            .await
            .unwrap();
        (store, course, student)
    }

    #[tokio::test]
    async fn dropped_handle_discards_writes() {
        let (store, course, student) = seeded().await;
        {
            let mut tx = store.lock_course(course.id).await.unwrap();
            tx.insert_enrollment(student.id, Utc::now()).await.unwrap();
            assert_eq!(tx.count_active().await.unwrap(), 1);
        }
        assert_eq!(store.get_course(course.id).await.unwrap().active_count, 0);
    }

    #[tokio::test]
    async fn rosters_join_students_and_skip_dropped_rows() {
        let (store, course, student) = seeded().await;
        let other = store
            .create_user(UserRecordInput {
                name: "Other",
                email: "other@example.com",
                hashed_password: "hash",
                role: Role::Student,
            })
            .await
            .unwrap();
        let mut tx = store.lock_course(course.id).await.unwrap();
        let first = tx.insert_enrollment(student.id, Utc::now()).await.unwrap();
        let second = tx.insert_enrollment(other.id, Utc::now()).await.unwrap();
        tx.set_status(second.id, EnrollmentStatus::Dropped, None).await.unwrap();
        tx.commit().await.unwrap();

        let roster = store.active_rosters(&[course.id]).await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].enrollment_id, first.id);
        assert_eq!(roster[0].student.name, "Student");
        assert!(store.active_rosters(&[]).await.unwrap().is_empty());

        let mine = store.user_enrollments(other.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].enrollment.status, EnrollmentStatus::Dropped);
        assert_eq!(mine[0].course.title, "Course");
        assert_eq!(mine[0].course.description.as_deref(), Some("desc"));
    }

    #[tokio::test]
    async fn duplicate_pair_insert_conflicts() {
        let (store, course, student) = seeded().await;
        let mut tx = store.lock_course(course.id).await.unwrap();
        tx.insert_enrollment(student.id, Utc::now()).await.unwrap();

        let err = tx.insert_enrollment(student.id, Utc::now()).await.unwrap_err();

        assert_matches!(err, PortError::Conflict(_));
    }

    #[tokio::test]
    async fn commit_refuses_rows_for_a_deleted_student() {
        let (store, course, student) = seeded().await;
        let mut tx = store.lock_course(course.id).await.unwrap();
        tx.insert_enrollment(student.id, Utc::now()).await.unwrap();

        store.delete_user(student.id).await.unwrap();

        assert_matches!(tx.commit().await, Err(PortError::NotFound(_)));
        assert_eq!(store.get_course(course.id).await.unwrap().active_count, 0);
        let all = store.list_enrollments(&EnrollmentFilter::default()).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn commit_refuses_updates_to_a_removed_row() {
        let (store, course, student) = seeded().await;
        let mut tx = store.lock_course(course.id).await.unwrap();
        let row = tx.insert_enrollment(student.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.lock_course(course.id).await.unwrap();
        tx.set_status(row.id, EnrollmentStatus::Dropped, None).await.unwrap();
        store.delete_enrollment(row.id).await.unwrap();

        assert_matches!(tx.commit().await, Err(PortError::NotFound(_)));
        assert_matches!(store.get_enrollment(row.id).await, Err(PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn locking_a_missing_course_is_not_found() {
        let store = MemoryStore::new();
        assert_matches!(
            store.lock_course(Uuid::new_v4()).await.err(),
            Some(PortError::NotFound(_))
        );
        assert!(store.course_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_course_releases_its_lock_entry() {
        let (store, course, _) = seeded().await;
        let tx = store.lock_course(course.id).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.course_locks.lock().await.len(), 1);

        let mut tx = store.lock_course(course.id).await.unwrap();
        tx.delete_course().await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.course_locks.lock().await.is_empty());
        assert_matches!(
            store.lock_course(course.id).await.err(),
            Some(PortError::NotFound(_))
        );
        assert!(store.course_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_user(UserRecordInput {
                name: "Again",
                email: "student@example.com",
                hashed_password: "hash",
                role: Role::Student,
            })
            .await
            .unwrap_err();
        assert_matches!(err, PortError::Conflict(_));
    }
}
