//! crates/enrollment_core/src/lifecycle.rs
//!
//! The enrollment lifecycle manager. Every change to an enrollment's state goes
//! through here; transitions that can raise a course's active count run inside the
//! course critical section and consult the capacity gate first.
//!
//! ```text
//!   Absent --enroll--> ACTIVE --drop--> DROPPED
//!                        ^                 |
//!                        +--enroll/ACTIVE--+   (same row, capacity re-checked)
//!   any --delete--> Absent
//! ```

use crate::capacity::CapacityGate;
use crate::domain::{Course, Enrollment, EnrollmentFilter, EnrollmentStatus, Principal, Role};
use crate::error::{CoreError, CoreResult};
use crate::ports::{CourseTransaction, DatabaseService, PortError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct EnrollmentManager {
    db: Arc<dyn DatabaseService>,
    gate: CapacityGate,
}

impl EnrollmentManager {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self {
            db,
            gate: CapacityGate,
        }
    }

    /// Enrolls `student_id` in `course_id`, creating the row or re-activating a
    /// dropped one.
    pub async fn enroll(
        &self,
        principal: &Principal,
        student_id: Uuid,
        course_id: Uuid,
    ) -> CoreResult<Enrollment> {
        if principal.role == Role::Student && principal.id != student_id {
            return Err(CoreError::Forbidden(
                "students may only enroll themselves".to_string(),
            ));
        }

        let student = self
            .db
            .get_user(student_id)
            .await
            .map_err(CoreError::or_not_found("Student", student_id))?;
        if student.role != Role::Student {
            return Err(CoreError::InvalidRole {
                user_id: student_id,
                expected: Role::Student,
            });
        }

        let mut tx = self
            .db
            .lock_course(course_id)
            .await
            .map_err(CoreError::or_not_found("Course", course_id))?;
        authorize(principal, student_id, tx.course())?;

        let enrollment = match tx.find_enrollment(student_id).await? {
            Some(existing) if existing.is_active() => {
                return Err(CoreError::AlreadyEnrolled {
                    student_id,
                    course_id,
                });
            }
            Some(dropped) => {
                self.admit(tx.as_mut()).await?;
                tx.set_status(dropped.id, EnrollmentStatus::Active, Some(Utc::now()))
                    .await?
            }
            None => {
                self.admit(tx.as_mut()).await?;
                tx.insert_enrollment(student_id, Utc::now())
                    .await
                    .map_err(|e| match e {
                        PortError::Conflict(_) => CoreError::AlreadyEnrolled {
                            student_id,
                            course_id,
                        },
                        PortError::NotFound(_) => CoreError::NotFound {
                            entity: "Student",
                            id: student_id,
                        },
                        other => CoreError::Store(other),
                    })?
            }
        };
        // The student may have been deleted while we waited for the course lock.
        tx.commit()
            .await
            .map_err(CoreError::or_not_found("Student", student_id))?;

        info!(
            enrollment_id = %enrollment.id,
            %student_id,
            %course_id,
            "Student enrolled"
        );
        Ok(enrollment)
    }

    /// Moves an enrollment to `status`. Re-activation re-checks capacity exactly as
    /// `enroll` does; setting the current status again is a no-op.
    pub async fn update_status(
        &self,
        principal: &Principal,
        enrollment_id: Uuid,
        status: EnrollmentStatus,
    ) -> CoreResult<Enrollment> {
        let not_found = CoreError::or_not_found("Enrollment", enrollment_id);
        let snapshot = self
            .db
            .get_enrollment(enrollment_id)
            .await
            .map_err(not_found)?;

        // If the course vanished in the meantime, so did the enrollment.
        let mut tx = self
            .db
            .lock_course(snapshot.course_id)
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;
        let current = tx
            .get_enrollment(enrollment_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Enrollment",
                id: enrollment_id,
            })?;
        authorize(principal, current.student_id, tx.course())?;

        let updated = match (current.status, status) {
            (EnrollmentStatus::Active, EnrollmentStatus::Active)
            | (EnrollmentStatus::Dropped, EnrollmentStatus::Dropped) => return Ok(current),
            (EnrollmentStatus::Dropped, EnrollmentStatus::Active) => {
                self.admit(tx.as_mut()).await?;
                tx.set_status(enrollment_id, EnrollmentStatus::Active, Some(Utc::now()))
                    .await?
            }
            (EnrollmentStatus::Active, EnrollmentStatus::Dropped) => {
                tx.set_status(enrollment_id, EnrollmentStatus::Dropped, None)
                    .await?
            }
        };
        tx.commit()
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;

        info!(%enrollment_id, status = %updated.status, "Enrollment status changed");
        Ok(updated)
    }

    /// Administrative removal of an enrollment row, whatever its status.
    pub async fn delete_enrollment(
        &self,
        principal: &Principal,
        enrollment_id: Uuid,
    ) -> CoreResult<()> {
        let enrollment = self
            .db
            .get_enrollment(enrollment_id)
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;
        let summary = self
            .db
            .get_course(enrollment.course_id)
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;
        if principal.role != Role::Teacher || summary.course.teacher_id != principal.id {
            return Err(CoreError::Forbidden(
                "only the course's teacher may remove enrollments".to_string(),
            ));
        }

        self.db
            .delete_enrollment(enrollment_id)
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;
        info!(%enrollment_id, course_id = %enrollment.course_id, "Enrollment deleted");
        Ok(())
    }

    pub async fn get_enrollment(
        &self,
        principal: &Principal,
        enrollment_id: Uuid,
    ) -> CoreResult<Enrollment> {
        let enrollment = self
            .db
            .get_enrollment(enrollment_id)
            .await
            .map_err(CoreError::or_not_found("Enrollment", enrollment_id))?;
        match principal.role {
            Role::Student if enrollment.student_id != principal.id => Err(CoreError::Forbidden(
                "students may only view their own enrollments".to_string(),
            )),
            _ => Ok(enrollment),
        }
    }

    /// Students only ever see their own rows; a filter naming another student is refused.
    pub async fn list_enrollments(
        &self,
        principal: &Principal,
        mut filter: EnrollmentFilter,
    ) -> CoreResult<Vec<Enrollment>> {
        if principal.role == Role::Student {
            match filter.student_id {
                Some(id) if id != principal.id => {
                    return Err(CoreError::Forbidden(
                        "students may only list their own enrollments".to_string(),
                    ));
                }
                _ => filter.student_id = Some(principal.id),
            }
        }
        Ok(self.db.list_enrollments(&filter).await?)
    }

    async fn admit(&self, tx: &mut dyn CourseTransaction) -> CoreResult<()> {
        if self.gate.can_admit(&mut *tx).await? {
            return Ok(());
        }
        let course_id = tx.course().id;
        warn!(%course_id, max_students = tx.course().max_students, "Admission rejected, course is full");
        Err(CoreError::CourseFull { course_id })
    }
}

fn authorize(principal: &Principal, student_id: Uuid, course: &Course) -> CoreResult<()> {
    match principal.role {
        Role::Student if principal.id == student_id => Ok(()),
        Role::Student => Err(CoreError::Forbidden(
            "students may only manage their own enrollments".to_string(),
        )),
        Role::Teacher if course.teacher_id == principal.id => Ok(()),
        Role::Teacher => Err(CoreError::Forbidden(
            "only the course's teacher may manage its enrollments".to_string(),
        )),
    }
}
