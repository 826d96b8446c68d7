//! crates/enrollment_core/src/courses.rs
//!
//! Course administration: creation, capacity changes, and deletion guarded by the
//! no-active-enrollments rule.

use crate::domain::{
    Course, CourseDetail, CourseSummary, CourseUpdate, NewCourse, Principal, Role, RosterEntry,
    UserSummary,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::{CourseRecordInput, DatabaseService, PortError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct CourseService {
    db: Arc<dyn DatabaseService>,
}

impl CourseService {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn create_course(
        &self,
        principal: &Principal,
        mut input: NewCourse,
    ) -> CoreResult<Course> {
        input.title = input.title.trim().to_string();
        input.validate()?;

        let teacher = self
            .db
            .get_user(input.teacher_id)
            .await
            .map_err(CoreError::or_not_found("Teacher", input.teacher_id))?;
        // A non-teacher id is reported exactly like a missing one.
        if teacher.role != Role::Teacher {
            return Err(CoreError::NotFound {
                entity: "Teacher",
                id: input.teacher_id,
            });
        }
        if principal.role != Role::Teacher || principal.id != teacher.id {
            return Err(CoreError::Forbidden(
                "teachers may only create courses they teach".to_string(),
            ));
        }

        let course = self
            .db
            .create_course(CourseRecordInput {
                title: &input.title,
                description: input.description.as_deref(),
                teacher_id: teacher.id,
                max_students: input.max_students,
            })
            .await?;
        info!(course_id = %course.id, teacher_id = %teacher.id, max_students = course.max_students, "Course created");
        Ok(course)
    }

    /// Lowering `max_students` below the active count is allowed; nobody is evicted and
    /// the course simply stops admitting until it is back under the cap.
    pub async fn update_course(
        &self,
        principal: &Principal,
        course_id: Uuid,
        mut update: CourseUpdate,
    ) -> CoreResult<CourseSummary> {
        update.title = update.title.map(|t| t.trim().to_string());
        update.validate()?;

        let current = self.get_course(course_id).await?;
        ensure_owner(principal, &current.course)?;

        let course = self
            .db
            .update_course(course_id, &update)
            .await
            .map_err(CoreError::or_not_found("Course", course_id))?;
        let summary = self.get_course(course.id).await?;
        if summary.active_count > i64::from(summary.course.max_students) {
            info!(
                %course_id,
                active = summary.active_count,
                max_students = summary.course.max_students,
                "Course is over capacity after update"
            );
        }
        Ok(summary)
    }

    /// Deletes a course with no active enrollments. The count and the delete share one
    /// course lock so a concurrent admission cannot land in between.
    pub async fn delete_course(&self, principal: &Principal, course_id: Uuid) -> CoreResult<()> {
        let mut tx = self
            .db
            .lock_course(course_id)
            .await
            .map_err(CoreError::or_not_found("Course", course_id))?;
        ensure_owner(principal, tx.course())?;

        let active = tx.count_active().await?;
        if active > 0 {
            return Err(CoreError::HasActiveEnrollments { course_id, active });
        }
        tx.delete_course().await?;
        tx.commit().await?;

        info!(%course_id, "Course deleted");
        Ok(())
    }

    pub async fn get_course(&self, course_id: Uuid) -> CoreResult<CourseSummary> {
        self.db
            .get_course(course_id)
            .await
            .map_err(CoreError::or_not_found("Course", course_id))
    }

    pub async fn list_courses(&self, teacher_id: Option<Uuid>) -> CoreResult<Vec<CourseSummary>> {
        Ok(self.db.list_courses(teacher_id).await?)
    }

    /// A course with its teacher, plus the active roster when a teacher is asking.
    pub async fn course_detail(
        &self,
        principal: &Principal,
        course_id: Uuid,
    ) -> CoreResult<CourseDetail> {
        let summary = self.get_course(course_id).await?;
        self.with_people(principal, vec![summary])
            .await?
            .pop()
            .ok_or(CoreError::NotFound {
                entity: "Course",
                id: course_id,
            })
    }

    pub async fn list_course_details(
        &self,
        principal: &Principal,
        teacher_id: Option<Uuid>,
    ) -> CoreResult<Vec<CourseDetail>> {
        let summaries = self.list_courses(teacher_id).await?;
        self.with_people(principal, summaries).await
    }

    /// Attaches teachers and rosters with one query each, whatever the number of courses.
    async fn with_people(
        &self,
        principal: &Principal,
        summaries: Vec<CourseSummary>,
    ) -> CoreResult<Vec<CourseDetail>> {
        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let mut teacher_ids: Vec<Uuid> = summaries.iter().map(|s| s.course.teacher_id).collect();
        teacher_ids.sort_unstable();
        teacher_ids.dedup();
        let teachers: HashMap<Uuid, UserSummary> = self
            .db
            .user_summaries(&teacher_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let show_roster = principal.role == Role::Teacher;
        let mut rosters: HashMap<Uuid, Vec<RosterEntry>> = HashMap::new();
        if show_roster {
            let course_ids: Vec<Uuid> = summaries.iter().map(|s| s.course.id).collect();
            for entry in self.db.active_rosters(&course_ids).await? {
                rosters.entry(entry.course_id).or_default().push(entry);
            }
        }

        summaries
            .into_iter()
            .map(|summary| {
                let teacher = teachers
                    .get(&summary.course.teacher_id)
                    .cloned()
                    .ok_or_else(|| {
                        CoreError::Store(PortError::Unexpected(format!(
                            "teacher {} of course {} is missing",
                            summary.course.teacher_id, summary.course.id
                        )))
                    })?;
                let roster = show_roster
                    .then(|| rosters.remove(&summary.course.id).unwrap_or_default());
                Ok(CourseDetail {
                    summary,
                    teacher,
                    roster,
                })
            })
            .collect()
    }
}

fn ensure_owner(principal: &Principal, course: &Course) -> CoreResult<()> {
    match principal.role {
        Role::Teacher if principal.id == course.teacher_id => Ok(()),
        _ => Err(CoreError::Forbidden(
            "only the course's teacher may change it".to_string(),
        )),
    }
}
