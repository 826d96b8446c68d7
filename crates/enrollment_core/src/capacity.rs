//! crates/enrollment_core/src/capacity.rs
//!
//! The capacity gate: decides whether a course can take one more active enrollment.

use crate::ports::{CourseTransaction, PortResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityGate;

impl CapacityGate {
    /// A non-positive capacity never admits.
    pub fn has_room(active: i64, max_students: i32) -> bool {
        max_students > 0 && active < i64::from(max_students)
    }

    /// Counts active rows afresh through the held course lock; nothing is cached
    /// between calls.
    pub async fn can_admit(&self, tx: &mut dyn CourseTransaction) -> PortResult<bool> {
        let max_students = tx.course().max_students;
        let active = tx.count_active().await?;
        Ok(Self::has_room(active, max_students))
    }
}
