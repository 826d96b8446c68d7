//! crates/enrollment_core/src/users.rs
//!
//! Teacher-facing management of student accounts.

use crate::domain::{NewStudent, Principal, Role, User, UserDetail};
use crate::error::{CoreError, CoreResult};
use crate::ports::{DatabaseService, PasswordHasher, PortError, UserRecordInput};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct UserService {
    db: Arc<dyn DatabaseService>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(db: Arc<dyn DatabaseService>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { db, hasher }
    }

    pub async fn create_student(
        &self,
        principal: &Principal,
        mut input: NewStudent,
    ) -> CoreResult<User> {
        require_teacher(principal)?;
        input.name = input.name.trim().to_string();
        input.email = input.email.trim().to_lowercase();
        input.validate()?;

        let hashed_password = self.hasher.hash_password(&input.password)?;
        let user = self
            .db
            .create_user(UserRecordInput {
                name: &input.name,
                email: &input.email,
                hashed_password: &hashed_password,
                role: Role::Student,
            })
            .await
            .map_err(|e| match e {
                PortError::Conflict(_) => {
                    CoreError::Validation("Email is already in use".to_string())
                }
                other => CoreError::Store(other),
            })?;
        info!(user_id = %user.id, created_by = %principal.id, "Student account created");
        Ok(user)
    }

    pub async fn list_users(&self, principal: &Principal, role: Option<Role>) -> CoreResult<Vec<User>> {
        require_teacher(principal)?;
        Ok(self.db.list_users(role).await?)
    }

    /// Users may always read themselves; teachers may read anyone.
    pub async fn get_user(&self, principal: &Principal, user_id: Uuid) -> CoreResult<User> {
        if principal.id != user_id {
            require_teacher(principal)?;
        }
        self.db
            .get_user(user_id)
            .await
            .map_err(CoreError::or_not_found("User", user_id))
    }

    /// The user together with every enrollment they hold and the courses they teach.
    pub async fn get_user_detail(
        &self,
        principal: &Principal,
        user_id: Uuid,
    ) -> CoreResult<UserDetail> {
        let user = self.get_user(principal, user_id).await?;
        let enrollments = self.db.user_enrollments(user.id).await?;
        let courses_taught = match user.role {
            Role::Teacher => self.db.list_courses(Some(user.id)).await?.len() as i64,
            Role::Student => 0,
        };
        Ok(UserDetail {
            user,
            enrollments,
            courses_taught,
        })
    }

    /// Removes a student account and every enrollment it held. Teacher accounts are
    /// never deleted here.
    pub async fn delete_user(&self, principal: &Principal, user_id: Uuid) -> CoreResult<()> {
        require_teacher(principal)?;
        let user = self
            .db
            .get_user(user_id)
            .await
            .map_err(CoreError::or_not_found("User", user_id))?;
        if user.role == Role::Teacher {
            return Err(CoreError::Forbidden(
                "teacher accounts cannot be deleted".to_string(),
            ));
        }
        self.db
            .delete_user(user_id)
            .await
            .map_err(CoreError::or_not_found("User", user_id))?;
        info!(%user_id, deleted_by = %principal.id, "Student account deleted");
        Ok(())
    }
}

fn require_teacher(principal: &Principal) -> CoreResult<()> {
    match principal.role {
        Role::Teacher => Ok(()),
        Role::Student => Err(CoreError::Forbidden(
            "only teachers may manage user accounts".to_string(),
        )),
    }
}
