//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use chrono::Duration;
use enrollment_core::ports::{DatabaseService, PasswordHasher};
use enrollment_core::{CourseService, EnrollmentManager, IdentityService, UserService};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub identity: IdentityService,
    pub courses: CourseService,
    pub enrollments: EnrollmentManager,
    pub users: UserService,
}

impl AppState {
    /// Wires the core services over a single store and password hasher.
    pub fn new(
        db: Arc<dyn DatabaseService>,
        hasher: Arc<dyn PasswordHasher>,
        config: Arc<Config>,
    ) -> Self {
        let session_ttl = Duration::days(config.session_ttl_days);
        Self {
            identity: IdentityService::new(db.clone(), hasher.clone(), session_ttl),
            courses: CourseService::new(db.clone()),
            enrollments: EnrollmentManager::new(db.clone()),
            users: UserService::new(db.clone(), hasher),
            db,
            config,
        }
    }
}
