pub mod capacity;
pub mod courses;
pub mod domain;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod users;

pub use capacity::CapacityGate;
pub use courses::CourseService;
pub use domain::{
    AuthSession, Course, CourseDetail, CourseRef, CourseSummary, CourseUpdate, Enrollment,
    EnrollmentFilter, EnrollmentStatus, NewCourse, NewStudent, Principal, Role, RosterEntry,
    User, UserCredentials, UserDetail, UserEnrollment, UserSummary, DEFAULT_MAX_STUDENTS,
};
pub use error::{CoreError, CoreResult};
pub use identity::IdentityService;
pub use lifecycle::EnrollmentManager;
pub use memory::MemoryStore;
pub use ports::{
    CourseRecordInput, CourseTransaction, DatabaseService, PasswordHasher, PortError,
    PortResult, UserRecordInput,
};
pub use users::UserService;
