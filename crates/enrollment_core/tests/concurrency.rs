//! Races between concurrent admissions against the same course.

use enrollment_core::{
    CoreError, CourseRecordInput, DatabaseService, EnrollmentFilter, EnrollmentManager,
    EnrollmentStatus, MemoryStore, Principal, Role, User, UserRecordInput,
};
use enrollment_core::{CourseService, Course};
use std::sync::Arc;
use uuid::Uuid;

async fn student(db: &MemoryStore, n: usize) -> User {
    db.create_user(UserRecordInput {
        name: &format!("Student {n}"),
        email: &format!("student{n}@example.com"),
        hashed_password: "hash",
        role: Role::Student,
    })
    .await
    .unwrap()
}

async fn course(db: &MemoryStore, max_students: i32) -> Course {
    let teacher = db
        .create_user(UserRecordInput {
            name: "Teacher",
            email: &format!("teacher-{}@example.com", Uuid::new_v4()),
            hashed_password: "hash",
            role: Role::Teacher,
        })
        .await
        .unwrap();
    db.create_course(CourseRecordInput {
        title: "Contested",
        description: None,
        teacher_id: teacher.id,
        max_students,
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_students_racing_for_the_last_seat() {
    let db = Arc::new(MemoryStore::new());
    let course = course(&db, 1).await;
    let a = student(&db, 1).await;
    let b = student(&db, 2).await;
    let manager = EnrollmentManager::new(db.clone());

    let (ra, rb) = tokio::join!(
        {
            let m = manager.clone();
            let course_id = course.id;
            tokio::spawn(async move { m.enroll(&Principal::student(a.id), a.id, course_id).await })
        },
        {
            let m = manager.clone();
            let course_id = course.id;
            tokio::spawn(async move { m.enroll(&Principal::student(b.id), b.id, course_id).await })
        },
    );
    let results = [ra.unwrap(), rb.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::CourseFull { .. })))
        .count();
    assert_eq!((successes, full), (1, 1));
    assert_eq!(db.get_course(course.id).await.unwrap().active_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_concurrent_enrollments_never_overshoot_capacity() {
    let db = Arc::new(MemoryStore::new());
    let course = course(&db, 5).await;
    let manager = EnrollmentManager::new(db.clone());

    let mut handles = Vec::new();
    for n in 0..40 {
        let s = student(&db, n).await;
        let m = manager.clone();
        let course_id = course.id;
        handles.push(tokio::spawn(async move {
            m.enroll(&Principal::student(s.id), s.id, course_id).await
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(CoreError::CourseFull { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(admitted, 5);
    let active = db
        .list_enrollments(&EnrollmentFilter {
            course_id: Some(course.id),
            status: Some(EnrollmentStatus::Active),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(active.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_student_enrolling_concurrently_gets_one_row() {
    let db = Arc::new(MemoryStore::new());
    let course = course(&db, 10).await;
    let s = student(&db, 1).await;
    let manager = EnrollmentManager::new(db.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let m = manager.clone();
        let (sid, cid) = (s.id, course.id);
        handles.push(tokio::spawn(async move {
            m.enroll(&Principal::student(sid), sid, cid).await
        }));
    }
    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(CoreError::AlreadyEnrolled { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(ok, 1);
    let rows = db
        .list_enrollments(&EnrollmentFilter {
            student_id: Some(s.id),
            course_id: Some(course.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn course_deletion_and_enrollment_do_not_interleave() {
    let db = Arc::new(MemoryStore::new());
    let course = course(&db, 10).await;
    let s = student(&db, 1).await;
    let manager = EnrollmentManager::new(db.clone());
    let courses = CourseService::new(db.clone());
    let teacher = Principal::teacher(course.teacher_id);

    let enroll = {
        let m = manager.clone();
        let (sid, cid) = (s.id, course.id);
        tokio::spawn(async move { m.enroll(&Principal::student(sid), sid, cid).await })
    };
    let delete = {
        let c = courses.clone();
        let cid = course.id;
        tokio::spawn(async move { c.delete_course(&teacher, cid).await })
    };
    let (enrolled, deleted) = (enroll.await.unwrap(), delete.await.unwrap());

    // Either the enrollment landed first and blocked the delete, or the delete won
    // and the enrollment found no course. Never both succeed.
    match (enrolled, deleted) {
        (Ok(_), Err(CoreError::HasActiveEnrollments { .. })) => {
            assert_eq!(db.get_course(course.id).await.unwrap().active_count, 1);
        }
        (Err(CoreError::NotFound { entity: "Course", .. }), Ok(())) => {
            assert!(db
                .list_enrollments(&EnrollmentFilter::default())
                .await
                .unwrap()
                .is_empty());
        }
        other => panic!("interleaved outcome: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn deleting_a_student_mid_enrollment_leaves_no_orphan_row() {
    let db = Arc::new(MemoryStore::new());
    let course = course(&db, 50).await;
    let manager = EnrollmentManager::new(db.clone());

    let mut handles = Vec::new();
    for n in 0..20 {
        let sid = student(&db, n).await.id;
        let enroll = {
            let m = manager.clone();
            let cid = course.id;
            tokio::spawn(async move { m.enroll(&Principal::student(sid), sid, cid).await })
        };
        let delete = {
            let db = db.clone();
            tokio::spawn(async move { db.delete_user(sid).await })
        };
        handles.push((sid, enroll, delete));
    }

    for (sid, enroll, delete) in handles {
        delete.await.unwrap().unwrap();
        match enroll.await.unwrap() {
            Ok(_) => {}
            Err(CoreError::NotFound { entity: "Student", id }) => assert_eq!(id, sid),
            Err(other) => panic!("unexpected enroll outcome: {other:?}"),
        }
    }

    // Every student is gone, so nothing may still count against the course.
    let rows = db
        .list_enrollments(&EnrollmentFilter::default())
        .await
        .unwrap();
    assert!(rows.is_empty(), "orphaned rows: {rows:?}");
    assert_eq!(db.get_course(course.id).await.unwrap().active_count, 0);
}
