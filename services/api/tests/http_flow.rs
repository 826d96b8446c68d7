//! Drives the full router over the in-memory store.

use api_lib::{adapters::Argon2Hasher, config::Config, web};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use enrollment_core::{DatabaseService, MemoryStore, PasswordHasher, Role, UserRecordInput};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    teacher_id: Uuid,
}

async fn spawn_app() -> TestApp {
    let config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "COOKIE_SECURE" => Some("false".to_string()),
        _ => None,
    })
    .unwrap();

    let store = Arc::new(MemoryStore::new());
    let hasher = Arc::new(Argon2Hasher::new());
    let teacher = store
        .create_user(UserRecordInput {
            name: "Ada Teacher",
            email: "ada@school.test",
            hashed_password: &hasher.hash_password("chalkboard").unwrap(),
            role: Role::Teacher,
        })
        .await
        .unwrap();

    let state = Arc::new(web::state::AppState::new(store, hasher, Arc::new(config)));
    TestApp {
        router: web::router(state),
        teacher_id: teacher.id,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, set_cookie, value)
    }

    /// Logs in and returns the `session=...` pair to send back as a cookie.
    async fn login(&self, email: &str, password: &str) -> String {
        let (status, set_cookie, _) = self
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        set_cookie
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string()
    }
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = spawn_app().await;
    let (status, _, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_session() {
    let app = spawn_app().await;

    let (status, _, body) = app.send("GET", "/courses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _, _) = app
        .send("GET", "/auth/me", Some("session=bogus"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = spawn_app().await;
    let (status, set_cookie, body) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ada@school.test", "password": "nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(set_cookie.is_none());
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn enrollment_flow_end_to_end() {
    let app = spawn_app().await;
    let teacher = app.login("ADA@school.test", "chalkboard").await;

    let (status, _, me) = app.send("GET", "/auth/me", Some(&teacher), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "TEACHER");
    assert_eq!(me["id"], app.teacher_id.to_string());

    // A one-seat course, owned by the caller by default.
    let (status, _, course) = app
        .send(
            "POST",
            "/courses",
            Some(&teacher),
            Some(json!({ "title": "  Compilers  ", "max_students": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(course["title"], "Compilers");
    assert_eq!(course["teacher_id"], app.teacher_id.to_string());
    assert_eq!(course["seats_left"], 1);
    let course_id = id_of(&course);

    let mut students = Vec::new();
    for name in ["grace", "linus"] {
        let (status, _, student) = app
            .send(
                "POST",
                "/users",
                Some(&teacher),
                Some(json!({
                    "name": name,
                    "email": format!("{name}@school.test"),
                    "password": "secret1",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(student["role"], "STUDENT");
        students.push(id_of(&student));
    }

    let grace = app.login("grace@school.test", "secret1").await;
    let linus = app.login("linus@school.test", "secret1").await;

    // Grace enrolls herself; student_id defaults to the caller.
    let (status, _, enrollment) = app
        .send(
            "POST",
            "/enrollments",
            Some(&grace),
            Some(json!({ "course_id": course_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(enrollment["status"], "ACTIVE");
    assert_eq!(enrollment["student_id"], students[0]);
    let enrollment_id = id_of(&enrollment);

    // Teachers see who holds each seat; students only see the counts.
    let (status, _, detail) = app
        .send("GET", &format!("/courses/{course_id}"), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["teacher"]["name"], "Ada Teacher");
    assert_eq!(detail["teacher"]["email"], "ada@school.test");
    assert_eq!(detail["roster"].as_array().unwrap().len(), 1);
    assert_eq!(detail["roster"][0]["enrollment_id"], enrollment_id);
    assert_eq!(detail["roster"][0]["student"]["name"], "grace");
    assert_eq!(detail["roster"][0]["student"]["email"], "grace@school.test");

    let (_, _, listed) = app.send("GET", "/courses", Some(&teacher), None).await;
    assert_eq!(listed[0]["roster"][0]["student"]["id"], students[0]);

    let (status, _, detail) = app
        .send("GET", &format!("/courses/{course_id}"), Some(&linus), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["teacher"]["name"], "Ada Teacher");
    assert_eq!(detail["active_count"], 1);
    assert!(detail.get("roster").is_none());

    let (status, _, profile) = app
        .send("GET", &format!("/users/{}", students[0]), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["enrollment_count"], 1);
    assert_eq!(profile["enrollments"][0]["status"], "ACTIVE");
    assert_eq!(profile["enrollments"][0]["course"]["id"], course_id);
    assert_eq!(profile["enrollments"][0]["course"]["title"], "Compilers");

    let (status, _, body) = app
        .send(
            "POST",
            "/enrollments",
            Some(&grace),
            Some(json!({ "course_id": course_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_ENROLLED");

    let (status, _, body) = app
        .send(
            "POST",
            "/enrollments",
            Some(&linus),
            Some(json!({ "course_id": course_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "COURSE_FULL");

    // Students cannot act for each other.
    let (status, _, body) = app
        .send(
            "POST",
            "/enrollments",
            Some(&linus),
            Some(json!({ "course_id": course_id, "student_id": students[0] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _, body) = app
        .send("DELETE", &format!("/courses/{course_id}"), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "HAS_ACTIVE_ENROLLMENTS");

    // Dropping frees the seat; dropping again is a no-op.
    for _ in 0..2 {
        let (status, _, dropped) = app
            .send(
                "PUT",
                &format!("/enrollments/{enrollment_id}"),
                Some(&grace),
                Some(json!({ "status": "DROPPED" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dropped["status"], "DROPPED");
        assert_eq!(dropped["id"], enrollment_id);
    }

    let (status, _, course) = app
        .send("GET", &format!("/courses/{course_id}"), Some(&linus), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(course["active_count"], 0);

    let (status, _, listed) = app
        .send(
            "GET",
            &format!("/enrollments?course_id={course_id}&status=DROPPED"),
            Some(&teacher),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // A student listing is confined to their own rows.
    let (status, _, listed) = app
        .send("GET", "/enrollments", Some(&linus), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());

    let (status, _, _) = app
        .send("DELETE", &format!("/courses/{course_id}"), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = app
        .send("GET", &format!("/courses/{course_id}"), Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn validation_and_role_errors_map_to_their_statuses() {
    let app = spawn_app().await;
    let teacher = app.login("ada@school.test", "chalkboard").await;

    let (status, _, body) = app
        .send(
            "POST",
            "/courses",
            Some(&teacher),
            Some(json!({ "title": "Empty", "max_students": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"], "Validation failed: Max students must be at least 1");

    let (_, _, course) = app
        .send("POST", "/courses", Some(&teacher), Some(json!({ "title": "Algebra" })))
        .await;
    assert_eq!(course["max_students"], 50);

    // A student id in teacher_id reads as a missing teacher.
    let (_, _, student) = app
        .send(
            "POST",
            "/users",
            Some(&teacher),
            Some(json!({ "name": "ken", "email": "ken@school.test", "password": "secret1" })),
        )
        .await;
    let (status, _, body) = app
        .send(
            "POST",
            "/courses",
            Some(&teacher),
            Some(json!({ "title": "Unix", "teacher_id": id_of(&student) })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    // The teacher is not a student.
    let (status, _, body) = app
        .send(
            "POST",
            "/enrollments",
            Some(&teacher),
            Some(json!({ "course_id": id_of(&course), "student_id": app.teacher_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_ROLE");

    let (status, _, body) = app
        .send(
            "POST",
            "/enrollments",
            Some(&teacher),
            Some(json!({ "course_id": Uuid::new_v4(), "student_id": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _, body) = app
        .send(
            "DELETE",
            &format!("/users/{}", app.teacher_id),
            Some(&teacher),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = spawn_app().await;
    let teacher = app.login("ada@school.test", "chalkboard").await;

    let (status, set_cookie, _) = app
        .send("POST", "/auth/logout", Some(&teacher), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(set_cookie.unwrap().contains("Max-Age=0"));

    let (status, _, _) = app.send("GET", "/auth/me", Some(&teacher), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
