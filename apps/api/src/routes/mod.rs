pub mod extract;
pub mod health;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::attachments::handlers as attachments;
use crate::auth::handlers as auth;
use crate::cv::handlers as cv;
use crate::events::handlers as events;
use crate::history::handle_history;
use crate::state::AppState;
use crate::users::handlers as users;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Accounts
        .route("/register", post(auth::handle_register))
        .route("/login", post(auth::handle_login))
        .route("/forgot-password", post(auth::handle_forgot_password))
        .route("/me", get(auth::handle_me))
        // Profile
        .route(
            "/users/:id",
            get(users::handle_get_user).put(users::handle_update_user),
        )
        .route(
            "/users/:id/check-password",
            post(users::handle_check_password),
        )
        .route(
            "/users/:id/update-password",
            put(users::handle_update_password),
        )
        .route(
            "/users/:id/profile-picture",
            post(users::handle_upload_profile_picture),
        )
        .route("/pictures/:name", get(users::handle_get_picture))
        // Calendar
        .route(
            "/events",
            get(events::handle_list_day).post(events::handle_create_event),
        )
        .route("/events/month", get(events::handle_month))
        .route(
            "/events/:id",
            get(events::handle_get_event)
                .put(events::handle_update_event)
                .delete(events::handle_delete_event),
        )
        .route(
            "/events/:id/attachments",
            get(attachments::handle_list_attachments).post(attachments::handle_upload_attachment),
        )
        .route(
            "/attachments/:id",
            get(attachments::handle_download_attachment)
                .delete(attachments::handle_delete_attachment),
        )
        .route("/history", get(handle_history))
        // CV wizard
        .route("/validate", post(cv::handle_validate_field))
        .route("/cv/validate", post(cv::handle_validate_form))
        .route("/upload-picture", post(cv::handle_upload_picture))
        .route("/generate-cv", post(cv::handle_generate_cv))
        .layer(body_limit)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use bytes::Bytes;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::token::JwtKeys;
    use crate::config::Config;
    use crate::db::create_pool;
    use crate::mail::{LogMailer, MailError, Mailer, OutgoingMail};
    use crate::render::CvRenderClient;
    use crate::storage::{LocalStorage, Storage, StorageError};

    struct TestApp {
        router: Router,
        mailer: LogMailer,
        uploads: TempDir,
    }

    /// Collaborators a test may swap out; anything left `None` gets the
    /// in-process default.
    #[derive(Default)]
    struct Overrides {
        mailer: Option<Arc<dyn Mailer>>,
        storage: Option<Arc<dyn Storage>>,
        cv_renderer: Option<CvRenderClient>,
    }

    async fn test_app() -> TestApp {
        test_app_with(Overrides::default()).await
    }

    async fn test_app_with(overrides: Overrides) -> TestApp {
        let uploads = tempfile::tempdir().unwrap();
        let config = Config::for_tests(uploads.path().to_str().unwrap());
        let db = create_pool(&config.database_url).await.unwrap();
        let mailer = LogMailer::new();
        let storage: Arc<dyn Storage> = match overrides.storage {
            Some(storage) => storage,
            None => Arc::new(LocalStorage::new(uploads.path())),
        };
        let app_mailer: Arc<dyn Mailer> = match overrides.mailer {
            Some(mailer) => mailer,
            None => Arc::new(mailer.clone()),
        };
        let state = AppState {
            db,
            storage,
            mailer: app_mailer,
            cv_renderer: overrides.cv_renderer,
            jwt: JwtKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_hours),
            config,
        };
        TestApp {
            router: build_router(state),
            mailer,
            uploads,
        }
    }

    /// A mail API that is always down.
    struct DownMailer;

    #[async_trait]
    impl Mailer for DownMailer {
        async fn send(&self, _mail: OutgoingMail) -> Result<(), MailError> {
            Err(MailError::Api {
                status: 503,
                body: "service unavailable".to_string(),
            })
        }
    }

    /// Local storage whose deletes always fail.
    struct UndeletableStorage(LocalStorage);

    #[async_trait]
    impl Storage for UndeletableStorage {
        async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
            self.0.put(key, data, content_type).await
        }

        async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
            self.0.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            Err(StorageError::S3(format!("delete of {key} refused")))
        }
    }

    fn renderer(url: String) -> CvRenderClient {
        CvRenderClient::new(url)
            .unwrap()
            .with_base_delay(std::time::Duration::from_millis(1))
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    async fn call(
        app: &TestApp,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let (status, bytes) = send(app, request).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    fn multipart_request(
        uri: &str,
        token: &str,
        field: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
    ) -> Request<Body> {
        let boundary = "----here-i-am-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn register(app: &TestApp, username: &str, email: &str, password: &str) -> i64 {
        let (status, body) = call(
            app,
            Method::POST,
            "/register",
            None,
            Some(json!({
                "name": "Meowth",
                "surname": "Meow",
                "username": username,
                "email": email,
                "password": password,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["user_id"].as_i64().unwrap()
    }

    async fn login(app: &TestApp, credential: &str, password: &str) -> (StatusCode, Value) {
        call(
            app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "credential": credential, "password": password })),
        )
        .await
    }

    /// Registers and logs in a user, returning (id, token).
    async fn signed_in(app: &TestApp, username: &str) -> (i64, String) {
        let email = format!("{}@teamrocket.com", username.to_lowercase());
        let id = register(app, username, &email, "JessieJamesMeowth").await;
        let (status, body) = login(app, username, "JessieJamesMeowth").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (id, body["token"].as_str().unwrap().to_string())
    }

    async fn create_event(app: &TestApp, token: &str, body: Value) -> Value {
        let (status, event) = call(app, Method::POST, "/events", Some(token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{event}");
        event
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "here-i-am-api");
    }

    #[tokio::test]
    async fn test_register_and_login_by_username_or_email() {
        let app = test_app().await;
        let id = register(&app, "TR_Meowth", "Meowth@TeamRocket.com", "JessieJamesMeowth").await;

        let (status, body) = login(&app, "TR_Meowth", "JessieJamesMeowth").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["user_id"], id);
        assert_eq!(body["email"], "meowth@teamrocket.com");
        assert!(body["token"].as_str().is_some());

        let (status, body) = login(&app, "MEOWTH@teamrocket.com", "JessieJamesMeowth").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "TR_Meowth");

        let sent = app.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("Sign Up"));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let app = test_app().await;
        register(&app, "TR_Meowth", "meowth@teamrocket.com", "JessieJamesMeowth").await;

        let (status, body) = login(&app, "TR_Meowth", "wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Incorrect Password");

        let (status, _) = login(&app, "TR_Jessie", "JessieJamesMeowth").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::POST, "/login", None, Some(json!({ "credential": "TR_Meowth" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_missing_fields() {
        let app = test_app().await;
        register(&app, "TR_Meowth", "meowth@teamrocket.com", "pw").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({
                "name": "Other", "surname": "Cat", "username": "TR_Other",
                "email": "MEOWTH@teamrocket.com", "password": "pw"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["message"], "Username or email already in use");

        let (status, body) = call(
            &app,
            Method::POST,
            "/register",
            None,
            Some(json!({ "name": "Only", "username": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "All fields required");
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        let app = test_app().await;
        let (status, _) = call(&app, Method::GET, "/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, Method::GET, "/history", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_profile_read_and_partial_update() {
        let app = test_app().await;
        let (id, token) = signed_in(&app, "TR_Meowth").await;
        let uri = format!("/users/{id}");

        let (status, profile) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "TR_Meowth");
        assert!(profile.get("password_hash").is_none());

        let (status, body) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "name": "Giovanni", "surname": "RocketBoss", "email": "giovanni@teamrocket.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User updated successfully");

        let (_, profile) = call(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(profile["name"], "Giovanni");
        assert_eq!(profile["surname"], "RocketBoss");
        assert_eq!(profile["email"], "giovanni@teamrocket.com");
        assert_eq!(profile["username"], "TR_Meowth");

        let (status, body) = call(&app, Method::PUT, &uri, Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "No valid fields provided");
    }

    #[tokio::test]
    async fn test_cannot_touch_another_users_profile() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (other_id, _) = signed_in(&app, "TR_Jessie").await;

        let (status, _) = call(&app, Method::GET, &format!("/users/{other_id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/users/{other_id}/update-password"),
            Some(&token),
            Some(json!({ "newPassword": "hijacked" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_check_and_update_password() {
        let app = test_app().await;
        let (id, token) = signed_in(&app, "TR_Meowth").await;

        let check = format!("/users/{id}/check-password");
        let (_, body) = call(&app, Method::POST, &check, Some(&token), Some(json!({ "password": "JessieJamesMeowth" }))).await;
        assert_eq!(body["valid"], true);
        let (_, body) = call(&app, Method::POST, &check, Some(&token), Some(json!({ "password": "nope" }))).await;
        assert_eq!(body["valid"], false);

        let update = format!("/users/{id}/update-password");
        let (status, _) = call(&app, Method::PUT, &update, Some(&token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = call(&app, Method::PUT, &update, Some(&token), Some(json!({ "newPassword": "Pikachu123" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        assert_eq!(login(&app, "TR_Meowth", "JessieJamesMeowth").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(login(&app, "TR_Meowth", "Pikachu123").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forgot_password_mails_a_working_password() {
        let app = test_app().await;
        signed_in(&app, "TR_Meowth").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "tr_meowth@teamrocket.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let generic = body["message"].clone();

        let mail = app.mailer.sent().pop().unwrap();
        assert!(mail.subject.contains("Forgot Password"));
        let new_password = mail
            .text
            .lines()
            .find(|l| l.len() == 10 && l.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap()
            .to_string();

        assert_eq!(login(&app, "TR_Meowth", "JessieJamesMeowth").await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(login(&app, "TR_Meowth", &new_password).await.0, StatusCode::OK);

        // Unknown addresses get the same answer and no mail.
        let before = app.mailer.sent().len();
        let (status, body) = call(
            &app,
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "nobody@teamrocket.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], generic);
        assert_eq!(app.mailer.sent().len(), before);

        let (status, _) = call(&app, Method::POST, "/forgot-password", None, Some(json!({ "email": "nope" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_profile_picture_upload_and_serve() {
        let app = test_app().await;
        let (id, token) = signed_in(&app, "TR_Meowth").await;

        let request = multipart_request(
            &format!("/users/{id}/profile-picture"),
            &token,
            "profile_picture",
            "avatar.jpg",
            "image/jpeg",
            b"fake-jpeg-data",
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        let url = body["profile_picture"].as_str().unwrap();
        assert!(url.ends_with(&format!("/pictures/user_{id}.jpg")));

        let (_, profile) = call(&app, Method::GET, "/me", Some(&token), None).await;
        assert_eq!(profile["profile_picture"], format!("user_{id}.jpg"));

        let request = Request::builder()
            .uri(format!("/pictures/user_{id}.jpg"))
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"fake-jpeg-data");

        let request = multipart_request(
            &format!("/users/{id}/profile-picture"),
            &token,
            "profile_picture",
            "script.sh",
            "text/plain",
            b"echo hi",
        );
        assert_eq!(send(&app, request).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_event_create_and_list_day() {
        let app = test_app().await;
        let (id, token) = signed_in(&app, "TR_Meowth").await;

        let event = create_event(
            &app,
            &token,
            json!({ "title": "  Project Meeting ", "date": "2025-12-03", "time": "14:30",
                    "description": "Discuss sprint tasks", "importance": "high" }),
        )
        .await;
        assert_eq!(event["title"], "Project Meeting");
        assert_eq!(event["user_id"], id);
        assert_eq!(event["start_time"], "2025-12-03T14:30:00");
        assert_eq!(event["end_time"], "2025-12-03T14:30:00");
        assert_eq!(event["importance"], "high");

        let early = create_event(&app, &token, json!({ "title": "Standup", "date": "2025-12-03" })).await;
        assert_eq!(early["start_time"], "2025-12-03T00:00:00");
        assert_eq!(early["importance"], "normal");
        create_event(&app, &token, json!({ "title": "Tomorrow", "date": "2025-12-04", "time": "00:00" })).await;

        let (status, events) = call(&app, Method::GET, "/events?date=2025-12-03", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<_> = events.as_array().unwrap().iter().map(|e| e["title"].clone()).collect();
        assert_eq!(titles, vec![json!("Standup"), json!("Project Meeting")]);

        let (status, body) = call(&app, Method::GET, "/events", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "missing date parameter");
    }

    #[tokio::test]
    async fn test_event_create_validation() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;

        let cases = [
            json!({ "date": "2025-12-03" }),
            json!({ "title": "   ", "date": "2025-12-03" }),
            json!({ "title": "x" }),
            json!({ "title": "x", "date": "03/12/2025" }),
            json!({ "title": "x", "date": "2025-12-03", "time": "7pm" }),
            json!({ "title": "x", "date": "2025-12-03", "importance": "urgent" }),
        ];
        for body in cases {
            let (status, _) = call(&app, Method::POST, "/events", Some(&token), Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        }
    }

    #[tokio::test]
    async fn test_event_update_delete_and_isolation() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (_, other) = signed_in(&app, "TR_Jessie").await;

        let event = create_event(&app, &token, json!({ "title": "Battle Plan", "date": "2025-01-01", "time": "10:00" })).await;
        let uri = format!("/events/{}", event["id"]);

        let (status, _) = call(&app, Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = call(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "time": "12:15", "importance": "low" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Battle Plan");
        assert_eq!(updated["start_time"], "2025-01-01T12:15:00");
        assert_eq!(updated["importance"], "low");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_month_grid_counts_events() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        create_event(&app, &token, json!({ "title": "a", "date": "2025-05-16", "time": "09:00" })).await;
        create_event(&app, &token, json!({ "title": "b", "date": "2025-05-16", "time": "12:00" })).await;
        create_event(&app, &token, json!({ "title": "c", "date": "2025-04-28" })).await;
        create_event(&app, &token, json!({ "title": "outside", "date": "2025-07-01" })).await;

        let (status, grid) = call(&app, Method::GET, "/events/month?year=2025&month=5", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let cells = grid.as_array().unwrap();
        assert_eq!(cells.len(), 42);
        let count_on = |date: &str| {
            cells.iter().find(|c| c["date"] == date).unwrap()["event_count"].as_u64().unwrap()
        };
        assert_eq!(count_on("2025-05-16"), 2);
        assert_eq!(count_on("2025-04-28"), 1);
        assert_eq!(cells.iter().map(|c| c["event_count"].as_u64().unwrap()).sum::<u64>(), 3);

        let (status, _) = call(&app, Method::GET, "/events/month?year=2025&month=13", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_filters_and_order() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (_, other) = signed_in(&app, "TR_Jessie").await;
        create_event(&app, &token, json!({ "title": "Team Meeting", "date": "2025-05-16", "time": "09:00", "importance": "high" })).await;
        create_event(&app, &token, json!({ "title": "Lunch Break", "date": "2025-05-16", "time": "12:00", "importance": "low" })).await;
        create_event(&app, &token, json!({ "title": "Client Call", "date": "2025-05-20", "time": "14:30" })).await;
        create_event(&app, &other, json!({ "title": "Team Rocket", "date": "2025-05-16" })).await;

        let (status, all) = call(&app, Method::GET, "/history", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<_> = all.as_array().unwrap().iter().map(|e| e["title"].as_str().unwrap().to_string()).collect();
        assert_eq!(titles, vec!["Client Call", "Lunch Break", "Team Meeting"]);

        let (_, filtered) = call(&app, Method::GET, "/history?search=team&importance=high,normal", Some(&token), None).await;
        let filtered = filtered.as_array().unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0]["title"], "Team Meeting");

        let (_, ranged) = call(&app, Method::GET, "/history?from=2025-05-17&to=2025-05-31", Some(&token), None).await;
        assert_eq!(ranged.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::GET, "/history?importance=critical", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_attachments_lifecycle() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (_, other) = signed_in(&app, "TR_Jessie").await;
        let event = create_event(&app, &token, json!({ "title": "Battle Plan", "date": "2025-01-01" })).await;
        let event_id = event["id"].as_i64().unwrap();

        let request = multipart_request(
            &format!("/events/{event_id}/attachments"),
            &token,
            "file",
            "test_file.txt",
            "text/plain",
            b"Hello, this is a test file!",
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        let upload: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(upload["filename"], "test_file.txt");
        assert_eq!(upload["event_id"], event_id);
        assert_eq!(upload["size_bytes"], 27);

        let (_, list) = call(&app, Method::GET, &format!("/events/{event_id}/attachments"), Some(&token), None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let uri = format!("/attachments/{}", upload["id"]);
        let (status, _) = call(&app, Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::builder()
            .uri(&uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"Hello, this is a test file!");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = multipart_request(
            &format!("/events/{event_id}/attachments"),
            &token,
            "file",
            "empty.txt",
            "text/plain",
            b"",
        );
        assert_eq!(send(&app, request).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deleting_event_removes_attachments() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let event = create_event(&app, &token, json!({ "title": "With file", "date": "2025-01-01" })).await;
        let event_id = event["id"].as_i64().unwrap();

        let request = multipart_request(
            &format!("/events/{event_id}/attachments"),
            &token,
            "file",
            "notes.txt",
            "text/plain",
            b"notes",
        );
        let (_, body) = send(&app, request).await;
        let upload: Value = serde_json::from_slice(&body).unwrap();
        let key = upload["storage_key"].as_str().unwrap();
        assert!(app.uploads.path().join(key).exists());

        let (status, _) = call(&app, Method::DELETE, &format!("/events/{event_id}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!app.uploads.path().join(key).exists());
        let (status, _) = call(&app, Method::GET, &format!("/attachments/{}", upload["id"]), Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validate_single_field() {
        let app = test_app().await;

        let (status, body) = call(&app, Method::POST, "/validate", None, Some(json!({ "field": "name", "value": " George " }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "value": "George" }));

        let (status, body) = call(&app, Method::POST, "/validate", None, Some(json!({ "field": "email", "value": "george.jordan" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "Invalid Email");

        let (status, body) = call(&app, Method::POST, "/validate", None, Some(json!({ "field": "hobbies", "value": "chess" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown field: hobbies");
    }

    #[tokio::test]
    async fn test_generate_cv_validates_before_rendering() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let mut form = json!({
            "name": "George", "surname": "Jordan", "birthdate": "25/12/1990",
            "degree": "BSc Computer Science", "job_count": "3", "phone": "+35799123456",
            "email": "george.jordan@example.com", "skill_count": "5", "picture_path": ""
        });

        let (status, body) = call(&app, Method::POST, "/cv/validate", None, Some(form.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        // Valid form, but no renderer configured in tests.
        let (status, _) = call(&app, Method::POST, "/generate-cv", Some(&token), Some(form.clone())).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);

        form["phone"] = json!("12");
        let (status, body) = call(&app, Method::POST, "/generate-cv", Some(&token), Some(form)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_FIELDS");
        assert_eq!(body["error"]["details"][0]["field"], "phone");
    }

    #[tokio::test]
    async fn test_upload_cv_picture() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;

        let request = multipart_request("/upload-picture", &token, "file", "avatar.png", "image/png", b"\x89PNG");
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["ok"], true);
        let path = body["path"].as_str().unwrap();
        assert!(path.ends_with("-avatar.png"));
        assert!(app.uploads.path().join(path).exists());

        let request = multipart_request("/upload-picture", &token, "file", "notes.txt", "text/plain", b"hi");
        assert_eq!(send(&app, request).await.0, StatusCode::BAD_REQUEST);
    }

    fn cv_form() -> Value {
        json!({
            "name": " George ", "surname": "Jordan", "birthdate": "25/12/1990",
            "degree": "BSc Computer Science", "job_count": "3", "phone": "+35799123456",
            "email": "george.jordan@example.com", "skill_count": "5", "picture_path": ""
        })
    }

    const PDF_RESPONSE: &str =
        "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 8\r\nConnection: close\r\n\r\n%PDF-1.7";

    #[tokio::test]
    async fn test_forgot_password_keeps_old_password_when_mail_fails() {
        let app = test_app_with(Overrides {
            mailer: Some(Arc::new(DownMailer)),
            ..Default::default()
        })
        .await;
        signed_in(&app, "TR_Meowth").await;

        let (status, _) = call(
            &app,
            Method::POST,
            "/forgot-password",
            None,
            Some(json!({ "email": "tr_meowth@teamrocket.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(login(&app, "TR_Meowth", "JessieJamesMeowth").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_picture_cannot_point_at_another_users_file() {
        let app = test_app().await;
        let (victim, victim_token) = signed_in(&app, "TR_Jessie").await;
        let (attacker, attacker_token) = signed_in(&app, "TR_Meowth").await;

        let request = multipart_request(
            &format!("/users/{victim}/profile-picture"),
            &victim_token,
            "profile_picture",
            "jessie.png",
            "image/png",
            b"jessie-picture",
        );
        assert_eq!(send(&app, request).await.0, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/users/{attacker}"),
            Some(&attacker_token),
            Some(json!({ "profile_picture": format!("user_{victim}.png") })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let request = multipart_request(
            &format!("/users/{attacker}/profile-picture"),
            &attacker_token,
            "profile_picture",
            "meowth.jpg",
            "image/jpeg",
            b"meowth-picture",
        );
        assert_eq!(send(&app, request).await.0, StatusCode::OK);

        let request = Request::builder()
            .uri(format!("/pictures/user_{victim}.png"))
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"jessie-picture");

        // Pointing at one's own picture name is still allowed.
        let (status, _) = call(
            &app,
            Method::PUT,
            &format!("/users/{attacker}"),
            Some(&attacker_token),
            Some(json!({ "profile_picture": format!("user_{attacker}.jpg") })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_month_view_rejects_invalid_months() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;

        for query in [
            "year=2025&month=13",
            "year=2025&month=0",
            "year=262142&month=12",
            "year=-262143&month=1",
            "year=0&month=6",
            "month=5",
            "year=2025&month=may",
        ] {
            let (status, body) =
                call(&app, Method::GET, &format!("/events/month?{query}"), Some(&token), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{query}: {body}");
        }
    }

    #[tokio::test]
    async fn test_history_rejects_inverted_range() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (status, body) = call(
            &app,
            Method::GET,
            "/history?from=2025-06-01&to=2025-05-01",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_requests_get_json_errors() {
        let app = test_app().await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;

        let (status, body) = call(&app, Method::GET, "/events/abc", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, bytes) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) = call(
            &app,
            Method::POST,
            "/events",
            Some(&token),
            Some(json!({ "title": ["not", "a", "string"], "date": "2025-01-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_deleting_attachment_survives_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_with(Overrides {
            storage: Some(Arc::new(UndeletableStorage(LocalStorage::new(dir.path())))),
            ..Default::default()
        })
        .await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let event = create_event(&app, &token, json!({ "title": "With file", "date": "2025-01-01" })).await;

        let request = multipart_request(
            &format!("/events/{}/attachments", event["id"]),
            &token,
            "file",
            "notes.txt",
            "text/plain",
            b"notes",
        );
        let (_, body) = send(&app, request).await;
        let upload: Value = serde_json::from_slice(&body).unwrap();
        let uri = format!("/attachments/{}", upload["id"]);

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_generate_cv_streams_rendered_pdf() {
        let (url, received) = crate::render::fake::fake_renderer(vec![PDF_RESPONSE]).await;
        let app = test_app_with(Overrides {
            cv_renderer: Some(renderer(url)),
            ..Default::default()
        })
        .await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/generate-cv")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(cv_form().to_string()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let pdf = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&pdf[..], b"%PDF-1.7");

        let sent: Value = serde_json::from_slice(&received.lock().unwrap()[0]).unwrap();
        assert_eq!(sent["name"], "George");
        assert_eq!(sent["phone"], "+35799123456");
        assert_eq!(sent["picture_path"], "");
        assert!(sent.get("picture").is_none());
    }

    #[tokio::test]
    async fn test_generate_cv_inlines_own_picture_only() {
        let (url, received) = crate::render::fake::fake_renderer(vec![PDF_RESPONSE]).await;
        let app = test_app_with(Overrides {
            cv_renderer: Some(renderer(url)),
            ..Default::default()
        })
        .await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (_, other) = signed_in(&app, "TR_Jessie").await;

        let request = multipart_request("/upload-picture", &token, "file", "avatar.png", "image/png", b"\x89PNG");
        let (_, body) = send(&app, request).await;
        let path = serde_json::from_slice::<Value>(&body).unwrap()["path"].clone();
        assert!(path.as_str().unwrap().starts_with("cv/"));

        let mut form = cv_form();
        form["picture_path"] = path;

        let (status, body) = call(&app, Method::POST, "/generate-cv", Some(&other), Some(form.clone())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["details"][0]["field"], "picture_path");

        let (status, _) = call(&app, Method::POST, "/generate-cv", Some(&token), Some(form)).await;
        assert_eq!(status, StatusCode::OK);
        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let sent: Value = serde_json::from_slice(&received[0]).unwrap();
        assert_eq!(sent["picture"], "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_generate_cv_maps_renderer_failures() {
        let (url, _) = crate::render::fake::fake_renderer(vec![
            "HTTP/1.1 400 Bad Request\r\nContent-Length: 9\r\nConnection: close\r\n\r\nbad input",
        ])
        .await;
        let app = test_app_with(Overrides {
            cv_renderer: Some(renderer(url)),
            ..Default::default()
        })
        .await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (status, body) = call(&app, Method::POST, "/generate-cv", Some(&token), Some(cv_form())).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");

        let (url, received) = crate::render::fake::fake_renderer(vec![
            "HTTP/1.1 429 Too Many Requests\r\nContent-Length: 4\r\nConnection: close\r\n\r\nslow",
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\nConnection: close\r\n\r\noops",
        ])
        .await;
        let app = test_app_with(Overrides {
            cv_renderer: Some(renderer(url)),
            ..Default::default()
        })
        .await;
        let (_, token) = signed_in(&app, "TR_Meowth").await;
        let (status, body) = call(&app, Method::POST, "/generate-cv", Some(&token), Some(cv_form())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
        assert_eq!(received.lock().unwrap().len(), 3);
    }
}
