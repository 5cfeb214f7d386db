//! Local HTTP surface the reader views talk to.
//!
//! Views never call the book platform for progress themselves: they open a
//! reading or listening session here, feed it viewer and player events, and
//! read the library back from the tracker's snapshot.

pub mod models;
pub mod registry;
pub mod routes;
pub mod services;

pub use registry::SessionRegistry;
pub use routes::CompanionApi;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use poem::{
        Route,
        http::StatusCode,
        test::{TestClient, TestResponse},
    };
    use poem_openapi::OpenApiService;
    use serde_json::{Value, json};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, header, method, path, query_param},
    };

    use super::*;
    use crate::{
        domain::models::{Role, User},
        progress::{ProgressTracker, ReadingPolicy},
        session::{Session, SessionManager},
        shelf_client::ShelfClient,
        storage::tests::memory_store,
    };

    struct Harness {
        cli: TestClient<Route>,
        sessions: Arc<SessionManager>,
    }

    async fn harness(server: &MockServer) -> Harness {
        let client = ShelfClient::new(server.uri()).unwrap();
        let tracker = ProgressTracker::new(Arc::new(client.clone()), ReadingPolicy::default());
        let sessions = Arc::new(SessionManager::new(client, Arc::new(memory_store().await)));
        let api = CompanionApi {
            sessions: sessions.clone(),
            tracker,
            registry: Arc::new(SessionRegistry::default()),
        };
        let route = Route::new().nest("/", OpenApiService::new(api, "Shelf Sync", "test"));
        Harness {
            cli: TestClient::new(route),
            sessions,
        }
    }

    fn sign_in(h: &Harness) {
        sign_in_with(h, "access-1");
    }

    fn sign_in_with(h: &Harness, access: &str) {
        let user = User {
            id: 7,
            name: "John Reader".into(),
            username: "john".into(),
            mobile: None,
            email: None,
            role: Role::User,
        };
        h.sessions
            .context()
            .set(Session::new(access.into(), "refresh-1".into(), user));
    }

    fn expired_jwt() -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1000,"user_id":7}"#);
        format!("{header}.{payload}.signature")
    }

    async fn body(resp: TestResponse) -> Value {
        resp.0.into_body().into_json().await.unwrap()
    }

    async fn mount_library(server: &MockServer, entries: Value) {
        Mock::given(method("GET"))
            .and(path("/library/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn status_when_signed_out() {
        let server = MockServer::start().await;
        let h = harness(&server).await;
        let resp = h.cli.get("/status").send().await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        assert_eq!(json["signed_in"], json!(false));
        assert_eq!(json["library_entries"], json!(0));
    }

    #[tokio::test]
    async fn login_fetches_library() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access": "access-1",
                "refresh": "refresh-1",
                "user": {"id": 7, "name": "John Reader", "username": "john", "type": "user"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_library(
            &server,
            json!([{
                "book": {"id": 7, "title": "Dune", "author": "Frank Herbert", "total_pages": 100},
                "type": "pdf",
                "progress": 6
            }]),
        )
        .await;
        let h = harness(&server).await;

        let resp = h
            .cli
            .post("/v1/auth/login")
            .body_json(&json!({"username": "john", "password": "secret123"}))
            .send()
            .await;
        resp.assert_status_is_ok();
        assert_eq!(body(resp).await["username"], json!("john"));

        let resp = h.cli.get("/v1/library").send().await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        let entry = &json["entries"][0];
        assert_eq!(entry["kind"], json!("pdf"));
        assert_eq!(entry["total"], json!(100));
        assert_eq!(entry["percent_complete"], json!(6));
        assert_eq!(entry["book"]["title"], json!("Dune"));
        assert_eq!(entry["book"]["cover_url"], json!("/default-cover.png"));

        let resp = h.cli.get("/v1/library/stats").send().await;
        let stats = body(resp).await;
        assert_eq!(stats["total"], json!(1));
        assert_eq!(stats["reading"], json!(1));
    }

    #[tokio::test]
    async fn wrong_credentials_are_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login/"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "No active account found"})),
            )
            .mount(&server)
            .await;
        let h = harness(&server).await;
        let resp = h
            .cli
            .post("/v1/auth/login")
            .body_json(&json!({"username": "john", "password": "nope"}))
            .send()
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert!(!h.sessions.context().is_signed_in());
    }

    #[tokio::test]
    async fn register_is_validated_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server).await;
        let resp = h
            .cli
            .post("/v1/auth/register")
            .body_json(&json!({
                "name": "Jane",
                "username": "jane",
                "mobile": "12ab",
                "email": "jane@example.com",
                "password": "password1"
            }))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
        let json = body(resp).await;
        assert!(json["fields"]["mobile"].is_array());
    }

    #[tokio::test]
    async fn pause_flushes_listening_position() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/library/audio-progress/"))
            .and(query_param("book_id", "9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/library/update/"))
            .and(body_json(
                json!({"book_id": 9, "progress": 120, "type": "audio", "total": 300}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        mount_library(
            &server,
            json!([{"book_id": 9, "type": "audio", "progress": 120, "total": 300}]),
        )
        .await;
        let h = harness(&server).await;
        sign_in(&h);

        let resp = h.cli.post("/v1/listening/9/open").send().await;
        resp.assert_status_is_ok();
        let opened = body(resp).await;
        assert_eq!(opened["state"], json!("idle"));
        assert_eq!(opened["progress"], json!(0));
        let id = opened["session_id"].as_str().unwrap().to_string();

        let resp = h
            .cli
            .post(format!("/v1/listening/sessions/{id}/play"))
            .send()
            .await;
        assert_eq!(body(resp).await["state"], json!("active"));

        let resp = h
            .cli
            .post(format!("/v1/listening/sessions/{id}/timeupdate"))
            .body_json(&json!({"current_time": 120.0, "duration": 300.0}))
            .send()
            .await;
        assert_eq!(body(resp).await["percent_complete"], json!(40));

        let resp = h
            .cli
            .post(format!("/v1/listening/sessions/{id}/pause"))
            .send()
            .await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        assert_eq!(json["sent"]["progress"], json!(120));
        assert_eq!(json["entry"]["percent_complete"], json!(40));
        assert!(json.get("notice").is_none());

        // paused already, closing has nothing to flush
        let resp = h
            .cli
            .post(format!("/v1/listening/sessions/{id}/close"))
            .send()
            .await;
        assert_eq!(body(resp).await["sent"], Value::Null);
    }

    #[tokio::test]
    async fn failed_write_is_a_notice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/library/update/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server).await;
        sign_in(&h);

        let resp = h
            .cli
            .post("/v1/progress/3/pdf")
            .body_json(&json!({"progress": 12, "total": 100}))
            .send()
            .await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        assert!(json["notice"].as_str().unwrap().starts_with("progress not saved"));
        assert_eq!(json["entry"], Value::Null);
    }

    #[tokio::test]
    async fn expired_access_token_is_refreshed_before_progress_write() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .and(body_json(json!({"refresh": "refresh-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "access-2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/library/update/"))
            .and(header("Authorization", "Bearer access-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        mount_library(
            &server,
            json!([{"book": 3, "type": "pdf", "progress": 12, "total": 100}]),
        )
        .await;
        let h = harness(&server).await;
        sign_in_with(&h, &expired_jwt());

        let resp = h
            .cli
            .post("/v1/progress/3/pdf")
            .body_json(&json!({"progress": 12, "total": 100}))
            .send()
            .await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        assert!(json.get("notice").is_none());
        assert_eq!(json["entry"]["progress"], json!(12));
        assert_eq!(h.sessions.context().access_token().as_deref(), Some("access-2"));
    }

    #[tokio::test]
    async fn rejected_refresh_signs_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is invalid"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server).await;
        sign_in(&h);

        let resp = h.cli.post("/v1/auth/refresh").send().await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
        assert!(!h.sessions.context().is_signed_in());
    }

    #[tokio::test]
    async fn scrub_without_session_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/library/update/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server).await;
        let resp = h
            .cli
            .post("/v1/progress/3/audio")
            .body_json(&json!({"progress": 30}))
            .send()
            .await;
        resp.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reading_session_closed_at_once_sends_nothing() {
        let server = MockServer::start().await;
        mount_library(
            &server,
            json!([{"book": 5, "type": "pdf", "progress": 40, "total": 180}]),
        )
        .await;
        Mock::given(method("POST"))
            .and(path("/library/update/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server).await;
        sign_in(&h);

        let resp = h.cli.post("/v1/reading/5/open").send().await;
        resp.assert_status_is_ok();
        let opened = body(resp).await;
        assert_eq!(opened["state"], json!("active"));
        assert_eq!(opened["progress"], json!(40));
        assert_eq!(opened["total"], json!(180));
        let id = opened["session_id"].as_str().unwrap().to_string();

        let resp = h
            .cli
            .post(format!("/v1/reading/sessions/{id}/close"))
            .send()
            .await;
        resp.assert_status_is_ok();
        assert_eq!(body(resp).await["sent"], Value::Null);

        let resp = h
            .cli
            .post(format!("/v1/reading/sessions/{id}/close"))
            .send()
            .await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn removing_one_kind_keeps_the_other() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/library/"))
            .and(query_param("book_id", "3"))
            .and(query_param("type", "pdf"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        mount_library(
            &server,
            json!([{"book": 3, "type": "audio", "progress": 120, "total": 300}]),
        )
        .await;
        let h = harness(&server).await;
        sign_in(&h);

        let resp = h
            .cli
            .delete("/v1/library/3")
            .query("kind", &"pdf")
            .send()
            .await;
        resp.assert_status_is_ok();
        let json = body(resp).await;
        assert_eq!(json["entries"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["entries"][0]["kind"], json!("audio"));
    }
}
