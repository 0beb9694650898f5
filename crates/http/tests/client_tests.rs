//! Integration tests for the authenticated API client

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde_json::{Value, json};
use sms_core::{ExecutionContext, Role};
use sms_http::client::auth::{CURRENT_USER_PATH, HEALTH_PATH, LOGIN_PATH, LOGOUT_PATH};
use sms_http::refresh::REFRESH_PATH;
use sms_http::store::USER_ROLE_COOKIE;
use sms_http::{ApiClient, AuthEvent, ClientError, CookieJar, MemoryStorage, Query, TokenStore};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

fn token_expiring_in(seconds: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"exp": Utc::now().timestamp() + seconds, "token_type": "access"}).to_string(),
    );
    format!("{header}.{payload}.sig")
}

fn client_for(server: &MockServer) -> (ApiClient, TokenStore) {
    let store = TokenStore::in_memory(ExecutionContext::Client);
    let client = ApiClient::new(server.uri(), store.clone()).unwrap();
    (client, store)
}

struct NoAuthorizationHeader;

impl Match for NoAuthorizationHeader {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

struct MultipartBody;

impl Match for MultipartBody {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data; boundary="))
    }
}

#[tokio::test]
async fn test_client_builder_requires_base_url() {
    let result = ApiClient::builder()
        .store(TokenStore::in_memory(ExecutionContext::Client))
        .build();
    assert!(matches!(result, Err(ClientError::Configuration(_))));
}

#[tokio::test]
async fn test_builder_trims_trailing_slash() {
    let client = ApiClient::new(
        "http://localhost:8000/api/v1/",
        TokenStore::in_memory(ExecutionContext::Client),
    )
    .unwrap();
    assert_eq!(client.base_url(), "http://localhost:8000/api/v1");
}

#[tokio::test]
async fn test_valid_token_is_sent_as_bearer_with_json_content_type() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    let access = token_expiring_in(3600);
    store.set_tokens(&access, "refresh-1").unwrap();

    Mock::given(method("GET"))
        .and(path("/schools/4/"))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4, "name": "North"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let school: Value = client.get("/schools/4/", None).await.unwrap();
    assert_eq!(school["name"], "North");
}

#[tokio::test]
async fn test_missing_token_sends_no_authorization_header() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/subjects/"))
        .and(NoAuthorizationHeader)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let subjects: Vec<Value> = client.get("/subjects/", None).await.unwrap();
    assert!(subjects.is_empty());
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once_before_request() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(-60), "R1").unwrap();
    let fresh = token_expiring_in(3600);

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({"refresh": "R1"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": fresh, "refresh": "R2"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/classes/"))
        .and(header("authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut events = client.subscribe();
    let classes: Vec<Value> = client.get("/classes/", None).await.unwrap();

    assert_eq!(classes.len(), 1);
    assert_eq!(store.access_token().as_deref(), Some(fresh.as_str()));
    assert_eq!(store.refresh_token().as_deref(), Some("R2"));
    assert_eq!(events.recv().await.unwrap(), AuthEvent::TokensRefreshed);
}

#[tokio::test]
async fn test_refresh_without_rotation_keeps_refresh_token() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(-5), "R-original").unwrap();

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A2"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client.refresher().refresh_access_token().await;

    assert_eq!(token.as_deref(), Some("A2"));
    assert_eq!(store.access_token().as_deref(), Some("A2"));
    assert_eq!(store.refresh_token().as_deref(), Some("R-original"));
}

#[tokio::test]
async fn test_empty_rotated_refresh_token_keeps_existing_one() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(-5), "R-original").unwrap();

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"access": "A2", "refresh": ""})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = client.refresher().refresh_access_token().await;

    assert_eq!(token.as_deref(), Some("A2"));
    assert_eq!(store.refresh_token().as_deref(), Some("R-original"));
}

#[tokio::test]
async fn test_absent_refresh_token_makes_no_network_call() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": "A"})))
        .expect(0)
        .mount(&server)
        .await;

    assert!(client.refresher().refresh_access_token().await.is_none());
}

#[tokio::test]
async fn test_failed_refresh_clears_tokens_and_sends_unauthenticated() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(-60), "revoked").unwrap();

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token is blacklisted"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sessions/"))
        .and(NoAuthorizationHeader)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let _: Vec<Value> = client.get("/sessions/", None).await.unwrap();
    assert!(store.access_token().is_none());
    assert!(store.refresh_token().is_none());
}

#[tokio::test]
async fn test_malformed_refresh_response_clears_tokens() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens("not-a-jwt", "R1").unwrap();

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error</html>"))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.refresher().refresh_access_token().await.is_none());
    assert!(store.tokens().is_none());
}

#[tokio::test]
async fn test_unauthorized_clears_tokens_for_any_body() {
    for body in [
        ResponseTemplate::new(401).set_body_json(json!({"detail": "Given token not valid"})),
        ResponseTemplate::new(401).set_body_string("Unauthorized"),
        ResponseTemplate::new(401),
    ] {
        let server = MockServer::start().await;
        let (client, store) = client_for(&server);
        store.set_tokens(&token_expiring_in(3600), "R1").unwrap();

        Mock::given(method("GET"))
            .and(path("/students/"))
            .respond_with(body)
            .expect(1)
            .mount(&server)
            .await;

        let mut events = client.subscribe();
        let result: Result<Value, _> = client.get("/students/", None).await;

        assert!(matches!(result, Err(ClientError::Unauthenticated(_))));
        assert!(store.access_token().is_none());
        assert!(store.refresh_token().is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            AuthEvent::Unauthenticated { status_code: 401 }
        );
    }
}

#[tokio::test]
async fn test_error_message_extraction() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("POST"))
        .and(path("/subjects/"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Subject code already used"})),
        )
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/subjects/2/"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "Name required"})))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/subjects/3/"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad gateway"))
        .mount(&server)
        .await;

    let err = client
        .post::<Value, _>("/subjects/", None, Some(&json!({"name": "Math"})))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Subject code already used");
    assert_eq!(err.status_code(), Some(400));

    let err = client
        .put::<Value, _>("/subjects/2/", None, Some(&json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Name required");

    let err = client
        .patch::<Value, _>("/subjects/3/", None, Some(&json!({"name": "X"})))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api(ref e) if e.message == "Request failed" && e.status_code == 502));
}

#[tokio::test]
async fn test_no_content_resolves_to_empty_object() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("DELETE"))
        .and(path("/subjects/9/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result: Value = client.delete("/subjects/9/").await.unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn test_no_content_resolves_to_unit() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("DELETE"))
        .and(path("/subjects/9/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/schools/1/logo/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.delete::<()>("/subjects/9/").await.unwrap();

    let form = reqwest::multipart::Form::new().text("name", "logo");
    client
        .post_form::<()>("/schools/1/logo/", form)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_query_parameters_skip_empty_values() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/students/"))
        .and(query_param("a", "1"))
        .and(query_param("d", "x"))
        .and(query_param_is_missing("b"))
        .and(query_param_is_missing("c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let query = Query::new()
        .param("a", 1)
        .param("b", None::<i64>)
        .param("c", "")
        .param("d", "x");
    let _: Vec<Value> = client.get("/students/", Some(&query)).await.unwrap();
}

#[tokio::test]
async fn test_json_bodied_requests_carry_query_parameters() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    for verb in ["POST", "PUT", "PATCH"] {
        Mock::given(method(verb))
            .and(path("/results/"))
            .and(query_param("session", "2024"))
            .and(query_param_is_missing("term"))
            .and(body_json(json!({"score": 90})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
    }

    let query = Query::new().param("session", 2024).param("term", "");
    let body = json!({"score": 90});
    let _: Value = client.post("/results/", Some(&query), Some(&body)).await.unwrap();
    let _: Value = client.put("/results/", Some(&query), Some(&body)).await.unwrap();
    let _: Value = client.patch("/results/", Some(&query), Some(&body)).await.unwrap();
}

#[tokio::test]
async fn test_form_upload_lets_transport_set_boundary() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    let access = token_expiring_in(600);
    store.set_tokens(&access, "R").unwrap();

    Mock::given(method("PATCH"))
        .and(path("/school-config/1/"))
        .and(MultipartBody)
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"logo": "/media/logo.png"})))
        .expect(1)
        .mount(&server)
        .await;

    let form = reqwest::multipart::Form::new()
        .text("name", "North High")
        .part(
            "logo",
            reqwest::multipart::Part::bytes(vec![0x89, 0x50, 0x4e, 0x47]).file_name("logo.png"),
        );
    let updated: Value = client.patch_form("/school-config/1/", form).await.unwrap();
    assert_eq!(updated["logo"], "/media/logo.png");
}

#[tokio::test]
async fn test_unauthorized_request_is_not_retried() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(-1), "R1").unwrap();

    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access": token_expiring_in(60)})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/teachers/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result: Result<Value, _> = client.get("/teachers/", None).await;
    assert!(result.unwrap_err().is_auth_expired());
}

#[tokio::test]
async fn test_login_stores_tokens_and_role() {
    let server = MockServer::start().await;
    let memory = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(memory.clone(), memory.clone(), ExecutionContext::Client);
    let client = ApiClient::new(server.uri(), store.clone()).unwrap();

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_json(json!({"email": "head@school.test", "password": "pw"})))
        .and(NoAuthorizationHeader)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": "A1",
            "refresh": "R1",
            "user": {"id": 1, "email": "head@school.test", "username": "head", "role": "admin", "is_active": true},
            "teacher": null,
            "admin": {"id": 1, "name": "Head"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let login = client.login("head@school.test", "pw").await.unwrap();

    assert_eq!(login.user.role, Role::Admin);
    assert_eq!(store.access_token().as_deref(), Some("A1"));
    assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    assert_eq!(memory.get_cookie(USER_ROLE_COOKIE).unwrap().value(), "admin");
}

#[tokio::test]
async fn test_login_rejection_message() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "non_field_errors": ["Unable to log in with provided credentials."]
        })))
        .mount(&server)
        .await;

    let err = client.login("x@y.z", "bad").await.unwrap_err();
    assert_eq!(err.user_message(), "Unable to log in with provided credentials.");
    assert!(store.tokens().is_none());
}

#[tokio::test]
async fn test_logout_clears_tokens_even_when_backend_fails() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(600), "R9").unwrap();

    Mock::given(method("POST"))
        .and(path(LOGOUT_PATH))
        .and(body_json(json!({"refresh": "R9"})))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    client.logout().await.unwrap();
    assert!(store.tokens().is_none());
}

#[tokio::test]
async fn test_validate_session_reports_user_or_invalid() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);

    // No stored session: invalid without asking the backend
    let validation = client.validate_session().await.unwrap();
    assert!(!validation.valid);

    store.set_tokens(&token_expiring_in(600), "R").unwrap();
    Mock::given(method("GET"))
        .and(path(CURRENT_USER_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": "u-1", "role": "site_admin"},
            "teacher": null,
            "admin": null
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CURRENT_USER_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let validation = client.validate_session().await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.user.unwrap().role, Role::SiteAdmin);

    let validation = client.validate_session().await.unwrap();
    assert!(!validation.valid);
    assert!(store.tokens().is_none());
}

#[tokio::test]
async fn test_validate_session_surfaces_server_errors() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);
    store.set_tokens(&token_expiring_in(600), "R").unwrap();

    Mock::given(method("GET"))
        .and(path(CURRENT_USER_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(client.validate_session().await.is_err());
    assert!(store.tokens().is_some());
}

#[tokio::test]
async fn test_check_health() {
    let server = MockServer::start().await;
    let (client, store) = client_for(&server);

    Mock::given(method("GET"))
        .and(path(HEALTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let health = client.check_health().await;
    assert!(health.api);
    assert!(!health.auth);

    store.set_tokens(&token_expiring_in(600), "R").unwrap();
    assert!(client.check_health().await.auth);

    store.set_tokens(&token_expiring_in(-600), "R").unwrap();
    assert!(!client.check_health().await.auth);
}

#[tokio::test]
async fn test_check_health_when_backend_is_down() {
    let store = TokenStore::in_memory(ExecutionContext::Client);
    // Port 9 (discard) is not listening in test environments
    let client = ApiClient::new("http://127.0.0.1:9", store).unwrap();
    assert!(!client.check_health().await.api);
}

#[tokio::test]
async fn test_resource_list_accepts_paginated_envelope() {
    let server = MockServer::start().await;
    let (client, _store) = client_for(&server);

    Mock::given(method("GET"))
        .and(path("/teachers/"))
        .and(query_param("search", "ann"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 1,
            "next": null,
            "previous": null,
            "results": [{"id": 5, "email": "ann@school.test", "name": "Ann"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/teachers/5/reset-password/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Reset email sent"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/teachers/5/"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let teachers = client
        .teachers()
        .list(Some(&Query::new().param("search", "ann")))
        .await
        .unwrap();
    assert_eq!(teachers.len(), 1);
    assert_eq!(teachers[0].name.as_deref(), Some("Ann"));

    let reset = client.reset_teacher_password(5).await.unwrap();
    assert_eq!(reset.message.as_deref(), Some("Reset email sent"));

    client.teachers().delete(5).await.unwrap();
}

#[tokio::test]
async fn test_server_context_never_attaches_tokens() {
    let server = MockServer::start().await;
    let memory = Arc::new(MemoryStorage::new());
    let store = TokenStore::new(memory.clone(), memory, ExecutionContext::Server);
    let client = ApiClient::new(server.uri(), store.clone()).unwrap();
    store.set_tokens(&token_expiring_in(600), "R").unwrap();

    Mock::given(method("GET"))
        .and(path("/classes/"))
        .and(NoAuthorizationHeader)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let _: Vec<Value> = client.get("/classes/", None).await.unwrap();
}
