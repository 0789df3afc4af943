//! Authorization round trip against a mock accounts service.

use discspin::{
    auth::AuthSession,
    config::Config,
    error::{AuthError, ErrorKind},
    pkce::PkceChallenge,
    store::{FileStore, SessionStore},
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> Config {
    format!(
        "client_id = \"client\"\naccounts_url = \"{0}\"\napi_url = \"{0}/v1\"",
        server.uri()
    )
    .parse()
    .unwrap()
}

#[tokio::test]
async fn exchanges_code_for_token() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session_file = dir.path().join("session.toml");

    let auth = AuthSession::new(&config(&server), FileStore::new(&session_file)).unwrap();
    let request = auth.begin_authorization().unwrap();
    let verifier = FileStore::new(&session_file)
        .load()
        .unwrap()
        .pkce_verifier
        .unwrap();
    assert_eq!(PkceChallenge::challenge_for(&verifier), request.challenge);

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=the-code"))
        .and(body_string_contains(format!("code_verifier={verifier}")))
        .and(body_string_contains("client_id=client"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "bearer-token",
            "token_type": "Bearer",
            "scope": "streaming",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let callback = format!(
        "http://127.0.0.1:5500/?code=the-code&state={}",
        request.state
    );
    let outcome = auth.complete_authorization(&callback).await.unwrap();

    assert_eq!(outcome.clean_url.as_str(), Config::DEFAULT_REDIRECT_URI);
    assert!(auth.has_credential());
    assert_eq!(auth.current_token().unwrap().as_str(), "bearer-token");
    assert!(auth.current_token_at(outcome.expires_at).is_none());

    // Pending challenge is gone and the token survives a restart.
    let stored = FileStore::new(&session_file).load().unwrap();
    assert!(stored.pkce_verifier.is_none());
    assert!(stored.oauth_state.is_none());
    assert_eq!(stored.token.as_deref(), Some("bearer-token"));

    let resumed = AuthSession::new(&config(&server), FileStore::new(&session_file)).unwrap();
    assert!(resumed.has_credential());
}

#[tokio::test]
async fn refused_exchange_reports_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let auth =
        AuthSession::new(&config(&server), FileStore::new(dir.path().join("s.toml"))).unwrap();
    let request = auth.begin_authorization().unwrap();

    let err = auth
        .complete_authorization(&format!("code=abc&state={}", request.state))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    match err.downcast::<AuthError>() {
        Some(AuthError::ExchangeFailed { status, body }) => {
            assert_eq!(status.as_u16(), 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected exchange failure, got {other:?}"),
    }
    assert!(!auth.has_credential());
}

#[tokio::test]
async fn forged_state_never_reaches_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let auth =
        AuthSession::new(&config(&server), FileStore::new(dir.path().join("s.toml"))).unwrap();
    auth.begin_authorization().unwrap();

    let err = auth
        .complete_authorization("?code=abc&state=forged")
        .await
        .unwrap_err();
    assert_eq!(err.downcast::<AuthError>(), Some(&AuthError::StateMismatch));
}

#[tokio::test]
async fn denied_callback_is_reported() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let auth =
        AuthSession::new(&config(&server), FileStore::new(dir.path().join("s.toml"))).unwrap();
    let request = auth.begin_authorization().unwrap();

    let err = auth
        .complete_authorization(&format!(
            "?error=access_denied&error_description=user+cancelled&state={}",
            request.state
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::PermissionDenied);
    assert_eq!(
        err.downcast::<AuthError>(),
        Some(&AuthError::Denied {
            error: "access_denied".to_owned(),
            description: Some("user cancelled".to_owned()),
        })
    );
}
