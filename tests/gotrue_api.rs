//! Wire-level tests for the GoTrue provider against a local mock server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sesame::{
    AuthClient, ChangeKind, Error, GoTrueProvider, IdentityProvider, ProviderConfig,
    SignUpOutcome,
};

const ANON_KEY: &str = "test-anon-key";

/// Route the crate's tracing output through the test harness.
fn trace_init() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "sesame=debug".into()))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_test_writer())
        .try_init();
}

fn provider_for(server: &ServerGuard) -> Result<GoTrueProvider> {
    trace_init();
    let config = ProviderConfig::new(server.url(), ANON_KEY)?;
    Ok(GoTrueProvider::new(config)?)
}

fn session_body(email: &str, access_token: &str, refresh_token: &str) -> String {
    json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": refresh_token,
        "user": {
            "id": "11111111-2222-3333-4444-555555555555",
            "email": email
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_password_grant_issues_a_session_and_a_change() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .match_header("apikey", ANON_KEY)
        .match_body(Matcher::PartialJson(json!({
            "email": "user@example.com",
            "password": "hunter2"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("user@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    let session = provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await?;
    assert_eq!(session.email, "user@example.com");
    assert_eq!(session.access_token, "jwt-access");
    assert_eq!(session.refresh_token.as_deref(), Some("jwt-refresh"));
    assert_eq!(session.token_type, "bearer");
    assert!(!session.is_expired(), "a fresh session is not expired");

    let change = changes.recv().await?;
    assert_eq!(change.kind, ChangeKind::SignedIn);
    assert_eq!(provider.current_session().await, Some(session));

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_surface_the_provider_message() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#,
        )
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    let err = provider
        .sign_in_with_password("user@example.com", "wrong")
        .await
        .expect_err("the provider's rejection should surface");
    assert_eq!(err.status(), Some(400));
    assert!(err.is_recoverable());
    assert!(err.to_string().contains("Invalid login credentials"));

    assert_eq!(provider.current_session().await, None);
    assert!(
        matches!(changes.try_recv(), Err(TryRecvError::Empty)),
        "a failed sign-in emits nothing"
    );
    Ok(())
}

#[tokio::test]
async fn test_legacy_error_bodies_are_understood() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#)
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let err = provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await
        .expect_err("rejection should surface");
    assert!(err.to_string().contains("Email not confirmed"));
    Ok(())
}

#[tokio::test]
async fn test_sign_up_reports_pending_confirmation() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/auth/v1/signup")
        .match_header("apikey", ANON_KEY)
        .match_body(Matcher::PartialJson(json!({
            "email": "new@example.com",
            "password": "hunter2"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"id":"22222222-3333-4444-5555-666666666666",
                "email":"new@example.com",
                "confirmation_sent_at":"2026-08-25T10:00:00Z"}"#,
        )
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    let outcome = provider.sign_up("new@example.com", "hunter2").await?;
    assert_eq!(
        outcome,
        SignUpOutcome::ConfirmationRequired {
            email: "new@example.com".to_string()
        }
    );
    assert_eq!(provider.current_session().await, None);
    assert!(
        matches!(changes.try_recv(), Err(TryRecvError::Empty)),
        "no session yet, so no change"
    );

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_auto_confirmed_sign_up_is_a_sign_in() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/signup")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("new@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    let outcome = provider.sign_up("new@example.com", "hunter2").await?;
    let session = match outcome {
        SignUpOutcome::SignedIn(session) => session,
        other => panic!("expected an immediate session, got {:?}", other),
    };
    assert_eq!(session.email, "new@example.com");

    let change = changes.recv().await?;
    assert_eq!(change.kind, ChangeKind::SignedIn);
    assert_eq!(provider.current_session().await, Some(session));
    Ok(())
}

#[tokio::test]
async fn test_sign_out_revokes_the_session_and_emits() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("user@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;
    let logout = server
        .mock("POST", "/auth/v1/logout")
        .match_header("apikey", ANON_KEY)
        .match_header("authorization", "Bearer jwt-access")
        .with_status(204)
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await?;
    provider.sign_out().await?;

    assert_eq!(provider.current_session().await, None);
    assert_eq!(changes.recv().await?.kind, ChangeKind::SignedIn);
    assert_eq!(changes.recv().await?.kind, ChangeKind::SignedOut);

    logout.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_sign_out_succeeds_even_when_the_server_session_is_gone() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("user@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;
    server
        .mock("POST", "/auth/v1/logout")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":401,"msg":"invalid JWT"}"#)
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await?;

    provider
        .sign_out()
        .await
        .expect("an already-dead server session still counts as signed out");
    assert_eq!(provider.current_session().await, None);
    Ok(())
}

#[tokio::test]
async fn test_refresh_grant_rotates_the_session() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("user@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;
    let refresh = server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .match_body(Matcher::PartialJson(json!({ "refresh_token": "jwt-refresh" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body(
            "user@example.com",
            "jwt-access-2",
            "jwt-refresh-2",
        ))
        .create_async()
        .await;

    let provider = provider_for(&server)?;
    let mut changes = provider.changes();

    provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await?;
    let refreshed = provider.refresh_session().await?;

    assert_eq!(refreshed.access_token, "jwt-access-2");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("jwt-refresh-2"));

    assert_eq!(changes.recv().await?.kind, ChangeKind::SignedIn);
    assert_eq!(changes.recv().await?.kind, ChangeKind::TokenRefreshed);

    refresh.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_refreshing_without_a_session_is_an_auth_error() -> Result<()> {
    let server = Server::new_async().await;
    let provider = provider_for(&server)?;

    let err = provider
        .refresh_session()
        .await
        .expect_err("nothing to refresh");
    assert!(matches!(err, Error::Auth { .. }));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_provider_is_a_recoverable_auth_error() -> Result<()> {
    trace_init();
    // Nothing listens on the discard port.
    let config = ProviderConfig::new("http://127.0.0.1:9", ANON_KEY)?;
    let provider = GoTrueProvider::new(config)?;

    let err = provider
        .sign_in_with_password("user@example.com", "hunter2")
        .await
        .expect_err("connection should fail");
    assert!(err.is_recoverable());
    assert!(matches!(err, Error::Auth { status: None, .. }));
    assert!(
        std::error::Error::source(&err).is_some(),
        "the transport error rides along as the source"
    );
    Ok(())
}

#[tokio::test]
async fn test_full_stack_works_against_the_wire() -> Result<()> {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token")
        .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(session_body("user@example.com", "jwt-access", "jwt-refresh"))
        .create_async()
        .await;

    let provider = Arc::new(provider_for(&server)?);
    let client = AuthClient::new(provider);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client
        .subscribe(move |state| sink.lock().unwrap().push(state))
        .await?;

    client.sign_in("user@example.com", "hunter2").await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].signed_in);
    assert_eq!(seen[0].email.as_deref(), Some("user@example.com"));
    Ok(())
}
