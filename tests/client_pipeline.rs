use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rollcall::{
    client::{AuthGateway, ClientError, LiveFeed, RequestPipeline, SessionClient, TokenStore},
    crypto::jwt::issue_access_token,
    models::user::{Role, User},
};

const SECRET: [u8; 32] = [5; 32];

#[derive(Default)]
struct Mock {
    refreshes: AtomicUsize,
    protected_hits: AtomicUsize,
    logouts: AtomicUsize,
    always_unauthorized: AtomicBool,
    refuse_refresh: AtomicBool,
    current: Mutex<Option<String>>,
}

fn mint() -> String {
    let user = User {
        id: Uuid::new_v4(),
        username: "mreyes".to_string(),
        display_name: "Maria Reyes".to_string(),
        password: String::new(),
        role: Role::Teacher,
        is_active: true,
        created_at: Utc::now(),
    };
    issue_access_token(&user, Utc::now(), 300, &SECRET).unwrap()
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "secret-pass" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid username or password", "code": "unauthorized"})))
            .into_response();
    }
    // The login token is never accepted, so the first protected call always 401s.
    Json(json!({"access": mint(), "refresh": "refresh-1"})).into_response()
}

async fn refresh(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> Response {
    mock.refreshes.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;

    if mock.refuse_refresh.load(Ordering::SeqCst) || body["refresh"] != "refresh-1" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid refresh token", "code": "unauthorized"})))
            .into_response();
    }

    let access = mint();
    *mock.current.lock().await = Some(access.clone());
    Json(json!({"access": access})).into_response()
}

async fn logout(State(mock): State<Arc<Mock>>) -> Json<Value> {
    mock.logouts.fetch_add(1, Ordering::SeqCst);
    Json(json!({"success": true, "message": "Logged out successfully"}))
}

async fn sessions(State(mock): State<Arc<Mock>>, headers: HeaderMap) -> Response {
    mock.protected_hits.fetch_add(1, Ordering::SeqCst);

    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let accepted = !mock.always_unauthorized.load(Ordering::SeqCst)
        && bearer.is_some()
        && *mock.current.lock().await == bearer;

    if accepted {
        Json(json!([])).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid or expired access token", "code": "unauthorized"})))
            .into_response()
    }
}

async fn stalled_view() -> StatusCode {
    tokio::time::sleep(Duration::from_secs(30)).await;
    StatusCode::SERVICE_UNAVAILABLE
}

async fn spawn_mock(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/sessions", get(sessions))
        .route("/api/sessions/{session_id}", get(stalled_view))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn logged_in_client(mock: &Arc<Mock>) -> SessionClient {
    let base = spawn_mock(mock.clone()).await;
    let gateway = AuthGateway::new(&base, TokenStore::new()).unwrap();
    gateway.login("mreyes", "secret-pass").await.unwrap();
    SessionClient::new(RequestPipeline::new(gateway))
}

#[tokio::test]
async fn a_401_triggers_one_refresh_then_succeeds() {
    let mock = Arc::new(Mock::default());
    let client = logged_in_client(&mock).await;

    let sessions = client.list().await.unwrap();
    assert!(sessions.is_empty());
    assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.protected_hits.load(Ordering::SeqCst), 2);

    // The refreshed token is reused without another exchange.
    client.list().await.unwrap();
    assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.protected_hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn a_second_401_is_not_retried() {
    let mock = Arc::new(Mock::default());
    mock.always_unauthorized.store(true, Ordering::SeqCst);
    let client = logged_in_client(&mock).await;

    let err = client.list().await.unwrap_err();
    assert_eq!(err, ClientError::Unauthorized);
    assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(mock.protected_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_refresh() {
    let mock = Arc::new(Mock::default());
    let client = logged_in_client(&mock).await;

    let calls = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.list().await })
    });
    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap().is_ok());
    }

    assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refused_refresh_clears_the_session() {
    let mock = Arc::new(Mock::default());
    mock.refuse_refresh.store(true, Ordering::SeqCst);
    let client = logged_in_client(&mock).await;

    let err = client.list().await.unwrap_err();
    assert_eq!(err, ClientError::ReauthenticationRequired);

    let tokens = client.pipeline().gateway().tokens();
    assert!(tokens.session().await.is_none());

    let err = client.list().await.unwrap_err();
    assert_eq!(err, ClientError::NotAuthenticated);
    assert_eq!(mock.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let mock = Arc::new(Mock::default());
    let base = spawn_mock(mock).await;
    let tokens = TokenStore::new();
    let gateway = AuthGateway::new(&base, tokens.clone()).unwrap();

    let err = gateway.login("mreyes", "nope").await.unwrap_err();
    assert_eq!(err, ClientError::InvalidCredentials);
    assert!(tokens.session().await.is_none());
}

#[tokio::test]
async fn login_decodes_identity_and_logout_forgets_it() {
    let mock = Arc::new(Mock::default());
    let base = spawn_mock(mock.clone()).await;
    let tokens = TokenStore::new();
    let gateway = AuthGateway::new(&base, tokens.clone()).unwrap();

    let identity = gateway.login("mreyes", "secret-pass").await.unwrap();
    assert_eq!(identity.role, Role::Teacher);
    assert_eq!(identity.display_name, "Maria Reyes");
    assert_eq!(tokens.identity().await, Some(identity));

    gateway.logout().await;
    assert_eq!(mock.logouts.load(Ordering::SeqCst), 1);
    assert!(tokens.session().await.is_none());
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = AuthGateway::new(&format!("http://{addr}"), TokenStore::new()).unwrap();
    let err = gateway.login("mreyes", "secret-pass").await.unwrap_err();
    assert!(matches!(err, ClientError::Network(_)));
}

#[tokio::test]
async fn live_feed_rides_out_network_failures() {
    let mock = Arc::new(Mock::default());
    let client = logged_in_client(&mock).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // Same stored session, pointed at a server that is gone.
    let tokens = client.pipeline().gateway().tokens().clone();
    let offline = AuthGateway::new(&format!("http://{addr}"), tokens).unwrap();
    let offline = SessionClient::new(RequestPipeline::new(offline));

    let cancel = CancellationToken::new();
    let feed = LiveFeed::new(offline, Uuid::new_v4()).with_interval(Duration::from_millis(20));
    let task = tokio::spawn(feed.run(cancel.clone(), |_| {}));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!task.is_finished());
    cancel.cancel();

    assert!(task.await.unwrap().unwrap().is_none());
}

#[tokio::test]
async fn cancel_interrupts_a_poll_in_flight() {
    let mock = Arc::new(Mock::default());
    let client = logged_in_client(&mock).await;

    let cancel = CancellationToken::new();
    let feed = LiveFeed::new(client, Uuid::new_v4());
    let task = tokio::spawn(feed.run(cancel.clone(), |_| {}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let last = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("feed did not stop while a poll was pending")
        .unwrap()
        .unwrap();
    assert!(last.is_none());
}
