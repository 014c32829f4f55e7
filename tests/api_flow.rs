use chrono::{Duration, TimeZone, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use rollcall::{
    client::{AuthGateway, ClientError, LiveFeed, RequestPipeline, SessionClient, TokenStore},
    clock::ManualClock,
    config::Config,
    models::{
        record::{Classification, ScanOutcome, ScanRejection},
        session::{OpenOutcome, SessionState},
    },
    routes::build_router,
    seed::{self, Fixture},
    state::AppState,
};

const SCHEDULE: &str = "6f1c9a52-3d1e-4e0b-9a57-0c1f2e3d4b5a";

const FIXTURE: &str = r#"{
    "users": [
        { "username": "registrar", "display_name": "Registrar", "password": "admin-pass-1", "role": "admin" },
        { "username": "mreyes", "display_name": "Maria Reyes", "password": "teacher-pass-1", "role": "teacher" },
        { "username": "jdelacruz", "display_name": "Juan Dela Cruz", "password": "student-pass-1", "role": "student" },
        { "username": "asantos", "display_name": "Ana Santos", "password": "student-pass-2", "role": "student" },
        { "username": "bgarcia", "display_name": "Ben Garcia", "password": "student-pass-3", "role": "student" },
        { "username": "visitor", "display_name": "Visiting Student", "password": "student-pass-4", "role": "student" }
    ],
    "schedules": [{
        "id": "6f1c9a52-3d1e-4e0b-9a57-0c1f2e3d4b5a",
        "course_code": "CS101",
        "section_name": "BSCS 1-A",
        "instructor": "mreyes",
        "students": ["jdelacruz", "asantos", "bgarcia"]
    }]
}"#;

async fn start_server(clock: ManualClock) -> String {
    let state = AppState::in_memory(Config::in_memory(vec![42; 32]), Arc::new(clock));
    let fixture: Fixture = sonic_rs::from_str(FIXTURE).unwrap();
    seed::apply(&state, &fixture).await.unwrap();

    let app = build_router(state).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{addr}")
}

async fn client_for(base: &str, username: &str, password: &str) -> SessionClient {
    let gateway = AuthGateway::new(base, TokenStore::new()).unwrap();
    gateway.login(username, password).await.unwrap();
    SessionClient::new(RequestPipeline::new(gateway))
}

#[tokio::test]
async fn attendance_round_trip_over_http() {
    let t0 = Utc.with_ymd_and_hms(2025, 9, 8, 8, 0, 0).unwrap();
    let clock = ManualClock::new(t0);
    let base = start_server(clock.clone()).await;
    let schedule_id: Uuid = SCHEDULE.parse().unwrap();

    let teacher = client_for(&base, "mreyes", "teacher-pass-1").await;
    let juan = client_for(&base, "jdelacruz", "student-pass-1").await;
    let ana = client_for(&base, "asantos", "student-pass-2").await;
    let ben = client_for(&base, "bgarcia", "student-pass-3").await;
    let visitor = client_for(&base, "visitor", "student-pass-4").await;

    let grant = match teacher.open(schedule_id).await.unwrap() {
        OpenOutcome::Opened(grant) => grant,
        OpenOutcome::Conflict(_) => panic!("schedule had no session yet"),
    };

    match teacher.open(schedule_id).await.unwrap() {
        OpenOutcome::Conflict(existing) => assert_eq!(existing.credential, grant.credential),
        OpenOutcome::Opened(_) => panic!("second open must resume the first session"),
    }

    clock.set(t0 + Duration::minutes(4));
    let first = juan.scan(&grant.credential).await.unwrap();
    assert_eq!(first.classification(), Some(Classification::Present));

    // Past the access token lifetime: every client refreshes transparently.
    clock.set(t0 + Duration::minutes(12));
    let late = ana.scan(&grant.credential).await.unwrap();
    assert_eq!(late.classification(), Some(Classification::Late));

    let repeat = juan.scan(&grant.credential).await.unwrap();
    assert!(matches!(
        repeat,
        ScanOutcome::AlreadyRecorded {
            classification: Classification::Present,
            ..
        }
    ));

    assert_eq!(
        visitor.scan(&grant.credential).await.unwrap(),
        ScanOutcome::Rejected {
            reason: ScanRejection::NotEnrolled
        }
    );
    assert_eq!(
        ben.scan("made-up-code").await.unwrap(),
        ScanOutcome::Rejected {
            reason: ScanRejection::InvalidCredential
        }
    );

    let history = juan.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].course_code, "CS101");
    assert_eq!(history[0].classification, Classification::Present);

    let resumed = teacher.active_credential(schedule_id).await.unwrap().unwrap();
    assert_eq!(resumed.session_id, grant.session_id);

    let mut feed = LiveFeed::new(teacher.clone(), grant.session_id);
    let snapshot = feed.poll_once().await.unwrap();
    assert_eq!((snapshot.present, snapshot.late), (1, 1));
    assert_eq!(snapshot.new_records.len(), 2);
    assert!(!snapshot.closed());
    let again = feed.poll_once().await.unwrap();
    assert!(again.new_records.is_empty());

    let summary = teacher.summary(grant.session_id).await.unwrap();
    assert_eq!((summary.present, summary.late, summary.absent), (1, 1, 1));

    let closed = teacher.close(grant.session_id).await.unwrap();
    assert_eq!(closed.state, SessionState::Closed);
    assert_eq!(
        ben.scan(&grant.credential).await.unwrap(),
        ScanOutcome::Rejected {
            reason: ScanRejection::ExpiredSession
        }
    );

    let last = LiveFeed::new(teacher.clone(), grant.session_id)
        .run(CancellationToken::new(), |_| {})
        .await
        .unwrap()
        .unwrap();
    assert!(last.closed());
    assert_eq!(last.total(), 2);
}

#[tokio::test]
async fn roles_are_enforced_and_logout_revokes() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 8, 13, 0, 0).unwrap());
    let base = start_server(clock.clone()).await;
    let schedule_id: Uuid = SCHEDULE.parse().unwrap();

    let admin = client_for(&base, "registrar", "admin-pass-1").await;
    let teacher = client_for(&base, "mreyes", "teacher-pass-1").await;
    let student = client_for(&base, "jdelacruz", "student-pass-1").await;

    let err = student.open(schedule_id).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 403, .. }));

    teacher.open(schedule_id).await.unwrap();
    let entries = admin.audit().await.unwrap();
    assert!(entries.iter().any(|e| e.action == "session.open"));

    let err = teacher.audit().await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 403, .. }));

    let gateway = student.pipeline().gateway().clone();
    let refresh_token = gateway.tokens().refresh_token().await.unwrap();
    gateway.logout().await;
    assert_eq!(student.list().await.unwrap_err(), ClientError::NotAuthenticated);

    // The revoked refresh token can no longer be exchanged.
    let revoked = reqwest::Client::new()
        .post(format!("{base}/api/auth/refresh"))
        .json(&serde_json::json!({ "refresh": refresh_token }))
        .send()
        .await
        .unwrap();
    assert_eq!(revoked.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn live_feed_stops_on_cancel() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 8, 15, 0, 0).unwrap());
    let base = start_server(clock).await;
    let schedule_id: Uuid = SCHEDULE.parse().unwrap();

    let teacher = client_for(&base, "mreyes", "teacher-pass-1").await;
    let grant = match teacher.open(schedule_id).await.unwrap() {
        OpenOutcome::Opened(grant) => grant,
        OpenOutcome::Conflict(grant) => grant,
    };

    let cancel = CancellationToken::new();
    let feed = LiveFeed::new(teacher.clone(), grant.session_id)
        .with_interval(std::time::Duration::from_millis(20));
    let task = tokio::spawn(feed.run(cancel.clone(), |_| {}));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    let last = task.await.unwrap().unwrap().unwrap();
    assert!(!last.closed());
    assert_eq!(last.total(), 0);
}

#[tokio::test]
async fn foreign_or_blank_qr_text_is_an_invalid_credential() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 9, 8, 10, 0, 0).unwrap());
    let base = start_server(clock).await;
    let schedule_id: Uuid = SCHEDULE.parse().unwrap();

    let teacher = client_for(&base, "mreyes", "teacher-pass-1").await;
    let student = client_for(&base, "jdelacruz", "student-pass-1").await;
    teacher.open(schedule_id).await.unwrap();

    let url = format!("https://example.com/menu?item={}", "x".repeat(300));
    let invalid = ScanOutcome::Rejected {
        reason: ScanRejection::InvalidCredential,
    };

    assert_eq!(student.scan(&url).await.unwrap(), invalid);
    assert_eq!(student.scan("").await.unwrap(), invalid);
    assert_eq!(student.scan("   ").await.unwrap(), invalid);
}
