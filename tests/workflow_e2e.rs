//! End-to-end: the reqwest client and workflow controllers against a live
//! axum server backed by the in-memory store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use farmdesk::api::auth::hash_password;
use farmdesk::api::store::{FarmStore, NewTask, NewUser};
use farmdesk::api::{self, AppState};
use farmdesk::attendance::{AttendanceSync, ClockState, LocalClock};
use farmdesk::client::{
    AuthGuard, ClientError, FarmApi, HttpFarmApi, InvalidReason, Session, SessionObserver,
};
use farmdesk::config::{ClientConfig, Config};
use farmdesk::model::{ReviewRequest, ReviewDecision, Role, SubmissionStatus, Task, TaskPriority, User};
use farmdesk::workflow::{Gate, Photo, ReviewInput, ReviewQueue, SubmissionState, TaskSubmissions};
use url::Url;

const PASSWORD: &str = "correct-horse";

#[derive(Default)]
struct Recorder(Mutex<Vec<(Option<Role>, InvalidReason)>>);

impl SessionObserver for Recorder {
    fn session_invalid(&self, role: Option<Role>, reason: InvalidReason) {
        self.0.lock().unwrap().push((role, reason));
    }
}

struct Farm {
    _dir: tempfile::TempDir,
    state: Arc<AppState>,
    client_config: ClientConfig,
    worker: User,
    task: Task,
}

async fn user(state: &AppState, username: &str, name: &str, role: Role) -> User {
    state
        .store
        .create_user(NewUser {
            username: username.into(),
            display_name: name.into(),
            role,
            password_hash: hash_password(PASSWORD),
        })
        .await
        .unwrap()
}

async fn start_farm() -> Farm {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::new(dir.path().to_path_buf(), "e2e-secret".to_string());
    let state = AppState::open(config).await.unwrap();

    let manager = user(&state, "morgan", "Morgan", Role::Manager).await;
    let worker = user(&state, "sam", "Sam", Role::Worker).await;
    let task = state
        .store
        .create_task(NewTask {
            title: "Mend north fence".into(),
            description: Some("Three posts down near the creek".into()),
            priority: TaskPriority::High,
            due_date: None,
            assigned_to: Some(worker.id),
            location: Some("North paddock".into()),
            estimated_hours: Some(3.0),
            created_by: manager.id,
        })
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::router(Arc::clone(&state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client_config = ClientConfig::new(
        Url::parse(&format!("http://{}/", addr)).unwrap(),
        Duration::from_secs(10),
        Duration::from_secs(5),
    );
    Farm {
        _dir: dir,
        state,
        client_config,
        worker,
        task,
    }
}

async fn client_for(farm: &Farm, username: &str) -> (Arc<HttpFarmApi>, Arc<Recorder>) {
    let session = HttpFarmApi::login(&farm.client_config, username, PASSWORD)
        .await
        .unwrap();
    let recorder = Arc::new(Recorder::default());
    let guard = Arc::new(AuthGuard::new(Some(session), recorder.clone()));
    let api = Arc::new(HttpFarmApi::new(&farm.client_config, guard).unwrap());
    (api, recorder)
}

#[tokio::test]
async fn submit_review_resubmit_cycle() {
    let farm = start_farm().await;
    let (worker_api, _) = client_for(&farm, "sam").await;
    let (manager_api, _) = client_for(&farm, "morgan").await;

    let tasks = worker_api.my_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].assigned_to_name.as_deref(), Some("Sam"));

    let mut view = TaskSubmissions::load(worker_api.clone(), tasks[0].clone())
        .await
        .unwrap();
    assert_eq!(view.gate(), Gate::CanSubmit);

    view.draft_mut().set_notes("  Posts reset and wired  ");
    view.draft_mut()
        .attach_photo(Photo::new("fence.png", "image/png", vec![137u8, 80, 78, 71]))
        .unwrap();
    let first = view.submit().await.unwrap();
    assert_eq!(first.status, SubmissionStatus::Pending);
    assert_eq!(first.notes, "Posts reset and wired");
    assert_eq!(view.gate(), Gate::AwaitingReview);
    assert!(view.draft().notes().is_empty());

    // The stored photo is served back.
    let photo_url = first.photo_url.clone().unwrap();
    assert!(photo_url.starts_with("/uploads/"));
    let photo = reqwest::get(farm.client_config.api_url.join(&photo_url[1..]).unwrap())
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(photo.as_ref(), &[137u8, 80, 78, 71]);

    // The controller refuses locally while one is pending.
    view.draft_mut().set_notes("again");
    assert!(view.submit().await.unwrap_err().is_conflict());

    let mut queue = ReviewQueue::new(manager_api.clone());
    queue.refresh().await.unwrap();
    assert_eq!(queue.pending().len(), 1);
    assert_eq!(queue.pending()[0].worker_name.as_deref(), Some("Sam"));

    let rejected = queue
        .review(first.id, &ReviewInput::reject(Some("Top wire still loose")))
        .await
        .unwrap();
    assert_eq!(rejected.status, SubmissionStatus::Rejected);
    assert_eq!(rejected.reviewed_by_name.as_deref(), Some("Morgan"));
    assert!(queue.pending().is_empty());

    // Second decision on the same submission is terminal.
    let again = queue
        .review(first.id, &ReviewInput::approve(None))
        .await
        .unwrap_err();
    assert!(again.is_conflict());

    view.refresh().await.unwrap();
    assert_eq!(view.gate(), Gate::CanResubmit);
    assert!(matches!(view.state(), SubmissionState::Rejected(s) if s.id == first.id));
    assert_eq!(view.draft().notes(), "again");

    view.draft_mut().set_notes("Top wire tensioned");
    let second = view.submit().await.unwrap();

    queue.refresh().await.unwrap();
    queue
        .review(second.id, &ReviewInput::approve(Some("Good")))
        .await
        .unwrap();
    view.refresh().await.unwrap();
    assert_eq!(view.gate(), Gate::Locked);
    assert_eq!(view.history().len(), 2);
    assert_eq!(view.history()[0].id, second.id);
}

#[tokio::test]
async fn server_rejects_second_pending_submission() {
    let farm = start_farm().await;
    let (worker_api, _) = client_for(&farm, "sam").await;

    let mut view = TaskSubmissions::load(worker_api.clone(), farm.task.clone())
        .await
        .unwrap();
    view.draft_mut().set_notes("Done");
    view.submit().await.unwrap();

    // Bypass the controller's gate and hit the server directly.
    let mut stale = TaskSubmissions::new(worker_api.clone(), farm.task.clone());
    stale.draft_mut().set_notes("Done twice");
    let valid = stale.draft().validate().unwrap();
    let err = worker_api.submit(farm.task.id, &valid).await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));

    let history = farm.state.store.list_submissions(farm.task.id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn role_checks_are_enforced() {
    let farm = start_farm().await;
    let (worker_api, _) = client_for(&farm, "sam").await;
    let (manager_api, _) = client_for(&farm, "morgan").await;

    assert!(matches!(
        worker_api.pending_submissions().await,
        Err(ClientError::Forbidden(_))
    ));
    let review = ReviewRequest {
        status: ReviewDecision::Approved,
        review_notes: None,
    };
    assert!(matches!(
        worker_api.review(1, &review).await,
        Err(ClientError::Forbidden(_))
    ));

    // Only the assignee may submit.
    let mut view = TaskSubmissions::load(manager_api.clone(), farm.task.clone())
        .await
        .unwrap();
    view.draft_mut().set_notes("Done for them");
    assert!(matches!(view.submit().await, Err(ClientError::Forbidden(_))));
}

#[tokio::test]
async fn bad_password_is_refused() {
    let farm = start_farm().await;
    let err = HttpFarmApi::login(&farm.client_config, "sam", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
}

#[tokio::test]
async fn unauthorized_response_clears_session() {
    let farm = start_farm().await;
    let session = HttpFarmApi::login(&farm.client_config, "sam", PASSWORD)
        .await
        .unwrap();
    // Claims still decode, signature no longer matches.
    let forged = Session::from_token(format!("{}x", session.token())).unwrap();

    let recorder = Arc::new(Recorder::default());
    let guard = Arc::new(AuthGuard::new(Some(forged), recorder.clone()));
    let api = HttpFarmApi::new(&farm.client_config, guard.clone()).unwrap();

    assert!(matches!(api.my_tasks().await, Err(ClientError::AuthExpired)));
    assert!(!guard.is_active().await);
    assert_eq!(
        recorder.0.lock().unwrap().as_slice(),
        &[(Some(Role::Worker), InvalidReason::Unauthorized)]
    );

    // Nothing is sent once the session is gone.
    assert!(matches!(api.my_tasks().await, Err(ClientError::AuthExpired)));
    assert_eq!(recorder.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn clock_in_and_out_round_trip() {
    let farm = start_farm().await;
    let (worker_api, _) = client_for(&farm, "sam").await;

    let sync = AttendanceSync::new(worker_api.clone(), Some(farm.worker.id), Arc::new(LocalClock));
    sync.poll_once().await.unwrap();
    assert_eq!(sync.clock().await, ClockState::NotClockedIn);

    sync.set_notes("Starting at the dairy").await;
    let opened = sync.clock_in().await.unwrap();
    assert!(opened.clock_in.is_some());
    assert!(sync.clock().await.is_clocked_in());

    // A fresh view of the same worker derives the state from the server.
    let other_device =
        AttendanceSync::new(worker_api.clone(), Some(farm.worker.id), Arc::new(LocalClock));
    other_device.poll_once().await.unwrap();
    assert!(other_device.clock().await.is_clocked_in());

    let closed = other_device.clock_out().await.unwrap();
    assert_eq!(closed.clock_in, opened.clock_in);
    assert!(closed.clock_out.is_some());
    assert_eq!(closed.notes.as_deref(), Some("Starting at the dairy"));

    sync.poll_once().await.unwrap();
    assert_eq!(sync.clock().await, ClockState::NotClockedIn);
    let view = sync.view().await;
    let report = view.snapshot.unwrap().report;
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.statistics.present, 1);
    assert_eq!(report.statistics.clocked_in, 0);
}
