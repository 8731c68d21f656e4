mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use campus_console::prefs::PrefStore;
use campus_console::timetable::{DragPayload, LoadOutcome, SlotKey, TimetableController, ViewMode, Viewer};
use campus_console::{ClientError, Query};
use serde_json::{json, Value};

const TIMESLOTS: &str = "/api/courses/timeslots/";
const SCHEDULES: &str = "/api/courses/schedules/";

fn courses() -> Value {
    json!([
        {"id": 10, "name": "高等数学", "teacher": 3, "classroom": "A101"},
        {"id": 11, "name": "体育", "teacher": null}
    ])
}

fn empty_week() -> MethodRouter {
    get(|| async { Json(json!([])) })
        .post(|| async { (StatusCode::CREATED, Json(json!({"id": 500}))) })
}

fn app(timeslots: MethodRouter, schedules: MethodRouter) -> Router {
    Router::new()
        .route(TIMESLOTS, timeslots)
        .route("/api/courses/courses/", get(|| async { Json(courses()) }))
        .route(SCHEDULES, schedules)
}

fn router(slots: Value) -> Router {
    app(get(move || async move { Json(slots) }), empty_week())
}

async fn controller(mock: &common::Mock, viewer: Viewer) -> TimetableController {
    let mut tt = TimetableController::new(
        mock.client(),
        PrefStore::memory(),
        viewer,
        Duration::from_millis(500),
    );
    tt.init_slots().await.expect("timeslots");
    tt.load_courses(&Query::new()).await.expect("courses");
    let outcome = tt
        .select_target(ViewMode::Class, Some(8))
        .await
        .expect("select class");
    assert_eq!(outcome, LoadOutcome::Empty);
    tt
}

fn key(weekday: u8, index: u8) -> SlotKey {
    SlotKey::new(weekday, index).expect("slot key")
}

#[tokio::test]
async fn drop_on_missing_slot_checks_server_then_fails() {
    let mock = common::serve(router(common::timeslots(&[(5, 3)]))).await;
    let mut tt = controller(&mock, Viewer::Admin).await;
    assert_eq!(mock.find(Method::GET, TIMESLOTS).len(), 1);

    let err = tt
        .drop_on(DragPayload::PaletteCourse(10), key(5, 3))
        .await
        .expect_err("slot does not exist");
    match err {
        ClientError::SlotMissing {
            weekday,
            index,
            available,
        } => {
            assert_eq!((weekday, index), (5, 3));
            assert_eq!(available, vec![1, 2, 4, 5, 6, 7, 8]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 本地缺失后向服务器查询了一次，且没有发出排课请求
    assert_eq!(mock.find(Method::GET, TIMESLOTS).len(), 2);
    assert!(mock.find(Method::POST, SCHEDULES).is_empty());
}

#[tokio::test]
async fn live_lookup_heals_stale_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let timeslots = get(move || {
        let counter = counter.clone();
        async move {
            let skip: &[(u8, u8)] = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                &[(5, 3)]
            } else {
                &[]
            };
            Json(common::timeslots(skip))
        }
    });
    let mock = common::serve(app(timeslots, empty_week())).await;
    let mut tt = controller(&mock, Viewer::Admin).await;
    assert!(tt.slots().clone().find(key(5, 3)).is_none());

    tt.drop_on(DragPayload::PaletteCourse(10), key(5, 3))
        .await
        .expect("healed");
    assert_eq!(tt.slots().clone().find(key(5, 3)).map(|s| s.id), Some(35));

    let posts = mock.find(Method::POST, SCHEDULES);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].body["timeslot"], 35);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn create_posts_full_schedule_then_reloads() {
    let mock = common::serve(router(common::timeslots(&[]))).await;
    let mut tt = controller(&mock, Viewer::Admin).await;

    tt.create_schedule(10, key(2, 4)).await.expect("create");

    let posts = mock.find(Method::POST, SCHEDULES);
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].body,
        json!({
            "course": 10,
            "timeslot": 12,
            "week_number": 1,
            "school_class": 8,
            "teacher": 3,
            "classroom_name": "A101"
        })
    );
    assert_eq!(posts[0].csrf_header.as_deref(), Some(common::CSRF_TOKEN));

    // 写入之后重新拉取当前周
    let loads = mock.find(Method::GET, SCHEDULES);
    assert_eq!(loads.len(), 2);
    assert!(loads[1].query.contains("week_number=1"));
    assert!(loads[1].query.contains("school_class=8"));
}

#[tokio::test]
async fn course_without_teacher_is_rejected_locally() {
    let mock = common::serve(router(common::timeslots(&[]))).await;
    let mut tt = controller(&mock, Viewer::Admin).await;

    let err = tt
        .drop_on(DragPayload::PaletteCourse(11), key(1, 1))
        .await
        .expect_err("no teacher");
    assert!(matches!(err, ClientError::Invalid(msg) if msg.contains("未指定授课教师")));
    assert!(mock.find(Method::POST, SCHEDULES).is_empty());
}

#[tokio::test]
async fn empty_slot_table_must_be_generated_first() {
    let mock = common::serve(router(json!([]))).await;
    let mut tt = controller(&mock, Viewer::Admin).await;

    let err = tt
        .drop_on(DragPayload::PaletteCourse(10), key(1, 1))
        .await
        .expect_err("no slots");
    assert!(matches!(err, ClientError::SlotsNotLoaded));
}

#[tokio::test]
async fn observers_cannot_drop() {
    let mock = common::serve(router(common::timeslots(&[]))).await;
    let mut tt = controller(&mock, Viewer::Observer).await;

    let err = tt
        .drop_on(DragPayload::Existing(500), key(1, 1))
        .await
        .expect_err("read only");
    assert!(matches!(err, ClientError::Invalid(_)));
    assert!(mock.find(Method::PATCH, "/api/courses/schedules/500/").is_empty());
}

#[tokio::test]
async fn admin_without_class_needs_target() {
    let mock = common::serve(router(common::timeslots(&[]))).await;
    let mut tt = TimetableController::new(
        mock.client(),
        PrefStore::memory(),
        Viewer::Admin,
        Duration::from_millis(500),
    );
    assert_eq!(tt.load_week().await.expect("load"), LoadOutcome::NeedsTarget);
    assert!(mock.find(Method::GET, SCHEDULES).is_empty());
}

#[tokio::test]
async fn week_renders_embedded_and_bare_timeslots() {
    let slots = common::timeslots(&[]);
    let schedules = get(|| async {
        Json(json!({"count": 2, "results": [
            {"id": 1, "course": 10, "course_name": "高等数学", "timeslot": 12, "week_number": 1},
            {"id": 2, "course": 10, "course_name": "高等数学",
             "timeslot": {"id": 35, "weekday": "5", "index": 3}, "week_number": 1}
        ]}))
    });
    let mock = common::serve(app(get(move || async move { Json(slots) }), schedules)).await;
    let mut tt = TimetableController::new(
        mock.client(),
        PrefStore::memory(),
        Viewer::Admin,
        Duration::from_millis(500),
    );
    tt.init_slots().await.expect("timeslots");
    let outcome = tt
        .select_target(ViewMode::Class, Some(8))
        .await
        .expect("load");
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            count: 2,
            unplaced: 0
        }
    );
}
