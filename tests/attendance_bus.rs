mod common;

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query as QueryParams;
use axum::http::{Method, StatusCode};
use axum::routing::{get, patch};
use axum::{Json, Router};
use campus_console::attendance::{AttendanceDesk, AttendanceQuery, AttendanceStatus};
use campus_console::config::Config;
use campus_console::notify::{AttendanceBus, AttendanceChange, BusTransport, Notification};
use campus_console::prefs::{PrefStore, ATTENDANCE_UPDATE_CHECK};
use campus_console::session::{Role, RoleSet};
use chrono::NaiveDate;
use serde_json::json;

const RECORDS: &str = "/api/attendance/records/";

async fn next_event(sub: &mut campus_console::notify::Subscription) -> Notification {
    tokio::time::timeout(Duration::from_secs(3), sub.next())
        .await
        .expect("notification in time")
        .expect("bus open")
}

#[tokio::test]
async fn shared_store_reaches_another_bus() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("prefs.json");
    let mut config = Config::for_base("http://127.0.0.1:9/".parse().expect("url"));
    config.cross_process_bus = true;
    config.poll_interval = Duration::from_millis(20);

    // 两个总线各自持有同一文件的存储，相当于两个进程
    let writer = AttendanceBus::new(BusTransport::detect(&config, PrefStore::file(&path)));
    let reader = AttendanceBus::new(BusTransport::detect(&config, PrefStore::file(&path)));
    let mut sub = reader.subscribe().await;

    let sent = writer
        .publish(AttendanceChange::Updated {
            attendance_id: 5,
            student_id: Some(9),
        })
        .await;

    match next_event(&mut sub).await {
        Notification::Event(event) => {
            assert_eq!(event, sent);
            assert_eq!(event.origin, writer.id());
        }
        Notification::Resync => panic!("expected the event itself"),
    }

    let stamp: Option<i64> = PrefStore::file(&path)
        .get(ATTENDANCE_UPDATE_CHECK)
        .await
        .expect("read store");
    assert_eq!(stamp, Some(sent.timestamp));
}

#[tokio::test]
async fn back_to_back_publishes_get_distinct_stamps() {
    let store = PrefStore::memory();
    let bus = AttendanceBus::new(BusTransport::SharedStore {
        store,
        poll_interval: Duration::from_millis(10),
    });
    let a = bus
        .publish(AttendanceChange::BatchUpdated { student_ids: vec![1] })
        .await;
    let b = bus
        .publish(AttendanceChange::BatchUpdated { student_ids: vec![2] })
        .await;
    assert!(b.timestamp > a.timestamp);
}

#[tokio::test]
async fn status_change_patches_and_notifies() {
    let mock = common::serve(
        Router::new()
            .route(RECORDS, get(|| async { Json(json!([])) }))
            .route(
                "/api/attendance/records/:id/",
                patch(|| async { Json(json!({"id": 5, "student": 9, "status": "late"})) }),
            ),
    )
    .await;
    let bus = AttendanceBus::in_process();
    let mut sub = bus.subscribe().await;
    let mut desk = AttendanceDesk::new(mock.client(), bus.clone(), RoleSet::of(&Role::Teacher));

    desk.set_status(5, AttendanceStatus::Late).await.expect("patch");

    let patches = mock.find(Method::PATCH, "/api/attendance/records/5/");
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].body, json!({"status": "late"}));

    match next_event(&mut sub).await {
        Notification::Event(event) => assert_eq!(
            event.change,
            AttendanceChange::Updated {
                attendance_id: 5,
                student_id: Some(9)
            }
        ),
        Notification::Resync => panic!("expected the event itself"),
    }
    // 修改后按原条件重新查询
    assert_eq!(mock.find(Method::GET, RECORDS).len(), 1);
}

#[tokio::test]
async fn students_cannot_edit_attendance() {
    let mock = common::serve(Router::new()).await;
    let mut desk = AttendanceDesk::new(
        mock.client(),
        AttendanceBus::in_process(),
        RoleSet::of(&Role::Student),
    );
    assert!(!desk.can_edit());
    let err = desk
        .set_status(5, AttendanceStatus::Absent)
        .await
        .expect_err("read only");
    assert_eq!(err.to_string(), "无权限");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn mark_all_present_patches_or_creates() {
    let records = get(|QueryParams(q): QueryParams<HashMap<String, String>>| async move {
        match q.get("student").map(String::as_str) {
            Some("1") => Json(json!([{"id": 70, "student": 1, "status": "absent"}])),
            _ => Json(json!([])),
        }
    })
    .post(|| async { (StatusCode::CREATED, Json(json!({"id": 71, "student": 2}))) });
    let mock = common::serve(
        Router::new()
            .route(RECORDS, records)
            .route(
                "/api/attendance/records/:id/",
                patch(|| async { Json(json!({"id": 70, "student": 1, "status": "present"})) }),
            )
            .route(
                "/api/accounts/students/",
                get(|| async {
                    Json(json!([
                        {"id": 1, "school_class": 4, "student_id": "2024001"},
                        {"id": 2, "school_class": 4, "student_id": "2024002"},
                        {"id": 3, "school_class": 5, "student_id": "2024003"}
                    ]))
                }),
            ),
    )
    .await;
    let bus = AttendanceBus::in_process();
    let mut sub = bus.subscribe().await;
    let mut desk = AttendanceDesk::new(mock.client(), bus.clone(), RoleSet::of(&Role::SuperAdmin));
    let date = NaiveDate::from_ymd_opt(2024, 9, 2).expect("date");
    desk.fetch(AttendanceQuery {
        date: Some(date),
        class_id: Some(4),
        ..Default::default()
    })
    .await;

    let summary = desk.mark_all_present().await.expect("mark all");
    assert_eq!(summary.updated, 2);
    assert_eq!(summary.failed, 0);

    let patched = mock.find(Method::PATCH, "/api/attendance/records/70/");
    assert_eq!(patched[0].body, json!({"status": "present"}));
    let created = mock.find(Method::POST, RECORDS);
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].body["student"], 2);
    assert_eq!(created[0].body["date"], "2024-09-02");
    assert_eq!(created[0].body["status"], "present");

    match next_event(&mut sub).await {
        Notification::Event(event) => assert_eq!(
            event.change,
            AttendanceChange::BatchUpdated {
                student_ids: vec![1, 2]
            }
        ),
        Notification::Resync => panic!("expected the event itself"),
    }
}
