mod common;

use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use campus_console::grades::{
    rollup, saved_weights, BatchSaveGrades, GradeBook, GradeEntry, GradeQuery, GradeWeights,
    PassBadge, PassFilter, StatLevel,
};
use campus_console::validation::{first_message, Validated};
use campus_console::ClientError;
use serde_json::json;

fn entry(student_id: i64, regular: Option<f64>, final_score: Option<f64>) -> GradeEntry {
    GradeEntry {
        student_id,
        regular_score: regular,
        final_score,
    }
}

#[tokio::test]
async fn batch_save_drops_blank_rows() {
    let mock = common::serve(Router::new().route(
        "/api/grades/grades/batch_save_grades/",
        post(|| async { Json(json!({"saved_count": 2, "errors": []})) }),
    ))
    .await;
    let book = GradeBook::new(mock.client());

    let batch = BatchSaveGrades::new(
        7,
        "SE2101",
        GradeWeights::entry_default(),
        vec![
            entry(1, Some(80.0), Some(90.0)),
            entry(2, None, None),
            entry(3, None, Some(55.0)),
        ],
    );
    let result = book
        .save_batch(Validated::new(batch).expect("valid batch"))
        .await
        .expect("save");
    assert_eq!(result.message(), "成功保存 2 条成绩记录");

    let posts = mock.find(Method::POST, "/api/grades/grades/batch_save_grades/");
    let body = &posts[0].body;
    assert_eq!(body["course_id"], 7);
    assert_eq!(body["class_id"], "SE2101");
    assert_eq!(body["regular_weight"], 50.0);
    let students: Vec<i64> = body["grades"]
        .as_array()
        .expect("grades array")
        .iter()
        .map(|g| g["student_id"].as_i64().expect("id"))
        .collect();
    assert_eq!(students, vec![1, 3]);
}

#[test]
fn batch_rejects_bad_weights_and_empty_rows() {
    let bad = BatchSaveGrades::new(
        7,
        "SE2101",
        GradeWeights::new(70.0, 40.0),
        vec![entry(1, Some(80.0), Some(90.0))],
    );
    match Validated::new(bad) {
        Err(ClientError::Validation(errors)) => {
            assert_eq!(first_message(&errors), "平时分占比和期末分占比之和必须等于100%")
        }
        other => panic!("unexpected: {:?}", other.map(|v| v.into_inner().course_id)),
    }

    let empty = BatchSaveGrades::new(7, "SE2101", GradeWeights::default(), vec![entry(1, None, None)]);
    match Validated::new(empty) {
        Err(ClientError::Validation(errors)) => {
            assert_eq!(first_message(&errors), "请至少录入一个学生的成绩")
        }
        other => panic!("unexpected: {:?}", other.map(|v| v.into_inner().course_id)),
    }
}

#[tokio::test]
async fn excellent_filter_is_applied_locally() {
    let mock = common::serve(Router::new().route(
        "/api/grades/grades/",
        get(|| async {
            Json(json!({"count": 3, "results": [
                {"id": 1, "student_name": "甲", "score": "95.50"},
                {"id": 2, "student_name": "乙", "score": 72},
                {"id": 3, "student_username": "bing", "score": null}
            ]}))
        }),
    ))
    .await;
    let book = GradeBook::new(mock.client());

    let query = GradeQuery {
        class_id: Some(4),
        pass: PassFilter::Excellent,
        ..Default::default()
    };
    let rows = book.list(&query).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].student, "甲");
    assert_eq!(rows[0].badge, PassBadge::Passed);

    // 优秀不是服务端参数
    let seen = mock.find(Method::GET, "/api/grades/grades/");
    assert_eq!(seen[0].query, "class_id=4");

    let all = book.list(&GradeQuery::default()).await.expect("list all");
    assert_eq!(all.len(), 3);
    assert_eq!(all[2].student, "bing");
    assert_eq!(all[2].badge.label(), "未录入");
}

#[tokio::test]
async fn statistics_roll_up_across_colleges() {
    let mock = common::serve(Router::new().route(
        "/api/grades/grades/statistics/",
        get(|| async {
            Json(json!([
                {"college_name": "信息学院", "total_students": 100, "total_grades": 300,
                 "average_score": 80, "pass_rate": 90, "excellent_rate": 20,
                 "passed_count": 270, "failed_count": 30},
                {"college_name": "经管学院", "total_students": 50, "total_grades": 100,
                 "average_score": "72", "pass_rate": 80, "excellent_rate": 10,
                 "passed_count": 80, "failed_count": 20}
            ]))
        }),
    ))
    .await;
    let book = GradeBook::new(mock.client());

    let rows = book
        .statistics(StatLevel::College, &GradeQuery::default())
        .await
        .expect("statistics");
    assert_eq!(rows[1].name(StatLevel::College), "经管学院");

    let total = rollup(&rows);
    assert_eq!(total.total_students, 150);
    assert_eq!(total.total_grades, 400);
    assert_eq!(total.average_score, 78.0);
    assert_eq!(total.pass_rate, 87.5);
    assert_eq!(total.excellent_rate, 17.5);

    let seen = mock.find(Method::GET, "/api/grades/grades/statistics/");
    assert_eq!(seen[0].query, "level=college");
}

#[tokio::test]
async fn class_students_restore_saved_weights() {
    let mock = common::serve(Router::new().route(
        "/api/grades/grades/class_students_grades/",
        get(|| async {
            Json(json!([
                {"student_id": 1, "student_name": "甲", "regular_score": 80, "final_score": 70,
                 "score": 76, "regular_weight": 60, "final_weight": 40},
                {"student_id": 2, "student_name": "乙"}
            ]))
        }),
    ))
    .await;
    let book = GradeBook::new(mock.client());

    let students = book.class_students(7, "SE2101").await.expect("students");
    let weights = saved_weights(&students);
    assert_eq!(weights, GradeWeights::default());
    assert_eq!(
        weights.total(students[0].regular_score, students[0].final_score),
        Some(76.0)
    );
    assert_eq!(weights.total(students[1].regular_score, Some(90.0)), None);
    assert_eq!(students[1].badge(), PassBadge::Missing);

    let seen = mock.find(Method::GET, "/api/grades/grades/class_students_grades/");
    assert_eq!(seen[0].query, "course_id=7&class_id=SE2101");
}

#[tokio::test]
async fn empty_batch_create_never_hits_server() {
    let mock = common::serve(Router::new()).await;
    let book = GradeBook::new(mock.client());
    let err = book.batch_create(Vec::new()).await.expect_err("empty");
    assert_eq!(err.to_string(), "没有有效的数据");
    assert!(mock.requests().is_empty());
}
