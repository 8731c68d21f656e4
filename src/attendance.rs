// src/attendance.rs
use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::{ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::{AttendanceRecord, CreateAttendanceSchema, Schedule, StudentProfile};
use crate::notify::{AttendanceBus, AttendanceChange};
use crate::session::RoleSet;

const RECORDS: &str = "/api/attendance/records/";
const STUDENTS: &str = "/api/accounts/students/";

// --- 1. 考勤状态 ---

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttendanceStatus {
    #[default]
    Present,
    Late,
    Absent,
    Leave,
    Other(String),
}

impl AttendanceStatus {
    pub const KNOWN: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Late,
        AttendanceStatus::Absent,
        AttendanceStatus::Leave,
    ];

    pub fn code(&self) -> &str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Leave => "leave",
            AttendanceStatus::Other(code) => code,
        }
    }

    /// 标签背景色；未知状态按“正常”的颜色显示
    pub fn color(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "#3fb950",
            AttendanceStatus::Late => "#d4a72c",
            AttendanceStatus::Absent => "#cf222e",
            AttendanceStatus::Leave => "#0969da",
            AttendanceStatus::Other(_) => "#3fb950",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "正常",
            AttendanceStatus::Late => "迟到",
            AttendanceStatus::Absent => "缺勤",
            AttendanceStatus::Leave => "请假",
            AttendanceStatus::Other(_) => "未知",
        }
    }

    /// 合并重复记录时的优先级，越大越优先
    pub fn priority(&self) -> u8 {
        match self {
            AttendanceStatus::Absent => 3,
            AttendanceStatus::Late => 2,
            AttendanceStatus::Leave => 1,
            AttendanceStatus::Present | AttendanceStatus::Other(_) => 0,
        }
    }
}

impl From<String> for AttendanceStatus {
    fn from(code: String) -> Self {
        match code.as_str() {
            "present" | "" => AttendanceStatus::Present,
            "late" => AttendanceStatus::Late,
            "absent" => AttendanceStatus::Absent,
            "leave" => AttendanceStatus::Leave,
            _ => AttendanceStatus::Other(code),
        }
    }
}

impl From<AttendanceStatus> for String {
    fn from(status: AttendanceStatus) -> Self {
        status.code().to_owned()
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// --- 2. 查询条件 ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceQuery {
    pub date: Option<NaiveDate>,
    /// 同一课程的全部排课 id
    pub schedule_ids: Vec<i64>,
    pub college: Option<i64>,
    pub department: Option<i64>,
    pub class_id: Option<i64>,
    pub student: Option<i64>,
    pub status: Option<AttendanceStatus>,
    pub q: String,
}

impl AttendanceQuery {
    pub fn to_query(&self) -> Query {
        let schedules = self
            .schedule_ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Query::new()
            .push_opt("date", self.date)
            .push_nonempty("schedule", &schedules)
            .push_opt("college", self.college)
            .push_opt("department", self.department)
            .push_opt("class", self.class_id)
            .push_opt("student", self.student)
            .push_opt("status", self.status.as_ref())
            .push_nonempty("q", &self.q)
    }

    /// 跨多个排课查询时同一学生会出现多条记录
    pub fn spans_schedules(&self) -> bool {
        self.schedule_ids.len() > 1
    }
}

/// 同一学生同一课程只保留优先级最高的一条 (缺勤 > 迟到 > 请假 > 正常)
pub fn collapse_by_priority(records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    let mut order: Vec<(Option<String>, Option<i64>)> = Vec::new();
    let mut seen: HashMap<(Option<String>, Option<i64>), AttendanceRecord> = HashMap::new();
    for rec in records {
        let key = (rec.student_id.clone(), rec.course_id.or(rec.course));
        match seen.get(&key) {
            None => {
                order.push(key.clone());
                seen.insert(key, rec);
            }
            Some(existing) if rec.status.priority() > existing.status.priority() => {
                seen.insert(key, rec);
            }
            Some(_) => {}
        }
    }
    order.into_iter().filter_map(|k| seen.remove(&k)).collect()
}

/// 课程下拉选项：同一课程合并，代表 id 取最小的排课 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOption {
    pub schedule_id: i64,
    pub course_id: i64,
    pub course_name: String,
    pub schedule_ids: Vec<i64>,
}

pub fn course_options(schedules: &[Schedule]) -> Vec<CourseOption> {
    let mut options: Vec<CourseOption> = Vec::new();
    for sch in schedules {
        match options.iter_mut().find(|o| o.course_id == sch.course) {
            Some(opt) => {
                opt.schedule_id = opt.schedule_id.min(sch.id);
                opt.schedule_ids.push(sch.id);
            }
            None => options.push(CourseOption {
                schedule_id: sch.id,
                course_id: sch.course,
                course_name: sch.course_name.clone().unwrap_or_else(|| "-".into()),
                schedule_ids: vec![sch.id],
            }),
        }
    }
    options
}

// --- 3. 考勤表 ---

/// 表格中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRow {
    pub id: i64,
    pub student: i64,
    pub student_id: String,
    pub student_name: String,
    pub course_name: String,
    pub college_name: String,
    pub major_name: String,
    pub class_name: String,
    pub status: AttendanceStatus,
    pub status_label: String,
    pub color: &'static str,
    pub remark: String,
    pub editable: bool,
}

impl AttendanceRow {
    pub fn from_record(rec: &AttendanceRecord, editable: bool) -> Self {
        let dash = |s: &Option<String>| {
            s.as_deref()
                .filter(|v| !v.is_empty())
                .unwrap_or("-")
                .to_owned()
        };
        Self {
            id: rec.id,
            student: rec.student,
            student_id: dash(&rec.student_id),
            student_name: dash(&rec.student_name),
            course_name: dash(&rec.course_name),
            college_name: dash(&rec.college_name),
            major_name: dash(&rec.major_name),
            class_name: dash(&rec.class_name),
            status: rec.status.clone(),
            status_label: rec
                .status_display
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| rec.status.label().to_owned()),
            color: rec.status.color(),
            remark: rec.remark.clone().unwrap_or_default(),
            editable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkAllSummary {
    pub updated: usize,
    pub failed: usize,
}

/// 考勤管理页：查询、修改状态/备注、一键全勤
pub struct AttendanceDesk {
    client: ApiClient,
    bus: AttendanceBus,
    roles: RoleSet,
    query: AttendanceQuery,
    rows: Vec<AttendanceRow>,
}

impl AttendanceDesk {
    pub fn new(client: ApiClient, bus: AttendanceBus, roles: RoleSet) -> Self {
        Self {
            client,
            bus,
            roles,
            query: AttendanceQuery::default(),
            rows: Vec::new(),
        }
    }

    /// 管理员和任课教师可以修改
    pub fn can_edit(&self) -> bool {
        self.roles.is_admin() || self.roles.is_teacher()
    }

    pub fn rows(&self) -> &[AttendanceRow] {
        &self.rows
    }

    pub fn query(&self) -> &AttendanceQuery {
        &self.query
    }

    pub fn total_label(&self) -> String {
        format!("共 {} 条记录", self.rows.len())
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    /// 查询失败时显示为空表
    async fn fetch_records(&self, query: &AttendanceQuery) -> Vec<AttendanceRecord> {
        let mut query = query.clone();
        query.date.get_or_insert_with(Self::today);
        self.client
            .list_or_empty::<AttendanceRecord>(RECORDS, &query.to_query())
            .await
            .items
    }

    pub async fn fetch(&mut self, query: AttendanceQuery) -> &[AttendanceRow] {
        self.query = query;
        self.refresh().await;
        &self.rows
    }

    /// 按上次的条件重新查询 (收到考勤通知时调用)
    pub async fn refresh(&mut self) {
        let mut records = self.fetch_records(&self.query).await;
        if self.query.spans_schedules() {
            records = collapse_by_priority(records);
        }
        let editable = self.can_edit();
        self.rows = records
            .iter()
            .map(|r| AttendanceRow::from_record(r, editable))
            .collect();
        tracing::debug!("考勤记录 {} 条", self.rows.len());
    }

    pub async fn course_options(&self) -> Vec<CourseOption> {
        let page: Page<Schedule> = self
            .client
            .list_or_empty("/api/courses/schedules/", &Query::new())
            .await;
        course_options(&page.items)
    }

    /// 班级学生；按班级查询失败时退回到全部学生
    pub async fn class_students(&self, class_id: i64) -> Vec<StudentProfile> {
        match self
            .client
            .list::<StudentProfile>(STUDENTS, &Query::new().push("class", class_id))
            .await
        {
            Ok(page) => page.items,
            Err(e) => {
                tracing::debug!("按班级加载学生失败，改为加载全部: {}", e);
                self.client
                    .list_or_empty::<StudentProfile>(STUDENTS, &Query::new())
                    .await
                    .items
            }
        }
    }

    fn ensure_editable(&self) -> Result<(), ClientError> {
        if self.can_edit() {
            Ok(())
        } else {
            Err(ClientError::Invalid("无权限".into()))
        }
    }

    async fn patch_record(&self, id: i64, body: serde_json::Value) -> Result<Option<i64>, ClientError> {
        let resp = self
            .client
            .patch(&format!("{}{}/", RECORDS, id), &body)
            .await?;
        Ok(resp.get("student").and_then(|v| v.as_i64()))
    }

    pub async fn set_status(&mut self, id: i64, status: AttendanceStatus) -> Result<(), ClientError> {
        self.ensure_editable()?;
        let student_id = self.patch_record(id, json!({ "status": status })).await?;
        self.bus
            .publish(AttendanceChange::Updated {
                attendance_id: id,
                student_id,
            })
            .await;
        self.refresh().await;
        Ok(())
    }

    pub async fn set_remark(&mut self, id: i64, remark: &str) -> Result<(), ClientError> {
        self.ensure_editable()?;
        let student_id = self.patch_record(id, json!({ "remark": remark })).await?;
        self.bus
            .publish(AttendanceChange::Updated {
                attendance_id: id,
                student_id,
            })
            .await;
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.remark = remark.to_owned();
        }
        Ok(())
    }

    async fn students_for_mark_all(&self, date: NaiveDate) -> Vec<StudentProfile> {
        let q = &self.query;
        if let Some(class_id) = q.class_id {
            return self.class_students(class_id).await;
        }
        if let Some(student) = q.student {
            return self
                .client
                .list_or_empty::<StudentProfile>(STUDENTS, &Query::new().push("student", student))
                .await
                .items;
        }

        // 没有指定班级/学生时，从当前条件下的考勤记录反查学生
        let probe = AttendanceQuery {
            date: Some(date),
            schedule_ids: Vec::new(),
            status: None,
            ..q.clone()
        };
        let mut ids: Vec<i64> = self
            .fetch_records(&probe)
            .await
            .iter()
            .map(|r| r.student)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Vec::new();
        }
        let query = ids
            .iter()
            .fold(Query::new(), |query, id| query.push("id", id));
        self.client
            .list_or_empty::<StudentProfile>(STUDENTS, &query)
            .await
            .items
    }

    /// 把筛选范围内的学生当天考勤全部设为正常
    pub async fn mark_all_present(&mut self) -> Result<MarkAllSummary, ClientError> {
        self.ensure_editable()?;
        let date = self.query.date.unwrap_or_else(Self::today);

        let keyword = self.query.q.trim().to_owned();
        let students: Vec<StudentProfile> = self
            .students_for_mark_all(date)
            .await
            .into_iter()
            .filter(|s| self.query.class_id.map_or(true, |c| s.school_class == Some(c)))
            .filter(|s| self.query.student.map_or(true, |id| s.id == id))
            .filter(|s| {
                keyword.is_empty()
                    || s.student_id.as_deref().unwrap_or("").contains(&keyword)
                    || s.display_name().contains(&keyword)
            })
            .collect();

        let mut summary = MarkAllSummary::default();
        let mut updated_ids = Vec::new();
        for student in &students {
            match self.mark_present(student.id, date).await {
                Ok(()) => {
                    summary.updated += 1;
                    updated_ids.push(student.id);
                }
                Err(e) => {
                    tracing::error!("更新学生考勤失败 ({}): {}", student.id, e);
                    summary.failed += 1;
                }
            }
        }

        if !updated_ids.is_empty() {
            self.bus
                .publish(AttendanceChange::BatchUpdated {
                    student_ids: updated_ids,
                })
                .await;
        }
        tracing::info!("一键全勤：成功 {} 人，失败 {} 人", summary.updated, summary.failed);
        self.refresh().await;
        Ok(summary)
    }

    async fn mark_present(&self, student: i64, date: NaiveDate) -> Result<(), ClientError> {
        let query = Query::new().push("student", student).push("date", date);
        let existing: Page<AttendanceRecord> = self.client.list(RECORDS, &query).await?;
        match existing.items.first() {
            Some(rec) => {
                self.patch_record(rec.id, json!({ "status": AttendanceStatus::Present }))
                    .await?;
            }
            None => {
                let body = CreateAttendanceSchema {
                    student,
                    date,
                    status: AttendanceStatus::Present,
                    remark: String::new(),
                };
                self.client.post(RECORDS, &body).await?;
            }
        }
        Ok(())
    }
}
