// src/timetable/controller.rs
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::grid::{DragPayload, Lookups, Timetable, ViewMode, Viewer, MAX_WEEK};
use super::slots::{weekday_name, Completeness, SlotIndex, SlotKey};
use crate::api::{ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::{
    Classroom, Course, CreateCourseSchema, CreateScheduleSchema, MoveScheduleSchema, Schedule,
    TimeSlot,
};
use crate::prefs::{PrefStore, SCHEDULE_FILTERS};
use crate::validation::Validated;

const TIMESLOTS: &str = "/api/courses/timeslots/";
const SCHEDULES: &str = "/api/courses/schedules/";
const COURSES: &str = "/api/courses/courses/";

/// 课表筛选条件，保存在偏好存储中
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleFilters {
    #[serde(default)]
    pub college_id: Option<i64>,
    #[serde(default)]
    pub major_id: Option<i64>,
    #[serde(default)]
    pub grade_id: Option<i64>,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub week: u8,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// 管理视图下还没有选择班级
    NeedsTarget,
    Empty,
    Loaded { count: usize, unplaced: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConflictItem {
    #[serde(default)]
    pub timeslot: Option<i64>,
    #[serde(default)]
    pub week_number: Option<u8>,
    #[serde(default)]
    pub conflict_types: Vec<String>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub schedule_ids: Vec<i64>,
}

impl ConflictItem {
    pub fn describe(&self, slots: &SlotIndex) -> String {
        let slot = self.timeslot.and_then(|id| slots.by_id(id));
        let when = match slot {
            Some(s) => format!(
                "{} 第{}节 ({}-{})",
                weekday_name(s.weekday),
                s.index,
                s.start_time.as_deref().unwrap_or("?"),
                s.end_time.as_deref().unwrap_or("?")
            ),
            None => "未知时间".to_owned(),
        };
        format!(
            "第{}周 {}；冲突类型：{}；涉及课程数：{} 节",
            self.week_number.unwrap_or(0),
            when,
            self.conflict_types.join("、"),
            self.count
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConflictReport {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub items: Vec<ConflictItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OptimizeResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub optimized: u64,
    #[serde(default)]
    pub failed: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoScheduleSummary {
    pub created: u64,
    pub failed: usize,
}

impl AutoScheduleSummary {
    pub fn message(&self) -> String {
        let mut msg = format!("智能排课完成：成功排课 {} 节", self.created);
        if self.failed > 0 {
            msg.push_str(&format!("，失败 {} 节", self.failed));
        }
        msg
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub failed: usize,
    /// 目标周已存在或冲突，不算失败
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub created: u64,
    pub completeness: Completeness,
}

#[derive(Debug, Deserialize)]
struct AutoScheduleResponse {
    #[serde(default)]
    created_count: u64,
    #[serde(default)]
    items: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct CopySchedulePayload {
    school_class: Option<i64>,
    course: i64,
    teacher: Option<i64>,
    timeslot: i64,
    week_number: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    classroom: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    classroom_name: Option<String>,
}

/// 课表页面控制器：时间段缓存、课表网格、拖拽排课
pub struct TimetableController {
    client: ApiClient,
    prefs: PrefStore,
    slots: SlotIndex,
    grid: Timetable,
    lookups: Lookups,
    courses: HashMap<i64, Course>,
    filters: ScheduleFilters,
    schedule_timeout: Duration,
    status: Option<String>,
}

impl TimetableController {
    pub fn new(client: ApiClient, prefs: PrefStore, viewer: Viewer, schedule_timeout: Duration) -> Self {
        Self {
            client,
            prefs,
            slots: SlotIndex::default(),
            grid: Timetable::new(viewer),
            lookups: Lookups::default(),
            courses: HashMap::new(),
            filters: ScheduleFilters::default(),
            schedule_timeout,
            status: None,
        }
    }

    pub fn grid(&self) -> &Timetable {
        &self.grid
    }

    pub fn slots(&self) -> &SlotIndex {
        &self.slots
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn filters(&self) -> &ScheduleFilters {
        &self.filters
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!("{}", msg);
        self.status = Some(msg);
    }

    fn require_class_target(&self, hint: &str) -> Result<i64, ClientError> {
        match self.grid.target_id {
            Some(id) if self.grid.view_mode == ViewMode::Class => Ok(id),
            _ => Err(ClientError::Invalid(hint.to_owned())),
        }
    }

    // --- 1. 时间段 ---

    pub async fn init_slots(&mut self) -> Result<Completeness, ClientError> {
        let raw = match self.client.get(TIMESLOTS, &Query::new()).await {
            Ok(v) => v,
            Err(e) => {
                self.slots = SlotIndex::default();
                self.set_status(format!("时间段数据加载失败: {}", e));
                return Err(e);
            }
        };
        self.slots = SlotIndex::from_slots(Page::<TimeSlot>::from_value_lossy(raw).items);
        let report = self.slots.completeness();
        if self.slots.is_empty() {
            tracing::warn!("时间段数据为空，请先生成时间段");
            self.set_status("时间段数据未加载！请先生成时间段或联系管理员。");
        } else if let Some(warning) = report.warning() {
            tracing::warn!("{}", warning);
            self.status = Some(warning);
        }
        Ok(report)
    }

    pub async fn generate_slots(&mut self) -> Result<GenerateReport, ClientError> {
        let result = self.client.post("/api/courses/timeslots/generate", &json!({})).await?;
        let created = result.get("created").and_then(Value::as_u64).unwrap_or(0);
        let completeness = self.init_slots().await?;
        if completeness.is_complete() {
            self.set_status(format!("时间段生成成功！已创建 {} 个时间段，所有时间段完整。", created));
        } else {
            self.set_status(format!(
                "已创建 {} 个时间段，仍有 {} 个时间段缺失。",
                created,
                completeness.missing.len()
            ));
        }
        Ok(GenerateReport {
            created,
            completeness,
        })
    }

    /// 缓存 → 线性扫描 → 实时查询服务器
    async fn resolve_slot(&mut self, key: SlotKey) -> Result<TimeSlot, ClientError> {
        if let Some(slot) = self.slots.find(key) {
            return Ok(slot);
        }
        if self.slots.is_empty() {
            return Err(ClientError::SlotsNotLoaded);
        }

        tracing::warn!("时间段 {} 不在本地缓存，向服务器查询", key);
        let live = match self.client.get(TIMESLOTS, &Query::new()).await {
            Ok(v) => Page::<TimeSlot>::from_value_lossy(v).items,
            Err(e) => {
                tracing::error!("查询时间段失败: {}", e);
                return Err(ClientError::Invalid("无法验证时间段，请刷新页面后重试".into()));
            }
        };

        if let Some(found) = live
            .iter()
            .find(|s| s.weekday == key.weekday && s.index == key.index)
            .cloned()
        {
            self.slots.insert(found.clone());
            return Ok(found);
        }

        let mut available: Vec<u8> = live
            .iter()
            .filter(|s| s.weekday == key.weekday)
            .map(|s| s.index)
            .collect();
        available.sort_unstable();
        available.dedup();
        Err(ClientError::SlotMissing {
            weekday: key.weekday,
            index: key.index,
            available,
        })
    }

    // --- 2. 课程列表 (左侧拖拽面板) ---

    pub async fn load_courses(&mut self, query: &Query) -> Result<usize, ClientError> {
        let page: Page<Course> = self.client.list(COURSES, query).await?;
        self.courses.clear();
        for course in page.items {
            self.lookups.courses.insert(course.id, course.name.clone());
            if let (Some(t), Some(name)) = (course.teacher, course.teacher_name.clone()) {
                self.lookups.teachers.insert(t, name);
            }
            self.courses.insert(course.id, course);
        }
        Ok(self.courses.len())
    }

    /// 教室名称映射，失败时保持为空
    pub async fn load_rooms(&mut self) {
        let page: Page<Classroom> = self
            .client
            .list_or_empty("/api/org/classrooms/", &Query::new())
            .await;
        self.lookups.rooms = page.items.into_iter().map(|r| (r.id, r.name)).collect();
    }

    pub fn palette(&self) -> Vec<&Course> {
        let mut list: Vec<&Course> = self.courses.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        list
    }

    pub async fn add_course(&mut self, schema: Validated<CreateCourseSchema>) -> Result<Course, ClientError> {
        let created: Course = serde_json::from_value(self.client.post(COURSES, &*schema).await?)?;
        self.lookups.courses.insert(created.id, created.name.clone());
        self.courses.insert(created.id, created.clone());
        Ok(created)
    }

    pub async fn update_course(&mut self, id: i64, patch: &Value) -> Result<(), ClientError> {
        self.client
            .patch(&format!("{}{}/", COURSES, id), patch)
            .await?;
        Ok(())
    }

    pub async fn delete_course(&mut self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&format!("{}{}/", COURSES, id)).await?;
        self.courses.remove(&id);
        Ok(())
    }

    // --- 3. 课表加载 ---

    pub async fn select_target(&mut self, mode: ViewMode, target_id: Option<i64>) -> Result<LoadOutcome, ClientError> {
        self.grid.select_target(mode, target_id);
        if mode == ViewMode::Class {
            self.filters.class_id = target_id;
        }
        self.save_filters().await;
        self.load_week().await
    }

    pub async fn load_week(&mut self) -> Result<LoadOutcome, ClientError> {
        if self.grid.viewer.needs_target() && self.grid.target_id.is_none() {
            self.grid.clear();
            self.set_status("请先选择班级");
            return Ok(LoadOutcome::NeedsTarget);
        }

        let mut query = Query::new().push("week_number", self.grid.week);
        if self.grid.viewer.needs_target() {
            query = query.push_opt(self.grid.view_mode.query_key(), self.grid.target_id);
        }

        let fetch = self.client.list::<Schedule>(SCHEDULES, &query);
        let page = match self.client.call_with_timeout(self.schedule_timeout, fetch).await {
            Ok(page) => page,
            Err(e) => {
                self.grid.clear();
                match &e {
                    ClientError::Timeout(_) => self.set_status("加载超时，请刷新页面重试"),
                    other => self.set_status(format!("加载课表失败: {}", other)),
                }
                return Err(e);
            }
        };

        if page.items.is_empty() {
            self.grid.clear();
            self.set_status("本周暂无课程安排");
            return Ok(LoadOutcome::Empty);
        }

        if self.slots.is_empty() {
            // 时间段为空时先重新加载；失败也继续渲染
            let _ = self.init_slots().await;
        }
        let mut report = self.grid.render(&page.items, &mut self.slots, &self.lookups);
        if !report.unplaced.is_empty() {
            tracing::warn!("{} 节课无法放入课表，重新加载时间段后重试", report.unplaced.len());
            if self.init_slots().await.is_ok() {
                report = self.grid.render(&page.items, &mut self.slots, &self.lookups);
            }
        }

        self.set_status(format!("已加载课表，共 {} 节课", page.items.len()));
        Ok(LoadOutcome::Loaded {
            count: page.items.len(),
            unplaced: report.unplaced.len(),
        })
    }

    /// 写操作之后刷新；刷新失败不影响写操作的结果
    async fn reload(&mut self) {
        if let Err(e) = self.load_week().await {
            tracing::warn!("刷新课表失败: {}", e);
        }
    }

    // --- 4. 拖拽与增删改 ---

    pub async fn drop_on(&mut self, payload: DragPayload, key: SlotKey) -> Result<(), ClientError> {
        if !self.grid.viewer.can_edit() {
            return Err(ClientError::Invalid("只有管理员可以调整课表".into()));
        }
        match payload {
            DragPayload::PaletteCourse(course_id) => {
                self.create_schedule(course_id, key).await?;
            }
            DragPayload::Existing(schedule_id) => {
                self.move_schedule(schedule_id, key).await?;
            }
        }
        Ok(())
    }

    pub async fn create_schedule(&mut self, course_id: i64, key: SlotKey) -> Result<Value, ClientError> {
        let Some(target) = self.grid.target_id else {
            return Err(ClientError::Invalid("请先选择班级/教师/教室".into()));
        };
        let slot = self.resolve_slot(key).await?;

        let course = self
            .courses
            .get(&course_id)
            .cloned()
            .ok_or_else(|| ClientError::Invalid(format!("课程 {} 不在课程列表中", course_id)))?;
        let Some(teacher) = course.teacher else {
            return Err(ClientError::Invalid(
                "该课程未指定授课教师，请先编辑课程添加教师后再排课".into(),
            ));
        };
        if self.grid.view_mode != ViewMode::Class {
            return Err(ClientError::Invalid("请先选择班级进行排课".into()));
        }

        let payload = Validated::new(CreateScheduleSchema {
            course: course_id,
            timeslot: slot.id,
            week_number: self.grid.week,
            school_class: target,
            teacher,
            classroom_name: course.classroom.clone().filter(|r| !r.trim().is_empty()),
        })?;
        let created = self.client.post(SCHEDULES, &*payload).await?;
        self.set_status("排课成功");
        self.reload().await;
        Ok(created)
    }

    pub async fn move_schedule(&mut self, schedule_id: i64, key: SlotKey) -> Result<(), ClientError> {
        let slot = self.resolve_slot(key).await?;
        self.client
            .patch(
                &format!("{}{}/", SCHEDULES, schedule_id),
                &MoveScheduleSchema { timeslot: slot.id },
            )
            .await?;
        self.set_status(format!("已调整到{}第{}节", weekday_name(key.weekday), key.index));
        self.reload().await;
        Ok(())
    }

    pub async fn delete_schedule(&mut self, schedule_id: i64) -> Result<(), ClientError> {
        if !self.grid.viewer.can_edit() {
            return Err(ClientError::Invalid("只有管理员可以删除排课".into()));
        }
        self.client
            .delete(&format!("{}{}/", SCHEDULES, schedule_id))
            .await?;
        self.reload().await;
        Ok(())
    }

    // --- 5. 冲突、智能排课、同步、重置 ---

    pub async fn check_conflicts(&mut self) -> Result<ConflictReport, ClientError> {
        let Some(target) = self.grid.target_id else {
            return Err(ClientError::Invalid("请先选择查看对象".into()));
        };
        let query = Query::new().push(self.grid.view_mode.query_key(), target);
        let report: ConflictReport = self
            .client
            .get_as("/api/courses/schedules/conflicts/", &query)
            .await?;

        if report.count == 0 {
            self.grid.clear_conflicts();
            self.set_status("未发现任何冲突，课程安排正常！");
        } else {
            self.grid.highlight_conflicts(
                report
                    .items
                    .iter()
                    .flat_map(|c| c.schedule_ids.iter().copied()),
            );
            self.set_status(format!("发现 {} 处冲突", report.items.len()));
        }
        Ok(report)
    }

    pub async fn optimize_conflicts(&mut self) -> Result<OptimizeResult, ClientError> {
        let target = self.require_class_target("只能对班级课表进行自动优化")?;
        let result: OptimizeResult = serde_json::from_value(
            self.client
                .post(
                    "/api/courses/schedules/optimize-conflicts",
                    &json!({ "school_class": target }),
                )
                .await?,
        )?;
        if result.success {
            self.grid.clear_conflicts();
            self.set_status(format!("已优化 {} 处冲突", result.optimized));
            self.reload().await;
        } else {
            self.set_status(format!(
                "成功优化：{} 处，失败：{} 处",
                result.optimized,
                result.failed.len()
            ));
        }
        Ok(result)
    }

    pub async fn auto_schedule(&mut self, course_ids: &[i64]) -> Result<AutoScheduleSummary, ClientError> {
        if course_ids.is_empty() {
            return Err(ClientError::Invalid("请先选择要排课的课程".into()));
        }
        let target = self.require_class_target("请先选择班级进行智能排课")?;
        let resp: AutoScheduleResponse = serde_json::from_value(
            self.client
                .post(
                    "/api/courses/schedules/auto",
                    &json!({
                        "school_class": target,
                        "courses": course_ids,
                        "start_week": 1,
                        "end_week": MAX_WEEK,
                        "week_mode": "all",
                    }),
                )
                .await?,
        )?;
        let summary = AutoScheduleSummary {
            created: resp.created_count,
            failed: resp
                .items
                .iter()
                .filter(|item| item.get("reason").map_or(false, |r| !r.is_null()))
                .count(),
        };
        self.set_status(summary.message());
        self.reload().await;
        Ok(summary)
    }

    /// 把当前周的排课复制到第 1-20 周的其余各周
    pub async fn sync_week_to_all(&mut self) -> Result<SyncSummary, ClientError> {
        let target = self.require_class_target("请先选择班级")?;
        let current = self.grid.week;
        let query = Query::new()
            .push("school_class", target)
            .push("week_number", current);
        let page: Page<Schedule> = self.client.list(SCHEDULES, &query).await?;
        if page.items.is_empty() {
            return Err(ClientError::Invalid("当前周没有课程安排需要保存".into()));
        }

        let mut summary = SyncSummary::default();
        for sch in &page.items {
            for week in (1..=MAX_WEEK).filter(|w| *w != current) {
                let payload = CopySchedulePayload {
                    school_class: sch.school_class,
                    course: sch.course,
                    teacher: sch.teacher,
                    timeslot: sch.timeslot.id(),
                    week_number: week,
                    classroom: sch.classroom,
                    classroom_name: sch.classroom_name.clone(),
                };
                match self.client.post(SCHEDULES, &payload).await {
                    Ok(_) => summary.created += 1,
                    Err(ClientError::Api(e)) if e.is_schedule_conflict() => summary.skipped += 1,
                    Err(e) => {
                        tracing::warn!("同步第{}周失败: {}", week, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        self.set_status(if summary.failed > 0 {
            format!("同步完成：成功{}个，失败{}个", summary.created, summary.failed)
        } else {
            format!("同步完成：已同步{}个课程安排", summary.created)
        });
        self.reload().await;
        Ok(summary)
    }

    /// 删除该班级所有周次的排课
    pub async fn reset_class(&mut self) -> Result<u64, ClientError> {
        let target = self.require_class_target("请先选择要重置的班级")?;
        let result = self
            .client
            .post(
                "/api/courses/schedules/bulk_delete/",
                &json!({ "school_class": target }),
            )
            .await;
        let deleted = match result {
            Ok(v) => v.get("deleted").and_then(Value::as_u64).unwrap_or(0),
            Err(e) => {
                self.reload().await;
                return Err(e);
            }
        };
        self.grid.clear();
        self.reload().await;
        self.set_status(format!("已删除 {} 条课程安排，筛选条件已保持", deleted));
        Ok(deleted)
    }

    // --- 6. 周次与筛选条件 ---

    pub async fn set_week(&mut self, week: u8) -> Result<LoadOutcome, ClientError> {
        self.grid.set_week(week);
        self.save_filters().await;
        self.load_week().await
    }

    /// 已在第 1 周时不做任何事
    pub async fn prev_week(&mut self) -> Result<Option<LoadOutcome>, ClientError> {
        if !self.grid.prev_week() {
            return Ok(None);
        }
        self.save_filters().await;
        self.load_week().await.map(Some)
    }

    pub async fn next_week(&mut self) -> Result<Option<LoadOutcome>, ClientError> {
        if !self.grid.next_week() {
            return Ok(None);
        }
        self.save_filters().await;
        self.load_week().await.map(Some)
    }

    pub fn set_filters(&mut self, filters: ScheduleFilters) {
        self.filters = filters;
    }

    async fn save_filters(&mut self) {
        self.filters.week = self.grid.week;
        self.filters.timestamp = chrono::Utc::now().timestamp_millis();
        if let Err(e) = self.prefs.set(SCHEDULE_FILTERS, &self.filters).await {
            tracing::warn!("保存筛选条件失败: {}", e);
        }
    }

    /// 恢复上次的班级与周次；没有保存过时返回 false
    pub async fn restore_filters(&mut self) -> bool {
        let saved = self
            .prefs
            .get::<ScheduleFilters>(SCHEDULE_FILTERS)
            .await
            .ok()
            .flatten();
        let Some(saved) = saved else {
            return false;
        };
        if saved.week >= 1 {
            self.grid.set_week(saved.week);
        }
        if saved.class_id.is_some() {
            self.grid.select_target(ViewMode::Class, saved.class_id);
        }
        self.filters = saved;
        true
    }

    pub async fn clear_filters(&mut self) -> Result<(), ClientError> {
        self.filters = ScheduleFilters::default();
        self.prefs.remove(SCHEDULE_FILTERS).await
    }
}
