// src/timetable/grid.rs
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::slots::{SlotIndex, SlotKey, DAYS_PER_WEEK};
use crate::models::Schedule;
use crate::session::RoleSet;

pub const MAX_WEEK: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    #[default]
    Class,
    Teacher,
    Classroom,
}

impl ViewMode {
    /// 查询课表时使用的参数名
    pub fn query_key(&self) -> &'static str {
        match self {
            ViewMode::Class => "school_class",
            ViewMode::Teacher => "teacher",
            ViewMode::Classroom => "classroom",
        }
    }
}

/// 当前查看课表的人
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// 管理员：完整信息，可拖拽和删除
    Admin,
    /// 院长等：完整信息，只读
    Observer,
    Teacher,
    Student,
}

impl Viewer {
    pub fn from_roles(roles: &RoleSet) -> Self {
        if roles.is_admin() {
            Viewer::Admin
        } else if roles.is_teacher() {
            Viewer::Teacher
        } else if roles.is_student() {
            Viewer::Student
        } else {
            Viewer::Observer
        }
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, Viewer::Admin)
    }

    /// 教师和学生看到的是自己的课表，不需要选择目标
    pub fn needs_target(&self) -> bool {
        matches!(self, Viewer::Admin | Viewer::Observer)
    }
}

/// 拖拽来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPayload {
    /// 左侧课程卡片
    PaletteCourse(i64),
    /// 已在课表中的课程块
    Existing(i64),
}

/// 本地名称映射，排课记录缺少名称时使用
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub courses: HashMap<i64, String>,
    pub teachers: HashMap<i64, String>,
    pub rooms: HashMap<i64, String>,
}

/// 课表中的一个课程块
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleBlock {
    pub schedule_id: i64,
    pub key: SlotKey,
    pub timeslot_id: i64,
    pub lines: Vec<String>,
    pub draggable: bool,
    pub deletable: bool,
    pub conflict: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub placed: usize,
    /// 时间段无法解析的排课 id
    pub unplaced: Vec<i64>,
}

/// 一行网格 (同一节次的七天)
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow<'a> {
    pub index: u8,
    pub label: String,
    pub cells: Vec<(SlotKey, &'a [ScheduleBlock])>,
}

/// 课表视图模型
#[derive(Debug, Clone)]
pub struct Timetable {
    pub week: u8,
    pub view_mode: ViewMode,
    pub target_id: Option<i64>,
    pub viewer: Viewer,
    cells: BTreeMap<SlotKey, Vec<ScheduleBlock>>,
    unplaced: Vec<i64>,
    conflicts: HashSet<i64>,
}

impl Timetable {
    pub fn new(viewer: Viewer) -> Self {
        Self {
            week: 1,
            view_mode: ViewMode::Class,
            target_id: None,
            viewer,
            cells: BTreeMap::new(),
            unplaced: Vec::new(),
            conflicts: HashSet::new(),
        }
    }

    /// 周次限制在 1..=20，返回是否发生变化
    pub fn set_week(&mut self, week: u8) -> bool {
        let week = week.clamp(1, MAX_WEEK);
        let changed = week != self.week;
        self.week = week;
        changed
    }

    pub fn prev_week(&mut self) -> bool {
        self.set_week(self.week.saturating_sub(1))
    }

    pub fn next_week(&mut self) -> bool {
        self.set_week(self.week.saturating_add(1))
    }

    pub fn select_target(&mut self, mode: ViewMode, target_id: Option<i64>) {
        if mode != self.view_mode || target_id != self.target_id {
            self.clear();
        }
        self.view_mode = mode;
        self.target_id = target_id;
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.unplaced.clear();
        self.conflicts.clear();
    }

    /// 用一周的排课记录重建网格
    pub fn render(
        &mut self,
        schedules: &[Schedule],
        slots: &mut SlotIndex,
        lookups: &Lookups,
    ) -> RenderReport {
        self.cells.clear();
        self.unplaced.clear();
        let mut report = RenderReport::default();

        for sch in schedules {
            let Some(slot) = slots.resolve_ref(&sch.timeslot) else {
                tracing::warn!("排课 {} 的时间段 {} 无法解析", sch.id, sch.timeslot.id());
                self.unplaced.push(sch.id);
                report.unplaced.push(sch.id);
                continue;
            };
            let Some(key) = SlotKey::of(&slot) else {
                self.unplaced.push(sch.id);
                report.unplaced.push(sch.id);
                continue;
            };
            if self.place(sch, key, slot.id, lookups) {
                report.placed += 1;
            }
        }
        report
    }

    fn place(&mut self, sch: &Schedule, key: SlotKey, timeslot_id: i64, lookups: &Lookups) -> bool {
        let cell = self.cells.entry(key).or_default();
        if cell.iter().any(|b| b.schedule_id == sch.id) {
            return false;
        }
        let editable = self.viewer.can_edit();
        cell.push(ScheduleBlock {
            schedule_id: sch.id,
            key,
            timeslot_id,
            lines: block_lines(self.viewer, sch, lookups),
            draggable: editable,
            deletable: editable,
            conflict: self.conflicts.contains(&sch.id),
        });
        true
    }

    pub fn cell(&self, key: SlotKey) -> &[ScheduleBlock] {
        self.cells.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ScheduleBlock> {
        self.cells.values().flatten()
    }

    pub fn block_count(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }

    pub fn find_block(&self, schedule_id: i64) -> Option<&ScheduleBlock> {
        self.blocks().find(|b| b.schedule_id == schedule_id)
    }

    pub fn unplaced(&self) -> &[i64] {
        &self.unplaced
    }

    /// 渲染用的行，节次数取自时间段索引
    pub fn rows<'a>(&'a self, slots: &SlotIndex) -> Vec<GridRow<'a>> {
        (1..=slots.max_index())
            .map(|index| GridRow {
                index,
                label: slots.label(index),
                cells: (1..=DAYS_PER_WEEK)
                    .map(|weekday| {
                        let key = SlotKey { weekday, index };
                        (key, self.cell(key))
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn highlight_conflicts(&mut self, schedule_ids: impl IntoIterator<Item = i64>) {
        self.conflicts = schedule_ids.into_iter().collect();
        for block in self.cells.values_mut().flatten() {
            block.conflict = self.conflicts.contains(&block.schedule_id);
        }
    }

    pub fn clear_conflicts(&mut self) {
        self.highlight_conflicts(std::iter::empty());
    }

    pub fn conflict_count(&self) -> usize {
        self.blocks().filter(|b| b.conflict).count()
    }
}

/// 课程块显示内容随查看者变化
fn block_lines(viewer: Viewer, sch: &Schedule, lookups: &Lookups) -> Vec<String> {
    let course = sch
        .course_name
        .clone()
        .or_else(|| lookups.courses.get(&sch.course).cloned())
        .unwrap_or_else(|| format!("课程#{}", sch.course));
    let teacher = sch
        .teacher_name
        .clone()
        .or_else(|| sch.teacher.and_then(|t| lookups.teachers.get(&t).cloned()))
        .unwrap_or_else(|| "-".into());
    let class = sch.class_name.clone().unwrap_or_else(|| "-".into());
    let room = sch
        .classroom_name
        .clone()
        .filter(|r| !r.is_empty())
        .or_else(|| sch.classroom.and_then(|r| lookups.rooms.get(&r).cloned()))
        .unwrap_or_else(|| "-".into());

    match viewer {
        Viewer::Teacher => vec![class, room],
        Viewer::Student => vec![course, teacher, format!("@{}", room)],
        Viewer::Admin | Viewer::Observer => vec![
            course,
            format!("班级: {}", class),
            format!("教师: {}", teacher),
            format!("教室: {}", room),
        ],
    }
}
