// src/dashboard.rs
use serde::Deserialize;

use crate::api::{ApiClient, Query};
use crate::error::ClientError;
use crate::refresh::Generation;

const DASHBOARD: &str = "/api/stats/dashboard";

/// 统计区间
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Range {
    Week,
    #[default]
    Month,
    Term,
}

impl Range {
    pub fn days(&self) -> u32 {
        match self {
            Range::Week => 7,
            Range::Month => 30,
            Range::Term => 120,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Range::Week => "本周",
            Range::Month => "本月",
            Range::Term => "本学期",
        }
    }

    /// 未知取值按本月处理
    pub fn parse(raw: &str) -> Self {
        match raw {
            "week" => Range::Week,
            "term" => Range::Term,
            _ => Range::Month,
        }
    }
}

/// 统计卡片的范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    School,
    College,
    Department,
}

/// 三张卡片的标题
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardLabels {
    pub students: &'static str,
    pub teachers: &'static str,
    pub courses: &'static str,
}

impl Scope {
    pub fn labels(&self) -> CardLabels {
        match self {
            Scope::Department => CardLabels {
                students: "本专业学生数",
                teachers: "本专业教师数",
                courses: "本专业课程数",
            },
            Scope::College => CardLabels {
                students: "本学院学生数",
                teachers: "本学院教师数",
                courses: "本学院课程数",
            },
            Scope::School => CardLabels {
                students: "在校学生总数",
                teachers: "在职教师总数",
                courses: "开设课程总数",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardFilter {
    pub range: Range,
    pub college: Option<i64>,
    pub department: Option<i64>,
}

impl DashboardFilter {
    /// 选了专业时只传专业
    pub fn to_query(&self) -> Query {
        let query = Query::new().push("days", self.range.days());
        match (self.department, self.college) {
            (Some(dept), _) => query.push("department", dept),
            (None, Some(college)) => query.push("college", college),
            (None, None) => query,
        }
    }

    pub fn scope(&self) -> Scope {
        match (self.department, self.college) {
            (Some(_), _) => Scope::Department,
            (None, Some(_)) => Scope::College,
            (None, None) => Scope::School,
        }
    }
}

// --- 后端返回 ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Cards {
    pub students_total: Option<u64>,
    pub teachers_total: Option<u64>,
    pub courses_total: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusCounts {
    pub present: u64,
    pub late: u64,
    pub absent: u64,
    pub leave: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.present + self.late + self.absent + self.leave
    }

    /// 正常出勤占比 (百分数，一位小数)；无记录时为 None
    pub fn attendance_rate(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Some((self.present as f64 * 1000.0 / total as f64).round() / 10.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrendSeries {
    pub present: Vec<u64>,
    pub late: Vec<u64>,
    pub absent: Vec<u64>,
    pub leave: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AttendanceTrend {
    pub dates: Vec<String>,
    pub series: TrendSeries,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Share {
    #[serde(default, alias = "name")]
    pub label: Option<String>,
    #[serde(default)]
    pub value: u64,
}

impl Share {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("未知类型")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub cards: Cards,
    pub attendance_today: StatusCounts,
    pub attendance_trend: Option<AttendanceTrend>,
    pub course_distribution: Vec<Share>,
    pub recent: Vec<RecentItem>,
}

impl DashboardStats {
    /// 课程分布：去掉 0 值，按数量降序
    pub fn distribution(&self) -> Vec<&Share> {
        let mut shares: Vec<&Share> = self
            .course_distribution
            .iter()
            .filter(|s| s.value > 0)
            .collect();
        shares.sort_by(|a, b| b.value.cmp(&a.value));
        shares
    }
}

/// 当前显示内容
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub filter: DashboardFilter,
    pub labels: CardLabels,
    pub stats: DashboardStats,
}

impl DashboardView {
    /// 卡片数值，缺失时显示 `--`
    pub fn card_values(&self) -> [String; 3] {
        let show = |v: Option<u64>| v.map_or_else(|| "--".to_string(), |v| v.to_string());
        let cards = &self.stats.cards;
        [
            show(cards.students_total),
            show(cards.teachers_total),
            show(cards.courses_total),
        ]
    }

    pub fn summary(&self) -> String {
        let [stu, tea, cou] = self.card_values();
        let mut line = format!(
            "[{}] {} {} · {} {} · {} {}",
            self.filter.range.label(),
            self.labels.students,
            stu,
            self.labels.teachers,
            tea,
            self.labels.courses,
            cou
        );
        if let Some(rate) = self.stats.attendance_today.attendance_rate() {
            line.push_str(&format!(" · 今日出勤率 {:.1}%", rate));
        }
        line
    }
}

// --- 仪表盘 ---

/// 一次已发出的请求；可以放到后台任务里执行
pub struct PendingLoad {
    ticket: u64,
    filter: DashboardFilter,
    client: ApiClient,
}

pub struct Fetched {
    ticket: u64,
    filter: DashboardFilter,
    result: Result<DashboardStats, ClientError>,
}

impl PendingLoad {
    pub async fn run(self) -> Fetched {
        let result = self
            .client
            .get_as::<DashboardStats>(DASHBOARD, &self.filter.to_query())
            .await;
        Fetched {
            ticket: self.ticket,
            filter: self.filter,
            result,
        }
    }
}

pub struct Dashboard {
    client: ApiClient,
    filter: DashboardFilter,
    generation: Generation,
    view: Option<DashboardView>,
}

impl Dashboard {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            filter: DashboardFilter::default(),
            generation: Generation::default(),
            view: None,
        }
    }

    pub fn filter(&self) -> DashboardFilter {
        self.filter
    }

    pub fn view(&self) -> Option<&DashboardView> {
        self.view.as_ref()
    }

    pub fn set_range(&mut self, range: Range) {
        self.filter.range = range;
    }

    /// 切换学院时清空专业
    pub fn set_college(&mut self, college: Option<i64>) {
        if self.filter.college != college {
            self.filter.department = None;
        }
        self.filter.college = college;
    }

    pub fn set_department(&mut self, department: Option<i64>) {
        self.filter.department = department;
    }

    /// 按当前筛选发出一次请求
    pub fn request(&mut self) -> PendingLoad {
        PendingLoad {
            ticket: self.generation.issue(),
            filter: self.filter,
            client: self.client.clone(),
        }
    }

    /// 采用返回结果；过期的结果丢弃并返回 false。
    /// 请求失败时保留上一次的内容
    pub fn apply(&mut self, fetched: Fetched) -> Result<bool, ClientError> {
        if !self.generation.accept(fetched.ticket) {
            tracing::debug!("丢弃过期的仪表盘数据 #{}", fetched.ticket);
            return Ok(false);
        }
        let stats = match fetched.result {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("加载仪表盘失败: {}", e);
                return Err(e);
            }
        };
        self.view = Some(DashboardView {
            filter: fetched.filter,
            labels: fetched.filter.scope().labels(),
            stats,
        });
        Ok(true)
    }

    pub async fn load(&mut self) -> Result<&DashboardView, ClientError> {
        let fetched = self.request().run().await;
        self.apply(fetched)?;
        self.view
            .as_ref()
            .ok_or_else(|| ClientError::Invalid("仪表盘数据尚未加载".into()))
    }
}
