// src/bulletin.rs
use std::collections::BTreeSet;

use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

use crate::api::{ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::{CalendarEvent, Notice};
use crate::prefs::PrefStore;
use crate::session::{role_display, RoleSet};
use crate::validation::Validated;

const TOP_NOTICE_LIMIT: usize = 5;

fn local_time(t: &Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.with_timezone(&Local).format("%Y/%-m/%-d %H:%M:%S").to_string())
}

fn publisher(name: &Option<String>, role: &Option<String>) -> String {
    format!(
        "{}（{}）",
        name.as_deref().unwrap_or(""),
        role_display(role.as_deref().unwrap_or(""))
    )
}

pub fn scope_label(scope: Option<&str>) -> &'static str {
    if scope == Some("all") {
        "全校"
    } else {
        "教师范围"
    }
}

pub fn event_type_label(event_type: &str) -> &str {
    match event_type {
        "campus" => "全校活动",
        "teaching" => "教学安排",
        "meeting" => "会议",
        "custom" => "自定义",
        other => other,
    }
}

pub fn visibility_label(visibility: &str) -> &str {
    match visibility {
        "all" => "全校范围",
        "college" => "学院范围",
        other => other,
    }
}

// --- 1. 公告 / 日程 共用的列表 ---

/// 可以放进公告栏列表的记录
pub trait BoardItem: DeserializeOwned {
    const PATH: &'static str;

    fn id(&self) -> i64;

    fn title(&self) -> &str;

    /// 列表中的一行摘要
    fn list_line(&self) -> String;

    /// 详情弹窗里的元信息
    fn meta(&self) -> String;

    /// 列表请求的额外参数
    fn extra_params(query: Query) -> Query {
        query
    }

    fn detail(&self) -> Detail {
        Detail {
            title: self.title().to_owned(),
            meta: self.meta(),
        }
    }
}

impl BoardItem for Notice {
    const PATH: &'static str = "/api/notices/notices/";

    fn id(&self) -> i64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn list_line(&self) -> String {
        format!(
            "#{} {} · {} · 发布者：{}",
            self.id,
            self.title,
            scope_label(self.scope.as_deref()),
            publisher(&self.created_by_name, &self.created_by_role)
        )
    }

    fn meta(&self) -> String {
        let mut meta = format!(
            "{} · {}",
            publisher(&self.created_by_name, &self.created_by_role),
            scope_label(self.scope.as_deref())
        );
        if let Some(time) = local_time(&self.created_at) {
            meta.push_str(" · ");
            meta.push_str(&time);
        }
        meta
    }
}

impl BoardItem for CalendarEvent {
    const PATH: &'static str = "/api/calendar/events/";

    fn id(&self) -> i64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn list_line(&self) -> String {
        let college = self
            .college_name
            .as_deref()
            .map(|c| format!("({})", c))
            .unwrap_or_default();
        format!(
            "#{} {} · {}{} · 发布者：{}",
            self.id,
            self.title,
            self.visibility.as_deref().unwrap_or(""),
            college,
            publisher(&self.created_by_name, &self.created_by_role)
        )
    }

    fn meta(&self) -> String {
        let college = self
            .college_name
            .as_deref()
            .map(|c| format!("（{}）", c))
            .unwrap_or_default();
        let window = match (local_time(&self.start_time), local_time(&self.end_time)) {
            (Some(s), Some(e)) => format!("{} ~ {}", s, e),
            _ => String::new(),
        };
        format!(
            "{} · {}{} · {} · 发布者：{}",
            event_type_label(self.event_type.as_deref().unwrap_or("")),
            visibility_label(self.visibility.as_deref().unwrap_or("")),
            college,
            window,
            publisher(&self.created_by_name, &self.created_by_role)
        )
    }

    /// 防止浏览器/代理缓存
    fn extra_params(query: Query) -> Query {
        query.push("ts", Utc::now().timestamp_millis())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardFilter {
    pub q: String,
    pub mine: bool,
    pub publisher_role: Option<String>,
}

impl BoardFilter {
    pub fn to_query(&self) -> Query {
        let query = Query::new().push_nonempty("q", &self.q);
        let query = if self.mine { query.push("mine", 1) } else { query };
        query.push_opt("publisher_role", self.publisher_role.as_deref())
    }
}

/// 详情弹窗
#[derive(Debug, Clone, PartialEq)]
pub struct Detail {
    pub title: String,
    pub meta: String,
}

pub struct Board<T: BoardItem> {
    client: ApiClient,
    roles: RoleSet,
    filter: BoardFilter,
    items: Vec<T>,
    selected: BTreeSet<i64>,
}

pub type NoticeBoard = Board<Notice>;
pub type EventBoard = Board<CalendarEvent>;

impl<T: BoardItem> Board<T> {
    pub fn new(client: ApiClient, roles: RoleSet) -> Self {
        Self {
            client,
            roles,
            filter: BoardFilter::default(),
            items: Vec::new(),
            selected: BTreeSet::new(),
        }
    }

    /// 只有校领导和院长可以发布/删除
    pub fn can_manage(&self) -> bool {
        self.roles.is_manager()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn selected(&self) -> &BTreeSet<i64> {
        &self.selected
    }

    pub async fn load(&mut self, filter: BoardFilter) -> Result<&[T], ClientError> {
        self.filter = filter;
        self.reload().await?;
        Ok(&self.items)
    }

    pub async fn reload(&mut self) -> Result<(), ClientError> {
        let query = T::extra_params(self.filter.to_query());
        let page: Page<T> = self.client.list(T::PATH, &query).await?;
        self.items = page.items;
        Ok(())
    }

    pub fn toggle(&mut self, id: i64, checked: bool) {
        if checked {
            self.selected.insert(id);
        } else {
            self.selected.remove(&id);
        }
    }

    pub fn select_all(&mut self, checked: bool) {
        if checked {
            self.selected = self.items.iter().map(|item| item.id()).collect();
        } else {
            self.selected.clear();
        }
    }

    pub async fn view(&self, id: i64) -> Result<T, ClientError> {
        self.client
            .get_as(&format!("{}{}/", T::PATH, id), &Query::new())
            .await
    }

    fn ensure_manager(&self) -> Result<(), ClientError> {
        if self.can_manage() {
            Ok(())
        } else {
            Err(ClientError::Invalid("无权限".into()))
        }
    }

    pub async fn create<S: Serialize + Validate>(&mut self, schema: Validated<S>) -> Result<(), ClientError> {
        self.ensure_manager()?;
        self.client.post(T::PATH, &*schema).await?;
        tracing::info!("已发布 {}", T::PATH);
        self.reload().await
    }

    pub async fn delete(&mut self, id: i64) -> Result<(), ClientError> {
        self.ensure_manager()?;
        self.client
            .delete(&format!("{}{}/", T::PATH, id))
            .await?;
        self.selected.remove(&id);
        self.reload().await
    }

    /// 逐条删除选中项，单条失败忽略；返回成功条数
    pub async fn delete_selected(&mut self) -> Result<usize, ClientError> {
        self.ensure_manager()?;
        if self.selected.is_empty() {
            return Ok(0);
        }
        let mut deleted = 0;
        for id in std::mem::take(&mut self.selected) {
            match self.client.delete(&format!("{}{}/", T::PATH, id)).await {
                Ok(_) => deleted += 1,
                Err(e) => tracing::warn!("删除 #{} 失败: {}", id, e),
            }
        }
        self.reload().await?;
        Ok(deleted)
    }
}

// --- 2. 顶栏公告菜单 ---

/// 最新公告时间晚于上次查看时间时显示红点
pub fn has_unread(items: &[Notice], last_seen_ms: i64) -> bool {
    latest_ms(items) > last_seen_ms
}

fn latest_ms(items: &[Notice]) -> i64 {
    items
        .iter()
        .filter_map(|n| n.created_at.map(|t| t.timestamp_millis()))
        .max()
        .unwrap_or(0)
}

pub struct TopNotices {
    client: ApiClient,
    prefs: PrefStore,
    items: Vec<Notice>,
    latest_ms: i64,
    unread: bool,
}

impl TopNotices {
    pub fn new(client: ApiClient, prefs: PrefStore) -> Self {
        Self {
            client,
            prefs,
            items: Vec::new(),
            latest_ms: 0,
            unread: false,
        }
    }

    pub fn items(&self) -> &[Notice] {
        &self.items
    }

    pub fn has_unread(&self) -> bool {
        self.unread
    }

    /// 取第一页前 5 条；403 不记错误
    pub async fn refresh(&mut self) {
        let query = Query::new().push("page", 1);
        self.items = match self.client.list::<Notice>(Notice::PATH, &query).await {
            Ok(page) => page.items.into_iter().take(TOP_NOTICE_LIMIT).collect(),
            Err(e) => {
                if !e.is_forbidden() {
                    tracing::error!("加载公告失败: {}", e);
                }
                Vec::new()
            }
        };
        self.latest_ms = latest_ms(&self.items);
        let last_seen = self.prefs.notice_last_seen().await;
        self.unread = !self.items.is_empty() && self.latest_ms > last_seen;
    }

    /// 打开菜单：记下已看到的最新时间
    pub async fn open(&mut self) -> Result<(), ClientError> {
        self.unread = false;
        let seen = if self.latest_ms > 0 {
            self.latest_ms
        } else {
            Utc::now().timestamp_millis()
        };
        self.prefs.mark_notices_seen(seen).await
    }
}
