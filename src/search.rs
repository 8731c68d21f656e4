// src/search.rs
use std::time::Duration;

use regex::RegexBuilder;
use serde::Deserialize;
use tokio::sync::watch;

use crate::api::{ApiClient, Query};
use crate::error::ClientError;

pub const MIN_QUERY_CHARS: usize = 2;
pub const RESULT_LIMIT: u32 = 5;
pub const DEBOUNCE: Duration = Duration::from_millis(300);

// --- 1. 后端返回 ---

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageHit {
    pub name: String,
    pub description: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StudentHit {
    pub name: String,
    pub student_id: String,
    pub class_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeacherHit {
    pub name: String,
    pub teacher_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CourseHit {
    pub name: String,
    pub department: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassHit {
    pub name: String,
    pub major: String,
    pub college: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassroomHit {
    pub name: String,
    pub location: String,
    pub capacity: Option<u32>,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NoticeHit {
    pub title: String,
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchResults {
    pub pages: Vec<PageHit>,
    pub students: Vec<StudentHit>,
    pub teachers: Vec<TeacherHit>,
    pub courses: Vec<CourseHit>,
    pub classes: Vec<ClassHit>,
    pub classrooms: Vec<ClassroomHit>,
    pub notices: Vec<NoticeHit>,
}

impl SearchResults {
    pub fn total(&self) -> usize {
        self.pages.len()
            + self.students.len()
            + self.teachers.len()
            + self.courses.len()
            + self.classes.len()
            + self.classrooms.len()
            + self.notices.len()
    }
}

// --- 2. 高亮 ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub hit: bool,
}

/// 按关键字 (不区分大小写) 切分文本
pub fn highlight(text: &str, query: &str) -> Vec<Segment> {
    let plain = || {
        vec![Segment {
            text: text.to_owned(),
            hit: false,
        }]
    };
    let query = query.trim();
    if query.is_empty() || text.is_empty() {
        return plain();
    }
    let re = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re,
        Err(_) => return plain(),
    };

    let mut segments = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        if m.start() > last {
            segments.push(Segment {
                text: text[last..m.start()].to_owned(),
                hit: false,
            });
        }
        segments.push(Segment {
            text: m.as_str().to_owned(),
            hit: true,
        });
        last = m.end();
    }
    if last < text.len() {
        segments.push(Segment {
            text: text[last..].to_owned(),
            hit: false,
        });
    }
    segments
}

// --- 3. 分组视图 ---

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub heading: Vec<Segment>,
    pub detail: Vec<Segment>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub title: &'static str,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    pub query: String,
    pub total: usize,
    pub groups: Vec<Group>,
}

impl SearchView {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        self.is_empty().then_some("未找到相关结果")
    }

    /// 管理页面在前，空分组不出现
    pub fn build(results: &SearchResults, query: &str) -> Self {
        let hl = |s: &str| highlight(s, query);
        let text = |s: String| {
            vec![Segment {
                text: s,
                hit: false,
            }]
        };
        let mut groups = Vec::new();
        let mut push = |title: &'static str, entries: Vec<Entry>| {
            if !entries.is_empty() {
                groups.push(Group { title, entries });
            }
        };

        push(
            "管理页面",
            results
                .pages
                .iter()
                .map(|p| Entry {
                    heading: hl(&p.name),
                    detail: text(p.description.clone()),
                    url: p.url.clone(),
                })
                .collect(),
        );
        push(
            "学生",
            results
                .students
                .iter()
                .map(|s| {
                    let mut detail = text("学号: ".into());
                    detail.extend(hl(&s.student_id));
                    detail.extend(text(format!(" · {}", s.class_name)));
                    Entry {
                        heading: hl(&s.name),
                        detail,
                        url: s.url.clone(),
                    }
                })
                .collect(),
        );
        push(
            "教师",
            results
                .teachers
                .iter()
                .map(|t| {
                    let mut detail = text("工号: ".into());
                    detail.extend(hl(&t.teacher_id));
                    detail.extend(text(format!(" · {}", t.title)));
                    Entry {
                        heading: hl(&t.name),
                        detail,
                        url: t.url.clone(),
                    }
                })
                .collect(),
        );
        push(
            "课程",
            results
                .courses
                .iter()
                .map(|c| Entry {
                    heading: hl(&c.name),
                    detail: text(c.department.clone()),
                    url: c.url.clone(),
                })
                .collect(),
        );
        push(
            "班级",
            results
                .classes
                .iter()
                .map(|c| Entry {
                    heading: hl(&c.name),
                    detail: text(format!("{} · {}", c.major, c.college)),
                    url: c.url.clone(),
                })
                .collect(),
        );
        push(
            "教室",
            results
                .classrooms
                .iter()
                .map(|r| Entry {
                    heading: hl(&r.name),
                    detail: text(format!(
                        "{} · 容量: {}",
                        r.location,
                        r.capacity.map_or_else(|| "-".to_string(), |c| c.to_string())
                    )),
                    url: r.url.clone(),
                })
                .collect(),
        );
        push(
            "通知公告",
            results
                .notices
                .iter()
                .map(|n| Entry {
                    heading: hl(&n.title),
                    detail: text(n.content.clone()),
                    url: n.url.clone(),
                })
                .collect(),
        );

        Self {
            query: query.to_owned(),
            total: results.total(),
            groups,
        }
    }
}

// --- 4. 搜索 ---

pub struct GlobalSearch {
    client: ApiClient,
}

impl GlobalSearch {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// 少于两个字符时不搜索，返回 None (收起结果框)
    pub async fn search(&self, query: &str) -> Result<Option<SearchView>, ClientError> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_CHARS {
            return Ok(None);
        }
        let params = Query::new().push("q", query).push("limit", RESULT_LIMIT);
        let results: SearchResults = self
            .client
            .get_as("/api/search", &params)
            .await
            .map_err(|e| {
                tracing::error!("搜索失败: {}", e);
                e
            })?;
        let view = SearchView::build(&results, query);
        tracing::debug!("搜索 {:?}：{} 条结果", query, view.total);
        Ok(Some(view))
    }
}

/// 输入框：每次按键写入最新内容
pub struct SearchInput {
    tx: watch::Sender<String>,
}

impl SearchInput {
    pub fn set(&self, text: &str) {
        self.tx.send_replace(text.to_owned());
    }
}

/// 输入停止 `wait` 之后才放行一次查询
pub struct Debouncer {
    rx: watch::Receiver<String>,
    wait: Duration,
}

pub fn debounced(wait: Duration) -> (SearchInput, Debouncer) {
    let (tx, rx) = watch::channel(String::new());
    (SearchInput { tx }, Debouncer { rx, wait })
}

impl Debouncer {
    /// 等到输入安静下来，返回最后的内容；输入端关闭后返回 None
    pub async fn next(&mut self) -> Option<String> {
        self.rx.changed().await.ok()?;
        loop {
            match tokio::time::timeout(self.wait, self.rx.changed()).await {
                // 等待期间又有输入，重新计时
                Ok(Ok(())) => continue,
                // 输入端已关闭，最后一次内容仍然放行
                Ok(Err(_)) => return Some(self.rx.borrow_and_update().clone()),
                Err(_) => return Some(self.rx.borrow_and_update().clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hits(segments: &[Segment]) -> Vec<&str> {
        segments
            .iter()
            .filter(|s| s.hit)
            .map(|s| s.text.as_str())
            .collect()
    }

    #[test]
    fn highlight_is_case_insensitive_and_literal() {
        let segs = highlight("Rust and rust", "RUST");
        assert_eq!(hits(&segs), vec!["Rust", "rust"]);
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[1].text, " and ");

        // 正则元字符按字面匹配
        let segs = highlight("C++ 程序设计", "c++");
        assert_eq!(hits(&segs), vec!["C++"]);

        let segs = highlight("高等数学", "");
        assert_eq!(segs.len(), 1);
        assert!(!segs[0].hit);
    }

    #[test]
    fn groups_skip_empty_and_count_total() {
        let results: SearchResults = serde_json::from_value(json!({
            "pages": [{"name": "学生管理", "description": "管理学生", "url": "/students/"}],
            "students": [
                {"name": "张学生", "student_id": "2024001", "class_name": "软件2101", "url": "/s/1"},
                {"name": "李四", "student_id": "2024学生", "class_name": "软件2102", "url": "/s/2"}
            ],
            "classrooms": [{"name": "A101", "location": "一教", "url": "/r/1"}]
        }))
        .unwrap();
        let view = SearchView::build(&results, "学生");
        assert_eq!(view.total, 4);
        let titles: Vec<&str> = view.groups.iter().map(|g| g.title).collect();
        assert_eq!(titles, vec!["管理页面", "学生", "教室"]);

        let students = &view.groups[1].entries;
        assert_eq!(hits(&students[0].heading), vec!["学生"]);
        assert_eq!(hits(&students[1].detail), vec!["学生"]);
        assert_eq!(view.groups[2].entries[0].detail[0].text, "一教 · 容量: -");
        assert_eq!(view.empty_message(), None);
    }

    #[test]
    fn no_results_message() {
        let view = SearchView::build(&SearchResults::default(), "不存在");
        assert_eq!(view.empty_message(), Some("未找到相关结果"));
    }

    #[tokio::test]
    async fn short_query_is_not_sent() {
        let client = ApiClient::new(&crate::config::Config::for_base(
            "http://127.0.0.1:9/".parse().unwrap(),
        ))
        .unwrap();
        let search = GlobalSearch::new(client);
        assert!(search.search(" 张 ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn debouncer_keeps_only_the_last_input() {
        let (input, mut debouncer) = debounced(DEBOUNCE);
        let typing = tokio::spawn(async move {
            for text in ["s", "so", "sof", "soft"] {
                input.set(text);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            tokio::time::sleep(Duration::from_millis(600)).await;
            input
        });
        assert_eq!(debouncer.next().await.as_deref(), Some("soft"));
        drop(typing.await.unwrap());
        assert_eq!(debouncer.next().await, None);
    }
}
