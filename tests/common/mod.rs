// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use campus_console::{ApiClient, Config};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

pub const CSRF_TOKEN: &str = "tok-123";

/// 模拟后端收到的一次请求
#[derive(Debug, Clone)]
pub struct Seen {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub csrf_header: Option<String>,
    pub body: Value,
}

type Log = Arc<Mutex<Vec<Seen>>>;

pub struct Mock {
    pub base: Url,
    log: Log,
    handle: JoinHandle<()>,
}

impl Mock {
    /// 带会话 Cookie 和 csrftoken 的配置
    pub fn config(&self) -> Config {
        let mut config = Config::for_base(self.base.clone());
        config.session_cookie = Some(format!("sessionid=s-1; csrftoken={}", CSRF_TOKEN));
        config
    }

    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config()).expect("build client")
    }

    /// 没有任何 Cookie 的客户端
    pub fn anonymous_client(&self) -> ApiClient {
        ApiClient::new(&Config::for_base(self.base.clone())).expect("build client")
    }

    pub fn requests(&self) -> Vec<Seen> {
        self.log.lock().expect("request log").clone()
    }

    pub fn find(&self, method: Method, path: &str) -> Vec<Seen> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }
}

impl Drop for Mock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// 记录请求；写操作必须带与 Cookie 一致的 X-CSRFToken
async fn record(State(log): State<Log>, jar: CookieJar, req: Request, next: Next) -> Response {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let csrf_header = parts
        .headers
        .get("x-csrftoken")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    log.lock().expect("request log").push(Seen {
        method: parts.method.clone(),
        path: parts.uri.path().to_owned(),
        query: parts.uri.query().unwrap_or("").to_owned(),
        csrf_header: csrf_header.clone(),
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    });

    if parts.method != Method::GET {
        let cookie = jar.get("csrftoken").map(|c| c.value().to_owned());
        if cookie.is_none() || cookie != csrf_header {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "CSRF Failed: CSRF token missing or incorrect."})),
            )
                .into_response();
        }
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

pub async fn serve(router: Router) -> Mock {
    let log = Log::default();
    let app = router.layer(middleware::from_fn_with_state(log.clone(), record));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().expect("mock addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock backend");
    });
    Mock {
        base: format!("http://{}/", addr).parse().expect("mock url"),
        log,
        handle,
    }
}

/// 周一到周五、每天 1-8 节的时间段；`skip` 中的格子不生成
pub fn timeslots(skip: &[(u8, u8)]) -> Value {
    let mut slots = Vec::new();
    let mut id = 1;
    for weekday in 1..=5u8 {
        for index in 1..=8u8 {
            if !skip.contains(&(weekday, index)) {
                slots.push(json!({
                    "id": id,
                    "weekday": weekday,
                    "index": index,
                    "start_time": "08:00",
                    "end_time": "08:45",
                }));
            }
            id += 1;
        }
    }
    Value::Array(slots)
}
