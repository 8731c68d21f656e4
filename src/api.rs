// src/api.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart::Form;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::{ApiError, ClientError};

/// 请求体：JSON 或 multipart 表单 (导入文件)
pub enum Body {
    Empty,
    Json(Value),
    Form(Form),
}

/// 额外请求头，合并覆盖默认头
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// 查询参数，按插入顺序编码
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Vec<(String, String)>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn push_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    /// 空字符串 (去掉首尾空白后) 不出现在查询串里
    pub fn push_nonempty(self, key: &str, value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self
        } else {
            self.push(key, trimmed)
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 分页结果：兼容裸数组与 `{results, count}` 两种写法
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub count: Option<u64>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: None,
        }
    }
}

impl<T: DeserializeOwned> Page<T> {
    pub fn from_value(value: Value) -> Result<Self, ClientError> {
        let (raw, count) = split_envelope(value);
        let items = raw
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(Self { items, count })
    }

    /// 跳过无法解析的条目 (时间段等允许脏数据的列表)
    pub fn from_value_lossy(value: Value) -> Self {
        let (raw, count) = split_envelope(value);
        let mut skipped = 0usize;
        let items = raw
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        if skipped > 0 {
            tracing::warn!("跳过 {} 条无法解析的记录", skipped);
        }
        Self { items, count }
    }
}

impl<T> Page<T> {
    /// 服务端总数；没有时退回本页条数
    pub fn total(&self) -> u64 {
        self.count.unwrap_or(self.items.len() as u64)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn split_envelope(value: Value) -> (Vec<Value>, Option<u64>) {
    match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let count = map.get("count").and_then(Value::as_u64);
            match map.remove("results") {
                Some(Value::Array(items)) => (items, count),
                _ => (Vec::new(), count),
            }
        }
        _ => (Vec::new(), None),
    }
}

/// REST 客户端：Cookie 存储、CSRF 头注入、错误解包
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    jar: Arc<Jar>,
    csrf_cookie: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        if let Some(cookies) = &config.session_cookie {
            for pair in cookies.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                jar.add_cookie_str(pair, &config.api_base);
            }
        }
        let http = Client::builder().cookie_provider(jar.clone()).build()?;

        Ok(Self {
            http,
            base: config.api_base.clone(),
            jar,
            csrf_cookie: config.csrf_cookie.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// 手动写入 Cookie (如登录后拿到的 csrftoken)
    pub fn set_cookie(&self, cookie: &str) {
        self.jar.add_cookie_str(cookie, &self.base);
    }

    /// 从 Cookie 存储中读取 CSRF token，没有时为空串
    pub fn csrf_token(&self) -> String {
        let prefix = format!("{}=", self.csrf_cookie);
        self.jar
            .cookies(&self.base)
            .and_then(|v| v.to_str().ok().map(str::to_owned))
            .and_then(|header| {
                header
                    .split(';')
                    .map(str::trim)
                    .find_map(|kv| kv.strip_prefix(prefix.as_str()).map(str::to_owned))
            })
            .unwrap_or_default()
    }

    fn url(&self, path: &str, query: &Query) -> Result<Url, ClientError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ClientError::Invalid(format!("无效的请求路径 {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.pairs());
        }
        Ok(url)
    }

    /// 发送请求。非 2xx 转为 `ApiError`；204 或非 JSON 响应返回 `{}`
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        query: &Query,
        body: Body,
        opts: RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.url(path, query)?;
        let mut headers = HeaderMap::new();
        let mut req = self.http.request(method.clone(), url);

        if method != Method::GET && method != Method::HEAD {
            match body {
                Body::Form(form) => req = req.multipart(form),
                Body::Json(value) => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    req = req.body(value.to_string());
                }
                Body::Empty => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    req = req.body("{}");
                }
            }
            let token = HeaderValue::from_str(&self.csrf_token())
                .unwrap_or_else(|_| HeaderValue::from_static(""));
            headers.insert(HeaderName::from_static("x-csrftoken"), token);
        }

        for (name, value) in opts.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Invalid(format!("无效的请求头 {}: {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ClientError::Invalid(format!("无效的请求头值: {}", e)))?;
            headers.insert(name, value);
        }

        tracing::debug!("{} {}", method, path);
        let resp = req.headers(headers).send().await?;
        let status = resp.status();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let err = ApiError::from_body(status, &text);
            tracing::debug!("{} {} -> {} {}", method, path, status.as_u16(), err.message);
            return Err(err.into());
        }

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.contains("application/json"));
        if status == StatusCode::NO_CONTENT || !is_json {
            return Ok(Value::Object(Map::new()));
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get(&self, path: &str, query: &Query) -> Result<Value, ClientError> {
        self.call(Method::GET, path, query, Body::Empty, RequestOptions::default())
            .await
    }

    pub async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.get(path, query).await?)?)
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<Page<T>, ClientError> {
        Page::from_value(self.get(path, query).await?)
    }

    /// 权限过滤的列表：任何错误都当作空页
    pub async fn list_or_empty<T: DeserializeOwned>(&self, path: &str, query: &Query) -> Page<T> {
        match self.list(path, query).await {
            Ok(page) => page,
            Err(e) => {
                tracing::debug!("{} 返回空列表: {}", path, e);
                Page::default()
            }
        }
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ClientError> {
        let body = Body::Json(serde_json::to_value(body)?);
        self.call(Method::POST, path, &Query::new(), body, RequestOptions::default())
            .await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ClientError> {
        let body = Body::Json(serde_json::to_value(body)?);
        self.call(Method::PATCH, path, &Query::new(), body, RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.call(
            Method::DELETE,
            path,
            &Query::new(),
            Body::Empty,
            RequestOptions::default(),
        )
        .await
    }

    pub async fn post_form(&self, path: &str, form: Form) -> Result<Value, ClientError> {
        self.call(
            Method::POST,
            path,
            &Query::new(),
            Body::Form(form),
            RequestOptions::default(),
        )
        .await
    }

    /// 带超时的调用，超时返回 `ClientError::Timeout`
    pub async fn call_with_timeout<T, F>(&self, timeout: Duration, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }
}

/// 文件上传表单 (`file` 字段)
pub fn file_form(bytes: Vec<u8>, filename: &str) -> Result<Form, ClientError> {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(filename.to_owned())
        .mime_str("application/octet-stream")?;
    Ok(Form::new().part("file", part))
}
