// src/config.rs
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;

/// 运行配置，全部来自环境变量 (可由 .env 提供)
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: Url,
    pub csrf_cookie: String,
    /// 预置到 Cookie 存储中的会话 Cookie，例如 `sessionid=...; csrftoken=...`
    pub session_cookie: Option<String>,
    pub prefs_path: PathBuf,
    pub refresh_interval: Duration,
    pub poll_interval: Duration,
    pub schedule_timeout: Duration,
    pub cross_process_bus: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 便于测试：从任意键值来源读取
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup("CAMPUS_API_BASE")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ClientError::Config("CAMPUS_API_BASE must be set".into()))?;
        let api_base = Url::parse(raw_base.trim())
            .map_err(|e| ClientError::Config(format!("CAMPUS_API_BASE: {}", e)))?;

        Ok(Self {
            api_base,
            csrf_cookie: lookup("CAMPUS_CSRF_COOKIE").unwrap_or_else(|| "csrftoken".into()),
            session_cookie: lookup("CAMPUS_SESSION_COOKIE").filter(|s| !s.is_empty()),
            prefs_path: lookup("CAMPUS_PREFS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".campus-console/prefs.json")),
            refresh_interval: Duration::from_secs(parse_or(&lookup, "CAMPUS_REFRESH_SECS", 20)?),
            poll_interval: Duration::from_millis(parse_or(&lookup, "CAMPUS_POLL_MS", 1000)?),
            schedule_timeout: Duration::from_millis(parse_or(
                &lookup,
                "CAMPUS_SCHEDULE_TIMEOUT_MS",
                500,
            )?),
            cross_process_bus: parse_or(&lookup, "CAMPUS_CROSS_PROCESS_BUS", false)?,
        })
    }

    /// 指向某个后端地址的默认配置 (测试与嵌入使用)
    pub fn for_base(api_base: Url) -> Self {
        Self {
            api_base,
            csrf_cookie: "csrftoken".into(),
            session_cookie: None,
            prefs_path: PathBuf::from(".campus-console/prefs.json"),
            refresh_interval: Duration::from_secs(20),
            poll_interval: Duration::from_millis(1000),
            schedule_timeout: Duration::from_millis(500),
            cross_process_bus: false,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ClientError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ClientError::Config(format!("{}: {}", key, e))),
    }
}
