// src/error.rs
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::timetable::weekday_name;

/// 后端返回的非 2xx 响应，保留 detail / message / error 三种写法
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// `error` 字段本身；没有该字段时为整个响应体
    pub error: Value,
    pub detail: Option<String>,
}

impl ApiError {
    /// 按 `detail || message || error || 原始文本` 的顺序取出错误信息
    pub fn from_body(status: StatusCode, text: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(text).ok();
        let pick = |key: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let detail = pick("detail");
        let message = detail
            .clone()
            .or_else(|| pick("message"))
            .or_else(|| pick("error"))
            .unwrap_or_else(|| {
                if text.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_owned()
                } else {
                    text.to_owned()
                }
            });

        let error = match &parsed {
            Some(v) => v.get("error").cloned().unwrap_or_else(|| v.clone()),
            None => Value::String(text.to_owned()),
        };

        Self {
            status,
            message,
            error,
            detail,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.status == StatusCode::FORBIDDEN
    }

    /// 排课冲突类错误（同步到其他周时视为“已存在”，不算失败）
    pub fn is_schedule_conflict(&self) -> bool {
        self.message.contains("冲突") || self.message.contains("已有课程安排")
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("请求超时：超过{}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("输入参数有误: {0}")]
    Validation(#[from] validator::ValidationErrors),

    // 客户端预检查失败（未选择班级、课程无教师等）
    #[error("{0}")]
    Invalid(String),

    #[error("{}", slot_missing_message(.weekday, .index, .available))]
    SlotMissing {
        weekday: u8,
        index: u8,
        available: Vec<u8>,
    },

    #[error("时间段数据未加载，请先生成时间段")]
    SlotsNotLoaded,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// 权限过滤导致的 403，调用方通常当作“无数据”处理
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ClientError::Api(e) if e.is_forbidden())
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(e) => Some(e),
            _ => None,
        }
    }
}

fn slot_missing_message(weekday: &u8, index: &u8, available: &[u8]) -> String {
    let mut msg = format!("{}第{}节不存在。", weekday_name(*weekday), index);
    if !available.is_empty() {
        let list: Vec<String> = available.iter().map(u8::to_string).collect();
        msg.push_str(&format!("该天可用的时间段：第{}节", list.join("、")));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_wins_over_message_and_error() {
        let e = ApiError::from_body(
            StatusCode::NOT_FOUND,
            r#"{"detail":"Not found","message":"m","error":"e"}"#,
        );
        assert_eq!(e.message, "Not found");
        assert_eq!(e.detail.as_deref(), Some("Not found"));
        assert_eq!(e.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn message_then_error_then_raw_text() {
        let e = ApiError::from_body(StatusCode::BAD_REQUEST, r#"{"message":"bad","error":"x"}"#);
        assert_eq!(e.message, "bad");
        assert_eq!(e.error, Value::String("x".into()));

        let e = ApiError::from_body(StatusCode::BAD_REQUEST, r#"{"error":"only error"}"#);
        assert_eq!(e.message, "only error");
        assert!(e.detail.is_none());

        let e = ApiError::from_body(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(e.message, "boom");
        assert_eq!(e.error, Value::String("boom".into()));
    }

    #[test]
    fn unknown_json_shape_falls_back_to_raw_text() {
        let body = r#"{"name":["required"]}"#;
        let e = ApiError::from_body(StatusCode::BAD_REQUEST, body);
        assert_eq!(e.message, body);
        assert_eq!(e.error["name"][0], "required");
    }

    #[test]
    fn empty_body_uses_reason_phrase() {
        let e = ApiError::from_body(StatusCode::FORBIDDEN, "");
        assert_eq!(e.message, "Forbidden");
        assert!(e.is_forbidden());
    }

    #[test]
    fn slot_missing_lists_available_indexes() {
        let err = ClientError::SlotMissing {
            weekday: 5,
            index: 3,
            available: vec![1, 2],
        };
        assert_eq!(err.to_string(), "周五第3节不存在。该天可用的时间段：第1、2节");
    }
}
