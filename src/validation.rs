// src/validation.rs
use std::ops::Deref;

use lazy_static::lazy_static;
use regex::Regex;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::error::ClientError;

lazy_static! {
    // 大陆手机号
    pub static ref PHONE_RE: Regex = Regex::new(r"^1[3-9]\d{9}$").unwrap();
    // 工号只允许字母和数字
    pub static ref TEACHER_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9]+$").unwrap();
    // HH:MM 或 HH:MM:SS
    pub static ref CLOCK_RE: Regex = Regex::new(r"^\d{2}:\d{2}(:\d{2})?$").unwrap();
}

/// 已通过校验的请求体，只能由 `Validated::new` 构造
#[derive(Debug, Clone)]
pub struct Validated<T>(T);

impl<T: Validate> Validated<T> {
    pub fn new(value: T) -> Result<Self, ClientError> {
        // 校验失败通过 ClientError::Validation 自动转换
        value.validate()?;
        Ok(Validated(value))
    }
}

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Validated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// 学生手机号可以填“无”
pub fn validate_optional_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    if phone.is_empty() || phone == "无" || PHONE_RE.is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("手机号格式不正确，请输入11位手机号或填写“无”".into()))
    }
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if PHONE_RE.is_match(phone.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("请输入正确的11位手机号".into()))
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("不能为空".into()))
    } else {
        Ok(())
    }
}

/// 把 ValidationErrors 拍平成一行提示 (取第一条带 message 的错误)
pub fn first_message(errors: &ValidationErrors) -> String {
    for kind in errors.errors().values() {
        if let ValidationErrorsKind::Field(errs) = kind {
            if let Some(msg) = errs.iter().find_map(|e| e.message.as_ref()) {
                return msg.to_string();
            }
        }
    }
    errors.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_rules() {
        assert!(validate_phone("13812345678").is_ok());
        assert!(validate_phone("12812345678").is_err());
        assert!(validate_phone("1381234567").is_err());
        assert!(validate_optional_phone("无").is_ok());
        assert!(validate_optional_phone("").is_ok());
        assert!(validate_optional_phone("abc").is_err());
    }

    #[test]
    fn teacher_id_is_alphanumeric() {
        assert!(TEACHER_ID_RE.is_match("T2024001"));
        assert!(!TEACHER_ID_RE.is_match("T-01"));
        assert!(!TEACHER_ID_RE.is_match(""));
    }
}
