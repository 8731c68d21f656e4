// src/account.rs
use serde::Deserialize;
use serde_json::Value;

use crate::api::{ApiClient, Query};
use crate::error::ClientError;
use crate::models::{ChangePasswordSchema, ChangePhoneSchema, StudentProfile};
use crate::session::{role_display, Session};
use crate::validation::Validated;

/// `/api/accounts/profiles/{id}/`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// 个人信息页的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    pub label: &'static str,
    pub value: String,
}

fn line(label: &'static str, value: Option<&str>) -> InfoLine {
    InfoLine {
        label,
        value: value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("-")
            .to_owned(),
    }
}

/// 成功提示优先用后端的 detail
fn detail_or(raw: &Value, fallback: &str) -> String {
    raw.get("detail")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_owned()
}

pub struct Account {
    client: ApiClient,
}

impl Account {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<String, ClientError> {
        let schema = Validated::new(ChangePasswordSchema {
            old_password: old_password.to_owned(),
            new_password: new_password.to_owned(),
        })?;
        let raw = self
            .client
            .post("/api/accounts/password/change", &*schema)
            .await?;
        tracing::info!("密码已修改");
        Ok(detail_or(&raw, "成功"))
    }

    pub async fn change_phone(&self, phone: &str) -> Result<String, ClientError> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ClientError::Invalid("请输入手机号".into()));
        }
        let schema = Validated::new(ChangePhoneSchema {
            phone: phone.to_owned(),
        })?;
        let raw = self
            .client
            .post("/api/accounts/phone/change", &*schema)
            .await?;
        tracing::info!("手机号已修改");
        Ok(detail_or(&raw, "手机号修改成功"))
    }

    pub async fn profile(&self, profile_id: i64) -> Result<UserProfile, ClientError> {
        self.client
            .get_as(&format!("/api/accounts/profiles/{}/", profile_id), &Query::new())
            .await
    }

    /// 学生看自己的学籍档案；其他角色看用户名、角色和联系方式
    pub async fn profile_card(&self, session: &Session) -> Result<Vec<InfoLine>, ClientError> {
        if session.roles().is_student() {
            let page = self
                .client
                .list::<StudentProfile>("/api/accounts/students/", &Query::new().push("size", 1))
                .await?;
            let sp = page
                .items
                .first()
                .ok_or_else(|| ClientError::Invalid("未找到学生资料".into()))?;
            return Ok(vec![
                line("学号", sp.student_id.as_deref()),
                line("姓名", Some(&sp.display_name())),
                line("学院", sp.college_name.as_deref()),
                line("专业", sp.major_name.as_deref()),
                line("班级", sp.class_name.as_deref()),
                line("学籍状态", sp.status.as_deref()),
            ]);
        }

        let mut lines = vec![
            line("用户名", session.username()),
            line("角色", Some(&role_display(session.role.code()))),
        ];
        // 档案查不到时只显示基本信息
        if let Some(id) = session.profile_id() {
            match self.profile(id).await {
                Ok(profile) => {
                    if let Some(phone) = profile.phone.as_deref().filter(|p| !p.is_empty()) {
                        lines.push(line("联系电话", Some(phone)));
                    }
                    if let Some(addr) = profile.address.as_deref().filter(|a| !a.is_empty()) {
                        lines.push(line("地址", Some(addr)));
                    }
                }
                Err(e) => tracing::debug!("读取用户档案失败: {}", e),
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn account() -> Account {
        let client = ApiClient::new(&Config::for_base("http://127.0.0.1:9/".parse().unwrap())).unwrap();
        Account::new(client)
    }

    #[test]
    fn detail_message_preferred() {
        assert_eq!(detail_or(&json!({"detail": "密码已更新"}), "成功"), "密码已更新");
        assert_eq!(detail_or(&json!({}), "成功"), "成功");
    }

    #[test]
    fn blank_values_show_dash() {
        assert_eq!(line("班级", Some("  ")).value, "-");
        assert_eq!(line("班级", None).value, "-");
        assert_eq!(line("班级", Some("软件2101")).value, "软件2101");
    }

    // 以下校验在发请求之前失败，不需要后端
    #[tokio::test]
    async fn phone_is_checked_before_sending() {
        let acc = account();
        match acc.change_phone("   ").await {
            Err(ClientError::Invalid(msg)) => assert_eq!(msg, "请输入手机号"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            acc.change_phone("1234").await,
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let err = account().change_password("old", "123").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
}
