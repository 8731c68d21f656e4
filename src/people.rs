// src/people.rs
use serde_json::Value;

use crate::api::{file_form, ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::{
    BulkUpdateStudentsSchema, CreateStudentSchema, CreateTeacherSchema, SchoolClass,
    StudentProfile, TeacherProfile, UpdateStudentSchema, UpdateTeacherSchema,
};
use crate::validation::Validated;

const STUDENTS: &str = "/api/accounts/students/";
const TEACHERS: &str = "/api/accounts/teachers/";

pub const STUDENT_STATUSES: [&str; 3] = ["在读", "休学", "毕业"];

// --- 1. 学生 ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentQuery {
    pub q: String,
    pub status: String,
    pub college: Option<i64>,
    pub department: Option<i64>,
    pub class_id: Option<i64>,
}

impl StudentQuery {
    pub fn to_query(&self) -> Query {
        Query::new()
            .push_nonempty("q", &self.q)
            .push_nonempty("status", &self.status)
            .push_opt("college", self.college)
            .push_opt("department", self.department)
            .push_opt("class", self.class_id)
    }
}

/// 学生列表的一行
#[derive(Debug, Clone, PartialEq)]
pub struct StudentRow {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub gender: String,
    pub class_name: String,
    pub status: String,
    pub phone: String,
}

impl From<&StudentProfile> for StudentRow {
    fn from(s: &StudentProfile) -> Self {
        Self {
            id: s.id,
            student_id: s.student_id.clone().unwrap_or_else(|| "-".into()),
            name: s.display_name(),
            gender: s.gender_display.clone().unwrap_or_else(|| "-".into()),
            class_name: s.class_name.clone().unwrap_or_else(|| "-".into()),
            status: s.status.clone().unwrap_or_else(|| "-".into()),
            phone: s.phone().unwrap_or("-").to_owned(),
        }
    }
}

pub struct Students {
    client: ApiClient,
}

impl Students {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn search(&self, query: &StudentQuery) -> Result<Page<StudentProfile>, ClientError> {
        self.client.list(STUDENTS, &query.to_query()).await
    }

    pub async fn get(&self, id: i64) -> Result<StudentProfile, ClientError> {
        self.client
            .get_as(&format!("{}{}/", STUDENTS, id), &Query::new())
            .await
    }

    pub async fn create(&self, schema: Validated<CreateStudentSchema>) -> Result<Value, ClientError> {
        let created = self.client.post(STUDENTS, &*schema).await?;
        tracing::info!("已添加学生 {}", schema.name_write);
        Ok(created)
    }

    pub async fn update(&self, id: i64, schema: Validated<UpdateStudentSchema>) -> Result<(), ClientError> {
        self.client
            .patch(&format!("{}{}/", STUDENTS, id), &*schema)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&format!("{}{}/", STUDENTS, id)).await?;
        tracing::info!("已删除学生 {}", id);
        Ok(())
    }

    /// 批量调整班级/状态
    pub async fn bulk_update(&self, schema: Validated<BulkUpdateStudentsSchema>) -> Result<(), ClientError> {
        self.client
            .post("/api/accounts/students/bulk_update/", &*schema)
            .await?;
        tracing::info!("批量修改 {} 名学生", schema.ids.len());
        Ok(())
    }

    /// 上传学生名单文件
    pub async fn import(&self, bytes: Vec<u8>, filename: &str) -> Result<Value, ClientError> {
        let form = file_form(bytes, filename)?.text("type", "students");
        self.client.post_form("/api/accounts/import", form).await
    }

    /// 班级花名册
    pub async fn roster(&self, class_id: i64) -> Result<Vec<StudentProfile>, ClientError> {
        let query = Query::new().push("class", class_id).push("size", 1000);
        Ok(self.client.list::<StudentProfile>(STUDENTS, &query).await?.items)
    }
}

// --- 2. 教师 ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeacherQuery {
    pub q: String,
    pub college: Option<i64>,
    pub department: Option<i64>,
}

impl TeacherQuery {
    pub fn to_query(&self) -> Query {
        Query::new()
            .push_nonempty("q", &self.q)
            .push_opt("college", self.college)
            .push_opt("department", self.department)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeacherRow {
    pub id: i64,
    pub teacher_id: String,
    pub name: String,
    pub position: String,
    pub college_name: String,
    pub department_name: String,
    pub managed_class: Option<String>,
}

impl From<&TeacherProfile> for TeacherRow {
    fn from(t: &TeacherProfile) -> Self {
        let dash = |s: &Option<String>| s.clone().unwrap_or_else(|| "-".into());
        Self {
            id: t.id,
            teacher_id: dash(&t.teacher_id),
            name: t.display_name(),
            position: t
                .position_type_display
                .clone()
                .or_else(|| t.title.clone())
                .unwrap_or_else(|| "-".into()),
            college_name: dash(&t.college_name),
            department_name: dash(&t.department_name),
            managed_class: t.managed_class_name(),
        }
    }
}

pub struct Teachers {
    client: ApiClient,
}

impl Teachers {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn search(&self, query: &TeacherQuery) -> Result<Page<TeacherProfile>, ClientError> {
        self.client.list(TEACHERS, &query.to_query()).await
    }

    pub async fn get(&self, id: i64) -> Result<TeacherProfile, ClientError> {
        self.client
            .get_as(&format!("{}{}/", TEACHERS, id), &Query::new())
            .await
    }

    pub async fn create(&self, schema: Validated<CreateTeacherSchema>) -> Result<Value, ClientError> {
        let created = self.client.post(TEACHERS, &*schema).await?;
        tracing::info!("已添加教师 {} ({})", schema.name, schema.role.label());
        Ok(created)
    }

    pub async fn update(&self, id: i64, schema: Validated<UpdateTeacherSchema>) -> Result<(), ClientError> {
        self.client
            .patch(&format!("{}{}/", TEACHERS, id), &*schema)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&format!("{}{}/", TEACHERS, id)).await?;
        tracing::info!("已删除教师 {}", id);
        Ok(())
    }

    /// 班主任管理的班级；查不到时为空
    pub async fn managed_classes(&self, teacher_id: i64) -> Vec<SchoolClass> {
        self.client
            .list_or_empty::<SchoolClass>(
                "/api/org/classes/",
                &Query::new().push("head_teacher", teacher_id),
            )
            .await
            .items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn student_query_skips_blank_filters() {
        let q = StudentQuery {
            q: " 张 ".into(),
            class_id: Some(4),
            ..Default::default()
        };
        let query = q.to_query();
        assert_eq!(query.get("q"), Some("张"));
        assert_eq!(query.get("class"), Some("4"));
        assert_eq!(query.get("status"), None);
        assert_eq!(query.get("department"), None);
    }

    #[test]
    fn student_row_name_fallback() {
        let s: StudentProfile = serde_json::from_value(json!({
            "id": 9,
            "student_id": "2024001",
            "user_profile": {"user": {"username": "zhang3", "first_name": ""}, "phone": "13800000000"}
        }))
        .unwrap();
        let row = StudentRow::from(&s);
        assert_eq!(row.name, "zhang3");
        assert_eq!(row.phone, "13800000000");
        assert_eq!(row.class_name, "-");

        let bare: StudentProfile = serde_json::from_value(json!({"id": 11})).unwrap();
        assert_eq!(StudentRow::from(&bare).name, "11");
    }

    #[test]
    fn teacher_row_uses_position_display() {
        let t: TeacherProfile = serde_json::from_value(json!({
            "id": 3,
            "teacher_id": "T01",
            "position_type_display": "班主任",
            "managed_class_info": {"id": 2, "name": "软件2101"},
            "user_profile": {"user": {"first_name": "李老师"}}
        }))
        .unwrap();
        let row = TeacherRow::from(&t);
        assert_eq!(row.name, "李老师");
        assert_eq!(row.position, "班主任");
        assert_eq!(row.managed_class.as_deref(), Some("软件2101"));
    }
}
