// src/org.rs
use serde_json::json;

use crate::api::{ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::{
    Classroom, College, CreateClassSchema, CreateClassroomSchema, CreateCollegeSchema,
    CreateDepartmentSchema, Department, ImportSummary, OrgImportSchema, SchoolClass,
};
use crate::validation::Validated;

const COLLEGES: &str = "/api/org/colleges/";
const DEPARTMENTS: &str = "/api/org/departments/";
const CLASSES: &str = "/api/org/classes/";
const CLASSROOMS: &str = "/api/org/classrooms/";

// --- 1. 级联筛选 ---

/// 学院 → 专业 → 班级 三级下拉框的数据与当前选择
#[derive(Debug, Clone, Default)]
pub struct OrgTree {
    colleges: Vec<College>,
    departments: Vec<Department>,
    classes: Vec<SchoolClass>,
    pub college: Option<i64>,
    pub major: Option<i64>,
    pub class_id: Option<i64>,
}

impl OrgTree {
    pub fn new(colleges: Vec<College>, departments: Vec<Department>, classes: Vec<SchoolClass>) -> Self {
        Self {
            colleges,
            departments,
            classes,
            ..Default::default()
        }
    }

    /// 加载全部下拉数据；无权限的部分为空
    pub async fn load(client: &ApiClient) -> Self {
        let all = Query::new().push("no_page", 1);
        let colleges = client.list_or_empty::<College>(COLLEGES, &all).await.items;
        let departments = client.list_or_empty::<Department>(DEPARTMENTS, &all).await.items;
        let classes = client.list_or_empty::<SchoolClass>(CLASSES, &all).await.items;
        tracing::debug!(
            "组织架构：{} 个学院，{} 个专业，{} 个班级",
            colleges.len(),
            departments.len(),
            classes.len()
        );
        Self::new(colleges, departments, classes)
    }

    pub fn colleges(&self) -> &[College] {
        &self.colleges
    }

    /// 当前学院下的专业；未选学院时为全部
    pub fn majors(&self) -> Vec<&Department> {
        self.departments
            .iter()
            .filter(|d| self.college.map_or(true, |c| d.college == Some(c)))
            .collect()
    }

    /// 当前专业下的班级；只选了学院时取该学院所有专业的班级
    pub fn classes(&self) -> Vec<&SchoolClass> {
        match (self.major, self.college) {
            (Some(major), _) => self
                .classes
                .iter()
                .filter(|c| c.major == Some(major))
                .collect(),
            (None, Some(_)) => {
                let majors: Vec<i64> = self.majors().iter().map(|d| d.id).collect();
                self.classes
                    .iter()
                    .filter(|c| c.major.map_or(false, |m| majors.contains(&m)))
                    .collect()
            }
            (None, None) => self.classes.iter().collect(),
        }
    }

    /// 切换学院时清空下级选择
    pub fn select_college(&mut self, college: Option<i64>) {
        if self.college != college {
            self.college = college;
            self.major = None;
            self.class_id = None;
        }
    }

    pub fn select_major(&mut self, major: Option<i64>) {
        if self.major != major {
            self.major = major;
            self.class_id = None;
        }
        if let Some(dept) = major.and_then(|m| self.departments.iter().find(|d| d.id == m)) {
            if dept.college.is_some() {
                self.college = dept.college;
            }
        }
    }

    pub fn select_class(&mut self, class_id: Option<i64>) {
        self.class_id = class_id;
    }

    pub fn college_name(&self, id: i64) -> Option<&str> {
        self.colleges
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
    }

    pub fn major_name(&self, id: i64) -> Option<&str> {
        self.departments
            .iter()
            .find(|d| d.id == id)
            .map(|d| d.name.as_str())
    }
}

/// 班级列表筛选：选了专业时不再按学院过滤
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassFilter {
    pub search: String,
    pub college: Option<i64>,
    pub major: Option<i64>,
}

impl ClassFilter {
    pub fn to_query(&self) -> Query {
        let query = Query::new().push_nonempty("search", &self.search);
        match (self.major, self.college) {
            (Some(major), _) => query.push("major", major),
            (None, Some(college)) => query.push("major__college", college),
            (None, None) => query,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Colleges,
    Departments,
}

impl ImportKind {
    pub fn code(&self) -> &'static str {
        match self {
            ImportKind::Colleges => "colleges",
            ImportKind::Departments => "departments",
        }
    }
}

// --- 2. 增删改查 ---

pub struct Org {
    client: ApiClient,
}

impl Org {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn detail(base: &str, id: i64) -> String {
        format!("{}{}/", base, id)
    }

    pub async fn colleges(&self, search: &str) -> Page<College> {
        let query = Query::new().push_nonempty("search", search);
        self.client.list_or_empty(COLLEGES, &query).await
    }

    pub async fn create_college(&self, schema: Validated<CreateCollegeSchema>) -> Result<College, ClientError> {
        let raw = self.client.post(COLLEGES, &*schema).await?;
        tracing::info!("已创建学院 {}", schema.name);
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn rename_college(&self, id: i64, name: &str) -> Result<(), ClientError> {
        if name.trim().is_empty() {
            return Err(ClientError::Invalid("学院名称不能为空".into()));
        }
        self.client
            .patch(&Self::detail(COLLEGES, id), &json!({ "name": name.trim() }))
            .await?;
        Ok(())
    }

    pub async fn delete_college(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&Self::detail(COLLEGES, id)).await?;
        Ok(())
    }

    pub async fn departments(&self, search: &str, college: Option<i64>) -> Page<Department> {
        let query = Query::new()
            .push_nonempty("search", search)
            .push_opt("college", college);
        self.client.list_or_empty(DEPARTMENTS, &query).await
    }

    pub async fn create_department(&self, schema: Validated<CreateDepartmentSchema>) -> Result<Department, ClientError> {
        let raw = self.client.post(DEPARTMENTS, &*schema).await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn update_department(&self, id: i64, name: &str, college: i64) -> Result<(), ClientError> {
        self.client
            .patch(
                &Self::detail(DEPARTMENTS, id),
                &json!({ "name": name, "college": college }),
            )
            .await?;
        Ok(())
    }

    /// 专业下还有班级时后端会拒绝
    pub async fn delete_department(&self, id: i64) -> Result<(), ClientError> {
        match self.client.delete(&Self::detail(DEPARTMENTS, id)).await {
            Ok(_) => Ok(()),
            Err(ClientError::Api(e)) => Err(ClientError::Invalid(format!(
                "{}\n\n提示：请先删除该专业下的所有班级，然后再删除专业。",
                e.message
            ))),
            Err(e) => Err(e),
        }
    }

    pub async fn classes(&self, filter: &ClassFilter) -> Page<SchoolClass> {
        self.client.list_or_empty(CLASSES, &filter.to_query()).await
    }

    pub async fn create_class(&self, schema: Validated<CreateClassSchema>) -> Result<SchoolClass, ClientError> {
        let raw = self.client.post(CLASSES, &*schema).await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn update_class(&self, id: i64, major: i64, enrollment_year: i32) -> Result<(), ClientError> {
        if major <= 0 || enrollment_year <= 0 {
            return Err(ClientError::Invalid("请填写完整".into()));
        }
        self.client
            .patch(
                &Self::detail(CLASSES, id),
                &json!({ "major": major, "enrollment_year": enrollment_year }),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_class(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&Self::detail(CLASSES, id)).await?;
        Ok(())
    }

    pub async fn classrooms(&self, search: &str) -> Page<Classroom> {
        let query = Query::new().push_nonempty("search", search);
        self.client.list_or_empty(CLASSROOMS, &query).await
    }

    pub async fn create_classroom(&self, schema: Validated<CreateClassroomSchema>) -> Result<Classroom, ClientError> {
        let raw = self.client.post(CLASSROOMS, &*schema).await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn delete_classroom(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&Self::detail(CLASSROOMS, id)).await?;
        Ok(())
    }

    /// 粘贴 CSV 批量导入学院或专业
    pub async fn import_csv(&self, kind: ImportKind, csv: &str) -> Result<ImportSummary, ClientError> {
        let schema = Validated::new(OrgImportSchema {
            kind: kind.code().to_owned(),
            csv: csv.to_owned(),
        })?;
        let raw = self.client.post("/api/org/import", &*schema).await?;
        let summary: ImportSummary = serde_json::from_value(raw)?;
        tracing::info!(
            "导入{}：新增 {}，跳过 {}",
            kind.code(),
            summary.created,
            summary.skipped
        );
        Ok(summary)
    }
}
