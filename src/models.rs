// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::attendance::AttendanceStatus;
use crate::validation::{
    validate_not_blank, validate_optional_phone, validate_phone, TEACHER_ID_RE,
};

// --- 1. 组织架构 (学院 / 专业 / 班级 / 教室) ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct College {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub major_count: Option<u64>,
    #[serde(default)]
    pub teacher_count: Option<u64>,
}

/// 专业 (接口里也叫 department)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
    #[serde(default)]
    pub college: Option<i64>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub duration_label: Option<String>,
    #[serde(default)]
    pub class_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: i64,
    #[serde(default)]
    pub class_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub major: Option<i64>,
    #[serde(default)]
    pub major_name: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub enrollment_year: Option<i32>,
    #[serde(default)]
    pub head_teacher: Option<i64>,
    #[serde(default)]
    pub head_teacher_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classroom {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateCollegeSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "学院名称不能为空"))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateDepartmentSchema {
    #[validate(length(min = 1, max = 100, message = "专业名称不能为空"))]
    pub name: String,
    pub college: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateClassSchema {
    #[validate(length(min = 1, max = 100, message = "班级名称不能为空"))]
    pub name: String,
    pub major: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_teacher: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateClassroomSchema {
    #[validate(length(min = 1, max = 100, message = "教室名称不能为空"))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[validate(range(min = 1, message = "容量必须大于0"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct OrgImportSchema {
    #[serde(rename = "type")]
    pub kind: String,
    #[validate(custom(function = "validate_not_blank", message = "请粘贴CSV"))]
    pub csv: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportSummary {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub skipped: u64,
}

// --- 2. 人员 (学生 / 教师) ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfileRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: i64,
    #[serde(default)]
    pub user_profile: Option<UserProfileRef>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub school_class: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub gender_display: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub major_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub dorm_number: Option<String>,
}

impl StudentProfile {
    /// 姓名 → 用户名 → 学号 → id
    pub fn display_name(&self) -> String {
        let user = self.user_profile.as_ref().and_then(|p| p.user.as_ref());
        non_empty(self.name.as_deref())
            .or_else(|| user.and_then(|u| non_empty(Some(&u.first_name))))
            .or_else(|| user.and_then(|u| non_empty(Some(&u.username))))
            .or_else(|| non_empty(self.student_id.as_deref()))
            .map(str::to_owned)
            .unwrap_or_else(|| self.id.to_string())
    }

    pub fn phone(&self) -> Option<&str> {
        self.user_profile
            .as_ref()
            .and_then(|p| non_empty(p.phone.as_deref()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: i64,
    #[serde(default)]
    pub user_profile: Option<UserProfileRef>,
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub position_type: Option<String>,
    #[serde(default)]
    pub position_type_display: Option<String>,
    #[serde(default)]
    pub department: Option<i64>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub name_display: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub department_name: Option<String>,
    #[serde(default)]
    pub managed_class_info: Option<Value>,
}

impl TeacherProfile {
    pub fn display_name(&self) -> String {
        let user = self.user_profile.as_ref().and_then(|p| p.user.as_ref());
        non_empty(self.name_display.as_deref())
            .or_else(|| user.and_then(|u| non_empty(Some(&u.first_name))))
            .or_else(|| user.and_then(|u| non_empty(Some(&u.username))))
            .or_else(|| non_empty(self.teacher_id.as_deref()))
            .map(str::to_owned)
            .unwrap_or_else(|| self.id.to_string())
    }

    /// 班主任管理的班级名称
    pub fn managed_class_name(&self) -> Option<String> {
        self.managed_class_info
            .as_ref()
            .and_then(|v| v.get("name"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateStudentSchema {
    #[validate(custom(function = "validate_not_blank", message = "请填写学生姓名"))]
    pub name_write: String,
    pub school_class: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[validate(custom(function = "validate_optional_phone"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CreateStudentSchema {
    /// “无”和空串都不提交
    pub fn new(name: &str, school_class: i64, gender: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            name_write: name.trim().to_owned(),
            school_class,
            gender: gender
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_owned),
            phone: phone
                .map(str::trim)
                .filter(|p| !p.is_empty() && *p != "无")
                .map(str::to_owned),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UpdateStudentSchema {
    #[validate(custom(function = "validate_not_blank", message = "姓名不能为空"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_write: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub school_class: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[validate(custom(function = "validate_optional_phone"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[validate(schema(function = "validate_bulk_update"))]
pub struct BulkUpdateStudentsSchema {
    #[validate(length(min = 1, message = "请先选择学生"))]
    pub ids: Vec<i64>,
    pub class_id: Option<i64>,
    pub status: Option<String>,
}

fn validate_bulk_update(schema: &BulkUpdateStudentsSchema) -> Result<(), ValidationError> {
    let has_status = schema
        .status
        .as_deref()
        .map_or(false, |s| !s.trim().is_empty());
    if schema.class_id.is_none() && !has_status {
        return Err(ValidationError::new("bulk_update")
            .with_message("请至少选择一项要修改的内容（班级或状态）".into()));
    }
    Ok(())
}

/// 教师职务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeacherRole {
    Teacher,
    HeadTeacher,
    Dean,
    ViceDean,
    Principal,
    VicePrincipal,
}

impl TeacherRole {
    pub fn label(&self) -> &'static str {
        match self {
            TeacherRole::Teacher => "教师",
            TeacherRole::HeadTeacher => "班主任",
            TeacherRole::Dean => "院长",
            TeacherRole::ViceDean => "副院长",
            TeacherRole::Principal => "校长",
            TeacherRole::VicePrincipal => "副校长",
        }
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
#[validate(schema(function = "validate_teacher_role_fields"))]
pub struct CreateTeacherSchema {
    #[validate(regex(path = *TEACHER_ID_RE, message = "工号只能包含数字和字母"))]
    pub teacher_id: String,
    #[validate(custom(function = "validate_not_blank", message = "请填写姓名"))]
    pub name: String,
    pub role: TeacherRole,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub college_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
}

impl CreateTeacherSchema {
    /// 有专业时只提交专业；班级只对班主任提交
    pub fn new(
        teacher_id: &str,
        name: &str,
        role: TeacherRole,
        phone: &str,
        college: Option<i64>,
        department: Option<i64>,
        class_id: Option<i64>,
    ) -> Self {
        Self {
            teacher_id: teacher_id.trim().to_owned(),
            name: name.trim().to_owned(),
            role,
            phone: phone.trim().to_owned(),
            department,
            college_id: if department.is_none() { college } else { None },
            class_id: if role == TeacherRole::HeadTeacher {
                class_id
            } else {
                None
            },
        }
    }
}

fn validate_teacher_role_fields(schema: &CreateTeacherSchema) -> Result<(), ValidationError> {
    let fail = |msg: &str| Err(ValidationError::new("role_fields").with_message(msg.to_owned().into()));
    match schema.role {
        TeacherRole::HeadTeacher => {
            if schema.department.is_none() {
                return fail("班主任必须选择专业");
            }
            if schema.phone.is_empty() {
                return fail("班主任必须填写联系电话");
            }
            if schema.class_id.is_none() {
                return fail("班主任必须选择管理的班级");
            }
        }
        TeacherRole::Dean | TeacherRole::ViceDean => {
            if schema.college_id.is_none() && schema.department.is_none() {
                return fail("院长/副院长必须选择学院");
            }
        }
        _ => {}
    }
    if !schema.phone.is_empty() && validate_phone(&schema.phone).is_err() {
        return fail("手机号格式不正确");
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UpdateTeacherSchema {
    #[validate(custom(function = "validate_not_blank", message = "姓名不能为空"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<TeacherRole>,
    #[validate(custom(function = "validate_optional_phone"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,
}

// --- 3. 课程与排课 ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    #[serde(default)]
    pub subject_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub course_type: Option<String>,
    #[serde(default)]
    pub course_type_display: Option<String>,
    #[serde(default)]
    pub teacher: Option<i64>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub department: Option<i64>,
    #[serde(default)]
    pub department_name: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    /// 默认教室地址 (文本)
    #[serde(default)]
    pub classroom: Option<String>,
    #[serde(default)]
    pub student_count: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateCourseSchema {
    #[validate(length(min = 1, max = 128, message = "课程名称不能为空"))]
    pub name: String,
    pub course_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classroom: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(default)]
    pub id: i64,
    #[serde(deserialize_with = "lenient::u8_num")]
    pub weekday: u8,
    #[serde(deserialize_with = "lenient::u8_num")]
    pub index: u8,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// 排课记录里的时间段：可能是 id，也可能是嵌套对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeslotRef {
    Id(i64),
    Embedded(TimeSlot),
}

impl TimeslotRef {
    pub fn id(&self) -> i64 {
        match self {
            TimeslotRef::Id(id) => *id,
            TimeslotRef::Embedded(slot) => slot.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    #[serde(default)]
    pub school_class: Option<i64>,
    #[serde(default)]
    pub class_name: Option<String>,
    pub course: i64,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub teacher: Option<i64>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub classroom: Option<i64>,
    #[serde(default)]
    pub classroom_name: Option<String>,
    #[serde(default)]
    pub classroom_display: Option<String>,
    pub timeslot: TimeslotRef,
    #[serde(default = "first_week")]
    pub week_number: u8,
}

fn first_week() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateScheduleSchema {
    pub course: i64,
    pub timeslot: i64,
    #[validate(range(min = 1, max = 20, message = "周次必须在1-20之间"))]
    pub week_number: u8,
    pub school_class: i64,
    pub teacher: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classroom_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveScheduleSchema {
    pub timeslot: i64,
}

// --- 4. 考勤 ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student: i64,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub schedule: Option<i64>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub course_id: Option<i64>,
    /// 部分接口只返回 course
    #[serde(default)]
    pub course: Option<i64>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub status: AttendanceStatus,
    #[serde(default)]
    pub status_display: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub major_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateAttendanceSchema {
    pub student: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remark: String,
}

// --- 5. 成绩 ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: i64,
    #[serde(default)]
    pub student: Option<i64>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_username: Option<String>,
    #[serde(default)]
    pub course: Option<i64>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub course_type: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub major_name: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub score: Option<f64>,
    #[serde(default)]
    pub is_passed: Option<bool>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub regular_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub final_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub regular_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub final_weight: Option<f64>,
}

impl Grade {
    pub fn student_label(&self) -> String {
        non_empty(self.student_name.as_deref())
            .or_else(|| non_empty(self.student_username.as_deref()))
            .or_else(|| non_empty(self.student_id.as_deref()))
            .unwrap_or("-")
            .to_owned()
    }
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UpdateGradeSchema {
    #[validate(range(min = 0.0, max = 100.0, message = "分数必须在0-100之间"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regular_score: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "分数必须在0-100之间"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "分数必须在0-100之间"))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

// --- 6. 公告与日程 ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    #[serde(default)]
    pub created_by_role: Option<String>,
    #[serde(default, deserialize_with = "lenient::datetime_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub college: Option<i64>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::datetime_opt")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::datetime_opt")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<i64>,
    #[serde(default)]
    pub created_by_name: Option<String>,
    #[serde(default)]
    pub created_by_role: Option<String>,
    #[serde(default)]
    pub remind_minutes_before: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateNoticeSchema {
    #[validate(length(min = 1, max = 128, message = "标题不能为空"))]
    pub title: String,
    #[validate(custom(function = "validate_not_blank", message = "内容不能为空"))]
    pub content: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[validate(schema(function = "validate_event_window"))]
pub struct CreateEventSchema {
    #[validate(length(min = 1, max = 128, message = "标题不能为空"))]
    pub title: String,
    pub description: String,
    pub event_type: String,
    pub visibility: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate(range(min = 0, message = "提醒时间不能为负数"))]
    pub remind_minutes_before: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub college: Option<i64>,
}

fn validate_event_window(schema: &CreateEventSchema) -> Result<(), ValidationError> {
    if schema.end_time < schema.start_time {
        return Err(ValidationError::new("event_window").with_message("结束时间不能早于开始时间".into()));
    }
    if schema.visibility == "college" && schema.college.is_none() {
        return Err(ValidationError::new("event_college").with_message("学院范围的日程必须选择学院".into()));
    }
    Ok(())
}

// --- 7. 账户 ---
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ChangePasswordSchema {
    #[validate(length(min = 1, message = "请输入原密码"))]
    pub old_password: String,
    #[validate(length(min = 6, message = "新密码至少需要 6 位"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct ChangePhoneSchema {
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// 后端字段类型不稳定时的宽松解析 (Decimal 以字符串返回等)
pub(crate) mod lenient {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn f64_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }

    pub fn u8_num<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let value = Value::deserialize(d)?;
        let parsed = match &value {
            Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| D::Error::custom(format!("expected small integer, got {}", value)))
    }

    pub fn datetime_opt<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => return Ok(None),
        };
        Ok(parse_datetime(&raw))
    }

    /// RFC3339；没有时区的按 UTC 处理
    pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grade_accepts_decimal_strings() {
        let g: Grade = serde_json::from_value(json!({
            "id": 1, "score": "86.50", "regular_score": 80, "final_score": null,
            "regular_weight": "60.00", "final_weight": "40.00"
        }))
        .unwrap();
        assert_eq!(g.score, Some(86.5));
        assert_eq!(g.regular_score, Some(80.0));
        assert_eq!(g.final_score, None);
        assert_eq!(g.regular_weight, Some(60.0));
    }

    #[test]
    fn schedule_timeslot_as_id_or_object() {
        let by_id: Schedule = serde_json::from_value(json!({
            "id": 1, "course": 2, "timeslot": 12, "week_number": 3
        }))
        .unwrap();
        assert_eq!(by_id.timeslot, TimeslotRef::Id(12));

        let embedded: Schedule = serde_json::from_value(json!({
            "id": 1, "course": 2, "week_number": 3,
            "timeslot": {"id": 12, "weekday": "5", "index": 3, "start_time": "10:00:00"}
        }))
        .unwrap();
        match embedded.timeslot {
            TimeslotRef::Embedded(slot) => {
                assert_eq!((slot.weekday, slot.index), (5, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn notice_time_without_zone_is_utc() {
        let n: Notice = serde_json::from_value(json!({
            "id": 1, "title": "t", "created_at": "2024-05-01T08:00:00"
        }))
        .unwrap();
        assert_eq!(n.created_at.unwrap().to_rfc3339(), "2024-05-01T08:00:00+00:00");
    }

    #[test]
    fn student_name_fallback_chain() {
        let s: StudentProfile = serde_json::from_value(json!({
            "id": 9, "user_profile": {"user": {"username": "stu09", "first_name": ""}}
        }))
        .unwrap();
        assert_eq!(s.display_name(), "stu09");

        let s: StudentProfile = serde_json::from_value(json!({"id": 9})).unwrap();
        assert_eq!(s.display_name(), "9");
    }

    #[test]
    fn head_teacher_needs_department_phone_and_class() {
        let schema = CreateTeacherSchema::new("T01", "王老师", TeacherRole::HeadTeacher, "", None, Some(3), Some(8));
        let err = schema.validate().unwrap_err();
        assert_eq!(crate::validation::first_message(&err), "班主任必须填写联系电话");

        let schema = CreateTeacherSchema::new(
            "T01",
            "王老师",
            TeacherRole::HeadTeacher,
            "13800000000",
            Some(1),
            Some(3),
            Some(8),
        );
        assert!(schema.validate().is_ok());
        // 有专业时不提交学院
        assert_eq!(schema.college_id, None);
    }

    #[test]
    fn dean_needs_college() {
        let schema = CreateTeacherSchema::new("D01", "李院长", TeacherRole::Dean, "", None, None, None);
        assert!(schema.validate().is_err());
        let schema = CreateTeacherSchema::new("D01", "李院长", TeacherRole::Dean, "", Some(2), None, Some(5));
        assert!(schema.validate().is_ok());
        assert_eq!(schema.class_id, None);
    }

    #[test]
    fn teacher_id_must_be_alphanumeric() {
        let schema = CreateTeacherSchema::new("T-01", "张三", TeacherRole::Teacher, "", None, None, None);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn student_phone_placeholder_is_dropped() {
        let schema = CreateStudentSchema::new("小明", 4, Some(""), Some("无"));
        assert!(schema.validate().is_ok());
        let body = serde_json::to_value(&schema).unwrap();
        assert_eq!(body, json!({"name_write": "小明", "school_class": 4}));

        let schema = CreateStudentSchema::new("小明", 4, None, Some("12345"));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn bulk_update_requires_a_change() {
        let schema = BulkUpdateStudentsSchema {
            ids: vec![1, 2],
            class_id: None,
            status: Some(" ".into()),
        };
        assert!(schema.validate().is_err());
    }
}
