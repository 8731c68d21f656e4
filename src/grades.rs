// src/grades.rs
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::api::{file_form, ApiClient, Page, Query};
use crate::error::ClientError;
use crate::models::lenient;
use crate::models::{Grade, UpdateGradeSchema};
use crate::validation::Validated;

const GRADES: &str = "/api/grades/grades/";
pub const PASS_LINE: f64 = 60.0;
pub const EXCELLENT_LINE: f64 = 90.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// --- 1. 总评计算 ---

/// 平时分/期末分占比 (百分数)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_weight_sum"))]
pub struct GradeWeights {
    #[validate(range(min = 0.0, max = 100.0, message = "占比必须在0-100之间"))]
    pub regular_weight: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "占比必须在0-100之间"))]
    pub final_weight: f64,
}

impl Default for GradeWeights {
    /// 后端保存时使用的 60/40
    fn default() -> Self {
        Self {
            regular_weight: 60.0,
            final_weight: 40.0,
        }
    }
}

fn validate_weight_sum(w: &GradeWeights) -> Result<(), ValidationError> {
    if (w.regular_weight + w.final_weight - 100.0).abs() > f64::EPSILON {
        return Err(ValidationError::new("weight_sum")
            .with_message("平时分占比和期末分占比之和必须等于100%".into()));
    }
    Ok(())
}

impl GradeWeights {
    pub fn new(regular_weight: f64, final_weight: f64) -> Self {
        Self {
            regular_weight,
            final_weight,
        }
    }

    /// 成绩录入页的初始占比
    pub fn entry_default() -> Self {
        Self::new(50.0, 50.0)
    }

    /// 两项成绩都有时才计算总评
    pub fn total(&self, regular: Option<f64>, final_score: Option<f64>) -> Option<f64> {
        let (r, f) = (regular?, final_score?);
        Some(round2(
            r * self.regular_weight / 100.0 + f * self.final_weight / 100.0,
        ))
    }
}

/// 默认 60/40 的总评
pub fn weighted_total(regular: f64, final_score: f64) -> f64 {
    round2(regular * 0.6 + final_score * 0.4)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassBadge {
    Passed,
    Failed,
    Missing,
}

impl PassBadge {
    pub fn of(score: Option<f64>) -> Self {
        match score {
            Some(s) if s >= PASS_LINE => PassBadge::Passed,
            Some(_) => PassBadge::Failed,
            None => PassBadge::Missing,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PassBadge::Passed => "及格",
            PassBadge::Failed => "不及格",
            PassBadge::Missing => "未录入",
        }
    }
}

/// 总评分档，用于着色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Excellent,
    Pass,
    Fail,
}

impl Tier {
    pub fn of(score: f64) -> Self {
        if score >= EXCELLENT_LINE {
            Tier::Excellent
        } else if score >= PASS_LINE {
            Tier::Pass
        } else {
            Tier::Fail
        }
    }
}

// --- 2. 成绩列表 ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PassFilter {
    #[default]
    All,
    /// ≥ 90，前端过滤
    Excellent,
    /// 60-89
    Passed,
    Failed,
}

impl PassFilter {
    fn is_passed_param(&self) -> Option<bool> {
        match self {
            PassFilter::Passed => Some(true),
            PassFilter::Failed => Some(false),
            PassFilter::All | PassFilter::Excellent => None,
        }
    }

    /// 服务端只区分及格/不及格，优秀和“及格不优秀”在这里再筛一次
    pub fn keep(&self, score: Option<f64>) -> bool {
        match self {
            PassFilter::Excellent => score.map_or(false, |s| s >= EXCELLENT_LINE),
            PassFilter::Passed => score.map_or(false, |s| (PASS_LINE..EXCELLENT_LINE).contains(&s)),
            PassFilter::Failed | PassFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradeQuery {
    pub college_id: Option<i64>,
    pub major_id: Option<i64>,
    pub class_id: Option<i64>,
    pub course_id: Option<i64>,
    pub student_name: String,
    pub pass: PassFilter,
}

impl GradeQuery {
    pub fn to_query(&self) -> Query {
        Query::new()
            .push_opt("college_id", self.college_id)
            .push_opt("major_id", self.major_id)
            .push_opt("class_id", self.class_id)
            .push_opt("course_id", self.course_id)
            .push_nonempty("student_name", &self.student_name)
            .push_opt("is_passed", self.pass.is_passed_param())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRow {
    pub id: i64,
    pub student: String,
    pub course: String,
    pub class_name: String,
    pub regular_score: Option<f64>,
    pub final_score: Option<f64>,
    pub score: Option<f64>,
    pub badge: PassBadge,
}

impl From<&Grade> for GradeRow {
    fn from(g: &Grade) -> Self {
        Self {
            id: g.id,
            student: g.student_label(),
            course: g.course_name.clone().unwrap_or_else(|| "-".into()),
            class_name: g.class_name.clone().unwrap_or_else(|| "-".into()),
            regular_score: g.regular_score,
            final_score: g.final_score,
            score: g.score,
            badge: PassBadge::of(g.score),
        }
    }
}

// --- 3. 批量录入 ---

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct GradeEntry {
    /// 学生档案 id
    pub student_id: i64,
    #[validate(range(min = 0.0, max = 100.0, message = "分数必须在0-100之间"))]
    pub regular_score: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "分数必须在0-100之间"))]
    pub final_score: Option<f64>,
}

impl GradeEntry {
    pub fn has_score(&self) -> bool {
        self.regular_score.is_some() || self.final_score.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
#[validate(schema(function = "validate_batch_weights"))]
pub struct BatchSaveGrades {
    pub course_id: i64,
    /// 班级编号 (不是数据库 id)
    pub class_id: String,
    pub regular_weight: f64,
    pub final_weight: f64,
    #[validate(length(min = 1, message = "请至少录入一个学生的成绩"), nested)]
    pub grades: Vec<GradeEntry>,
}

fn validate_batch_weights(batch: &BatchSaveGrades) -> Result<(), ValidationError> {
    validate_weight_sum(&GradeWeights::new(batch.regular_weight, batch.final_weight))
}

impl BatchSaveGrades {
    /// 两项成绩都为空的行不提交
    pub fn new(
        course_id: i64,
        class_id: &str,
        weights: GradeWeights,
        entries: impl IntoIterator<Item = GradeEntry>,
    ) -> Self {
        Self {
            course_id,
            class_id: class_id.to_owned(),
            regular_weight: weights.regular_weight,
            final_weight: weights.final_weight,
            grades: entries.into_iter().filter(GradeEntry::has_score).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SaveResult {
    #[serde(default)]
    pub saved_count: u64,
    #[serde(default)]
    pub errors: Vec<Value>,
}

impl SaveResult {
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            format!("成功保存 {} 条成绩记录", self.saved_count)
        } else {
            format!(
                "成功保存 {} 条成绩记录，有 {} 条记录保存失败",
                self.saved_count,
                self.errors.len()
            )
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BatchCreateResult {
    #[serde(default)]
    pub created: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewGrade {
    pub student: i64,
    pub course: i64,
    pub score: f64,
    pub approved: bool,
}

/// 解析 “学生id,课程id,分数” 文本；不完整的行跳过
pub fn parse_grade_lines(text: &str) -> Vec<NewGrade> {
    text.lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            Some(NewGrade {
                student: parts[0].parse().ok()?,
                course: parts[1].parse().ok()?,
                score: parts[2].parse().ok()?,
                approved: false,
            })
        })
        .collect()
}

// --- 4. 统计 ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatLevel {
    College,
    Major,
    Class,
}

impl StatLevel {
    pub fn code(&self) -> &'static str {
        match self {
            StatLevel::College => "college",
            StatLevel::Major => "major",
            StatLevel::Class => "class",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatRow {
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub major_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub total_students: u64,
    #[serde(default)]
    pub total_grades: u64,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub average_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub pass_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub excellent_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub good_rate: Option<f64>,
    #[serde(default)]
    pub passed_count: u64,
    #[serde(default)]
    pub failed_count: u64,
}

impl StatRow {
    pub fn name(&self, level: StatLevel) -> &str {
        let name = match level {
            StatLevel::College => &self.college_name,
            StatLevel::Major => &self.major_name,
            StatLevel::Class => &self.class_name,
        };
        name.as_deref().unwrap_or("-")
    }
}

/// 全校汇总：平均分按成绩条数加权
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rollup {
    pub total_students: u64,
    pub total_grades: u64,
    pub average_score: f64,
    pub pass_rate: f64,
    pub excellent_rate: f64,
}

pub fn rollup(rows: &[StatRow]) -> Rollup {
    let mut out = Rollup::default();
    let mut score_sum = 0.0;
    let mut passed = 0u64;
    let mut excellent = 0.0;
    for row in rows {
        out.total_students += row.total_students;
        out.total_grades += row.total_grades;
        score_sum += row.average_score.unwrap_or(0.0) * row.total_grades as f64;
        passed += row.passed_count;
        excellent += (row.total_grades as f64 * row.excellent_rate.unwrap_or(0.0) / 100.0).round();
    }
    if out.total_grades > 0 {
        let n = out.total_grades as f64;
        out.average_score = round2(score_sum / n);
        out.pass_rate = round2(passed as f64 / n * 100.0);
        out.excellent_rate = round2(excellent / n * 100.0);
    }
    out
}

/// 教师授课的 (课程, 班级) 汇总
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TeacherClassSummary {
    pub course_id: i64,
    #[serde(default)]
    pub course_name: Option<String>,
    pub class_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub student_count: u64,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub avg_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub pass_rate: Option<f64>,
}

impl TeacherClassSummary {
    pub fn key(&self) -> String {
        format!("{}_{}", self.course_id, self.class_id)
    }

    pub fn pass_rate_label(&self) -> String {
        self.pass_rate
            .map(|r| format!("{:.2}%", r))
            .unwrap_or_else(|| "-".into())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CourseClass {
    pub id: i64,
    pub class_id: String,
    pub name: String,
    #[serde(default)]
    pub major_name: Option<String>,
    #[serde(default)]
    pub college_name: Option<String>,
    #[serde(default)]
    pub enrollment_year: Option<i32>,
}

/// 某课程某班级的学生及其成绩 (未录入时分数为空)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassStudentGrade {
    pub student_id: i64,
    #[serde(default)]
    pub student_number: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub grade_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub regular_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub final_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub regular_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64_opt")]
    pub final_weight: Option<f64>,
    #[serde(default)]
    pub approved: bool,
}

impl ClassStudentGrade {
    pub fn badge(&self) -> PassBadge {
        PassBadge::of(self.score)
    }
}

/// 班级已保存的占比；没有时用录入页默认值
pub fn saved_weights(students: &[ClassStudentGrade]) -> GradeWeights {
    students
        .first()
        .and_then(|s| Some(GradeWeights::new(s.regular_weight?, s.final_weight?)))
        .unwrap_or_else(GradeWeights::entry_default)
}

// --- 5. 接口 ---

pub struct GradeBook {
    client: ApiClient,
}

impl GradeBook {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, query: &GradeQuery) -> Result<Vec<GradeRow>, ClientError> {
        let page: Page<Grade> = self.client.list(GRADES, &query.to_query()).await?;
        Ok(page
            .items
            .iter()
            .filter(|g| query.pass.keep(g.score))
            .map(GradeRow::from)
            .collect())
    }

    pub async fn update(&self, id: i64, schema: Validated<UpdateGradeSchema>) -> Result<(), ClientError> {
        self.client
            .patch(&format!("{}{}/", GRADES, id), &*schema)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), ClientError> {
        self.client.delete(&format!("{}{}/", GRADES, id)).await?;
        Ok(())
    }

    pub async fn save_batch(&self, batch: Validated<BatchSaveGrades>) -> Result<SaveResult, ClientError> {
        let raw = self
            .client
            .post("/api/grades/grades/batch_save_grades/", &*batch)
            .await?;
        let result: SaveResult = serde_json::from_value(raw)?;
        if !result.errors.is_empty() {
            tracing::warn!("部分成绩保存失败: {:?}", result.errors);
        }
        tracing::info!("{}", result.message());
        Ok(result)
    }

    pub async fn batch_create(&self, grades: Vec<NewGrade>) -> Result<BatchCreateResult, ClientError> {
        if grades.is_empty() {
            return Err(ClientError::Invalid("没有有效的数据".into()));
        }
        let raw = self
            .client
            .post(
                "/api/grades/grades/batch_create/",
                &serde_json::json!({ "grades": grades }),
            )
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn statistics(&self, level: StatLevel, scope: &GradeQuery) -> Result<Vec<StatRow>, ClientError> {
        let query = Query::new()
            .push("level", level.code())
            .push_opt("college_id", scope.college_id)
            .push_opt("major_id", scope.major_id)
            .push_opt("class_id", scope.class_id);
        Ok(self
            .client
            .list::<StatRow>("/api/grades/grades/statistics/", &query)
            .await?
            .items)
    }

    pub async fn teacher_classes(&self) -> Result<Vec<TeacherClassSummary>, ClientError> {
        Ok(self
            .client
            .list::<TeacherClassSummary>("/api/grades/grades/teacher_classes/", &Query::new())
            .await?
            .items)
    }

    pub async fn course_classes(&self, course_id: i64) -> Result<Vec<CourseClass>, ClientError> {
        let query = Query::new().push("course_id", course_id);
        Ok(self
            .client
            .list::<CourseClass>("/api/grades/grades/course_classes/", &query)
            .await?
            .items)
    }

    pub async fn class_students(&self, course_id: i64, class_id: &str) -> Result<Vec<ClassStudentGrade>, ClientError> {
        let query = Query::new()
            .push("course_id", course_id)
            .push("class_id", class_id);
        Ok(self
            .client
            .list::<ClassStudentGrade>("/api/grades/grades/class_students_grades/", &query)
            .await?
            .items)
    }

    /// 导入班级成绩表 (Excel 文件原样上传)
    pub async fn import_class(
        &self,
        course_id: i64,
        class_id: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<SaveResult, ClientError> {
        let form = file_form(bytes, filename)?
            .text("course_id", course_id.to_string())
            .text("class_id", class_id.to_owned());
        let raw = self
            .client
            .post_form("/api/grades/grades/class_grades_import/", form)
            .await?;
        Ok(serde_json::from_value(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_weights_are_sixty_forty() {
        assert_eq!(weighted_total(85.0, 90.0), 87.0);
        assert_eq!(weighted_total(59.5, 61.25), 60.2);
        assert_eq!(GradeWeights::default().total(Some(85.0), Some(90.0)), Some(87.0));
        assert_eq!(GradeWeights::default().total(Some(85.0), None), None);
        assert_eq!(GradeWeights::entry_default().total(Some(70.0), Some(80.0)), Some(75.0));
    }

    #[test]
    fn pass_badge_boundary() {
        assert_eq!(PassBadge::of(Some(60.0)).label(), "及格");
        assert_eq!(PassBadge::of(Some(59.99)).label(), "不及格");
        assert_eq!(PassBadge::of(None).label(), "未录入");
        assert_eq!(Tier::of(90.0), Tier::Excellent);
        assert_eq!(Tier::of(89.99), Tier::Pass);
    }

    #[test]
    fn weights_must_sum_to_hundred() {
        assert!(GradeWeights::new(70.0, 30.0).validate().is_ok());
        let err = GradeWeights::new(70.0, 40.0).validate().unwrap_err();
        assert_eq!(
            crate::validation::first_message(&err),
            "平时分占比和期末分占比之和必须等于100%"
        );
    }

    #[test]
    fn batch_drops_empty_rows_and_rejects_nothing_to_save() {
        let rows = vec![
            GradeEntry { student_id: 1, regular_score: Some(80.0), final_score: None },
            GradeEntry { student_id: 2, regular_score: None, final_score: None },
        ];
        let batch = BatchSaveGrades::new(3, "CS2101", GradeWeights::default(), rows);
        assert_eq!(batch.grades.len(), 1);
        assert!(batch.validate().is_ok());

        let empty = BatchSaveGrades::new(3, "CS2101", GradeWeights::default(), Vec::new());
        assert!(Validated::new(empty).is_err());
    }

    #[test]
    fn pass_filter_query_and_local_filter() {
        let q = GradeQuery {
            pass: PassFilter::Passed,
            ..Default::default()
        };
        assert_eq!(q.to_query().get("is_passed"), Some("true"));
        assert!(PassFilter::Passed.keep(Some(75.0)));
        assert!(!PassFilter::Passed.keep(Some(95.0)));
        assert!(PassFilter::Excellent.keep(Some(90.0)));
        let excellent = GradeQuery {
            pass: PassFilter::Excellent,
            ..Default::default()
        };
        assert_eq!(excellent.to_query().get("is_passed"), None);
    }

    #[test]
    fn rollup_weights_by_grade_count() {
        let rows: Vec<StatRow> = serde_json::from_value(json!([
            {"total_students": 10, "total_grades": 30, "average_score": "80.00",
             "passed_count": 27, "excellent_rate": 20.0},
            {"total_students": 5, "total_grades": 10, "average_score": 60.0,
             "passed_count": 5, "excellent_rate": 0},
        ]))
        .unwrap();
        let r = rollup(&rows);
        assert_eq!(r.total_students, 15);
        assert_eq!(r.average_score, 75.0);
        assert_eq!(r.pass_rate, 80.0);
        assert_eq!(r.excellent_rate, 15.0);
        assert_eq!(rollup(&[]), Rollup::default());
    }

    #[test]
    fn parse_grade_lines_skips_bad_rows() {
        let parsed = parse_grade_lines("1,2,88.5\nbad\n3, 4 ,x\n5,6,70");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].score, 88.5);
        assert_eq!(parsed[1].student, 5);
    }

    #[test]
    fn saved_weights_fall_back_to_entry_default() {
        let students: Vec<ClassStudentGrade> = serde_json::from_value(json!([
            {"student_id": 1, "regular_weight": 60.0, "final_weight": 40.0}
        ]))
        .unwrap();
        assert_eq!(saved_weights(&students), GradeWeights::default());
        assert_eq!(saved_weights(&[]), GradeWeights::entry_default());
    }
}
