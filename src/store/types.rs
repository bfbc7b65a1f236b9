use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{FolioError, FolioResult};

/// 错题记录（读取后的不可变快照）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeRecord {
    pub id: i64,
    pub subject: String,
    pub grade: String,
    pub semester: String,
    pub record_date: NaiveDate,
    pub question_desc: String,
    pub question_image: Option<String>,
    pub correct_answer: Option<String>,
    pub mistake_reason: Option<String>,
    pub review_count: i64,
    pub last_review_date: Option<NaiveDate>,
}

impl MistakeRecord {
    /// 可写字段的副本，便于编辑后回写
    pub fn to_draft(&self) -> MistakeDraft {
        MistakeDraft {
            subject: self.subject.clone(),
            grade: self.grade.clone(),
            semester: self.semester.clone(),
            question_desc: self.question_desc.clone(),
            question_image: self.question_image.clone(),
            correct_answer: self.correct_answer.clone(),
            mistake_reason: self.mistake_reason.clone(),
        }
    }
}

/// 新增 / 更新时提交的字段
///
/// `id`、`record_date`、复习计数不在此列：前两者由存储层分配且不可更改，
/// 复习计数由外部复习流程维护。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeDraft {
    pub subject: String,
    pub grade: String,
    pub semester: String,
    pub question_desc: String,
    pub question_image: Option<String>,
    pub correct_answer: Option<String>,
    pub mistake_reason: Option<String>,
}

impl MistakeDraft {
    /// 检查必填字段（去除首尾空白后不能为空）
    pub fn validate(&self) -> FolioResult<()> {
        let required = [
            ("subject", &self.subject),
            ("grade", &self.grade),
            ("semester", &self.semester),
            ("question_desc", &self.question_desc),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FolioError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )))
        }
    }
}

/// 列表 / 随机抽取的筛选条件
///
/// 每个字段对应一列；`None` 或空字符串表示不参与筛选。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeFilters {
    pub subject: Option<String>,
    pub grade: Option<String>,
    pub semester: Option<String>,
    pub question_desc: Option<String>,
}

impl MistakeFilters {
    pub fn subject(mut self, value: impl Into<String>) -> Self {
        self.subject = Some(value.into());
        self
    }

    pub fn grade(mut self, value: impl Into<String>) -> Self {
        self.grade = Some(value.into());
        self
    }

    pub fn semester(mut self, value: impl Into<String>) -> Self {
        self.semester = Some(value.into());
        self
    }

    pub fn question_desc(mut self, value: impl Into<String>) -> Self {
        self.question_desc = Some(value.into());
        self
    }

    /// 参与筛选的 (列名, 查询串)。列名固定来自本结构，不接受外部输入。
    pub(crate) fn active_clauses(&self) -> Vec<(&'static str, &str)> {
        [
            ("subject", &self.subject),
            ("grade", &self.grade),
            ("semester", &self.semester),
            ("question_desc", &self.question_desc),
        ]
        .into_iter()
        .filter_map(|(column, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (column, v))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.active_clauses().is_empty()
    }
}
