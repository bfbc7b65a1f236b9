use chrono::{Local, NaiveDate};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::types::{MistakeDraft, MistakeFilters, MistakeRecord};
use crate::error::{FolioError, FolioResult};

const SELECT_COLUMNS: &str = r#"
    SELECT id, subject, grade, semester, record_date, question_desc, question_image,
           correct_answer, mistake_reason, review_count, last_review_date
    FROM mistakes
"#;

pub struct MistakeRepo;

impl MistakeRepo {
    /// 插入新错题，返回分配的 id；`record_date` 取当天日期
    pub fn insert(conn: &Connection, draft: &MistakeDraft) -> FolioResult<i64> {
        Self::insert_on(conn, draft, Local::now().date_naive())
    }

    pub(crate) fn insert_on(
        conn: &Connection,
        draft: &MistakeDraft,
        record_date: NaiveDate,
    ) -> FolioResult<i64> {
        draft.validate()?;

        conn.execute(
            r#"
            INSERT INTO mistakes (
                subject, grade, semester, record_date, question_desc,
                question_image, correct_answer, mistake_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                draft.subject,
                draft.grade,
                draft.semester,
                record_date,
                draft.question_desc,
                draft.question_image,
                draft.correct_answer,
                draft.mistake_reason,
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("[MistakeRepo] Inserted mistake: id={}", id);
        Ok(id)
    }

    pub fn get_by_id(conn: &Connection, id: i64) -> FolioResult<Option<MistakeRecord>> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let record = conn
            .query_row(&sql, params![id], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    /// 整体替换内容 / 分类字段；`id`、`record_date` 与复习字段保持不变
    pub fn update(conn: &Connection, id: i64, draft: &MistakeDraft) -> FolioResult<()> {
        draft.validate()?;

        let changed = conn.execute(
            r#"
            UPDATE mistakes SET
                subject = ?1,
                grade = ?2,
                semester = ?3,
                question_desc = ?4,
                question_image = ?5,
                correct_answer = ?6,
                mistake_reason = ?7
            WHERE id = ?8
            "#,
            params![
                draft.subject,
                draft.grade,
                draft.semester,
                draft.question_desc,
                draft.question_image,
                draft.correct_answer,
                draft.mistake_reason,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(FolioError::NotFound(id));
        }
        debug!("[MistakeRepo] Updated mistake: id={}", id);
        Ok(())
    }

    /// 删除记录；id 不存在时静默返回。返回是否真的删除了一行。
    pub fn delete(conn: &Connection, id: i64) -> FolioResult<bool> {
        let changed = conn.execute("DELETE FROM mistakes WHERE id = ?1", params![id])?;
        debug!("[MistakeRepo] Delete mistake: id={}, removed={}", id, changed);
        Ok(changed > 0)
    }

    /// 按筛选条件列出，最新添加的在前
    pub fn list(conn: &Connection, filters: &MistakeFilters) -> FolioResult<Vec<MistakeRecord>> {
        let (where_sql, patterns) = Self::build_where(filters);
        let sql = format!("{}{} ORDER BY id DESC", SELECT_COLUMNS, where_sql);

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            patterns.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_record)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        debug!("[MistakeRepo] Listed {} mistakes", records.len());
        Ok(records)
    }

    pub fn count(conn: &Connection, filters: &MistakeFilters) -> FolioResult<u64> {
        let (where_sql, patterns) = Self::build_where(filters);
        let sql = format!("SELECT COUNT(*) FROM mistakes{}", where_sql);
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            patterns.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let count: i64 = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// 从符合条件的记录中无放回地均匀抽取 `min(count, 匹配数)` 条
    pub fn sample_random<R: Rng + ?Sized>(
        conn: &Connection,
        count: i64,
        filters: &MistakeFilters,
        rng: &mut R,
    ) -> FolioResult<Vec<MistakeRecord>> {
        if count <= 0 {
            return Ok(Vec::new());
        }
        let matches = Self::list(conn, filters)?;
        let amount = (count as usize).min(matches.len());
        let sampled: Vec<MistakeRecord> = matches
            .choose_multiple(rng, amount)
            .cloned()
            .collect();

        debug!(
            "[MistakeRepo] Sampled {} of {} matching mistakes (requested {})",
            sampled.len(),
            matches.len(),
            count
        );
        Ok(sampled)
    }

    /// 转义 SQL LIKE 模式中的特殊字符，防止用户输入被当作通配符
    fn escape_like_pattern(s: &str) -> String {
        s.replace('\\', r"\\").replace('%', r"\%").replace('_', r"\_")
    }

    /// 生成 WHERE 子句与对应的 `%…%` 参数
    fn build_where(filters: &MistakeFilters) -> (String, Vec<String>) {
        let clauses = filters.active_clauses();
        if clauses.is_empty() {
            return (String::new(), Vec::new());
        }

        let mut conditions = Vec::with_capacity(clauses.len());
        let mut patterns = Vec::with_capacity(clauses.len());
        for (idx, (column, value)) in clauses.into_iter().enumerate() {
            conditions.push(format!("{} LIKE ?{} ESCAPE '\\'", column, idx + 1));
            patterns.push(format!("%{}%", Self::escape_like_pattern(value)));
        }
        (format!(" WHERE {}", conditions.join(" AND ")), patterns)
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<MistakeRecord> {
        Ok(MistakeRecord {
            id: row.get(0)?,
            subject: row.get(1)?,
            grade: row.get(2)?,
            semester: row.get(3)?,
            record_date: row.get(4)?,
            question_desc: row.get(5)?,
            question_image: row.get(6)?,
            correct_answer: row.get(7)?,
            mistake_reason: row.get(8)?,
            review_count: row.get::<_, Option<i64>>(9)?.unwrap_or(0),
            last_review_date: row.get(10)?,
        })
    }
}
