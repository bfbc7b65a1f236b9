//! 错题本 SQLite 数据库管理
//!
//! 单文件数据库，使用 r2d2 连接池；打开时建表（无迁移）。

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{FolioError, FolioResult};

/// SQLite 连接池类型
pub type MistakePool = Pool<SqliteConnectionManager>;

/// SQLite 池化连接类型
pub type MistakePooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS mistakes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL,
    grade TEXT NOT NULL,
    semester TEXT NOT NULL,
    record_date DATE NOT NULL,
    question_desc TEXT NOT NULL,
    question_image TEXT,
    correct_answer TEXT,
    mistake_reason TEXT,
    review_count INTEGER DEFAULT 0,
    last_review_date DATE
);
"#;

/// 错题本数据库管理器
pub struct MistakeDatabase {
    pool: MistakePool,
    db_path: PathBuf,
}

impl MistakeDatabase {
    /// 打开（必要时创建）数据库文件并建表
    pub fn open(db_path: &Path) -> FolioResult<Self> {
        info!("[Mistake::Database] Opening database: {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                error!(
                    "[Mistake::Database] Failed to create data directory: {}",
                    e
                );
                return Err(FolioError::Storage(format!(
                    "Failed to create data directory: {}",
                    e
                )));
            }
        }

        let pool = Self::build_pool(db_path)?;
        let db = Self {
            pool,
            db_path: db_path.to_path_buf(),
        };
        db.init_schema()?;

        info!(
            "[Mistake::Database] Database ready: {}",
            db.db_path.display()
        );
        Ok(db)
    }

    fn build_pool(db_path: &Path) -> FolioResult<MistakePool> {
        debug!(
            "[Mistake::Database] Building connection pool for: {}",
            db_path.display()
        );

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 3000i64)?;
            Ok(())
        });

        Pool::builder()
            .max_size(4)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)
            .map_err(|e| FolioError::Storage(format!("Failed to create connection pool: {}", e)))
    }

    fn init_schema(&self) -> FolioResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// 获取数据库连接
    pub fn get_conn(&self) -> FolioResult<MistakePooledConnection> {
        Ok(self.pool.get()?)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 数据库统计信息
    pub fn get_statistics(&self) -> FolioResult<MistakeDatabaseStats> {
        let conn = self.get_conn()?;
        let record_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM mistakes", [], |row| row.get(0))?;
        let with_image_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mistakes WHERE TRIM(COALESCE(question_image, '')) <> ''",
            [],
            |row| row.get(0),
        )?;
        Ok(MistakeDatabaseStats {
            record_count: record_count as u64,
            with_image_count: with_image_count as u64,
            db_path: self.db_path.clone(),
        })
    }
}

/// 错题本数据库统计信息
#[derive(Debug, Clone, Serialize)]
pub struct MistakeDatabaseStats {
    pub record_count: u64,
    pub with_image_count: u64,
    pub db_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_db() -> (TempDir, MistakeDatabase) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = MistakeDatabase::open(&temp_dir.path().join("database").join("qisilu.db"))
            .expect("Failed to open database");
        (temp_dir, db)
    }

    #[test]
    fn test_database_creation() {
        let (temp_dir, db) = setup_test_db();
        let db_file = temp_dir.path().join("database").join("qisilu.db");
        assert!(db_file.exists(), "Database file should exist");
        assert_eq!(db.db_path(), db_file);
    }

    #[test]
    fn test_table_created() {
        let (_temp_dir, db) = setup_test_db();
        let conn = db.get_conn().expect("Failed to get connection");
        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='mistakes'",
                [],
                |row| row.get(0),
            )
            .expect("Failed to check table existence");
        assert_eq!(exists, 1);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let (temp_dir, db) = setup_test_db();
        {
            let conn = db.get_conn().unwrap();
            conn.execute(
                "INSERT INTO mistakes (subject, grade, semester, record_date, question_desc)
                 VALUES ('数学', '7年级', '上册', '2025-01-23', 'x')",
                [],
            )
            .unwrap();
        }
        drop(db);

        let db2 = MistakeDatabase::open(&temp_dir.path().join("database").join("qisilu.db"))
            .expect("Failed to reopen database");
        let stats = db2.get_statistics().unwrap();
        assert_eq!(stats.record_count, 1);
        assert_eq!(stats.with_image_count, 0);
    }
}
