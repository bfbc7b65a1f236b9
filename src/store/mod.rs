//! 错题记录存储
//!
//! `MistakeStore` 是对外的存储接口：增删改查、按条件筛选、随机抽取。
//! 底层为单文件 SQLite（`database`），SQL 集中在 `repo`。

pub mod database;
pub mod repo;
pub mod types;

pub use database::{MistakeDatabase, MistakeDatabaseStats};
pub use repo::MistakeRepo;
pub use types::{MistakeDraft, MistakeFilters, MistakeRecord};

use rand::Rng;
use std::path::Path;

use crate::error::FolioResult;

pub struct MistakeStore {
    db: MistakeDatabase,
}

impl MistakeStore {
    pub fn open(db_path: &Path) -> FolioResult<Self> {
        Ok(Self {
            db: MistakeDatabase::open(db_path)?,
        })
    }

    pub fn database(&self) -> &MistakeDatabase {
        &self.db
    }

    pub fn add(&self, draft: &MistakeDraft) -> FolioResult<i64> {
        let conn = self.db.get_conn()?;
        MistakeRepo::insert(&conn, draft)
    }

    pub fn get_by_id(&self, id: i64) -> FolioResult<Option<MistakeRecord>> {
        let conn = self.db.get_conn()?;
        MistakeRepo::get_by_id(&conn, id)
    }

    pub fn update(&self, id: i64, draft: &MistakeDraft) -> FolioResult<()> {
        let conn = self.db.get_conn()?;
        MistakeRepo::update(&conn, id, draft)
    }

    /// 删除记录，不处理关联图片；需要图片路径的调用方应先 `get_by_id`
    pub fn delete(&self, id: i64) -> FolioResult<()> {
        let conn = self.db.get_conn()?;
        MistakeRepo::delete(&conn, id)?;
        Ok(())
    }

    pub fn list(&self, filters: &MistakeFilters) -> FolioResult<Vec<MistakeRecord>> {
        let conn = self.db.get_conn()?;
        MistakeRepo::list(&conn, filters)
    }

    pub fn count(&self, filters: &MistakeFilters) -> FolioResult<u64> {
        let conn = self.db.get_conn()?;
        MistakeRepo::count(&conn, filters)
    }

    pub fn sample_random(
        &self,
        count: i64,
        filters: &MistakeFilters,
    ) -> FolioResult<Vec<MistakeRecord>> {
        self.sample_random_with_rng(count, filters, &mut rand::thread_rng())
    }

    pub fn sample_random_with_rng<R: Rng + ?Sized>(
        &self,
        count: i64,
        filters: &MistakeFilters,
        rng: &mut R,
    ) -> FolioResult<Vec<MistakeRecord>> {
        let conn = self.db.get_conn()?;
        MistakeRepo::sample_random(&conn, count, filters, rng)
    }

    pub fn statistics(&self) -> FolioResult<MistakeDatabaseStats> {
        self.db.get_statistics()
    }
}
