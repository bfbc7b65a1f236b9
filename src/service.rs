//! 错题业务服务
//!
//! 组合存储、图片目录和导出：带图片的新增/修改、删除时清理图片、
//! 在阻塞线程池上执行导出。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::assets::AssetManager;
use crate::config::FolioConfig;
use crate::error::{Contained, FolioError, FolioResult};
use crate::render::{ExportComposer, ExportSummary, GlyphRasterizer};
use crate::store::{MistakeDraft, MistakeFilters, MistakeRecord, MistakeStore};

pub struct MistakeService {
    store: MistakeStore,
    assets: AssetManager,
    composer: ExportComposer,
}

impl MistakeService {
    pub fn new(store: MistakeStore, assets: AssetManager, composer: ExportComposer) -> Self {
        Self {
            store,
            assets,
            composer,
        }
    }

    pub fn from_config(config: &FolioConfig) -> FolioResult<Self> {
        let store = MistakeStore::open(&config.database_path())?;
        let assets = AssetManager::new(config.images_dir());
        let rasterizer = GlyphRasterizer::from_font_path(
            config.resolve_formula_font().as_deref(),
            config.raster.clone(),
        );
        let composer = ExportComposer::new(Arc::new(rasterizer), config.export.clone());
        Ok(Self::new(store, assets, composer))
    }

    pub fn store(&self) -> &MistakeStore {
        &self.store
    }

    pub fn assets(&self) -> &AssetManager {
        &self.assets
    }

    /// 新增错题；`image_source` 会先复制到图片目录
    pub async fn add_with_image(
        &self,
        mut draft: MistakeDraft,
        image_source: Option<&Path>,
    ) -> FolioResult<i64> {
        // 先校验，避免复制出无主图片
        draft.validate()?;

        let ingested = match image_source {
            Some(source) => Some(self.assets.ingest_image(source).await?),
            None => None,
        };
        if let Some(path) = &ingested {
            draft.question_image = Some(path.display().to_string());
        }

        match self.store.add(&draft) {
            Ok(id) => {
                info!("[Service] Added mistake {}", id);
                Ok(id)
            }
            Err(e) => {
                Self::discard_ingested(ingested.as_deref(), &e);
                Err(e)
            }
        }
    }

    /// 修改错题；提供新图片时替换旧图片，旧文件尽力删除
    pub async fn update_with_image(
        &self,
        id: i64,
        mut draft: MistakeDraft,
        image_source: Option<&Path>,
    ) -> FolioResult<Contained<()>> {
        draft.validate()?;
        let existing = self
            .store
            .get_by_id(id)?
            .ok_or(FolioError::NotFound(id))?;

        let ingested = match image_source {
            Some(source) => Some(self.assets.ingest_image(source).await?),
            None => None,
        };
        let replaced = match &ingested {
            Some(stored) => {
                draft.question_image = Some(stored.display().to_string());
                existing
                    .question_image
                    .filter(|old| Path::new(old) != stored.as_path())
            }
            None => None,
        };

        if let Err(e) = self.store.update(id, &draft) {
            Self::discard_ingested(ingested.as_deref(), &e);
            return Err(e);
        }

        let failures = replaced
            .and_then(|old| AssetManager::remove_image(Path::new(&old)))
            .into_iter()
            .collect();
        Ok(Contained::with_failures((), failures))
    }

    /// 写库失败时删除刚复制进来的图片
    fn discard_ingested(ingested: Option<&Path>, cause: &FolioError) {
        let Some(path) = ingested else {
            return;
        };
        match AssetManager::remove_image(path) {
            None => info!(
                "[Service] Removed orphan image {} after failed write: {}",
                path.display(),
                cause
            ),
            Some(failure) => error!(
                "[Service] Orphan image left behind after failed write ({}): {}",
                cause, failure
            ),
        }
    }

    /// 删除错题及其图片
    ///
    /// 返回值表示记录是否存在；图片不存在不算失败，删除失败作为被容纳的失败返回。
    pub fn delete_with_assets(&self, id: i64) -> FolioResult<Contained<bool>> {
        let Some(record) = self.store.get_by_id(id)? else {
            return Ok(Contained::clean(false));
        };

        self.store.delete(id)?;
        info!("[Service] Deleted mistake {}", id);

        let failures = record
            .question_image
            .as_deref()
            .and_then(|image| AssetManager::remove_image(Path::new(image)))
            .into_iter()
            .collect();
        Ok(Contained::with_failures(true, failures))
    }

    /// 在阻塞线程池上导出
    pub async fn export(
        &self,
        records: Vec<MistakeRecord>,
        destination: PathBuf,
    ) -> FolioResult<Contained<ExportSummary>> {
        let composer = self.composer.clone();
        let result = tokio::task::spawn_blocking(move || composer.compose(&records, &destination))
            .await
            .map_err(|e| FolioError::Export(format!("export task failed: {}", e)))?;

        if let Ok(contained) = &result {
            for failure in &contained.failures {
                warn!("[Service] Export degraded: {}", failure);
            }
        }
        result
    }

    pub async fn export_filtered(
        &self,
        filters: &MistakeFilters,
        destination: PathBuf,
    ) -> FolioResult<Contained<ExportSummary>> {
        let records = self.store.list(filters)?;
        self.export(records, destination).await
    }
}
