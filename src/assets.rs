use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use tokio::fs as async_fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ContainedFailure, FolioError, FolioResult};

type Result<T> = FolioResult<T>;

/// 读取题目图片的结果
#[derive(Debug)]
pub enum ImageLoad {
    /// 文件不存在：视为没有图片
    Missing,
    /// 文件存在但读取失败
    Unreadable(String),
    Loaded { bytes: Vec<u8>, mime: &'static str },
}

/// 题目图片目录管理
pub struct AssetManager {
    images_dir: PathBuf,
}

impl AssetManager {
    pub fn new(images_dir: PathBuf) -> Self {
        AssetManager { images_dir }
    }

    /// 获取 images 目录
    pub fn images_directory(&self) -> &Path {
        &self.images_dir
    }

    /// 把外部图片复制到 images 目录，文件名为 `<uuid>.<ext>`，返回存储路径
    pub async fn ingest_image(&self, source: &Path) -> Result<PathBuf> {
        if !async_fs::try_exists(source)
            .await
            .map_err(|e| FolioError::AssetIo(format!("检查文件存在性失败: {}", e)))?
        {
            return Err(FolioError::AssetIo(format!(
                "图片文件不存在: {}",
                source.display()
            )));
        }

        async_fs::create_dir_all(&self.images_dir)
            .await
            .map_err(|e| FolioError::AssetIo(format!("创建图片目录失败: {}", e)))?;

        let target = self.images_dir.join(Self::generated_filename(source));
        async_fs::copy(source, &target)
            .await
            .map_err(|e| FolioError::AssetIo(format!("复制图片文件失败: {}", e)))?;

        info!(
            "[Assets] Ingested image {} -> {}",
            source.display(),
            target.display()
        );
        Ok(target)
    }

    fn generated_filename(source: &Path) -> String {
        let file_id = Uuid::new_v4().to_string();
        match source
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
        {
            Some(ext) => format!("{}.{}", file_id, ext.to_lowercase()),
            None => file_id,
        }
    }

    /// 读取图片字节；不存在与读取失败分开报告，均不返回错误
    pub fn load_image(path: &Path) -> ImageLoad {
        if !path.exists() {
            debug!("[Assets] Image missing, skipped: {}", path.display());
            return ImageLoad::Missing;
        }
        match fs::read(path) {
            Ok(bytes) => ImageLoad::Loaded {
                bytes,
                mime: Self::infer_mime_from_path(path),
            },
            Err(e) => {
                warn!("[Assets] Failed to read image {}: {}", path.display(), e);
                ImageLoad::Unreadable(e.to_string())
            }
        }
    }

    /// `data:<mime>;base64,...`
    pub fn to_data_url(bytes: &[u8], mime: &str) -> String {
        format!(
            "data:{};base64,{}",
            mime,
            general_purpose::STANDARD.encode(bytes)
        )
    }

    pub fn infer_mime_from_path(path: &Path) -> &'static str {
        let lower = path.to_string_lossy().to_lowercase();
        if lower.ends_with(".png") {
            "image/png"
        } else if lower.ends_with(".gif") {
            "image/gif"
        } else if lower.ends_with(".webp") {
            "image/webp"
        } else if lower.ends_with(".bmp") {
            "image/bmp"
        } else if lower.ends_with(".svg") {
            "image/svg+xml"
        } else {
            "image/jpeg"
        }
    }

    /// 尽力删除图片：不存在视为成功，删除失败作为被容纳的失败返回
    pub fn remove_image(path: &Path) -> Option<ContainedFailure> {
        if !path.exists() {
            return None;
        }
        match fs::remove_file(path) {
            Ok(()) => {
                debug!("[Assets] Removed image: {}", path.display());
                None
            }
            Err(e) => {
                warn!("[Assets] 删除图片文件失败 {}: {}", path.display(), e);
                Some(ContainedFailure::Cleanup {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ingest_copies_with_unique_name() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("photo.PNG");
        std::fs::write(&source, b"fake-png").unwrap();

        let manager = AssetManager::new(tmp.path().join("assets").join("images"));
        let first = manager.ingest_image(&source).await.unwrap();
        let second = manager.ingest_image(&source).await.unwrap();

        assert_ne!(first, second);
        assert!(first.starts_with(manager.images_directory()));
        assert_eq!(first.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&first).unwrap(), b"fake-png");
        assert!(source.exists(), "source must be left in place");
    }

    #[tokio::test]
    async fn test_ingest_missing_source_is_asset_error() {
        let tmp = TempDir::new().unwrap();
        let manager = AssetManager::new(tmp.path().join("images"));
        let err = manager
            .ingest_image(&tmp.path().join("nope.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::AssetIo(_)));
    }

    #[test]
    fn test_load_image_variants() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            AssetManager::load_image(&tmp.path().join("none.png")),
            ImageLoad::Missing
        ));

        // 目录存在但不是文件，读取会失败
        let dir_as_image = tmp.path().join("dir.png");
        std::fs::create_dir(&dir_as_image).unwrap();
        assert!(matches!(
            AssetManager::load_image(&dir_as_image),
            ImageLoad::Unreadable(_)
        ));

        let file = tmp.path().join("ok.gif");
        std::fs::write(&file, b"GIF89a").unwrap();
        match AssetManager::load_image(&file) {
            ImageLoad::Loaded { bytes, mime } => {
                assert_eq!(bytes, b"GIF89a");
                assert_eq!(mime, "image/gif");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_remove_missing_image_is_not_a_failure() {
        let tmp = TempDir::new().unwrap();
        assert!(AssetManager::remove_image(&tmp.path().join("gone.png")).is_none());
    }

    #[test]
    fn test_data_url() {
        assert_eq!(
            AssetManager::to_data_url(b"hi", "image/png"),
            "data:image/png;base64,aGk="
        );
    }
}
