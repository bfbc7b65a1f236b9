//! 应用配置
//!
//! 加载顺序：内置默认值 → `config/insight_folio.toml`（可选）→ `FOLIO__*` 环境变量。
//! 启动时会先读取 `.env`。

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

const CONFIG_FILE_STEM: &str = "config/insight_folio";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    /// 应用数据目录（数据库、图片）
    pub data_dir: PathBuf,
    /// 数据库文件名
    pub database_file: String,
    /// 题目图片目录（相对 data_dir）
    pub images_subdir: String,
    /// KaTeX 资源目录（katex.min.css / katex.min.js / auto-render.min.js）
    pub katex_dir: PathBuf,
    /// 公式光栅化使用的字体；未配置时在常见系统路径中查找
    pub formula_font: Option<PathBuf>,
    pub raster: RasterSettings,
    pub export: ExportSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    /// 公式图片高度（像素）
    pub formula_height_px: u32,
    /// 四周留白（像素）
    pub padding_px: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// 题目图片最大显示宽度（像素，96 DPI）
    pub image_max_width_px: u32,
    /// 公式图片显示缩放（光栅高度 × 该系数 = 显示高度）
    pub formula_display_scale: f32,
}

impl Default for FolioConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "qisilu.db".to_string(),
            images_subdir: "images".to_string(),
            katex_dir: PathBuf::from("assets/katex"),
            formula_font: None,
            raster: RasterSettings::default(),
            export: ExportSettings::default(),
        }
    }
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            formula_height_px: 64,
            padding_px: 6,
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            image_max_width_px: 450,
            formula_display_scale: 0.4,
        }
    }
}

impl FolioConfig {
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(Path::new(&format!("{}.toml", CONFIG_FILE_STEM)))
    }

    /// 文件在前、环境变量在后：后加入的来源覆盖先加入的
    pub fn load(file: &Path) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if file.exists() {
            debug!("[Config] Loading {}", file.display());
            builder = builder.add_source(config::File::from(file));
        }
        let loaded = builder
            .add_source(
                config::Environment::with_prefix("FOLIO")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let cfg = match loaded.try_deserialize::<FolioConfig>() {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("[Config] Invalid configuration, falling back to defaults: {}", e);
                FolioConfig::default()
            }
        };
        Ok(cfg)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join(&self.images_subdir)
    }

    /// 配置的字体；否则返回第一个存在的常见系统字体
    pub fn resolve_formula_font(&self) -> Option<PathBuf> {
        if let Some(path) = &self.formula_font {
            return Some(path.clone());
        }
        const CANDIDATES: &[&str] = &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/Library/Fonts/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
            "C:\\Windows\\Fonts\\cambria.ttc",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];
        CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }
}
