//! 多条错题导出为分页 DOCX
//!
//! 每条记录依次输出：标题、题目、题目图片、正确答案、错误原因；记录之间插入分页符
//! （最后一条之后不插入）。公式先光栅化为临时 PNG 再嵌入，导出结束后统一清理。

use std::fs::{self, File};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docx_rs::{BreakType, Docx, Paragraph, Pic, Run};
use image::ImageOutputFormat;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::raster::{placeholder_image, FormulaImage, FormulaRasterizer};
use super::segments::{segments, SegmentKind};
use super::PresentationTarget;
use crate::assets::{AssetManager, ImageLoad};
use crate::config::ExportSettings;
use crate::error::{Contained, ContainedFailure, FolioError, FolioResult};
use crate::store::MistakeRecord;

/// 96 DPI 下每像素对应的 EMU
const EMU_PER_PX: u32 = 9525;
const EMPTY_SECTION: &str = "（未填写）";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub records: usize,
    /// 成功光栅化的公式数
    pub formulas: usize,
    /// 渲染失败、以占位图代替的公式数
    pub placeholders: usize,
    pub images: usize,
    pub page_breaks: usize,
}

/// 单次导出的可变状态
struct ComposeState {
    scratch: PathBuf,
    temp_files: Vec<PathBuf>,
    failures: Vec<ContainedFailure>,
    summary: ExportSummary,
}

impl ComposeState {
    /// 公式图片落盘到临时目录，再读回嵌入文档
    fn persist(&mut self, png: &[u8]) -> FolioResult<Vec<u8>> {
        let path = self.scratch.join(format!("{}.png", Uuid::new_v4()));
        fs::write(&path, png).map_err(|e| {
            FolioError::Export(format!("cannot write temp image {}: {}", path.display(), e))
        })?;
        self.temp_files.push(path.clone());
        fs::read(&path).map_err(|e| {
            FolioError::Export(format!("cannot read temp image {}: {}", path.display(), e))
        })
    }
}

#[derive(Clone)]
pub struct ExportComposer {
    rasterizer: Arc<dyn FormulaRasterizer>,
    settings: ExportSettings,
    scratch_root: Option<PathBuf>,
}

impl ExportComposer {
    pub fn new(rasterizer: Arc<dyn FormulaRasterizer>, settings: ExportSettings) -> Self {
        Self {
            rasterizer,
            settings,
            scratch_root: None,
        }
    }

    /// 临时公式图片所在的父目录（默认系统临时目录）
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// 导出记录到 `destination`
    ///
    /// 只有目标不可写或文档库内部错误才返回 `FolioError::Export`；
    /// 公式、图片、临时文件清理的失败随结果返回。
    pub fn compose(
        &self,
        records: &[MistakeRecord],
        destination: &Path,
    ) -> FolioResult<Contained<ExportSummary>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("insight-folio-export-");
        let scratch_dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| FolioError::Export(format!("cannot create scratch directory: {}", e)))?;

        let mut state = ComposeState {
            scratch: scratch_dir.path().to_path_buf(),
            temp_files: Vec::new(),
            failures: Vec::new(),
            summary: ExportSummary {
                path: destination.to_path_buf(),
                ..ExportSummary::default()
            },
        };

        let built = self.build_document(records, &mut state);
        let written = built.and_then(|docx| Self::write(docx, destination));

        // 无论成功与否都清理临时文件
        let cleanup = purge_temp_files(&state.temp_files);
        state.failures.extend(cleanup);
        if let Err(e) = scratch_dir.close() {
            warn!("[Render::Export] Failed to remove scratch directory: {}", e);
            state.failures.push(ContainedFailure::Cleanup {
                path: state.scratch.clone(),
                reason: e.to_string(),
            });
        }

        written?;
        state.summary.records = records.len();
        info!(
            "[Render::Export] Exported {} records to {} ({} formulas, {} placeholders, {} images)",
            state.summary.records,
            destination.display(),
            state.summary.formulas,
            state.summary.placeholders,
            state.summary.images
        );
        Ok(Contained::with_failures(state.summary, state.failures))
    }

    fn build_document(
        &self,
        records: &[MistakeRecord],
        state: &mut ComposeState,
    ) -> FolioResult<Docx> {
        let mut paragraphs = Vec::new();
        for (index, record) in records.iter().enumerate() {
            debug!("[Render::Export] Composing mistake {}", record.id);
            paragraphs.push(
                Paragraph::new().add_run(
                    Run::new()
                        .add_text(format!("Item {}", index + 1))
                        .bold()
                        .size(32),
                ),
            );
            paragraphs.push(Paragraph::new().add_run(
                Run::new().color("666666").add_text(format!(
                    "{} · {} · {} · {}",
                    record.subject,
                    record.grade,
                    record.semester,
                    record.record_date.format("%Y-%m-%d")
                )),
            ));

            paragraphs.extend(self.section("题目", Some(&record.question_desc), state)?);
            if let Some(image) = record.question_image.as_deref() {
                paragraphs.extend(self.image_paragraph(Path::new(image), state));
            }
            paragraphs.extend(self.section("正确答案", record.correct_answer.as_deref(), state)?);
            paragraphs.extend(self.section("错误原因", record.mistake_reason.as_deref(), state)?);

            if index + 1 < records.len() {
                paragraphs.push(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
                state.summary.page_breaks += 1;
            }
        }

        Ok(paragraphs
            .into_iter()
            .fold(Docx::new(), |docx, paragraph| docx.add_paragraph(paragraph)))
    }

    /// 标题 + 正文；正文按分段结果排版，文本中的换行开启新段落
    fn section(
        &self,
        title: &str,
        text: Option<&str>,
        state: &mut ComposeState,
    ) -> FolioResult<Vec<Paragraph>> {
        let mut paragraphs = vec![Paragraph::new().add_run(Run::new().add_text(title).bold())];

        let text = match text.filter(|t| !t.trim().is_empty()) {
            Some(t) => t,
            None => {
                paragraphs.push(
                    Paragraph::new().add_run(Run::new().color("999999").add_text(EMPTY_SECTION)),
                );
                return Ok(paragraphs);
            }
        };

        let mut current = Paragraph::new();
        for segment in segments(text) {
            match segment.kind {
                SegmentKind::Text => {
                    for (i, line) in segment.lines().enumerate() {
                        if i > 0 {
                            paragraphs.push(std::mem::replace(&mut current, Paragraph::new()));
                        }
                        if !line.is_empty() {
                            current = current.add_run(Run::new().add_text(line));
                        }
                    }
                }
                SegmentKind::Math => {
                    if segment.is_blank_math() {
                        continue;
                    }
                    current = current.add_run(self.formula_run(segment.content, state)?);
                }
            }
        }
        paragraphs.push(current);
        Ok(paragraphs)
    }

    fn formula_run(&self, expression: &str, state: &mut ComposeState) -> FolioResult<Run> {
        let image = match self.rasterizer.rasterize(expression) {
            Ok(image) => {
                state.summary.formulas += 1;
                image
            }
            Err(e) => {
                warn!(
                    "[Render::Export] Formula render failed, using placeholder: {:?} ({})",
                    expression, e
                );
                state.failures.push(ContainedFailure::Formula {
                    expression: expression.to_string(),
                    reason: e.to_string(),
                });
                state.summary.placeholders += 1;
                placeholder_image(self.rasterizer.height_px())?
            }
        };

        let bytes = state.persist(&image.png)?;
        let (width, height) = self.formula_display_size(&image);
        Ok(Run::new().add_image(Pic::new(&bytes).size(px_to_emu(width), px_to_emu(height))))
    }

    fn formula_display_size(&self, image: &FormulaImage) -> (u32, u32) {
        let scale = self.settings.formula_display_scale.max(0.01);
        (
            ((image.width as f32 * scale).round() as u32).max(1),
            ((image.height as f32 * scale).round() as u32).max(1),
        )
    }

    /// 题目图片：不存在时跳过；无法读取或解码时跳过并记录
    fn image_paragraph(&self, path: &Path, state: &mut ComposeState) -> Option<Paragraph> {
        let contain = |state: &mut ComposeState, reason: String| {
            warn!(
                "[Render::Export] Question image skipped {}: {}",
                path.display(),
                reason
            );
            state.failures.push(ContainedFailure::Image {
                path: path.to_path_buf(),
                reason,
            });
        };

        let bytes = match AssetManager::load_image(path) {
            ImageLoad::Missing => return None,
            ImageLoad::Unreadable(reason) => {
                contain(state, reason);
                return None;
            }
            ImageLoad::Loaded { bytes, .. } => bytes,
        };

        let decoded = match image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                contain(state, e.to_string());
                return None;
            }
        };

        let mut png = Cursor::new(Vec::new());
        if let Err(e) = decoded.write_to(&mut png, ImageOutputFormat::Png) {
            contain(state, e.to_string());
            return None;
        }

        let (width, height) = fit_width(
            decoded.width(),
            decoded.height(),
            self.settings.image_max_width_px,
        );
        state.summary.images += 1;
        Some(Paragraph::new().add_run(
            Run::new().add_image(
                Pic::new(&png.into_inner()).size(px_to_emu(width), px_to_emu(height)),
            ),
        ))
    }

    fn write(docx: Docx, destination: &Path) -> FolioResult<()> {
        if let Some(parent) = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent).map_err(|e| {
                FolioError::Export(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let file = File::create(destination).map_err(|e| {
            FolioError::Export(format!("cannot create {}: {}", destination.display(), e))
        })?;
        docx.build()
            .pack(file)
            .map_err(|e| FolioError::Export(format!("docx packaging failed: {}", e)))?;
        Ok(())
    }
}

/// 逐个删除临时文件；失败只记录，不中断
pub fn purge_temp_files(paths: &[PathBuf]) -> Vec<ContainedFailure> {
    let mut failures = Vec::new();
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(
                "[Render::Export] Failed to delete temp file {}: {}",
                path.display(),
                e
            );
            failures.push(ContainedFailure::Cleanup {
                path: path.clone(),
                reason: e.to_string(),
            });
        }
    }
    failures
}

/// 等比缩放到不超过 `max_width`
fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width == 0 || height == 0 || max_width == 0 || width <= max_width {
        return (width.max(1), height.max(1));
    }
    let scaled_height = (height as u64 * max_width as u64 / width as u64).max(1) as u32;
    (max_width, scaled_height)
}

fn px_to_emu(px: u32) -> u32 {
    px.saturating_mul(EMU_PER_PX)
}

/// 导出呈现目标
pub struct RasterComposed<'c> {
    pub composer: &'c ExportComposer,
    pub destination: &'c Path,
}

impl PresentationTarget for RasterComposed<'_> {
    type Output = Contained<ExportSummary>;

    fn present(&self, records: &[MistakeRecord]) -> FolioResult<Self::Output> {
        self.composer.compose(records, self.destination)
    }
}
