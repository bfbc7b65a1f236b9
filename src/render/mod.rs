//! 错题呈现
//!
//! - `segments`：`$` 分段
//! - `live`：KaTeX 交互式 HTML
//! - `raster` / `export`：公式光栅化 + DOCX 导出
//! - `plain`：纯文本

pub mod export;
pub mod live;
pub mod plain;
pub mod raster;
pub mod segments;

use crate::error::FolioResult;
use crate::store::MistakeRecord;

pub use export::{ExportComposer, ExportSummary, RasterComposed};
pub use live::{KatexBundle, LiveRenderer, LiveTypeset};
pub use plain::PlainText;
pub use raster::{FormulaRasterizer, FormulaRenderError, GlyphRasterizer};
pub use segments::{parse_segments, segments, Segment, SegmentKind, Segments};

/// 呈现目标：同一组记录的不同输出形式
pub trait PresentationTarget {
    type Output;

    fn present(&self, records: &[MistakeRecord]) -> FolioResult<Self::Output>;
}
