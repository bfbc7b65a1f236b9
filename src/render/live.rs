//! 交互式渲染：生成单条错题的独立 HTML 文档
//!
//! 文本原样嵌入（转义 + 换行转 `<br>`），公式由内联的 KaTeX auto-render
//! 在显示时扫描 `$…$`、`$$…$$`、`\(…\)`、`\[…\]` 排版。

use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use regex::{Captures, Regex};
use tracing::{debug, warn};

use super::PresentationTarget;
use crate::assets::{AssetManager, ImageLoad};
use crate::error::{FolioError, FolioResult};
use crate::store::MistakeRecord;
use crate::utils::text::{escape_html, text_to_html};

const KATEX_CSS: &str = "katex.min.css";
const KATEX_JS: &str = "katex.min.js";
const AUTO_RENDER_JS: &str = "auto-render.min.js";

const PAGE_CSS: &str = r#"
body { font-family: sans-serif; margin: 2em; line-height: 1.6; }
.meta { color: #555; font-size: 0.9em; margin-bottom: 1em; }
.meta span { margin-right: 1.5em; }
h3 { border-left: 4px solid #3b82f6; padding-left: 0.5em; }
.question-image img { max-width: 100%; }
.image-error { color: #b91c1c; border: 1px dashed #b91c1c; padding: 0.5em; }
.empty { color: #999; }
"#;

const AUTO_RENDER_BOOT: &str = r#"
document.addEventListener("DOMContentLoaded", function() {
    renderMathInElement(document.body, {
        delimiters: [
            {left: "$$", right: "$$", display: true},
            {left: "$", right: "$", display: false},
            {left: "\\[", right: "\\]", display: true},
            {left: "\\(", right: "\\)", display: false}
        ],
        throwOnError: false
    });
});
"#;

/// 内联到文档中的 KaTeX 资源
#[derive(Debug, Clone)]
pub struct KatexBundle {
    css: String,
    katex_js: String,
    auto_render_js: String,
}

impl KatexBundle {
    /// 从资源目录加载；任一文件缺失即失败
    pub fn load(dir: &Path) -> FolioResult<Self> {
        let read = |name: &str| -> FolioResult<String> {
            let path = dir.join(name);
            fs::read_to_string(&path).map_err(|e| {
                FolioError::Render(format!(
                    "KaTeX asset unavailable {}: {}",
                    path.display(),
                    e
                ))
            })
        };

        let css = Self::inline_fonts(&read(KATEX_CSS)?, dir);
        let bundle = Self {
            css,
            katex_js: Self::escape_script(&read(KATEX_JS)?),
            auto_render_js: Self::escape_script(&read(AUTO_RENDER_JS)?),
        };
        debug!("[Render::Live] KaTeX bundle loaded from {}", dir.display());
        Ok(bundle)
    }

    /// 样式表里 `url(fonts/…)` 改写为 data URL；字体文件不存在时保留原引用
    fn inline_fonts(css: &str, dir: &Path) -> String {
        let pattern = match Regex::new(r#"url\(\s*['"]?(fonts/[^'")\s]+)['"]?\s*\)"#) {
            Ok(p) => p,
            Err(_) => return css.to_string(),
        };
        pattern
            .replace_all(css, |caps: &Captures| {
                let relative = &caps[1];
                let font_path = dir.join(relative);
                match fs::read(&font_path) {
                    Ok(bytes) => format!(
                        "url(data:{};base64,{})",
                        Self::font_mime(&font_path),
                        general_purpose::STANDARD.encode(bytes)
                    ),
                    Err(_) => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn font_mime(path: &Path) -> &'static str {
        match path.extension().and_then(|e| e.to_str()) {
            Some("woff2") => "font/woff2",
            Some("woff") => "font/woff",
            Some("ttf") => "font/ttf",
            _ => "application/octet-stream",
        }
    }

    fn escape_script(js: &str) -> String {
        js.replace("</script", "<\\/script")
    }
}

/// `LiveTypeset` 渲染器
#[derive(Debug)]
pub struct LiveRenderer {
    bundle: KatexBundle,
}

impl LiveRenderer {
    pub fn new(bundle: KatexBundle) -> Self {
        Self { bundle }
    }

    pub fn from_dir(katex_dir: &Path) -> FolioResult<Self> {
        Ok(Self::new(KatexBundle::load(katex_dir)?))
    }

    /// 渲染单条错题；图片问题降级处理，不返回错误
    pub fn render(&self, record: &MistakeRecord, show_answer: bool) -> String {
        let mut body = String::new();

        body.push_str(&format!(
            r#"<div class="meta"><span>学科：{}</span><span>年级：{}</span><span>学期：{}</span><span>日期：{}</span></div>"#,
            escape_html(&record.subject),
            escape_html(&record.grade),
            escape_html(&record.semester),
            record.record_date.format("%Y-%m-%d"),
        ));

        body.push_str(&Self::section("题目", Some(&record.question_desc)));

        if let Some(image) = record.question_image.as_deref() {
            body.push_str(&Self::image_section(Path::new(image)));
        }

        if show_answer {
            body.push_str(&Self::section("正确答案", record.correct_answer.as_deref()));
            body.push_str(&Self::section("错误原因", record.mistake_reason.as_deref()));
        }

        self.document(&body)
    }

    /// 复习结束页
    pub fn render_finished(&self) -> String {
        self.document("<h1>复习完成！</h1>")
    }

    fn section(title: &str, text: Option<&str>) -> String {
        let content = match text.filter(|t| !t.trim().is_empty()) {
            Some(t) => text_to_html(t),
            None => r#"<span class="empty">（未填写）</span>"#.to_string(),
        };
        format!(
            r#"<h3>{}</h3><div class="content">{}</div>"#,
            title, content
        )
    }

    fn image_section(path: &Path) -> String {
        match AssetManager::load_image(path) {
            ImageLoad::Missing => String::new(),
            ImageLoad::Unreadable(reason) => {
                warn!(
                    "[Render::Live] Question image unreadable {}: {}",
                    path.display(),
                    reason
                );
                format!(
                    r#"<div class="image-error">图片加载失败：{}</div>"#,
                    escape_html(&reason)
                )
            }
            ImageLoad::Loaded { bytes, mime } => format!(
                r#"<div class="question-image"><img src="{}" alt="题目图片"></div>"#,
                AssetManager::to_data_url(&bytes, mime)
            ),
        }
    }

    fn document(&self, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\">\n<style>{}</style>\n<style>{}</style>\n<script>{}</script>\n<script>{}</script>\n</head><body>\n{}\n<script>{}</script>\n</body></html>\n",
            self.bundle.css,
            PAGE_CSS,
            self.bundle.katex_js,
            self.bundle.auto_render_js,
            body,
            AUTO_RENDER_BOOT,
        )
    }
}

/// 交互式呈现目标：每条记录一个独立文档
pub struct LiveTypeset<'r> {
    pub renderer: &'r LiveRenderer,
    pub show_answer: bool,
}

impl PresentationTarget for LiveTypeset<'_> {
    type Output = Vec<String>;

    fn present(&self, records: &[MistakeRecord]) -> FolioResult<Self::Output> {
        Ok(records
            .iter()
            .map(|record| self.renderer.render(record, self.show_answer))
            .collect())
    }
}

/// 写出 `{id}.html` 供外部浏览器打开
pub fn write_document(dir: &Path, record: &MistakeRecord, html: &str) -> FolioResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| FolioError::Render(e.to_string()))?;
    let path = dir.join(format!("mistake-{}.html", record.id));
    fs::write(&path, html).map_err(|e| FolioError::Render(e.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn write_bundle(dir: &Path) {
        fs::create_dir_all(dir.join("fonts")).unwrap();
        fs::write(
            dir.join(KATEX_CSS),
            ".katex{font:normal 1.21em KaTeX_Main} @font-face{src:url(fonts/KaTeX_Main-Regular.woff2) format(\"woff2\"),url(fonts/Missing.woff) format(\"woff\")}",
        )
        .unwrap();
        fs::write(dir.join("fonts").join("KaTeX_Main-Regular.woff2"), b"wOF2").unwrap();
        fs::write(dir.join(KATEX_JS), "var katex={};").unwrap();
        fs::write(dir.join(AUTO_RENDER_JS), "function renderMathInElement(){}").unwrap();
    }

    fn record(image: Option<String>) -> MistakeRecord {
        MistakeRecord {
            id: 3,
            subject: "数学".to_string(),
            grade: "7年级".to_string(),
            semester: "上册".to_string(),
            record_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            question_desc: "解方程 $x^2=4$\n求 x".to_string(),
            question_image: image,
            correct_answer: Some("$x=\\pm 2$".to_string()),
            mistake_reason: Some("漏掉负根".to_string()),
            review_count: 0,
            last_review_date: None,
        }
    }

    #[test]
    fn test_missing_bundle_is_render_error() {
        let tmp = TempDir::new().unwrap();
        let err = LiveRenderer::from_dir(tmp.path()).unwrap_err();
        assert!(matches!(err, FolioError::Render(_)));
    }

    #[test]
    fn test_fonts_inlined_when_present() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path());
        let bundle = KatexBundle::load(tmp.path()).unwrap();
        assert!(bundle.css.contains("url(data:font/woff2;base64,"));
        assert!(bundle.css.contains("url(fonts/Missing.woff)"));
    }

    #[test]
    fn test_answer_sections_only_when_requested() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path());
        let renderer = LiveRenderer::from_dir(tmp.path()).unwrap();

        let hidden = renderer.render(&record(None), false);
        assert!(hidden.contains("解方程 $x^2=4$<br>求 x"));
        assert!(hidden.contains("2025-09-01"));
        assert!(!hidden.contains("正确答案"));
        assert!(!hidden.contains("漏掉负根"));

        let shown = renderer.render(&record(None), true);
        assert!(shown.contains("正确答案"));
        assert!(shown.contains("$x=\\pm 2$"));
        assert!(shown.contains("漏掉负根"));
        assert!(shown.contains("var katex={};"));
        assert!(!shown.contains("<link"), "assets must be inline");
    }

    #[test]
    fn test_image_handling() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path());
        let renderer = LiveRenderer::from_dir(tmp.path()).unwrap();

        let missing = tmp.path().join("gone.png");
        let html = renderer.render(&record(Some(missing.display().to_string())), false);
        assert!(!html.contains("<img"));
        assert!(!html.contains("image-error"));

        let unreadable = tmp.path().join("folder.png");
        fs::create_dir(&unreadable).unwrap();
        let html = renderer.render(&record(Some(unreadable.display().to_string())), false);
        assert!(html.contains("image-error"));

        let present = tmp.path().join("q.png");
        fs::write(&present, b"png-bytes").unwrap();
        let html = renderer.render(&record(Some(present.display().to_string())), false);
        assert!(html.contains("src=\"data:image/png;base64,"));
        assert!(!html.contains(&present.display().to_string()));
    }

    #[test]
    fn test_live_target_renders_each_record() {
        let tmp = TempDir::new().unwrap();
        write_bundle(tmp.path());
        let renderer = LiveRenderer::from_dir(tmp.path()).unwrap();
        let target = LiveTypeset {
            renderer: &renderer,
            show_answer: true,
        };
        let docs = target.present(&[record(None), record(None)]).unwrap();
        assert_eq!(docs.len(), 2);
    }
}
