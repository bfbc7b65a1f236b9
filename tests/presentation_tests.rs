//! 分段、交互渲染、复习会话与导出的端到端测试

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use insight_folio_lib::assets::AssetManager;
use insight_folio_lib::config::{ExportSettings, RasterSettings};
use insight_folio_lib::render::{
    parse_segments, ExportComposer, GlyphRasterizer, LiveRenderer, PresentationTarget,
    RasterComposed, Segment,
};
use insight_folio_lib::{
    ContainedFailure, FolioError, MistakeDraft, MistakeFilters, MistakeService, MistakeStore,
    ReviewSession,
};

fn write_katex(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("katex.min.css"), ".katex{}").unwrap();
    fs::write(dir.join("katex.min.js"), "var katex={};").unwrap();
    fs::write(dir.join("auto-render.min.js"), "function renderMathInElement(){}").unwrap();
}

fn service(tmp: &TempDir) -> MistakeService {
    let store = MistakeStore::open(&tmp.path().join("folio.db")).unwrap();
    let composer = ExportComposer::new(
        Arc::new(GlyphRasterizer::new(None, RasterSettings::default())),
        ExportSettings::default(),
    );
    MistakeService::new(store, AssetManager::new(tmp.path().join("images")), composer)
}

fn draft(question: &str) -> MistakeDraft {
    MistakeDraft {
        subject: "数学".to_string(),
        grade: "7年级".to_string(),
        semester: "下册".to_string(),
        question_desc: question.to_string(),
        correct_answer: Some("答案 $x=1$".to_string()),
        ..MistakeDraft::default()
    }
}

#[test]
fn segments_alternate_and_end_with_text() {
    for source in ["solve $x^2=4$ for x", "$a$ and $b$", "no math", "", "odd $ count"] {
        let segs = parse_segments(source);
        assert!(!segs.is_empty());
        assert!(!segs.last().unwrap().is_math(), "{:?}", source);
        for pair in segs.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
        }
    }
    assert_eq!(
        parse_segments("solve $x^2=4$ for x"),
        vec![
            Segment::text("solve "),
            Segment::math("x^2=4"),
            Segment::text(" for x")
        ]
    );
}

#[test]
fn live_render_requires_katex_bundle() {
    let tmp = TempDir::new().unwrap();
    let err = LiveRenderer::from_dir(&tmp.path().join("missing")).err().unwrap();
    assert!(matches!(err, FolioError::Render(_)));
}

#[test]
fn review_session_walks_sample_and_finishes() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    for i in 0..3 {
        svc.store().add(&draft(&format!("第{}题 $x+{}$", i, i))).unwrap();
    }
    let katex = tmp.path().join("katex");
    write_katex(&katex);
    let renderer = LiveRenderer::from_dir(&katex).unwrap();

    let sample = svc
        .store()
        .sample_random(10, &MistakeFilters::default())
        .unwrap();
    let mut session = ReviewSession::new(sample);
    assert_eq!(session.len(), 3);

    let mut seen = Vec::new();
    while let Some(record) = session.current() {
        seen.push(record.id);
        assert!(!session.render_current(&renderer).contains("正确答案"));
        session.reveal_answer();
        assert!(session.render_current(&renderer).contains("答案 $x=1$"));
        session.advance();
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 3);
    assert!(session.render_current(&renderer).contains("复习完成！"));
}

#[tokio::test]
async fn export_degrades_instead_of_failing() {
    let tmp = TempDir::new().unwrap();
    let svc = service(&tmp);
    let corrupt = tmp.path().join("broken.png");
    fs::write(&corrupt, b"garbage").unwrap();

    let mut with_image = draft("看图 $y$");
    with_image.question_image = Some(corrupt.display().to_string());
    svc.store().add(&with_image).unwrap();
    svc.store().add(&draft("纯文本")).unwrap();

    let out = tmp.path().join("out.docx");
    let result = svc
        .export_filtered(&MistakeFilters::default(), out.clone())
        .await
        .unwrap();

    assert!(out.exists());
    assert_eq!(result.value.records, 2);
    assert_eq!(result.value.page_breaks, 1);
    // 无字体：三个公式全部为占位图
    assert_eq!(result.value.placeholders, 3);
    assert!(result
        .failures
        .iter()
        .any(|f| matches!(f, ContainedFailure::Image { path, .. } if path == &corrupt)));
}

#[test]
fn raster_target_writes_empty_document() {
    let tmp = TempDir::new().unwrap();
    let composer = ExportComposer::new(
        Arc::new(GlyphRasterizer::new(None, RasterSettings::default())),
        ExportSettings::default(),
    );
    let out = tmp.path().join("nested").join("empty.docx");
    let target = RasterComposed {
        composer: &composer,
        destination: &out,
    };
    let result = target.present(&[]).unwrap();
    assert!(result.is_clean());
    assert!(out.exists());
}
