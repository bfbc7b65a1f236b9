//! 纯文本呈现：终端预览、复习模式下的命令行输出

use super::raster::linearize;
use super::segments::{segments, SegmentKind};
use super::PresentationTarget;
use crate::error::FolioResult;
use crate::store::MistakeRecord;

const RULE: &str = "----------------------------------------";

pub struct PlainText {
    pub show_answer: bool,
}

impl PlainText {
    pub fn render(&self, record: &MistakeRecord) -> String {
        let mut out = format!(
            "#{} [{} / {} / {}] {}\n",
            record.id,
            record.subject,
            record.grade,
            record.semester,
            record.record_date.format("%Y-%m-%d")
        );
        out.push_str(&Self::section("题目", Some(&record.question_desc)));
        if let Some(image) = record
            .question_image
            .as_deref()
            .filter(|p| !p.trim().is_empty())
        {
            out.push_str(&format!("[图片] {}\n", image));
        }
        if self.show_answer {
            out.push_str(&Self::section("正确答案", record.correct_answer.as_deref()));
            out.push_str(&Self::section("错误原因", record.mistake_reason.as_deref()));
        }
        out
    }

    fn section(title: &str, text: Option<&str>) -> String {
        let body = match text.filter(|t| !t.trim().is_empty()) {
            Some(t) => linearize_text(t),
            None => "（未填写）".to_string(),
        };
        format!("【{}】\n{}\n", title, body)
    }
}

/// 公式尽量转为 Unicode，无法转换时保留 `$…$` 原文
pub fn linearize_text(source: &str) -> String {
    let mut out = String::new();
    for segment in segments(source) {
        match segment.kind {
            SegmentKind::Text => out.push_str(&segment.lines().collect::<Vec<_>>().join("\n")),
            SegmentKind::Math if segment.is_blank_math() => {}
            SegmentKind::Math => match linearize(segment.content) {
                Ok(text) => out.push_str(&text),
                Err(_) => {
                    out.push('$');
                    out.push_str(segment.content);
                    out.push('$');
                }
            },
        }
    }
    out
}

impl PresentationTarget for PlainText {
    type Output = String;

    fn present(&self, records: &[MistakeRecord]) -> FolioResult<Self::Output> {
        Ok(records
            .iter()
            .map(|record| self.render(record))
            .collect::<Vec<_>>()
            .join(&format!("{}\n", RULE)))
    }
}
