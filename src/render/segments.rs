//! 文本 / 公式分段
//!
//! 以 `$` 为分隔符切分：偶数位置为普通文本，奇数位置为公式。
//! 分隔符个数为奇数时，最后一个 `$` 之后的内容没有闭合；这里把它连同 `$`
//! 一起并入前一个文本段（仍然保持文本/公式交替、以文本结尾），并输出告警。

use serde::Serialize;
use tracing::warn;

pub const MATH_DELIMITER: char = '$';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentKind {
    Text,
    Math,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub content: &'a str,
}

impl<'a> Segment<'a> {
    pub fn text(content: &'a str) -> Self {
        Self {
            kind: SegmentKind::Text,
            content,
        }
    }

    pub fn math(content: &'a str) -> Self {
        Self {
            kind: SegmentKind::Math,
            content,
        }
    }

    pub fn is_math(&self) -> bool {
        self.kind == SegmentKind::Math
    }

    /// 公式内容为空白时不做任何渲染
    pub fn is_blank_math(&self) -> bool {
        self.is_math() && self.content.trim().is_empty()
    }

    /// 文本段按行拆分（`\r\n`、`\r` 视为换行）
    pub fn lines(&self) -> impl Iterator<Item = &'a str> {
        let content = self.content;
        content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .flat_map(|line| line.split('\r'))
    }
}

/// 惰性分段迭代器；`Clone` 后可从头重新遍历
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    source: &'a str,
    /// 下一段在 `source` 中的起始字节位置；`None` 表示已结束
    cursor: Option<usize>,
    next_kind: SegmentKind,
    /// 未闭合时最后一个 `$` 的位置
    unterminated_at: Option<usize>,
}

impl<'a> Segments<'a> {
    pub fn new(source: &'a str) -> Self {
        let delimiters = source.matches(MATH_DELIMITER).count();
        let unterminated_at = if delimiters % 2 == 1 {
            source.rfind(MATH_DELIMITER)
        } else {
            None
        };
        Self {
            source,
            cursor: Some(0),
            next_kind: SegmentKind::Text,
            unterminated_at,
        }
    }

    /// 是否存在未闭合的公式（分隔符为奇数个）
    pub fn has_unterminated_math(&self) -> bool {
        self.unterminated_at.is_some()
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor?;
        let rest = &self.source[start..];
        let kind = self.next_kind;

        let segment = match rest.find(MATH_DELIMITER).map(|offset| start + offset) {
            Some(end) if kind == SegmentKind::Text && Some(end) == self.unterminated_at => {
                warn!(
                    "[Segments] Unterminated math delimiter at byte {}, kept as text",
                    end
                );
                self.cursor = None;
                Segment::text(rest)
            }
            Some(end) => {
                self.cursor = Some(end + MATH_DELIMITER.len_utf8());
                self.next_kind = match kind {
                    SegmentKind::Text => SegmentKind::Math,
                    SegmentKind::Math => SegmentKind::Text,
                };
                Segment {
                    kind,
                    content: &self.source[start..end],
                }
            }
            None => {
                self.cursor = None;
                Segment {
                    kind,
                    content: rest,
                }
            }
        };
        Some(segment)
    }
}

impl std::iter::FusedIterator for Segments<'_> {}

pub fn segments(source: &str) -> Segments<'_> {
    Segments::new(source)
}

pub fn parse_segments(source: &str) -> Vec<Segment<'_>> {
    Segments::new(source).collect()
}
