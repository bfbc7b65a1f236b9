//! 复习会话
//!
//! 抽样结果固定为不可变序列，位置和答案显示状态由会话自身持有。

use std::sync::Arc;

use tracing::debug;

use crate::render::LiveRenderer;
use crate::store::MistakeRecord;

#[derive(Debug, Clone)]
pub struct ReviewSession {
    records: Arc<[MistakeRecord]>,
    position: usize,
    answer_shown: bool,
}

impl ReviewSession {
    pub fn new(records: Vec<MistakeRecord>) -> Self {
        Self {
            records: records.into(),
            position: 0,
            answer_shown: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&MistakeRecord> {
        self.records.get(self.position)
    }

    pub fn answer_shown(&self) -> bool {
        self.answer_shown
    }

    /// 显示当前题目的答案；已结束时无效果
    pub fn reveal_answer(&mut self) {
        if !self.is_finished() {
            self.answer_shown = true;
        }
    }

    /// 下一题（答案重新隐藏），返回新的当前题
    pub fn advance(&mut self) -> Option<&MistakeRecord> {
        if self.position < self.records.len() {
            self.position += 1;
        }
        self.answer_shown = false;
        debug!(
            "[Review] Advanced to {}/{}",
            self.position,
            self.records.len()
        );
        self.current()
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.records.len()
    }

    /// 形如 `1 / 5`；结束后显示 `5 / 5`
    pub fn progress(&self) -> String {
        let total = self.records.len();
        format!("{} / {}", (self.position + 1).min(total), total)
    }

    pub fn render_current(&self, renderer: &LiveRenderer) -> String {
        match self.current() {
            Some(record) => renderer.render(record, self.answer_shown),
            None => renderer.render_finished(),
        }
    }
}
