//! 错题本统一错误类型
//!
//! 结构性错误通过 `FolioError` 向调用方传播；公式渲染、单张图片读取、
//! 临时文件清理等非致命失败通过 `Contained` 随成功结果一并返回。

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// 错题本统一错误类型
#[derive(Debug, Error, Serialize)]
pub enum FolioError {
    /// 必填字段缺失
    #[error("Validation error: {0}")]
    Validation(String),

    /// 错题记录不存在
    #[error("Mistake not found: {0}")]
    NotFound(i64),

    /// 数据库 / 存储 IO 错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 交互渲染失败（KaTeX 资源缺失等）
    #[error("Render error: {0}")]
    Render(String),

    /// 导出失败（目标不可写、文档库内部错误）
    #[error("Export error: {0}")]
    Export(String),

    /// 图片复制 / 读取失败
    #[error("Asset IO error: {0}")]
    AssetIo(String),
}

pub type FolioResult<T> = Result<T, FolioError>;

impl From<rusqlite::Error> for FolioError {
    fn from(e: rusqlite::Error) -> Self {
        FolioError::Storage(format!("{:#}", e))
    }
}

impl From<r2d2::Error> for FolioError {
    fn from(e: r2d2::Error) -> Self {
        FolioError::Storage(format!("Connection pool error: {}", e))
    }
}

/// 被局部吞掉的失败（记录日志、降级输出，不影响整体成功）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ContainedFailure {
    /// 公式光栅化失败，已替换为占位图
    Formula { expression: String, reason: String },
    /// 题目图片无法读取 / 解码，已跳过或替换为提示
    Image { path: PathBuf, reason: String },
    /// 临时文件或关联图片删除失败
    Cleanup { path: PathBuf, reason: String },
}

impl fmt::Display for ContainedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainedFailure::Formula { expression, reason } => {
                write!(f, "formula `{}`: {}", expression, reason)
            }
            ContainedFailure::Image { path, reason } => {
                write!(f, "image {}: {}", path.display(), reason)
            }
            ContainedFailure::Cleanup { path, reason } => {
                write!(f, "cleanup {}: {}", path.display(), reason)
            }
        }
    }
}

/// 主结果 + 被容纳的次要失败
#[derive(Debug, Clone, Serialize)]
pub struct Contained<T> {
    pub value: T,
    pub failures: Vec<ContainedFailure>,
}

impl<T> Contained<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            failures: Vec::new(),
        }
    }

    pub fn with_failures(value: T, failures: Vec<ContainedFailure>) -> Self {
        Self { value, failures }
    }

    /// 没有任何降级发生
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Contained<U> {
        Contained {
            value: f(self.value),
            failures: self.failures,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}
