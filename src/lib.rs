//! Insight Folio（启思录）错题本
//!
//! 错题记录的存储、筛选与随机抽取，`$` 公式分段，KaTeX 交互式渲染和 DOCX 导出。

pub mod assets;
pub mod config;
pub mod error;
pub mod render;
pub mod review;
pub mod service;
pub mod store;
pub mod utils;

pub use config::FolioConfig;
pub use error::{Contained, ContainedFailure, FolioError, FolioResult};
pub use review::ReviewSession;
pub use service::MistakeService;
pub use store::{MistakeDraft, MistakeFilters, MistakeRecord, MistakeStore};
