//! DropError：所有公开入口共用的错误类型

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropError {
    #[error("{operation}: 选择器未匹配到元素: {locator:?}")]
    LocatorNotFound { operation: &'static str, locator: String },
    #[error("无效选择器: {0}")]
    InvalidLocator(String),
    #[error("读取文件 {name} 失败: {reason}")]
    Read { name: String, reason: String },
    #[error("索引越界: {index} (共 {len} 项)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("未知的{kind}: {value}")]
    UnknownName { kind: &'static str, value: String },
    #[error("DOM操作失败: {0}")]
    Dom(String),
    #[error("IO失败: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

impl DropError {
    /// 构造读取失败错误
    pub fn read(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
