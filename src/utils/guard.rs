//! 公开入口的统一容错：错误记日志后吞掉，绝不抛给调用方

use crate::model::error::DropError;

/// 运行 body；`Err` 以 error 级别记录并转成 `None`
pub fn guarded<T>(operation: &str, body: impl FnOnce() -> Result<T, DropError>) -> Option<T> {
    match body() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!("{}: {}", operation, e);
            None
        }
    }
}
