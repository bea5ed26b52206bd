//! 拖放文件工具库
//!
//! 把拖放区域与文件选择框的事件接到内存文件加载上，并将加载结果写回输出元素。
//! 宿主文档通过 `DomHost` 抽象：内存文档用于测试与演示，浏览器文档见 `web` 特性。

pub mod dom;
pub mod model;
pub mod utils;
pub mod vm;

// 重新导出主要类型
pub use dom::headless::HeadlessDocument;
pub use dom::{DomEvent, DomHost, ElementHandle, EventKind, FileHandle, InsertPosition, PropertyValue};
pub use model::drop_area::{DropAreaSpec, RegistrationInfo};
pub use model::error::DropError;
pub use model::loaded_file::{Blob, DataKind, LoadedFile};
pub use model::output::{OutputCategory, OutputOptions};
pub use model::settings::DropSettings;
pub use vm::controller::{async_completion, completion, Completion, CompletionContext, FileDropController};
