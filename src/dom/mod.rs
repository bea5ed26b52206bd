//! 宿主文档抽象：控制器只通过 DomHost 查找元素、登记事件、读取文件
//!
//! - `headless`：内存文档，测试与命令行演示使用
//! - `web`：浏览器文档（web 特性，基于 web-sys）

pub mod headless;
pub mod selector;
#[cfg(feature = "web")]
pub mod web;

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use futures::future::LocalBoxFuture;

use crate::model::error::DropError;
use crate::model::loaded_file::Blob;

/// 宿主内元素句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub usize);

/// 宿主提供的待读文件描述（内容由 `DomHost::read_file` 异步读取）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// 宿主内部编号
    pub id: usize,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: i64,
    /// 宿主的原生文件对象，随描述一起释放；没有时按 id 查找
    pub native: Option<NativeFile>,
}

/// 宿主附在 FileHandle 上的不透明文件对象，只有创建它的宿主能取回
#[derive(Clone)]
pub struct NativeFile(Rc<dyn Any>);

impl NativeFile {
    pub fn new<T: 'static>(file: T) -> Self {
        Self(Rc::new(file))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for NativeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeFile")
    }
}

/// 同一个原生对象才相等
impl PartialEq for NativeFile {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NativeFile {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DragOver,
    DragLeave,
    Drop,
    Change,
    Click,
}

impl EventKind {
    /// DOM 事件名
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::DragOver => "dragover",
            EventKind::DragLeave => "dragleave",
            EventKind::Drop => "drop",
            EventKind::Change => "change",
            EventKind::Click => "click",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 派发给监听器的事件
#[derive(Debug)]
pub struct DomEvent {
    kind: EventKind,
    target: ElementHandle,
    data_transfer: Option<Vec<FileHandle>>,
    target_files: Option<Vec<FileHandle>>,
    default_prevented: Cell<bool>,
}

impl DomEvent {
    pub fn new(kind: EventKind, target: ElementHandle) -> Self {
        Self {
            kind,
            target,
            data_transfer: None,
            target_files: None,
            default_prevented: Cell::new(false),
        }
    }

    /// 拖放载荷中的文件
    pub fn with_data_transfer(mut self, files: Vec<FileHandle>) -> Self {
        self.data_transfer = Some(files);
        self
    }

    /// 事件目标（文件选择框）上的文件
    pub fn with_target_files(mut self, files: Vec<FileHandle>) -> Self {
        self.target_files = Some(files);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn target(&self) -> ElementHandle {
        self.target
    }

    /// 优先取拖放载荷，其次取目标上的文件，都没有则为空
    pub fn files(&self) -> Vec<FileHandle> {
        self.data_transfer
            .as_ref()
            .or(self.target_files.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}

/// 事件监听器。同步部分在派发时立即执行，返回的 future 由宿主驱动完成
pub type Listener = Rc<dyn Fn(Rc<DomEvent>) -> LocalBoxFuture<'static, ()>>;

/// 相对锚点元素的插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPosition {
    BeforeBegin,
    AfterBegin,
    #[default]
    BeforeEnd,
    AfterEnd,
}

impl InsertPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            InsertPosition::BeforeBegin => "beforebegin",
            InsertPosition::AfterBegin => "afterbegin",
            InsertPosition::BeforeEnd => "beforeend",
            InsertPosition::AfterEnd => "afterend",
        }
    }
}

impl FromStr for InsertPosition {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beforebegin" => Ok(InsertPosition::BeforeBegin),
            "afterbegin" => Ok(InsertPosition::AfterBegin),
            "beforeend" => Ok(InsertPosition::BeforeEnd),
            "afterend" => Ok(InsertPosition::AfterEnd),
            _ => Err(DropError::UnknownName {
                kind: "插入位置",
                value: s.to_string(),
            }),
        }
    }
}

/// 写到元素属性上的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Blob(Blob),
    Url(String),
    Bytes(Rc<[u8]>),
}

impl PropertyValue {
    /// 文本或 URL 的字符串形式
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) | PropertyValue::Url(s) => Some(s),
            PropertyValue::Blob(_) | PropertyValue::Bytes(_) => None,
        }
    }
}

/// 宿主文档能力。所有方法只在 UI 线程上调用
pub trait DomHost: 'static {
    /// 按选择器返回文档顺序中的第一个元素
    fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DropError>;

    fn create_element(&self, tag: &str) -> Result<ElementHandle, DropError>;

    fn set_attribute(&self, element: ElementHandle, name: &str, value: &str) -> Result<(), DropError>;

    fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DropError>;

    fn append_child(&self, parent: ElementHandle, child: ElementHandle) -> Result<(), DropError>;

    fn insert_adjacent(
        &self,
        anchor: ElementHandle,
        position: InsertPosition,
        element: ElementHandle,
    ) -> Result<(), DropError>;

    fn add_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError>;

    fn remove_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError>;

    fn add_event_listener(
        &self,
        element: ElementHandle,
        kind: EventKind,
        listener: Listener,
    ) -> Result<(), DropError>;

    /// 模拟用户点击（文件选择框会弹出选择对话框）
    fn click(&self, element: ElementHandle) -> Result<(), DropError>;

    /// 文档中所有样式块的文本
    fn style_texts(&self) -> Result<Vec<String>, DropError>;

    /// 向文档头追加一个样式块
    fn append_style(&self, css: &str) -> Result<(), DropError>;

    /// 异步读取文件全部字节
    fn read_file(&self, file: &FileHandle) -> LocalBoxFuture<'static, Result<Vec<u8>, DropError>>;

    /// 为 blob 生成临时引用 URL
    fn create_object_url(&self, blob: &Blob) -> Result<String, DropError>;

    fn set_property(
        &self,
        element: ElementHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), DropError>;
}
