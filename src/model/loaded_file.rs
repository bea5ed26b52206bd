//! LoadedFile：一次加载得到的单个文件，派生值按需从原始字节计算

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dom::{DomHost, FileHandle};
use crate::model::error::DropError;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 带 MIME 类型的二进制句柄（与 LoadedFile 共享同一份字节）
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Rc<[u8]>,
    mime_type: String,
}

impl Blob {
    pub fn new(bytes: Rc<[u8]>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// 已加载文件
#[derive(Clone)]
pub struct LoadedFile {
    pub name: String,
    pub size: u64,
    /// MIME 类型，宿主无法判断时为空串
    pub mime_type: String,
    /// 最后修改时间（毫秒，Unix 纪元）
    pub last_modified: i64,
    bytes: Rc<[u8]>,
}

impl LoadedFile {
    /// 用宿主的文件描述与读取到的字节构造
    pub fn new(file: &FileHandle, bytes: Vec<u8>) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            last_modified: file.last_modified,
            bytes: Rc::from(bytes),
        }
    }

    /// 原始字节（共享，不复制）
    pub fn array_buffer(&self) -> Rc<[u8]> {
        Rc::clone(&self.bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn text(&self) -> String {
        to_text(&self.bytes)
    }

    pub fn blob(&self) -> Blob {
        to_blob(Rc::clone(&self.bytes), &self.mime_type)
    }

    /// 由宿主生成临时引用 URL；每次调用都会生成新的 URL
    pub fn data_url<H: DomHost + ?Sized>(&self, host: &H) -> Result<String, DropError> {
        host.create_object_url(&self.blob())
    }
}

impl fmt::Debug for LoadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("mime_type", &self.mime_type)
            .field("last_modified", &self.last_modified)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// UTF-8 解码：去掉开头的 BOM，非法序列替换为 U+FFFD
pub fn to_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn to_blob(bytes: Rc<[u8]>, mime_type: &str) -> Blob {
    Blob::new(bytes, mime_type)
}

/// 可写回输出元素的派生值种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "blob")]
    Blob,
    #[serde(rename = "dataURL")]
    DataUrl,
    #[serde(rename = "joinedText")]
    JoinedText,
    #[serde(rename = "arrayBuffer")]
    ArrayBuffer,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Text => "text",
            DataKind::Blob => "blob",
            DataKind::DataUrl => "dataURL",
            DataKind::JoinedText => "joinedText",
            DataKind::ArrayBuffer => "arrayBuffer",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(DataKind::Text),
            "blob" => Ok(DataKind::Blob),
            "dataURL" => Ok(DataKind::DataUrl),
            "joinedText" => Ok(DataKind::JoinedText),
            "arrayBuffer" => Ok(DataKind::ArrayBuffer),
            other => Err(DropError::UnknownName {
                kind: "数据类型",
                value: other.to_string(),
            }),
        }
    }
}
