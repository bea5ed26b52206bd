//! 输出绑定：类别默认值与调用方选项合并为最终写回目标

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::model::error::DropError;
use crate::model::loaded_file::DataKind;

/// 输出元素类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputCategory {
    #[default]
    Text,
    Image,
    Audio,
    Video,
    Pdf,
}

impl OutputCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputCategory::Text => "text",
            OutputCategory::Image => "image",
            OutputCategory::Audio => "audio",
            OutputCategory::Video => "video",
            OutputCategory::Pdf => "pdf",
        }
    }

    /// 类别对应的默认写回目标
    pub fn defaults(self) -> OutputTarget {
        match self {
            OutputCategory::Text => OutputTarget {
                data_type: DataKind::JoinedText,
                property: "value".to_string(),
                index: 0,
            },
            OutputCategory::Image
            | OutputCategory::Audio
            | OutputCategory::Video
            | OutputCategory::Pdf => OutputTarget {
                data_type: DataKind::DataUrl,
                property: "src".to_string(),
                index: 0,
            },
        }
    }

    /// 宽松解析：未知名称按 text 处理
    pub fn parse_or_text(name: &str) -> Self {
        name.parse().unwrap_or_else(|e| {
            tracing::warn!("{}，按 text 处理", e);
            OutputCategory::Text
        })
    }
}

impl fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputCategory {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(OutputCategory::Text),
            "image" => Ok(OutputCategory::Image),
            "audio" => Ok(OutputCategory::Audio),
            "video" => Ok(OutputCategory::Video),
            "pdf" => Ok(OutputCategory::Pdf),
            other => Err(DropError::UnknownName {
                kind: "输出类别",
                value: other.to_string(),
            }),
        }
    }
}

/// 调用方覆盖项，任意字段可省略
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// 接受数字或数字字符串（"1"）
    #[serde(
        default,
        deserialize_with = "index_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub index: Option<usize>,
}

impl OutputOptions {
    pub fn with_data_type(mut self, data_type: DataKind) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

fn index_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawIndex {
        Number(usize),
        Text(String),
    }

    match Option::<RawIndex>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawIndex::Number(n)) => Ok(Some(n)),
        Some(RawIndex::Text(s)) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("index 不是非负整数: {s:?} ({e})"))),
    }
}

/// 合并后的写回目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub data_type: DataKind,
    pub property: String,
    pub index: usize,
}

impl OutputTarget {
    /// 类别默认值，再由 options 中给出的字段覆盖
    pub fn resolve(category: OutputCategory, options: Option<&OutputOptions>) -> Self {
        let mut target = category.defaults();
        if let Some(options) = options {
            if let Some(data_type) = options.data_type {
                target.data_type = data_type;
            }
            if let Some(property) = &options.property {
                target.property = property.clone();
            }
            if let Some(index) = options.index {
                target.index = index;
            }
        }
        target
    }
}
