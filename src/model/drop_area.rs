//! 拖放区域：创建参数与登记信息

use serde::{Deserialize, Serialize};

use crate::dom::InsertPosition;
use crate::vm::bridge::{DEFAULT_DROP_AREA_ID, DEFAULT_INPUT_ID};

/// create_drop_area 的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropAreaSpec {
    /// 文件选择框的 accept 过滤（如 ".jpg, .png"），空串表示不限
    pub accept: String,
    pub position: InsertPosition,
    pub drop_area_id: String,
    pub input_id: String,
}

impl Default for DropAreaSpec {
    fn default() -> Self {
        Self {
            accept: String::new(),
            position: InsertPosition::BeforeEnd,
            drop_area_id: DEFAULT_DROP_AREA_ID.to_string(),
            input_id: DEFAULT_INPUT_ID.to_string(),
        }
    }
}

impl DropAreaSpec {
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn with_position(mut self, position: InsertPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_ids(mut self, drop_area_id: impl Into<String>, input_id: impl Into<String>) -> Self {
        self.drop_area_id = drop_area_id.into();
        self.input_id = input_id.into();
        self
    }
}

/// 已创建拖放区域的登记信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub drop_area_id: String,
    pub input_id: String,
    pub drop_area_selector: String,
    pub input_selector: String,
}

impl RegistrationInfo {
    pub fn new(drop_area_id: &str, input_id: &str) -> Self {
        Self {
            drop_area_id: drop_area_id.to_string(),
            input_id: input_id.to_string(),
            drop_area_selector: format!("#{drop_area_id}"),
            input_selector: format!("#{input_id}"),
        }
    }
}
