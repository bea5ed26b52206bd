//! DropSettings：连接符、两段样式与提示文案，可从 JSON 文件加载

use serde::{Deserialize, Serialize};

use crate::vm::bridge::{
    default_drop_area_css, default_on_dragover_css, DEFAULT_PROMPT_TEXT, DEFAULT_SEPARATOR,
};

/// 控制器的可变配置；样式只在下次注入时生效
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DropSettings {
    /// loaded_joined_text 使用的连接符
    pub separator_for_join: String,
    pub on_dragover_css: String,
    pub drop_area_css: String,
    /// 拖放区域内的提示文字
    pub prompt_text: String,
}

impl Default for DropSettings {
    fn default() -> Self {
        Self {
            separator_for_join: DEFAULT_SEPARATOR.to_string(),
            on_dragover_css: default_on_dragover_css(),
            drop_area_css: default_drop_area_css(),
            prompt_text: DEFAULT_PROMPT_TEXT.to_string(),
        }
    }
}
