//! 简单选择器：`tag`、`#id`、`.class` 及其组合（如 `div.drop-area#zone`）
//!
//! 不支持后代/子代组合符与属性选择器

use std::str::FromStr;

use crate::model::error::DropError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
}

impl Selector {
    /// 判断元素是否匹配；标签名不区分大小写
    pub fn matches<'a>(
        &self,
        tag: &str,
        id: Option<&str>,
        classes: impl Iterator<Item = &'a str> + Clone,
    ) -> bool {
        if let Some(want) = &self.tag {
            if !want.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(want) = &self.id {
            if id != Some(want.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|want| classes.clone().any(|c| c == want.as_str()))
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

impl FromStr for Selector {
    type Err = DropError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(DropError::InvalidLocator("空选择器".into()));
        }

        let mut selector = Selector::default();
        let mut chars = input.char_indices().peekable();

        // 可选的标签名
        let tag_end = input
            .find(|c: char| !is_name_char(c))
            .unwrap_or(input.len());
        if tag_end > 0 {
            selector.tag = Some(input[..tag_end].to_ascii_lowercase());
            while chars.peek().map_or(false, |(i, _)| *i < tag_end) {
                chars.next();
            }
        }

        while let Some((_, sigil)) = chars.next() {
            if sigil != '#' && sigil != '.' {
                return Err(DropError::InvalidLocator(format!(
                    "不支持的选择器语法: {s:?}"
                )));
            }
            let mut name = String::new();
            while let Some((_, c)) = chars.peek().copied() {
                if !is_name_char(c) {
                    break;
                }
                name.push(c);
                chars.next();
            }
            if name.is_empty() {
                return Err(DropError::InvalidLocator(format!("选择器缺少名称: {s:?}")));
            }
            if sigil == '#' {
                if selector.id.is_some() {
                    return Err(DropError::InvalidLocator(format!("重复的ID: {s:?}")));
                }
                selector.id = Some(name);
            } else {
                selector.classes.push(name);
            }
        }

        Ok(selector)
    }
}
