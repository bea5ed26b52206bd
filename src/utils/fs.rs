//! IO helper: 配置文件读写与磁盘文件描述

use std::{fs::File, io::BufReader, path::Path, time::UNIX_EPOCH};

use crate::model::error::DropError;
use crate::model::settings::DropSettings;

/// 磁盘文件的元数据（不含内容）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// 毫秒，Unix 纪元；取不到修改时间时为 0
    pub last_modified: i64,
}

/// 从文件读取配置，缺省字段取默认值
pub fn read_settings_file(p: &Path) -> Result<DropSettings, DropError> {
    let f = File::open(p)?;
    let rdr = BufReader::new(f);
    let settings: DropSettings = serde_json::from_reader(rdr)?;
    Ok(settings)
}

/// 将配置保存到文件（格式化输出）
pub fn write_settings_file(p: &Path, settings: &DropSettings) -> Result<(), DropError> {
    let f = File::create(p)?;
    serde_json::to_writer_pretty(f, settings)?;
    Ok(())
}

/// 读取磁盘文件的名称、大小、类型与修改时间
pub fn describe_file(p: &Path) -> Result<FileMeta, DropError> {
    let meta = std::fs::metadata(p)?;
    if !meta.is_file() {
        return Err(DropError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("不是普通文件: {}", p.display()),
        )));
    }
    let last_modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(FileMeta {
        name,
        size: meta.len(),
        mime_type: guess_mime_type(p).to_string(),
        last_modified,
    })
}

/// 按扩展名猜测 MIME 类型；未知扩展名返回空串（与浏览器一致）
pub fn guess_mime_type(p: &Path) -> &'static str {
    let ext = p
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "md" => "text/markdown",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/vnd.microsoft.icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" | "oga" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "",
    }
}
