//! 程序入口：初始化日志，在内存文档上模拟一次拖放，并打印结果
//!
//! 用法: easy_drop_files [--config settings.json] [--category text|image|audio|video|pdf] FILE...

use std::convert::Infallible;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;
use futures::executor::block_on;
use tracing_subscriber::fmt::SubscriberBuilder;

use easy_drop_files::utils::fs::read_settings_file;
use easy_drop_files::{
    DomHost, DropAreaSpec, DropSettings, FileDropController, HeadlessDocument, OutputCategory,
    PropertyValue,
};

#[derive(Parser, Debug)]
#[command(name = "easy_drop_files")]
#[command(about = "在内存文档上模拟拖放文件，并打印写回结果", long_about = None)]
struct CliArgs {
    /// 设置文件（JSON），缺省字段取默认值
    #[arg(long, value_name = "JSON_FILE")]
    config: Option<PathBuf>,

    /// 输出类别：text、image、audio、video、pdf
    #[arg(long, default_value = "text", value_parser = category_or_text)]
    category: OutputCategory,

    /// 要拖放的文件，按顺序加载
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,
}

/// 未知类别按 text 处理
fn category_or_text(name: &str) -> Result<OutputCategory, Infallible> {
    Ok(OutputCategory::parse_or_text(name))
}

/// 类别对应的输出元素标签
fn output_tag(category: OutputCategory) -> &'static str {
    match category {
        OutputCategory::Text => "textarea",
        OutputCategory::Image => "img",
        OutputCategory::Audio => "audio",
        OutputCategory::Video => "video",
        OutputCategory::Pdf => "iframe",
    }
}

fn describe(value: Option<PropertyValue>) -> String {
    match value {
        Some(PropertyValue::Text(text)) => text,
        Some(PropertyValue::Url(url)) => url,
        Some(PropertyValue::Blob(blob)) => format!("<blob {} 字节, {}>", blob.size(), blob.mime_type()),
        Some(PropertyValue::Bytes(bytes)) => format!("<{} 字节>", bytes.len()),
        None => "<未设置>".to_string(),
    }
}

fn main() -> anyhow::Result<()> {
    // 初始化日志输出
    let _ = SubscriberBuilder::default()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let args = CliArgs::parse();
    let settings = match &args.config {
        Some(path) => read_settings_file(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?,
        None => DropSettings::default(),
    };

    let doc = Rc::new(HeadlessDocument::new());
    let body = doc.body();
    doc.create_child(body, "div", Some("app"))?;
    let output = doc.create_child(body, output_tag(args.category), Some("output"))?;

    let controller = FileDropController::with_settings(Rc::clone(&doc), settings);
    let info = controller
        .create_drop_area("#app", &DropAreaSpec::default())
        .context("无法创建拖放区域")?;
    controller.add_drag_and_drop_handler(
        &info.drop_area_selector,
        "#output",
        &info.input_selector,
        args.category,
        None,
    );

    let files = args
        .files
        .iter()
        .map(|path| doc.add_path_file(path).with_context(|| format!("无法打开文件: {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let area = doc
        .query_selector(&info.drop_area_selector)?
        .context("拖放区域不在文档中")?;
    block_on(async {
        doc.drag_over(area).await;
        doc.drop_files(area, files).await;
    });

    tracing::info!("已加载 {} 个文件", controller.loaded_file_count());
    for file in controller.loaded_files() {
        println!("{}\t{} 字节\t{}", file.name, file.size, file.mime_type);
    }
    let property = args.category.defaults().property;
    println!("#output.{} = {}", property, describe(doc.property(output, &property)));
    println!("{}", doc.to_html());
    Ok(())
}
