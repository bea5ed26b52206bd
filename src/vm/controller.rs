//! FileDropController：拖放区域、文件选择框与输出元素之间的桥接
//!
//! 持有已加载文件与拖放区域登记表；在宿主文档上登记事件，事件触发时
//! 按顺序读入全部文件，再调用完成回调。所有公开方法出错只记日志，不向调用方传播。

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::future::{self, FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::dom::{DomEvent, DomHost, ElementHandle, EventKind, Listener, PropertyValue};
use crate::model::drop_area::{DropAreaSpec, RegistrationInfo};
use crate::model::error::DropError;
use crate::model::loaded_file::{Blob, DataKind, LoadedFile};
use crate::model::output::{OutputCategory, OutputOptions, OutputTarget};
use crate::model::settings::DropSettings;
use crate::utils::guard::guarded;
use crate::vm::bridge::{DRAG_OVER_CLASS, DRAG_OVER_MARKER, DROP_AREA_CLASS};

/// 完成回调收到的上下文
pub struct CompletionContext<H: DomHost> {
    pub controller: FileDropController<H>,
    pub event: Rc<DomEvent>,
    /// 登记时给出的附加参数
    pub args: Value,
}

/// 完成回调；返回的 future 会被等待
pub type Completion<H> = Rc<dyn Fn(CompletionContext<H>) -> LocalBoxFuture<'static, ()>>;

/// 由同步闭包构造完成回调
pub fn completion<H, F>(f: F) -> Completion<H>
where
    H: DomHost,
    F: Fn(CompletionContext<H>) + 'static,
{
    Rc::new(move |ctx: CompletionContext<H>| {
        f(ctx);
        future::ready(()).boxed_local()
    })
}

/// 由异步闭包构造完成回调
pub fn async_completion<H, F, Fut>(f: F) -> Completion<H>
where
    H: DomHost,
    F: Fn(CompletionContext<H>) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    Rc::new(move |ctx: CompletionContext<H>| f(ctx).boxed_local())
}

#[derive(Debug, Default)]
struct ControllerState {
    loaded_files: Vec<LoadedFile>,
    settings: DropSettings,
    drop_area_info: BTreeMap<String, RegistrationInfo>,
    /// 正在进行的加载数
    ingestions_in_flight: usize,
}

/// 加载结束（含 future 被丢弃）时归还计数
struct IngestionGuard {
    state: Rc<RefCell<ControllerState>>,
}

impl Drop for IngestionGuard {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.ingestions_in_flight = state.ingestions_in_flight.saturating_sub(1);
    }
}

/// 拖放文件控制器。克隆得到的是同一个控制器
pub struct FileDropController<H: DomHost> {
    host: Rc<H>,
    state: Rc<RefCell<ControllerState>>,
}

impl<H: DomHost> Clone for FileDropController<H> {
    fn clone(&self) -> Self {
        Self {
            host: Rc::clone(&self.host),
            state: Rc::clone(&self.state),
        }
    }
}

/// 监听器持有的引用：宿主为弱引用，避免 宿主→监听器→宿主 的循环
struct WeakController<H: DomHost> {
    host: Weak<H>,
    state: Rc<RefCell<ControllerState>>,
}

impl<H: DomHost> Clone for WeakController<H> {
    fn clone(&self) -> Self {
        Self {
            host: Weak::clone(&self.host),
            state: Rc::clone(&self.state),
        }
    }
}

impl<H: DomHost> WeakController<H> {
    fn upgrade(&self) -> Option<FileDropController<H>> {
        let host = self.host.upgrade()?;
        Some(FileDropController {
            host,
            state: Rc::clone(&self.state),
        })
    }
}

impl<H: DomHost> FileDropController<H> {
    /// 创建控制器并确保文档中有且仅有一份拖拽悬停样式
    pub fn new(host: Rc<H>) -> Self {
        Self::with_settings(host, DropSettings::default())
    }

    pub fn with_settings(host: Rc<H>, settings: DropSettings) -> Self {
        let controller = Self {
            host,
            state: Rc::new(RefCell::new(ControllerState {
                settings,
                ..ControllerState::default()
            })),
        };
        controller.add_css_for_drag();
        controller
    }

    fn as_weak(&self) -> WeakController<H> {
        WeakController {
            host: Rc::downgrade(&self.host),
            state: Rc::clone(&self.state),
        }
    }

    pub fn host(&self) -> &Rc<H> {
        &self.host
    }

    // === 访问器 ===

    pub fn loaded_files(&self) -> Vec<LoadedFile> {
        self.state.borrow().loaded_files.clone()
    }

    pub fn loaded_array_buffers(&self) -> Vec<Rc<[u8]>> {
        self.state
            .borrow()
            .loaded_files
            .iter()
            .map(LoadedFile::array_buffer)
            .collect()
    }

    pub fn loaded_blobs(&self) -> Vec<Blob> {
        self.state
            .borrow()
            .loaded_files
            .iter()
            .map(LoadedFile::blob)
            .collect()
    }

    /// 每个文件一个新的临时 URL
    pub fn loaded_data_urls(&self) -> Vec<String> {
        let files = self.loaded_files();
        guarded("loaded_data_urls", || {
            files
                .iter()
                .map(|f| f.data_url(self.host.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap_or_default()
    }

    pub fn loaded_texts(&self) -> Vec<String> {
        self.state
            .borrow()
            .loaded_files
            .iter()
            .map(LoadedFile::text)
            .collect()
    }

    /// 全部文本按当前连接符拼接
    pub fn loaded_joined_text(&self) -> String {
        let separator = self.state.borrow().settings.separator_for_join.clone();
        self.loaded_texts().join(&separator)
    }

    pub fn loaded_file_count(&self) -> usize {
        self.state.borrow().loaded_files.len()
    }

    /// 以父元素选择器为键的拖放区域登记表
    pub fn drop_area_info(&self) -> BTreeMap<String, RegistrationInfo> {
        self.state.borrow().drop_area_info.clone()
    }

    pub fn settings(&self) -> DropSettings {
        self.state.borrow().settings.clone()
    }

    pub fn set_separator_for_join(&self, separator: impl Into<String>) {
        self.state.borrow_mut().settings.separator_for_join = separator.into();
    }

    /// 下次注入时生效
    pub fn set_on_dragover_css(&self, css: impl Into<String>) {
        self.state.borrow_mut().settings.on_dragover_css = css.into();
    }

    /// 下次创建拖放区域时生效
    pub fn set_drop_area_css(&self, css: impl Into<String>) {
        self.state.borrow_mut().settings.drop_area_css = css.into();
    }

    pub fn set_prompt_text(&self, text: impl Into<String>) {
        self.state.borrow_mut().settings.prompt_text = text.into();
    }

    pub fn to_data_url(&self, blob: &Blob) -> Option<String> {
        guarded("to_data_url", || self.host.create_object_url(blob))
    }

    // === 样式 ===

    /// 文档中还没有拖拽悬停样式时注入一份
    pub fn add_css_for_drag(&self) {
        guarded("add_css_for_drag", || {
            let included = self
                .host
                .style_texts()?
                .iter()
                .any(|css| css.contains(DRAG_OVER_MARKER));
            if !included {
                let css = self.state.borrow().settings.on_dragover_css.clone();
                self.host.append_style(&css)?;
                tracing::debug!("已注入拖拽悬停样式");
            }
            Ok(())
        });
    }

    /// 空选择器视为未匹配
    fn resolve(&self, selector: &str) -> Result<Option<ElementHandle>, DropError> {
        if selector.trim().is_empty() {
            return Ok(None);
        }
        self.host.query_selector(selector)
    }

    // === 文件加载 ===

    /// 读入事件携带的全部文件，替换当前已加载集合
    ///
    /// 文件严格按顺序读取：前一个读取结束后才发起下一个。
    /// 某个文件读取失败时立即返回错误，之前读入的文件保留，之后的文件不再读取。
    pub async fn load_files(&self, event: &DomEvent) -> Result<Vec<LoadedFile>, DropError> {
        let files = event.files();
        let _guard = self.begin_ingestion();

        self.state.borrow_mut().loaded_files.clear();
        for file in &files {
            let bytes = self.host.read_file(file).await.map_err(|e| match e {
                DropError::Read { .. } => e,
                other => DropError::read(&file.name, other.to_string()),
            })?;
            tracing::debug!("已读取文件: {} ({} 字节)", file.name, bytes.len());
            self.state
                .borrow_mut()
                .loaded_files
                .push(LoadedFile::new(file, bytes));
        }

        tracing::info!("文件加载完成: {} 个", files.len());
        Ok(self.loaded_files())
    }

    fn begin_ingestion(&self) -> IngestionGuard {
        let mut state = self.state.borrow_mut();
        if state.ingestions_in_flight > 0 {
            tracing::warn!(
                "上一次文件加载尚未结束（{} 个进行中），两次加载将交错写入同一集合",
                state.ingestions_in_flight
            );
        }
        state.ingestions_in_flight += 1;
        IngestionGuard {
            state: Rc::clone(&self.state),
        }
    }

    pub fn reset_loaded_files(&self) {
        self.state.borrow_mut().loaded_files.clear();
    }

    /// 加载文件后调用回调；加载失败只记日志，回调仍会在已读入的部分上运行
    async fn load_then_complete(
        &self,
        event: Rc<DomEvent>,
        callback: Option<Completion<H>>,
        args: Value,
    ) {
        if let Err(e) = self.load_files(&event).await {
            tracing::error!("{}事件的文件加载失败: {}", event.kind(), e);
        }
        if let Some(callback) = callback {
            callback(CompletionContext {
                controller: self.clone(),
                event,
                args,
            })
            .await;
        }
    }

    // === 拖放区域 ===

    /// 在 parent_selector 指向的元素旁创建拖放区域
    ///
    /// 父元素不存在时返回 `None`，文档不做任何修改。
    /// 同一父选择器再次创建会覆盖登记表中的旧条目。
    pub fn create_drop_area(
        &self,
        parent_selector: &str,
        spec: &DropAreaSpec,
    ) -> Option<RegistrationInfo> {
        guarded("create_drop_area", || {
            let Some(parent) = self.resolve(parent_selector)? else {
                tracing::info!("create_drop_area: parentSelector 无效: {:?}", parent_selector);
                return Ok(None);
            };
            let settings = self.settings();

            let container = self.host.create_element("div")?;
            self.host.set_attribute(container, "class", DROP_AREA_CLASS)?;
            self.host.set_attribute(container, "id", &spec.drop_area_id)?;

            let prompt = self.host.create_element("span")?;
            self.host.set_text_content(prompt, &settings.prompt_text)?;
            self.host.append_child(container, prompt)?;

            let input = self.host.create_element("input")?;
            self.host.set_attribute(input, "type", "file")?;
            self.host.set_attribute(input, "id", &spec.input_id)?;
            self.host.set_attribute(input, "accept", &spec.accept)?;
            self.host.set_attribute(input, "style", "display: none;")?;
            self.host.set_attribute(input, "multiple", "")?;
            self.host.append_child(container, input)?;

            self.host.insert_adjacent(parent, spec.position, container)?;
            self.host.append_style(&settings.drop_area_css)?;

            // 点击拖放区域 → 打开文件选择框
            let host = Rc::downgrade(&self.host);
            let open_picker: Listener = Rc::new(move |_event: Rc<DomEvent>| {
                if let Some(host) = host.upgrade() {
                    if let Err(e) = host.click(input) {
                        tracing::error!("打开文件选择框失败: {}", e);
                    }
                }
                future::ready(()).boxed_local()
            });
            self.host
                .add_event_listener(container, EventKind::Click, open_picker)?;

            let info = RegistrationInfo::new(&spec.drop_area_id, &spec.input_id);
            self.state
                .borrow_mut()
                .drop_area_info
                .insert(parent_selector.to_string(), info.clone());
            tracing::info!(
                "已创建拖放区域: {} (父元素 {})",
                info.drop_area_selector,
                parent_selector
            );
            Ok(Some(info))
        })
        .flatten()
    }

    // === 事件登记 ===

    /// 拖拽悬停时加上高亮类，离开时移除；不涉及文件
    pub fn add_drag_listener(&self, drop_area_selector: &str) {
        guarded("add_drag_listener", || {
            let Some(area) = self.resolve(drop_area_selector)? else {
                return Ok(());
            };

            let host = Rc::downgrade(&self.host);
            let on_drag_over: Listener = Rc::new(move |event: Rc<DomEvent>| {
                event.prevent_default();
                if let Some(host) = host.upgrade() {
                    if let Err(e) = host.add_class(area, DRAG_OVER_CLASS) {
                        tracing::error!("dragover: {}", e);
                    }
                }
                future::ready(()).boxed_local()
            });
            self.host
                .add_event_listener(area, EventKind::DragOver, on_drag_over)?;

            let host = Rc::downgrade(&self.host);
            let on_drag_leave: Listener = Rc::new(move |event: Rc<DomEvent>| {
                event.prevent_default();
                if let Some(host) = host.upgrade() {
                    if let Err(e) = host.remove_class(area, DRAG_OVER_CLASS) {
                        tracing::error!("dragleave: {}", e);
                    }
                }
                future::ready(()).boxed_local()
            });
            self.host
                .add_event_listener(area, EventKind::DragLeave, on_drag_leave)
        });
    }

    /// 拖放时读入文件，然后调用回调
    pub fn add_drop_listener(
        &self,
        drop_area_selector: &str,
        callback: Option<Completion<H>>,
        args: Value,
    ) {
        guarded("add_drop_listener", || {
            let Some(area) = self.resolve(drop_area_selector)? else {
                tracing::info!("add_drop_listener: dropAreaSelector 无效: {:?}", drop_area_selector);
                return Ok(());
            };

            let weak = self.as_weak();
            let on_drop: Listener = Rc::new(move |event: Rc<DomEvent>| {
                event.prevent_default();
                let Some(controller) = weak.upgrade() else {
                    return future::ready(()).boxed_local();
                };
                if let Err(e) = controller.host.remove_class(area, DRAG_OVER_CLASS) {
                    tracing::error!("drop: {}", e);
                }
                let callback = callback.clone();
                let args = args.clone();
                async move { controller.load_then_complete(event, callback, args).await }
                    .boxed_local()
            });
            self.host.add_event_listener(area, EventKind::Drop, on_drop)
        });
    }

    /// 文件选择框选中文件时读入，然后调用回调
    pub fn add_change_listener(
        &self,
        input_selector: &str,
        callback: Option<Completion<H>>,
        args: Value,
    ) {
        guarded("add_change_listener", || {
            let Some(input) = self.resolve(input_selector)? else {
                tracing::info!("add_change_listener: inputSelector 无效: {:?}", input_selector);
                return Ok(());
            };

            let weak = self.as_weak();
            let on_change: Listener = Rc::new(move |event: Rc<DomEvent>| {
                let Some(controller) = weak.upgrade() else {
                    return future::ready(()).boxed_local();
                };
                let callback = callback.clone();
                let args = args.clone();
                async move { controller.load_then_complete(event, callback, args).await }
                    .boxed_local()
            });
            self.host.add_event_listener(input, EventKind::Change, on_change)
        });
    }

    /// 拖拽高亮 + 拖放加载 + 选择框加载，共用同一个回调
    pub fn add_drag_and_drop_listener(
        &self,
        drop_area_selector: &str,
        input_selector: &str,
        callback: Option<Completion<H>>,
        args: Value,
    ) {
        self.add_drag_listener(drop_area_selector);
        self.add_drop_listener(drop_area_selector, callback.clone(), args.clone());
        self.add_change_listener(input_selector, callback, args);
    }

    // === 输出 ===

    /// 按类别（及覆盖项）把已加载数据写到输出元素的属性上
    ///
    /// 输出元素不存在或索引越界时记日志并返回 `false`。
    pub fn set_loaded_data_to_element(
        &self,
        output_selector: &str,
        category: OutputCategory,
        options: Option<&OutputOptions>,
    ) -> bool {
        guarded("set_loaded_data_to_element", || {
            let target = OutputTarget::resolve(category, options);
            let output = self.resolve(output_selector)?.ok_or_else(|| {
                DropError::LocatorNotFound {
                    operation: "set_loaded_data_to_element",
                    locator: output_selector.to_string(),
                }
            })?;
            let value = self.loaded_value(target.data_type, target.index)?;
            self.host.set_property(output, &target.property, value)?;
            tracing::info!(
                "已写入 {}.{} ({} #{})",
                output_selector,
                target.property,
                target.data_type,
                target.index
            );
            Ok(())
        })
        .is_some()
    }

    /// 取某类派生值集合中的第 index 项
    fn loaded_value(&self, kind: DataKind, index: usize) -> Result<PropertyValue, DropError> {
        let len = match kind {
            DataKind::JoinedText => 1,
            _ => self.loaded_file_count(),
        };
        if index >= len {
            return Err(DropError::IndexOutOfRange { index, len });
        }

        if kind == DataKind::JoinedText {
            return Ok(PropertyValue::Text(self.loaded_joined_text()));
        }
        let file = self.state.borrow().loaded_files[index].clone();
        Ok(match kind {
            DataKind::Text => PropertyValue::Text(file.text()),
            DataKind::Blob => PropertyValue::Blob(file.blob()),
            DataKind::DataUrl => PropertyValue::Url(file.data_url(self.host.as_ref())?),
            DataKind::ArrayBuffer => PropertyValue::Bytes(file.array_buffer()),
            DataKind::JoinedText => PropertyValue::Text(self.loaded_joined_text()),
        })
    }

    /// 拖放区域（及可选的选择框）加载后直接写到输出元素
    pub fn add_drag_and_drop_handler(
        &self,
        drop_area_selector: &str,
        output_selector: &str,
        input_selector: &str,
        category: OutputCategory,
        options: Option<OutputOptions>,
    ) {
        let output_selector = output_selector.to_string();
        let callback = completion(move |ctx: CompletionContext<H>| {
            ctx.controller
                .set_loaded_data_to_element(&output_selector, category, options.as_ref());
        });
        self.add_drag_and_drop_listener(drop_area_selector, input_selector, Some(callback), Value::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::headless::HeadlessDocument;
    use crate::dom::{FileHandle, InsertPosition};
    use futures::executor::{block_on, LocalPool};
    use futures::task::LocalSpawnExt;
    use serde_json::json;
    use std::cell::Cell;

    /// 带 #app 与 #output 的文档和一个控制器
    fn setup() -> (Rc<HeadlessDocument>, FileDropController<HeadlessDocument>) {
        let doc = Rc::new(HeadlessDocument::new());
        let body = doc.body();
        doc.create_child(body, "div", Some("app")).expect("创建 #app 失败");
        doc.create_child(body, "textarea", Some("output")).expect("创建 #output 失败");
        let controller = FileDropController::new(Rc::clone(&doc));
        (doc, controller)
    }

    fn text_files(doc: &HeadlessDocument, contents: &[(&str, &str)]) -> Vec<FileHandle> {
        contents
            .iter()
            .map(|(name, text)| doc.add_memory_file(name, "text/plain", *text, 0))
            .collect()
    }

    fn element(doc: &HeadlessDocument, selector: &str) -> ElementHandle {
        doc.query_selector(selector)
            .expect("选择器解析失败")
            .expect("元素不存在")
    }

    fn text_property(doc: &HeadlessDocument, selector: &str, name: &str) -> Option<String> {
        doc.property(element(doc, selector), name)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    #[test]
    fn test_construct_injects_drag_style_once() {
        let (doc, _first) = setup();
        let _second = FileDropController::new(Rc::clone(&doc));
        let _third = FileDropController::new(Rc::clone(&doc));

        let with_marker = doc
            .style_texts()
            .unwrap()
            .iter()
            .filter(|css| css.contains(DRAG_OVER_MARKER))
            .count();
        assert_eq!(with_marker, 1, "多个控制器共享文档时拖拽样式只注入一次");
    }

    #[test]
    fn test_load_preserves_order() {
        let (doc, controller) = setup();
        let files = text_files(&doc, &[("1.txt", "one"), ("2.txt", "two"), ("3.txt", "three")]);
        let event = DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files);

        let loaded = block_on(controller.load_files(&event)).expect("加载应该成功");
        let names: Vec<&str> = loaded.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["1.txt", "2.txt", "3.txt"]);
        assert_eq!(controller.loaded_texts(), vec!["one", "two", "three"]);
        assert_eq!(controller.loaded_file_count(), 3);
        assert_eq!(doc.read_log(), vec!["1.txt", "2.txt", "3.txt"], "读取应按出现顺序发起");
    }

    #[test]
    fn test_next_read_starts_after_previous_settles() {
        let (doc, controller) = setup();
        let (first, first_gate) = doc.add_gated_file("1.txt", "text/plain", "one");
        let (second, second_gate) = doc.add_gated_file("2.txt", "text/plain", "two");
        let event = DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(vec![first, second]);

        let mut pool = LocalPool::new();
        let loading = controller.clone();
        pool.spawner()
            .spawn_local(async move {
                loading.load_files(&event).await.expect("加载应该成功");
            })
            .unwrap();

        pool.run_until_stalled();
        assert_eq!(doc.read_log(), vec!["1.txt"], "第一个读取未结束时不应发起第二个");
        assert_eq!(controller.loaded_file_count(), 0);

        first_gate.release();
        pool.run_until_stalled();
        assert_eq!(doc.read_log(), vec!["1.txt", "2.txt"]);
        assert_eq!(controller.loaded_texts(), vec!["one"], "第一个文件读完即加入集合");

        second_gate.release();
        pool.run_until_stalled();
        assert_eq!(controller.loaded_texts(), vec!["one", "two"]);
    }

    #[test]
    fn test_load_replaces_previous_set() {
        let (doc, controller) = setup();
        let first = text_files(&doc, &[("a.txt", "a"), ("b.txt", "b")]);
        let second = text_files(&doc, &[("c.txt", "c")]);

        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(first)))
            .unwrap();
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(second)))
            .unwrap();
        assert_eq!(controller.loaded_texts(), vec!["c"]);
    }

    #[test]
    fn test_load_failure_keeps_prefix_and_stops() {
        let (doc, controller) = setup();
        let files = vec![
            doc.add_memory_file("1.txt", "text/plain", "one", 0),
            doc.add_failing_file("2.txt", "text/plain", "disk error"),
            doc.add_memory_file("3.txt", "text/plain", "three", 0),
        ];
        let event = DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files);

        let result = block_on(controller.load_files(&event));
        assert!(matches!(result, Err(DropError::Read { ref name, .. }) if name == "2.txt"));
        assert_eq!(controller.loaded_file_count(), 1, "失败前读入的文件应保留");
        assert_eq!(controller.loaded_files()[0].name, "1.txt");
        assert_eq!(doc.read_log(), vec!["1.txt", "2.txt"], "失败后的文件不应再读取");
    }

    #[test]
    fn test_event_without_files_clears_set() {
        let (doc, controller) = setup();
        let files = text_files(&doc, &[("a.txt", "a")]);
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        let loaded = block_on(controller.load_files(&DomEvent::new(EventKind::Change, doc.body())))
            .expect("没有文件时也应成功");
        assert!(loaded.is_empty());
        assert_eq!(controller.loaded_file_count(), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let (doc, controller) = setup();
        let files = text_files(&doc, &[("a.txt", "a"), ("b.txt", "b")]);
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        controller.reset_loaded_files();
        assert_eq!(controller.loaded_file_count(), 0);
        controller.reset_loaded_files();
        assert_eq!(controller.loaded_file_count(), 0);
        assert!(controller.loaded_files().is_empty());
    }

    #[test]
    fn test_joined_text_follows_separator() {
        let (doc, controller) = setup();
        let files = text_files(&doc, &[("a", "a"), ("b", "b"), ("c", "c")]);
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        assert_eq!(controller.loaded_joined_text(), "a\nb\nc");
        controller.set_separator_for_join("|");
        assert_eq!(controller.loaded_joined_text(), "a|b|c", "修改连接符后无需重新加载");
        assert_eq!(doc.read_log().len(), 3);
    }

    #[test]
    fn test_derived_collections() {
        let (doc, controller) = setup();
        let files = vec![
            doc.add_memory_file("a.png", "image/png", vec![1u8, 2, 3], 42),
            doc.add_memory_file("b.txt", "", "hi", 43),
        ];
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        let buffers = controller.loaded_array_buffers();
        assert_eq!(&*buffers[0], &[1u8, 2, 3]);
        let blobs = controller.loaded_blobs();
        assert_eq!(blobs[0].mime_type(), "image/png");
        assert_eq!(blobs[1].mime_type(), "");

        let urls = controller.loaded_data_urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(doc.object_url_blob(&urls[1]).map(|b| b.bytes().to_vec()), Some(b"hi".to_vec()));
        assert_eq!(controller.loaded_files()[1].last_modified, 43);
    }

    #[test]
    fn test_create_drop_area_unknown_parent() {
        let (doc, controller) = setup();
        let before = doc.to_html();

        assert!(controller.create_drop_area("#missing", &DropAreaSpec::default()).is_none());
        assert!(controller.create_drop_area("", &DropAreaSpec::default()).is_none());
        assert!(controller.create_drop_area("div > p", &DropAreaSpec::default()).is_none());
        assert_eq!(doc.to_html(), before, "文档不应被修改");
        assert!(controller.drop_area_info().is_empty());
    }

    #[test]
    fn test_create_drop_area_structure() {
        let (doc, controller) = setup();
        let spec = DropAreaSpec::default().with_accept(".txt, .csv");
        let info = controller.create_drop_area("#app", &spec).expect("应创建拖放区域");

        assert_eq!(info.drop_area_selector, "#dropAreaId");
        assert_eq!(info.input_selector, "#dropAreaInputId");

        let app = element(&doc, "#app");
        let area = element(&doc, &info.drop_area_selector);
        assert_eq!(doc.parent(area), Some(app));
        assert!(doc.has_class(area, DROP_AREA_CLASS));

        let children = doc.children(area);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.tag_name(children[0]).as_deref(), Some("span"));
        assert_eq!(
            doc.text_content(children[0]).as_deref(),
            Some(crate::vm::bridge::DEFAULT_PROMPT_TEXT)
        );
        let input = children[1];
        assert_eq!(doc.attribute(input, "type").as_deref(), Some("file"));
        assert_eq!(doc.attribute(input, "accept").as_deref(), Some(".txt, .csv"));
        assert_eq!(doc.attribute(input, "style").as_deref(), Some("display: none;"));
        assert!(doc.attribute(input, "multiple").is_some());

        let styles = doc.style_texts().unwrap();
        assert!(styles.iter().any(|css| css.contains(".drop-area")));
    }

    #[test]
    fn test_drop_area_style_not_deduplicated() {
        let (doc, controller) = setup();
        let base = doc.style_texts().unwrap().len();
        controller.create_drop_area("#app", &DropAreaSpec::default().with_ids("a", "ai"));
        controller.create_drop_area("#app", &DropAreaSpec::default().with_ids("b", "bi"));
        assert_eq!(doc.style_texts().unwrap().len(), base + 2, "每次创建都追加一份区域样式");
    }

    #[test]
    fn test_create_drop_area_positions() {
        let (doc, controller) = setup();
        let spec = DropAreaSpec::default().with_position(InsertPosition::BeforeBegin);
        let info = controller.create_drop_area("#output", &spec).unwrap();

        let body = doc.body();
        let area = element(&doc, &info.drop_area_selector);
        let output = element(&doc, "#output");
        let children = doc.children(body);
        let area_pos = children.iter().position(|c| *c == area).unwrap();
        let output_pos = children.iter().position(|c| *c == output).unwrap();
        assert_eq!(area_pos + 1, output_pos, "beforebegin 应插在输出元素之前");
    }

    #[test]
    fn test_two_regions_same_parent() {
        let (doc, controller) = setup();
        doc.create_child(doc.body(), "div", Some("other")).unwrap();

        let a = controller
            .create_drop_area("#app", &DropAreaSpec::default().with_ids("zoneA", "inputA"))
            .unwrap();
        let b = controller
            .create_drop_area("#other", &DropAreaSpec::default().with_ids("zoneB", "inputB"))
            .unwrap();
        assert_ne!(a, b);
        let info = controller.drop_area_info();
        assert_eq!(info.len(), 2);
        assert_eq!(info["#app"].drop_area_id, "zoneA");
        assert_eq!(info["#other"].input_selector, "#inputB");
        assert!(doc.query_selector("#zoneA").unwrap().is_some());
        assert!(doc.query_selector("#zoneB").unwrap().is_some());

        // 同一父选择器再次创建：两个区域都在文档中，登记表保留最新一个
        let c = controller
            .create_drop_area("#app", &DropAreaSpec::default().with_ids("zoneC", "inputC"))
            .unwrap();
        assert_eq!(controller.drop_area_info()["#app"], c);
        assert_eq!(controller.drop_area_info().len(), 2);
        assert!(doc.query_selector("#zoneA").unwrap().is_some());
        assert!(doc.query_selector("#zoneC").unwrap().is_some());
    }

    #[test]
    fn test_click_opens_picker() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        let area = element(&doc, &info.drop_area_selector);
        let input = element(&doc, &info.input_selector);

        block_on(doc.dispatch(DomEvent::new(EventKind::Click, area)));
        assert_eq!(doc.activations(), vec![input]);
    }

    #[test]
    fn test_click_on_prompt_opens_picker() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        let area = element(&doc, &info.drop_area_selector);
        let input = element(&doc, &info.input_selector);
        let prompt = doc.children(area)[0];
        assert_eq!(doc.tag_name(prompt).as_deref(), Some("span"));

        block_on(doc.dispatch(DomEvent::new(EventKind::Click, prompt)));
        assert_eq!(doc.activations(), vec![input], "点击提示文字冒泡到拖放区域");
    }

    #[test]
    fn test_drop_on_prompt_bubbles_to_area() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        controller.add_drag_and_drop_handler(
            &info.drop_area_selector,
            "#output",
            &info.input_selector,
            OutputCategory::Text,
            None,
        );
        let area = element(&doc, &info.drop_area_selector);
        let prompt = doc.children(area)[0];

        let over = block_on(doc.drag_over(prompt));
        assert!(over.default_prevented());
        assert!(doc.has_class(area, DRAG_OVER_CLASS), "悬停在提示文字上也应高亮拖放区域");

        let files = text_files(&doc, &[("a.txt", "from prompt")]);
        let event = block_on(doc.drop_files(prompt, files));
        assert!(event.default_prevented(), "拖放区域的监听器应阻止默认行为");
        assert!(!doc.has_class(area, DRAG_OVER_CLASS));
        assert_eq!(controller.loaded_file_count(), 1);
        assert_eq!(text_property(&doc, "#output", "value").as_deref(), Some("from prompt"));
    }

    #[test]
    fn test_drag_feedback() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        controller.add_drag_and_drop_listener(&info.drop_area_selector, &info.input_selector, None, Value::Null);
        let area = element(&doc, &info.drop_area_selector);

        let event = block_on(doc.drag_over(area));
        assert!(event.default_prevented());
        assert!(doc.has_class(area, DRAG_OVER_CLASS));

        let event = block_on(doc.drag_leave(area));
        assert!(event.default_prevented());
        assert!(!doc.has_class(area, DRAG_OVER_CLASS));

        block_on(doc.drag_over(area));
        let event = block_on(doc.drop_files(area, Vec::new()));
        assert!(event.default_prevented());
        assert!(!doc.has_class(area, DRAG_OVER_CLASS), "拖放后应移除高亮");
    }

    #[test]
    fn test_drag_listener_unknown_region_is_noop() {
        let (doc, controller) = setup();
        controller.add_drag_listener("#nowhere");
        controller.add_drop_listener("#nowhere", None, Value::Null);
        controller.add_change_listener("", None, Value::Null);
        let app = element(&doc, "#app");
        assert_eq!(doc.listener_count(app, EventKind::DragOver), 0);
    }

    #[test]
    fn test_drop_invokes_callback_with_args() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        let seen = Rc::new(RefCell::new(None));
        let callback = {
            let seen = Rc::clone(&seen);
            completion(move |ctx: CompletionContext<HeadlessDocument>| {
                *seen.borrow_mut() = Some((
                    ctx.controller.loaded_joined_text(),
                    ctx.event.kind(),
                    ctx.args.clone(),
                ));
            })
        };
        controller.add_drop_listener(&info.drop_area_selector, Some(callback), json!({"tag": "upload", "n": 2}));

        let area = element(&doc, &info.drop_area_selector);
        let files = text_files(&doc, &[("a", "hello"), ("b", "world")]);
        block_on(doc.drop_files(area, files));

        let seen = seen.borrow();
        let (text, kind, args) = seen.as_ref().expect("回调应被调用");
        assert_eq!(text, "hello\nworld");
        assert_eq!(*kind, EventKind::Drop);
        assert_eq!(args["tag"], "upload");
        assert_eq!(args["n"], 2);
    }

    #[test]
    fn test_async_callback_is_awaited() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        let finished = Rc::new(Cell::new(false));
        let callback = {
            let finished = Rc::clone(&finished);
            async_completion(move |_ctx: CompletionContext<HeadlessDocument>| {
                let finished = Rc::clone(&finished);
                async move {
                    futures::future::ready(()).await;
                    finished.set(true);
                }
            })
        };
        controller.add_drop_listener(&info.drop_area_selector, Some(callback), Value::Null);

        let area = element(&doc, &info.drop_area_selector);
        block_on(doc.drop_files(area, Vec::new()));
        assert!(finished.get(), "派发结束前异步回调应已完成");
    }

    #[test]
    fn test_callback_runs_after_partial_failure() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        let counts = Rc::new(RefCell::new(Vec::new()));
        let callback = {
            let counts = Rc::clone(&counts);
            completion(move |ctx: CompletionContext<HeadlessDocument>| {
                counts.borrow_mut().push(ctx.controller.loaded_file_count());
            })
        };
        controller.add_drop_listener(&info.drop_area_selector, Some(callback), Value::Null);

        let area = element(&doc, &info.drop_area_selector);
        let files = vec![
            doc.add_memory_file("ok.txt", "text/plain", "ok", 0),
            doc.add_failing_file("bad.txt", "text/plain", "boom"),
        ];
        block_on(doc.drop_files(area, files));
        assert_eq!(*counts.borrow(), vec![1]);
    }

    #[test]
    fn test_picker_change_ingests() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        controller.add_drag_and_drop_handler(
            &info.drop_area_selector,
            "#output",
            &info.input_selector,
            OutputCategory::Text,
            None,
        );

        let input = element(&doc, &info.input_selector);
        let files = text_files(&doc, &[("x.txt", "picked")]);
        let event = block_on(doc.select_files(input, files));
        assert!(!event.default_prevented(), "change 事件不需要阻止默认行为");
        assert_eq!(text_property(&doc, "#output", "value").as_deref(), Some("picked"));
    }

    #[test]
    fn test_handler_writes_joined_text_on_drop() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        controller.set_separator_for_join(" + ");
        controller.add_drag_and_drop_handler(&info.drop_area_selector, "#output", "", OutputCategory::Text, None);

        let area = element(&doc, &info.drop_area_selector);
        let files = text_files(&doc, &[("a", "1"), ("b", "2")]);
        block_on(doc.drop_files(area, files));
        assert_eq!(text_property(&doc, "#output", "value").as_deref(), Some("1 + 2"));
    }

    #[test]
    fn test_listeners_outlive_controller_handle() {
        let (doc, controller) = setup();
        let info = controller.create_drop_area("#app", &DropAreaSpec::default()).unwrap();
        controller.add_drag_and_drop_handler(&info.drop_area_selector, "#output", "", OutputCategory::Text, None);
        drop(controller);

        let area = element(&doc, &info.drop_area_selector);
        let files = text_files(&doc, &[("a", "still here")]);
        block_on(doc.drop_files(area, files));
        assert_eq!(text_property(&doc, "#output", "value").as_deref(), Some("still here"));
    }

    #[test]
    fn test_project_image_uses_index() {
        let (doc, controller) = setup();
        let img = doc.create_child(doc.body(), "img", Some("preview")).unwrap();
        let files = vec![
            doc.add_memory_file("a.png", "image/png", vec![1u8], 0),
            doc.add_memory_file("b.png", "image/png", vec![2u8], 0),
        ];
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        assert!(controller.set_loaded_data_to_element("#preview", OutputCategory::Image, None));
        let url = text_property(&doc, "#preview", "src").expect("src 应被设置");
        assert_eq!(doc.object_url_blob(&url).map(|b| b.bytes().to_vec()), Some(vec![1u8]));

        let options = OutputOptions::default().with_index(1);
        assert!(controller.set_loaded_data_to_element("#preview", OutputCategory::Image, Some(&options)));
        let url = text_property(&doc, "#preview", "src").unwrap();
        assert_eq!(doc.object_url_blob(&url).map(|b| b.bytes().to_vec()), Some(vec![2u8]));
        assert!(doc.property(img, "value").is_none());
    }

    #[test]
    fn test_project_index_out_of_range() {
        let (doc, controller) = setup();
        doc.create_child(doc.body(), "img", Some("preview")).unwrap();
        let files = vec![doc.add_memory_file("a.png", "image/png", vec![1u8], 0)];
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();

        let options = OutputOptions::default().with_index(1);
        assert!(!controller.set_loaded_data_to_element("#preview", OutputCategory::Image, Some(&options)));
        assert!(text_property(&doc, "#preview", "src").is_none(), "越界时不应写入");
        assert_eq!(doc.object_url_count(), 0, "越界时不应生成 URL");
    }

    #[test]
    fn test_project_unknown_output() {
        let (_doc, controller) = setup();
        assert!(!controller.set_loaded_data_to_element("#nope", OutputCategory::Text, None));
    }

    #[test]
    fn test_project_other_kinds() {
        let (doc, controller) = setup();
        let files = vec![doc.add_memory_file("a.bin", "application/octet-stream", vec![7u8, 8], 0)];
        block_on(controller.load_files(&DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files)))
            .unwrap();
        let output = element(&doc, "#output");

        let options = OutputOptions::default().with_data_type(DataKind::ArrayBuffer).with_property("buffer");
        assert!(controller.set_loaded_data_to_element("#output", OutputCategory::Text, Some(&options)));
        assert_eq!(doc.property(output, "buffer"), Some(PropertyValue::Bytes(Rc::from(vec![7u8, 8]))));

        let options = OutputOptions::default().with_data_type(DataKind::Blob).with_property("data");
        assert!(controller.set_loaded_data_to_element("#output", OutputCategory::Pdf, Some(&options)));
        match doc.property(output, "data") {
            Some(PropertyValue::Blob(blob)) => assert_eq!(blob.mime_type(), "application/octet-stream"),
            other => panic!("应写入 blob: {other:?}"),
        }

        // joinedText 始终只有一项
        let options = OutputOptions::default().with_index(1);
        assert!(!controller.set_loaded_data_to_element("#output", OutputCategory::Text, Some(&options)));
    }

    #[test]
    fn test_dragover_css_change_applies_on_next_injection() {
        let doc = Rc::new(HeadlessDocument::new());
        let mut settings = DropSettings::default();
        settings.on_dragover_css = ".ondragover { color: red; }".to_string();
        let controller = FileDropController::with_settings(Rc::clone(&doc), settings);
        assert_eq!(doc.style_texts().unwrap(), vec![".ondragover { color: red; }"]);

        controller.set_on_dragover_css(".ondragover { color: blue; }");
        controller.add_css_for_drag();
        assert_eq!(doc.style_texts().unwrap().len(), 1, "已有标记时不再注入");
    }

    #[test]
    fn test_interleaved_ingestion_is_counted() {
        let (doc, controller) = setup();
        let files = text_files(&doc, &[("a", "a")]);
        let event = DomEvent::new(EventKind::Drop, doc.body()).with_data_transfer(files);

        let first = controller.load_files(&event);
        let second = controller.load_files(&event);
        let (a, b) = block_on(futures::future::join(first, second));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(controller.state.borrow().ingestions_in_flight, 0, "结束后计数归零");
    }
}
