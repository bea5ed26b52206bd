//! HeadlessDocument：内存中的文档树，实现 DomHost
//!
//! 元素、样式块、事件监听、对象 URL 与待读文件全部保存在进程内，
//! 供测试与命令行演示驱动完整的拖放流程

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};

use crate::dom::selector::Selector;
use crate::dom::{
    DomEvent, DomHost, ElementHandle, EventKind, FileHandle, InsertPosition, Listener,
    PropertyValue,
};
use crate::model::error::DropError;
use crate::model::loaded_file::Blob;
use crate::utils::fs::describe_file;

const VOID_TAGS: &[&str] = &["input", "img", "br", "hr", "meta", "link"];

struct ElementNode {
    tag: String,
    /// 除 class 外的属性，保持写入顺序
    attributes: Vec<(String, String)>,
    classes: Vec<String>,
    text: String,
    children: Vec<ElementHandle>,
    parent: Option<ElementHandle>,
    properties: BTreeMap<String, PropertyValue>,
    listeners: Vec<(EventKind, Listener)>,
}

impl ElementNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            classes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
            parent: None,
            properties: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone)]
enum FileSource {
    Memory(Rc<[u8]>),
    Path(PathBuf),
    Failing(String),
    /// 读取一直挂起，直到对应的 FileGate 放行
    Gated {
        bytes: Rc<[u8]>,
        gate: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
    },
}

/// 放行挂起中的文件读取；未放行就被丢弃时读取失败
pub struct FileGate {
    sender: oneshot::Sender<()>,
}

impl FileGate {
    pub fn release(self) {
        // 读取方已放弃时无需通知
        let _ = self.sender.send(());
    }
}

struct DocumentState {
    nodes: Vec<ElementNode>,
    root: ElementHandle,
    head: ElementHandle,
    body: ElementHandle,
    files: Vec<(FileHandle, FileSource)>,
    /// 读取请求的文件名，按发起顺序
    read_log: Vec<String>,
    /// 被 click() 激活过的元素
    activations: Vec<ElementHandle>,
    object_urls: Vec<(String, Blob)>,
}

impl DocumentState {
    fn node(&self, handle: ElementHandle) -> Result<&ElementNode, DropError> {
        self.nodes
            .get(handle.0)
            .ok_or_else(|| DropError::Dom(format!("无效元素句柄: {}", handle.0)))
    }

    fn node_mut(&mut self, handle: ElementHandle) -> Result<&mut ElementNode, DropError> {
        self.nodes
            .get_mut(handle.0)
            .ok_or_else(|| DropError::Dom(format!("无效元素句柄: {}", handle.0)))
    }

    fn alloc(&mut self, tag: &str) -> ElementHandle {
        self.nodes.push(ElementNode::new(tag));
        ElementHandle(self.nodes.len() - 1)
    }

    fn detach(&mut self, handle: ElementHandle) -> Result<(), DropError> {
        if let Some(parent) = self.node(handle)?.parent {
            self.node_mut(parent)?.children.retain(|c| *c != handle);
            self.node_mut(handle)?.parent = None;
        }
        Ok(())
    }

    fn is_ancestor_or_self(&self, candidate: ElementHandle, of: ElementHandle) -> bool {
        self.ancestors_or_self(of).contains(&candidate)
    }

    /// handle 自身及其全部祖先，由近及远
    fn ancestors_or_self(&self, handle: ElementHandle) -> Vec<ElementHandle> {
        let mut path = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            path.push(h);
            current = self.nodes.get(h.0).and_then(|n| n.parent);
        }
        path
    }

    /// 把 child 放到 parent 的 children[index]
    fn attach(&mut self, parent: ElementHandle, index: usize, child: ElementHandle) -> Result<(), DropError> {
        if self.is_ancestor_or_self(child, parent) {
            return Err(DropError::Dom("不能把元素插入到自身或其后代中".into()));
        }
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// 文档顺序（先序）遍历挂在根上的元素
    fn preorder(&self) -> Vec<ElementHandle> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(h) = stack.pop() {
            out.push(h);
            if let Some(node) = self.nodes.get(h.0) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn write_html(&self, handle: ElementHandle, out: &mut String) {
        let Some(node) = self.nodes.get(handle.0) else {
            return;
        };
        out.push('<');
        out.push_str(&node.tag);
        for (name, value) in &node.attributes {
            if value.is_empty() && name == "multiple" {
                out.push_str(" multiple");
            } else {
                out.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
            }
        }
        if !node.classes.is_empty() {
            out.push_str(&format!(" class=\"{}\"", escape_html(&node.classes.join(" "))));
        }
        out.push('>');
        if VOID_TAGS.contains(&node.tag.as_str()) {
            return;
        }
        out.push_str(&escape_html(&node.text));
        for child in &node.children {
            self.write_html(*child, out);
        }
        out.push_str(&format!("</{}>", node.tag));
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// 内存文档；克隆得到的是同一份文档
#[derive(Clone)]
pub struct HeadlessDocument {
    state: Rc<RefCell<DocumentState>>,
}

impl Default for HeadlessDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDocument {
    /// 创建只含 html/head/body 的空文档
    pub fn new() -> Self {
        let mut state = DocumentState {
            nodes: Vec::new(),
            root: ElementHandle(0),
            head: ElementHandle(0),
            body: ElementHandle(0),
            files: Vec::new(),
            read_log: Vec::new(),
            activations: Vec::new(),
            object_urls: Vec::new(),
        };
        let root = state.alloc("html");
        let head = state.alloc("head");
        let body = state.alloc("body");
        state.root = root;
        state.head = head;
        state.body = body;
        for child in [head, body] {
            state.nodes[root.0].children.push(child);
            state.nodes[child.0].parent = Some(root);
        }
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn head(&self) -> ElementHandle {
        self.state.borrow().head
    }

    pub fn body(&self) -> ElementHandle {
        self.state.borrow().body
    }

    /// 创建元素并追加到 parent 末尾
    pub fn create_child(
        &self,
        parent: ElementHandle,
        tag: &str,
        id: Option<&str>,
    ) -> Result<ElementHandle, DropError> {
        let element = self.create_element(tag)?;
        if let Some(id) = id {
            self.set_attribute(element, "id", id)?;
        }
        self.append_child(parent, element)?;
        Ok(element)
    }

    // === 测试与演示用的查询 ===

    pub fn has_class(&self, element: ElementHandle, class: &str) -> bool {
        let state = self.state.borrow();
        state
            .node(element)
            .map(|n| n.classes.iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn attribute(&self, element: ElementHandle, name: &str) -> Option<String> {
        let state = self.state.borrow();
        state
            .node(element)
            .ok()
            .and_then(|n| n.attribute(name).map(str::to_string))
    }

    pub fn tag_name(&self, element: ElementHandle) -> Option<String> {
        let state = self.state.borrow();
        state.node(element).ok().map(|n| n.tag.clone())
    }

    pub fn text_content(&self, element: ElementHandle) -> Option<String> {
        let state = self.state.borrow();
        state.node(element).ok().map(|n| n.text.clone())
    }

    pub fn property(&self, element: ElementHandle, name: &str) -> Option<PropertyValue> {
        let state = self.state.borrow();
        state
            .node(element)
            .ok()
            .and_then(|n| n.properties.get(name).cloned())
    }

    pub fn children(&self, element: ElementHandle) -> Vec<ElementHandle> {
        let state = self.state.borrow();
        state
            .node(element)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, element: ElementHandle) -> Option<ElementHandle> {
        let state = self.state.borrow();
        state.node(element).ok().and_then(|n| n.parent)
    }

    pub fn listener_count(&self, element: ElementHandle, kind: EventKind) -> usize {
        let state = self.state.borrow();
        state
            .node(element)
            .map(|n| n.listeners.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }

    /// 文档中元素（挂在根上的）总数
    pub fn element_count(&self) -> usize {
        self.state.borrow().preorder().len()
    }

    pub fn outer_html(&self, element: ElementHandle) -> String {
        let mut out = String::new();
        self.state.borrow().write_html(element, &mut out);
        out
    }

    /// 整个文档序列化为 HTML
    pub fn to_html(&self) -> String {
        let root = self.state.borrow().root;
        self.outer_html(root)
    }

    /// 读取请求的文件名，按发起顺序
    pub fn read_log(&self) -> Vec<String> {
        self.state.borrow().read_log.clone()
    }

    pub fn activations(&self) -> Vec<ElementHandle> {
        self.state.borrow().activations.clone()
    }

    /// 按 URL 找回生成时的 blob
    pub fn object_url_blob(&self, url: &str) -> Option<Blob> {
        self.state
            .borrow()
            .object_urls
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, b)| b.clone())
    }

    pub fn object_url_count(&self) -> usize {
        self.state.borrow().object_urls.len()
    }

    // === 待读文件 ===

    fn register_file(&self, name: &str, size: u64, mime_type: &str, last_modified: i64, source: FileSource) -> FileHandle {
        let mut state = self.state.borrow_mut();
        let handle = FileHandle {
            id: state.files.len(),
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
            last_modified,
            native: None,
        };
        state.files.push((handle.clone(), source));
        handle
    }

    /// 内存中的文件
    pub fn add_memory_file(&self, name: &str, mime_type: &str, bytes: impl Into<Vec<u8>>, last_modified: i64) -> FileHandle {
        let bytes: Vec<u8> = bytes.into();
        let size = bytes.len() as u64;
        self.register_file(name, size, mime_type, last_modified, FileSource::Memory(Rc::from(bytes)))
    }

    /// 磁盘上的文件；元数据立即读取，内容在 read_file 时读取
    pub fn add_path_file(&self, path: &Path) -> Result<FileHandle, DropError> {
        let meta = describe_file(path)?;
        Ok(self.register_file(
            &meta.name,
            meta.size,
            &meta.mime_type,
            meta.last_modified,
            FileSource::Path(path.to_path_buf()),
        ))
    }

    /// 读取时必然失败的文件
    pub fn add_failing_file(&self, name: &str, mime_type: &str, reason: &str) -> FileHandle {
        self.register_file(name, 0, mime_type, 0, FileSource::Failing(reason.to_string()))
    }

    /// 读取会挂起直到 gate 放行的文件，用于观察读取的先后顺序
    pub fn add_gated_file(&self, name: &str, mime_type: &str, bytes: impl Into<Vec<u8>>) -> (FileHandle, FileGate) {
        let bytes: Vec<u8> = bytes.into();
        let size = bytes.len() as u64;
        let (sender, receiver) = oneshot::channel();
        let source = FileSource::Gated {
            bytes: Rc::from(bytes),
            gate: Rc::new(RefCell::new(Some(receiver))),
        };
        (self.register_file(name, size, mime_type, 0, source), FileGate { sender })
    }

    // === 事件派发 ===

    /// 先运行 target 上该类事件的监听器，再沿父元素逐级向上运行（冒泡）；
    /// 每个监听器完成后才运行下一个。传播路径在派发开始时确定
    pub async fn dispatch(&self, event: DomEvent) -> Rc<DomEvent> {
        let event = Rc::new(event);
        let path = {
            let state = self.state.borrow();
            if let Err(e) = state.node(event.target()) {
                tracing::warn!("dispatch: {}", e);
                return event;
            }
            state.ancestors_or_self(event.target())
        };
        for element in path {
            let listeners: Vec<Listener> = {
                let state = self.state.borrow();
                state
                    .nodes
                    .get(element.0)
                    .map(|node| {
                        node.listeners
                            .iter()
                            .filter(|(kind, _)| *kind == event.kind())
                            .map(|(_, l)| Rc::clone(l))
                            .collect()
                    })
                    .unwrap_or_default()
            };
            for listener in listeners {
                listener(Rc::clone(&event)).await;
            }
        }
        event
    }

    pub async fn drag_over(&self, target: ElementHandle) -> Rc<DomEvent> {
        self.dispatch(DomEvent::new(EventKind::DragOver, target).with_data_transfer(Vec::new()))
            .await
    }

    pub async fn drag_leave(&self, target: ElementHandle) -> Rc<DomEvent> {
        self.dispatch(DomEvent::new(EventKind::DragLeave, target).with_data_transfer(Vec::new()))
            .await
    }

    /// 模拟把 files 拖放到 target 上
    pub async fn drop_files(&self, target: ElementHandle, files: Vec<FileHandle>) -> Rc<DomEvent> {
        self.dispatch(DomEvent::new(EventKind::Drop, target).with_data_transfer(files))
            .await
    }

    /// 模拟在文件选择框中选中 files
    pub async fn select_files(&self, input: ElementHandle, files: Vec<FileHandle>) -> Rc<DomEvent> {
        self.dispatch(DomEvent::new(EventKind::Change, input).with_target_files(files))
            .await
    }
}

impl DomHost for HeadlessDocument {
    fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DropError> {
        let selector: Selector = selector.parse()?;
        let state = self.state.borrow();
        Ok(state.preorder().into_iter().find(|h| {
            let node = &state.nodes[h.0];
            selector.matches(
                &node.tag,
                node.attribute("id"),
                node.classes.iter().map(String::as_str),
            )
        }))
    }

    fn create_element(&self, tag: &str) -> Result<ElementHandle, DropError> {
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(DropError::Dom(format!("无效标签名: {tag:?}")));
        }
        Ok(self.state.borrow_mut().alloc(tag))
    }

    fn set_attribute(&self, element: ElementHandle, name: &str, value: &str) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        let node = state.node_mut(element)?;
        if name == "class" {
            node.classes = value.split_whitespace().map(str::to_string).collect();
            return Ok(());
        }
        match node.attributes.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => node.attributes.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        let children = std::mem::take(&mut state.node_mut(element)?.children);
        for child in children {
            state.node_mut(child)?.parent = None;
        }
        state.node_mut(element)?.text = text.to_string();
        Ok(())
    }

    fn append_child(&self, parent: ElementHandle, child: ElementHandle) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        let len = state.node(parent)?.children.len();
        state.attach(parent, len, child)
    }

    fn insert_adjacent(
        &self,
        anchor: ElementHandle,
        position: InsertPosition,
        element: ElementHandle,
    ) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        match position {
            InsertPosition::AfterBegin => state.attach(anchor, 0, element),
            InsertPosition::BeforeEnd => {
                let len = state.node(anchor)?.children.len();
                state.attach(anchor, len, element)
            }
            InsertPosition::BeforeBegin | InsertPosition::AfterEnd => {
                let parent = state.node(anchor)?.parent.ok_or_else(|| {
                    DropError::Dom(format!("{}: 锚点元素没有父元素", position.as_str()))
                })?;
                // 先摘下 element，再计算锚点位置，避免同级移动时下标偏移
                state.detach(element)?;
                let index = state
                    .node(parent)?
                    .children
                    .iter()
                    .position(|c| *c == anchor)
                    .ok_or_else(|| DropError::Dom("锚点不在父元素中".into()))?;
                let index = if position == InsertPosition::AfterEnd { index + 1 } else { index };
                state.attach(parent, index, element)
            }
        }
    }

    fn add_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        let node = state.node_mut(element)?;
        if !node.classes.iter().any(|c| c == class) {
            node.classes.push(class.to_string());
        }
        Ok(())
    }

    fn remove_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        state.node_mut(element)?.classes.retain(|c| c != class);
        Ok(())
    }

    fn add_event_listener(
        &self,
        element: ElementHandle,
        kind: EventKind,
        listener: Listener,
    ) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        state.node_mut(element)?.listeners.push((kind, listener));
        Ok(())
    }

    fn click(&self, element: ElementHandle) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        state.node(element)?;
        state.activations.push(element);
        Ok(())
    }

    fn style_texts(&self) -> Result<Vec<String>, DropError> {
        let state = self.state.borrow();
        Ok(state
            .preorder()
            .into_iter()
            .map(|h| &state.nodes[h.0])
            .filter(|n| n.tag == "style")
            .map(|n| n.text.clone())
            .collect())
    }

    fn append_style(&self, css: &str) -> Result<(), DropError> {
        let head = self.head();
        let style = self.create_element("style")?;
        self.set_text_content(style, css)?;
        self.append_child(head, style)
    }

    fn read_file(&self, file: &FileHandle) -> LocalBoxFuture<'static, Result<Vec<u8>, DropError>> {
        let state = Rc::clone(&self.state);
        let file = file.clone();
        async move {
            let source = {
                let mut state = state.borrow_mut();
                state.read_log.push(file.name.clone());
                state
                    .files
                    .get(file.id)
                    .filter(|(h, _)| h.name == file.name)
                    .map(|(_, s)| s.clone())
            };
            match source {
                Some(FileSource::Memory(bytes)) => Ok(bytes.to_vec()),
                Some(FileSource::Path(path)) => {
                    std::fs::read(&path).map_err(|e| DropError::read(&file.name, e.to_string()))
                }
                Some(FileSource::Failing(reason)) => Err(DropError::read(&file.name, reason)),
                Some(FileSource::Gated { bytes, gate }) => {
                    let pending = gate.borrow_mut().take();
                    match pending {
                        Some(pending) => pending
                            .await
                            .map(|()| bytes.to_vec())
                            .map_err(|_| DropError::read(&file.name, "读取被取消")),
                        None => Ok(bytes.to_vec()),
                    }
                }
                None => Err(DropError::read(&file.name, "未知的文件句柄")),
            }
        }
        .boxed_local()
    }

    fn create_object_url(&self, blob: &Blob) -> Result<String, DropError> {
        let mut state = self.state.borrow_mut();
        let url = format!("blob:headless/{}", state.object_urls.len() + 1);
        state.object_urls.push((url.clone(), blob.clone()));
        Ok(url)
    }

    fn set_property(
        &self,
        element: ElementHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), DropError> {
        let mut state = self.state.borrow_mut();
        state.node_mut(element)?.properties.insert(name.to_string(), value);
        Ok(())
    }
}
