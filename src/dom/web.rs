//! WebDocument：浏览器文档上的 DomHost（web 特性）
//!
//! 元素在首次出现时登记到本地表中，以句柄编号引用。
//! 文件不登记：每个 FileHandle 直接携带对应的 `web_sys::File`，随事件与句柄一起释放。
//! 监听器的同步部分在浏览器回调内立即执行（因此 prevent_default 能及时生效），
//! 返回的 future 交给 `spawn_local`。
//!
//! `to_dom_event` 只把拖放载荷与选择框上的文件原样搬进 DomEvent，
//! 取哪一份文件由 `DomEvent::files` 决定，这部分逻辑在宿主无关的测试中覆盖。

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, DragEvent, Element, Event, File, FileList, HtmlElement, HtmlInputElement};

use crate::dom::{
    DomEvent, DomHost, ElementHandle, EventKind, FileHandle, InsertPosition, Listener,
    NativeFile, PropertyValue,
};
use crate::model::error::DropError;
use crate::model::loaded_file::Blob;

fn js_error(e: JsValue) -> DropError {
    DropError::Dom(format!("{e:?}"))
}

#[derive(Default)]
struct Registry {
    elements: Vec<Element>,
}

impl Registry {
    fn element_handle(&mut self, element: Element) -> ElementHandle {
        if let Some(i) = self.elements.iter().position(|e| *e == element) {
            return ElementHandle(i);
        }
        self.elements.push(element);
        ElementHandle(self.elements.len() - 1)
    }
}

/// FileList 转为文件描述；id 为列表内序号
fn file_handles(list: Option<FileList>) -> Option<Vec<FileHandle>> {
    let list = list?;
    Some(
        (0..list.length())
            .filter_map(|i| list.get(i))
            .enumerate()
            .map(|(id, file)| FileHandle {
                id,
                name: file.name(),
                size: file.size() as u64,
                mime_type: file.type_(),
                last_modified: file.last_modified() as i64,
                native: Some(NativeFile::new(file)),
            })
            .collect(),
    )
}

/// 浏览器文档
pub struct WebDocument {
    document: Document,
    registry: Rc<RefCell<Registry>>,
}

impl WebDocument {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// 取全局 window 的 document
    pub fn from_window() -> Result<Self, DropError> {
        let window = web_sys::window().ok_or_else(|| DropError::Dom("没有全局 window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| DropError::Dom("window 没有 document".into()))?;
        Ok(Self::new(document))
    }

    fn element(&self, handle: ElementHandle) -> Result<Element, DropError> {
        self.registry
            .borrow()
            .elements
            .get(handle.0)
            .cloned()
            .ok_or_else(|| DropError::Dom(format!("无效元素句柄: {}", handle.0)))
    }

    fn register(&self, element: Element) -> ElementHandle {
        self.registry.borrow_mut().element_handle(element)
    }

    fn js_blob(blob: &Blob) -> Result<web_sys::Blob, DropError> {
        let parts = js_sys::Array::new();
        parts.push(&js_sys::Uint8Array::from(blob.bytes()));
        let options = web_sys::BlobPropertyBag::new();
        options.set_type(blob.mime_type());
        web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options).map_err(js_error)
    }
}

/// 把浏览器事件转换为 DomEvent
fn to_dom_event(kind: EventKind, target: ElementHandle, raw: &Event) -> DomEvent {
    let mut event = DomEvent::new(kind, target);
    if let Some(transfer) = raw.dyn_ref::<DragEvent>().and_then(DragEvent::data_transfer) {
        event = event.with_data_transfer(file_handles(transfer.files()).unwrap_or_default());
    }
    let input = raw
        .target()
        .and_then(|t| t.dyn_into::<HtmlInputElement>().ok());
    if let Some(files) = file_handles(input.and_then(|i| i.files())) {
        event = event.with_target_files(files);
    }
    event
}

impl DomHost for WebDocument {
    fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>, DropError> {
        let found = self.document.query_selector(selector).map_err(js_error)?;
        Ok(found.map(|element| self.register(element)))
    }

    fn create_element(&self, tag: &str) -> Result<ElementHandle, DropError> {
        let element = self.document.create_element(tag).map_err(js_error)?;
        Ok(self.register(element))
    }

    fn set_attribute(&self, element: ElementHandle, name: &str, value: &str) -> Result<(), DropError> {
        self.element(element)?
            .set_attribute(name, value)
            .map_err(js_error)
    }

    fn set_text_content(&self, element: ElementHandle, text: &str) -> Result<(), DropError> {
        self.element(element)?.set_text_content(Some(text));
        Ok(())
    }

    fn append_child(&self, parent: ElementHandle, child: ElementHandle) -> Result<(), DropError> {
        let child = self.element(child)?;
        self.element(parent)?
            .append_child(&child)
            .map_err(js_error)?;
        Ok(())
    }

    fn insert_adjacent(
        &self,
        anchor: ElementHandle,
        position: InsertPosition,
        element: ElementHandle,
    ) -> Result<(), DropError> {
        let element = self.element(element)?;
        self.element(anchor)?
            .insert_adjacent_element(position.as_str(), &element)
            .map_err(js_error)?;
        Ok(())
    }

    fn add_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError> {
        self.element(element)?
            .class_list()
            .add_1(class)
            .map_err(js_error)
    }

    fn remove_class(&self, element: ElementHandle, class: &str) -> Result<(), DropError> {
        self.element(element)?
            .class_list()
            .remove_1(class)
            .map_err(js_error)
    }

    fn add_event_listener(
        &self,
        element: ElementHandle,
        kind: EventKind,
        listener: Listener,
    ) -> Result<(), DropError> {
        let target = self.element(element)?;
        let callback = Closure::<dyn FnMut(Event)>::new(move |raw: Event| {
            let event = Rc::new(to_dom_event(kind, element, &raw));
            let pending = listener(Rc::clone(&event));
            if event.default_prevented() {
                raw.prevent_default();
            }
            wasm_bindgen_futures::spawn_local(pending);
        });
        target
            .add_event_listener_with_callback(kind.as_str(), callback.as_ref().unchecked_ref())
            .map_err(js_error)?;
        // 监听器与页面同生命周期
        callback.forget();
        Ok(())
    }

    fn click(&self, element: ElementHandle) -> Result<(), DropError> {
        let element: HtmlElement = self
            .element(element)?
            .dyn_into()
            .map_err(|_| DropError::Dom("元素不是 HtmlElement".into()))?;
        element.click();
        Ok(())
    }

    fn style_texts(&self) -> Result<Vec<String>, DropError> {
        let nodes = self.document.query_selector_all("style").map_err(js_error)?;
        Ok((0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|node| node.text_content())
            .collect())
    }

    fn append_style(&self, css: &str) -> Result<(), DropError> {
        let style = self.document.create_element("style").map_err(js_error)?;
        style.set_text_content(Some(css));
        let head = self
            .document
            .head()
            .ok_or_else(|| DropError::Dom("文档没有 head".into()))?;
        head.append_child(&style).map_err(js_error)?;
        Ok(())
    }

    fn read_file(&self, file: &FileHandle) -> LocalBoxFuture<'static, Result<Vec<u8>, DropError>> {
        let source = file
            .native
            .as_ref()
            .and_then(|native| native.downcast_ref::<File>())
            .cloned();
        let name = file.name.clone();
        async move {
            let source = source.ok_or_else(|| DropError::read(&name, "文件描述没有附带浏览器文件"))?;
            let buffer = JsFuture::from(source.array_buffer())
                .await
                .map_err(|e| DropError::read(&name, format!("{e:?}")))?;
            Ok(js_sys::Uint8Array::new(&buffer).to_vec())
        }
        .boxed_local()
    }

    fn create_object_url(&self, blob: &Blob) -> Result<String, DropError> {
        let js_blob = Self::js_blob(blob)?;
        web_sys::Url::create_object_url_with_blob(&js_blob).map_err(js_error)
    }

    fn set_property(
        &self,
        element: ElementHandle,
        name: &str,
        value: PropertyValue,
    ) -> Result<(), DropError> {
        let element = self.element(element)?;
        let value: JsValue = match value {
            PropertyValue::Text(s) | PropertyValue::Url(s) => JsValue::from_str(&s),
            PropertyValue::Blob(blob) => Self::js_blob(&blob)?.into(),
            PropertyValue::Bytes(bytes) => js_sys::Uint8Array::from(&bytes[..]).buffer().into(),
        };
        js_sys::Reflect::set(&element, &JsValue::from_str(name), &value).map_err(js_error)?;
        Ok(())
    }
}
