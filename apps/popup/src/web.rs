//! WebAssembly bindings for the autofill bridge
//!
//! `WebPage` and `install_content_script` run inside the page as the
//! content script. `ChromeTabsBus` and `ChromeTabs` run in the popup.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Document, Element, Event, EventInit, HtmlElement, HtmlInputElement, Window};

use crate::host::{TabId, Tabs};
use crate::messaging::{BridgeError, ContentScript, Listener, MessageBus, PageDom, LISTENER_FLAG};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = ["chrome", "runtime", "onMessage"], js_name = addListener)]
    fn add_message_listener(listener: &Closure<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>);

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = sendMessage, catch)]
    fn tabs_send_message(tab_id: i32, message: JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = query, catch)]
    fn tabs_query(query: JsValue) -> Result<js_sys::Promise, JsValue>;
}

/// Initialize panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn to_js(value: &Value) -> Result<JsValue, BridgeError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| BridgeError::Malformed(e.to_string()))
}

fn from_js(value: JsValue) -> Result<Value, BridgeError> {
    serde_wasm_bindgen::from_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
}

// ============================================================================
// Content Script Side
// ============================================================================

/// The page the content script was injected into
pub struct WebPage {
    window: Window,
    document: Document,
}

impl WebPage {
    pub fn current() -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        Some(Self { window, document })
    }
}

impl PageDom for WebPage {
    type Element = Element;

    fn query_selector(&self, selector: &str) -> Option<Element> {
        self.document.query_selector(selector).ok().flatten()
    }

    fn set_value(&self, element: &Element, value: &str) {
        match element.dyn_ref::<HtmlInputElement>() {
            Some(input) => input.set_value(value),
            None => {
                let _ = element.set_attribute("value", value);
            }
        }
    }

    fn dispatch_input(&self, element: &Element) {
        let init = EventInit::new();
        init.set_bubbles(true);
        if let Ok(event) = Event::new_with_event_init_dict("input", &init) {
            let _ = element.dispatch_event(&event);
        }
    }

    fn click(&self, element: &Element) {
        if let Some(element) = element.dyn_ref::<HtmlElement>() {
            element.click();
        }
    }

    fn set_global_flag(&self, name: &str) -> bool {
        let key = JsValue::from_str(name);
        let already_set = js_sys::Reflect::get(&self.window, &key)
            .map(|v| v.is_truthy())
            .unwrap_or(false);
        if already_set {
            return false;
        }
        js_sys::Reflect::set(&self.window, &key, &JsValue::TRUE).unwrap_or(false)
    }
}

/// Register the autofill listener for this page load.
/// Returns false when a listener is already registered.
#[wasm_bindgen]
pub fn install_content_script() -> bool {
    let Some(page) = WebPage::current() else {
        return false;
    };
    if !page.set_global_flag(LISTENER_FLAG) {
        return false;
    }

    let script = ContentScript::new(page);
    let listener = Closure::wrap(Box::new(
        move |message: JsValue, _sender: JsValue, send_response: js_sys::Function| {
            let response = from_js(message)
                .and_then(|message| script.on_message(&message))
                .unwrap_or_else(|e| {
                    tracing::warn!("Content script rejected message: {}", e);
                    serde_json::json!({ "error": e.to_string() })
                });

            if let Ok(response) = to_js(&response) {
                let _ = send_response.call1(&JsValue::NULL, &response);
            }
            false
        },
    ) as Box<dyn FnMut(JsValue, JsValue, js_sys::Function) -> bool>);

    add_message_listener(&listener);
    listener.forget();
    true
}

// ============================================================================
// Popup Side
// ============================================================================

/// `MessageBus` over `chrome.tabs.sendMessage`
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeTabsBus;

#[async_trait(?Send)]
impl MessageBus for ChromeTabsBus {
    async fn send_raw(&self, tab: TabId, message: Value) -> Result<Value, BridgeError> {
        let promise = tabs_send_message(tab.0, to_js(&message)?)
            .map_err(|_| BridgeError::NoReceiver(tab))?;
        let response = JsFuture::from(promise)
            .await
            .map_err(|_| BridgeError::NoReceiver(tab))?;

        let response = from_js(response)?;
        match response.get("error").and_then(Value::as_str) {
            Some(error) => Err(BridgeError::Malformed(error.to_string())),
            None => Ok(response),
        }
    }
}

/// `Tabs` over `chrome.tabs.query`
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeTabs;

#[async_trait(?Send)]
impl Tabs for ChromeTabs {
    async fn active_tab(&self) -> Option<TabId> {
        let query = to_js(&serde_json::json!({ "active": true, "currentWindow": true })).ok()?;
        let tabs = JsFuture::from(tabs_query(query).ok()?).await.ok()?;
        let first = js_sys::Array::from(&tabs).get(0);
        let id = js_sys::Reflect::get(&first, &JsValue::from_str("id")).ok()?;
        id.as_f64().map(|id| TabId(id as i32))
    }
}
