//! In-memory doubles for the browser APIs, shared by the unit tests.

use async_trait::async_trait;
use pwm_logins::InMemoryStorage;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::host::{Clipboard, HostPermissions, Notifier, TabId, Tabs, ToastKind};
use crate::messaging::{
    LocalBus, PageDom, PASSWORD_SELECTOR, SUBMIT_SELECTOR, USERNAME_SELECTOR,
};
use crate::sync::{Fetch, SyncError};
use crate::ExtensionHost;

// ============================================================================
// Page
// ============================================================================

#[derive(Debug, Default)]
struct FakeElement {
    value: String,
    input_events: usize,
    clicks: usize,
}

#[derive(Debug, Default)]
struct PageState {
    elements: HashMap<String, FakeElement>,
    flags: HashSet<String>,
}

/// Page whose elements are addressed by the exact selector string
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    state: Rc<RefCell<PageState>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_form() -> Self {
        Self::new()
            .with_element(USERNAME_SELECTOR)
            .with_element(PASSWORD_SELECTOR)
            .with_element(SUBMIT_SELECTOR)
    }

    pub fn with_element(self, selector: &str) -> Self {
        self.state
            .borrow_mut()
            .elements
            .insert(selector.to_string(), FakeElement::default());
        self
    }

    pub fn value(&self, selector: &str) -> Option<String> {
        self.state
            .borrow()
            .elements
            .get(selector)
            .map(|e| e.value.clone())
    }

    pub fn input_events(&self, selector: &str) -> usize {
        self.state
            .borrow()
            .elements
            .get(selector)
            .map_or(0, |e| e.input_events)
    }

    pub fn clicks(&self, selector: &str) -> usize {
        self.state
            .borrow()
            .elements
            .get(selector)
            .map_or(0, |e| e.clicks)
    }
}

impl PageDom for FakePage {
    type Element = String;

    fn query_selector(&self, selector: &str) -> Option<String> {
        self.state
            .borrow()
            .elements
            .contains_key(selector)
            .then(|| selector.to_string())
    }

    fn set_value(&self, element: &String, value: &str) {
        if let Some(e) = self.state.borrow_mut().elements.get_mut(element) {
            e.value = value.to_string();
        }
    }

    fn dispatch_input(&self, element: &String) {
        if let Some(e) = self.state.borrow_mut().elements.get_mut(element) {
            e.input_events += 1;
        }
    }

    fn click(&self, element: &String) {
        if let Some(e) = self.state.borrow_mut().elements.get_mut(element) {
            e.clicks += 1;
        }
    }

    fn set_global_flag(&self, name: &str) -> bool {
        self.state.borrow_mut().flags.insert(name.to_string())
    }
}

// ============================================================================
// Host APIs
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub toasts: Rc<RefCell<Vec<(String, ToastKind)>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.toasts.borrow().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn last(&self) -> Option<(String, ToastKind)> {
        self.toasts.borrow().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, kind: ToastKind) {
        self.toasts.borrow_mut().push((message.to_string(), kind));
    }
}

pub struct FakeTabs(pub Option<TabId>);

#[async_trait(?Send)]
impl Tabs for FakeTabs {
    async fn active_tab(&self) -> Option<TabId> {
        self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeClipboard {
    pub fail: bool,
    pub written: Rc<RefCell<Vec<String>>>,
}

#[async_trait(?Send)]
impl Clipboard for FakeClipboard {
    async fn write_text(&self, text: &str) -> Result<(), String> {
        if self.fail {
            return Err("clipboard unavailable".to_string());
        }
        self.written.borrow_mut().push(text.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FakePermissions {
    pub granted: Rc<RefCell<HashSet<String>>>,
    pub grant_on_request: bool,
    pub requests: Rc<RefCell<Vec<String>>>,
}

impl FakePermissions {
    pub fn granting() -> Self {
        Self {
            granted: Rc::default(),
            grant_on_request: true,
            requests: Rc::default(),
        }
    }

    pub fn denying() -> Self {
        Self {
            grant_on_request: false,
            ..Self::granting()
        }
    }
}

#[async_trait(?Send)]
impl HostPermissions for FakePermissions {
    async fn contains(&self, origin: &str) -> bool {
        self.granted.borrow().contains(origin)
    }

    async fn request(&self, origin: &str) -> bool {
        self.requests.borrow_mut().push(origin.to_string());
        if self.grant_on_request {
            self.granted.borrow_mut().insert(origin.to_string());
        }
        self.grant_on_request
    }
}

/// Fetcher answering from a fixed table of URL -> body
#[derive(Debug, Default)]
pub struct StubFetcher {
    pub responses: RefCell<HashMap<String, Result<Value, SyncError>>>,
    pub calls: RefCell<Vec<String>>,
}

impl StubFetcher {
    pub fn respond(&self, url: &str, body: Result<Value, SyncError>) {
        self.responses.borrow_mut().insert(url.to_string(), body);
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

#[async_trait(?Send)]
impl Fetch for StubFetcher {
    async fn fetch_json(&self, url: &str) -> Result<Value, SyncError> {
        self.calls.borrow_mut().push(url.to_string());
        self.responses
            .borrow()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(SyncError::Network(format!("no route to {}", url))))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const ACTIVE_TAB: TabId = TabId(42);

/// Handles kept by a test after the host has been moved into a popup
pub struct Harness {
    pub sync_storage: Rc<InMemoryStorage>,
    pub local_storage: Rc<InMemoryStorage>,
    pub bus: Rc<LocalBus>,
    pub fetcher: Rc<StubFetcher>,
    pub permissions: FakePermissions,
    pub clipboard: FakeClipboard,
    pub notifier: RecordingNotifier,
    pub active_tab: Option<TabId>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            sync_storage: Rc::new(InMemoryStorage::sync_area()),
            local_storage: Rc::new(InMemoryStorage::new()),
            bus: Rc::new(LocalBus::new()),
            fetcher: Rc::new(StubFetcher::default()),
            permissions: FakePermissions::granting(),
            clipboard: FakeClipboard::default(),
            notifier: RecordingNotifier::default(),
            active_tab: Some(ACTIVE_TAB),
        }
    }

    pub fn host(&self) -> ExtensionHost {
        ExtensionHost {
            sync_storage: Box::new(Rc::clone(&self.sync_storage)),
            local_storage: Box::new(Rc::clone(&self.local_storage)),
            bus: Box::new(Rc::clone(&self.bus)),
            fetcher: self.fetcher.clone(),
            permissions: Box::new(self.permissions.clone()),
            tabs: Box::new(FakeTabs(self.active_tab)),
            clipboard: Box::new(self.clipboard.clone()),
            notifier: Box::new(self.notifier.clone()),
        }
    }
}
