/*!
 * Message bus between the popup and the content script
 *
 * The popup never touches page DOM itself. It sends a typed command to
 * the content script installed in a tab, which performs the DOM work and
 * answers with the command's response type.
 *
 * Wire shape: `{"command": "<name>", ...request fields}`.
 */

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

use crate::host::TabId;

pub const USERNAME_SELECTOR: &str = "[autocomplete='username']";
pub const PASSWORD_SELECTOR: &str = "[autocomplete='current-password']";
pub const SUBMIT_SELECTOR: &str = "[type='submit']";

/// Page-global flag guarding listener registration
pub const LISTENER_FLAG: &str = "__pwmAutofillListener";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("No content script listening in tab {0}")]
    NoReceiver(TabId),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

// ============================================================================
// Commands
// ============================================================================

/// A command understood by the content script, with its response type
pub trait Request: Serialize + DeserializeOwned {
    const COMMAND: &'static str;
    type Response: Serialize + DeserializeOwned;
}

/// Fill the page's login form, optionally submitting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofillRequest {
    pub username: String,
    pub password: String,
    pub use_auto_login: bool,
}

/// What the content script found and did on the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutofillReport {
    pub username_filled: bool,
    pub password_filled: bool,
    pub submitted: bool,
}

impl Request for AutofillRequest {
    const COMMAND: &'static str = "autofill";
    type Response = AutofillReport;
}

/// Serialize a request into its wire message
pub fn encode<R: Request>(request: &R) -> Result<Value, BridgeError> {
    match serde_json::to_value(request) {
        Ok(Value::Object(mut fields)) => {
            fields.insert("command".to_string(), Value::String(R::COMMAND.to_string()));
            Ok(Value::Object(fields))
        }
        Ok(_) => Err(BridgeError::Malformed(format!(
            "'{}' request must serialize to an object",
            R::COMMAND
        ))),
        Err(e) => Err(BridgeError::Malformed(e.to_string())),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|e| BridgeError::Malformed(e.to_string()))
}

// ============================================================================
// Message Bus
// ============================================================================

/// Transport from the privileged context to a tab's content script
#[async_trait(?Send)]
pub trait MessageBus {
    async fn send_raw(&self, tab: TabId, message: Value) -> Result<Value, BridgeError>;
}

#[async_trait(?Send)]
impl<T: MessageBus + ?Sized> MessageBus for Rc<T> {
    async fn send_raw(&self, tab: TabId, message: Value) -> Result<Value, BridgeError> {
        (**self).send_raw(tab, message).await
    }
}

/// Send a typed command and decode its response
pub async fn send<R: Request>(
    bus: &dyn MessageBus,
    tab: TabId,
    request: &R,
) -> Result<R::Response, BridgeError> {
    let message = encode(request)?;
    let response = bus.send_raw(tab, message).await?;
    decode(response)
}

// ============================================================================
// Content Script
// ============================================================================

/// DOM operations the content script needs from the host page
pub trait PageDom {
    type Element;

    fn query_selector(&self, selector: &str) -> Option<Self::Element>;

    fn set_value(&self, element: &Self::Element, value: &str);

    /// Dispatch a bubbling `input` event so page frameworks see the change
    fn dispatch_input(&self, element: &Self::Element);

    fn click(&self, element: &Self::Element);

    /// Set a page-global flag. Returns false if it was already set.
    fn set_global_flag(&self, name: &str) -> bool;
}

/// Receiving end of the bus inside one page
pub trait Listener {
    fn on_message(&self, message: &Value) -> Result<Value, BridgeError>;
}

pub struct ContentScript<P: PageDom> {
    page: P,
}

impl<P: PageDom> ContentScript<P> {
    pub fn new(page: P) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// Fill username and password fields, then click submit when asked.
    /// Missing elements are skipped.
    pub fn autofill(&self, request: &AutofillRequest) -> AutofillReport {
        let username_filled = self.fill(USERNAME_SELECTOR, &request.username);
        let password_filled = self.fill(PASSWORD_SELECTOR, &request.password);

        let submitted = request.use_auto_login
            && match self.page.query_selector(SUBMIT_SELECTOR) {
                Some(button) => {
                    self.page.click(&button);
                    true
                }
                None => {
                    tracing::debug!("No submit control on page, skipping auto login");
                    false
                }
            };

        AutofillReport {
            username_filled,
            password_filled,
            submitted,
        }
    }

    fn fill(&self, selector: &str, value: &str) -> bool {
        match self.page.query_selector(selector) {
            Some(input) => {
                self.page.set_value(&input, value);
                self.page.dispatch_input(&input);
                true
            }
            None => {
                tracing::debug!("No element matches {}", selector);
                false
            }
        }
    }
}

impl<P: PageDom> Listener for ContentScript<P> {
    fn on_message(&self, message: &Value) -> Result<Value, BridgeError> {
        let command = message
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::Malformed("missing 'command'".to_string()))?;

        if command == AutofillRequest::COMMAND {
            let request: AutofillRequest = decode(message.clone())?;
            let report = self.autofill(&request);
            serde_json::to_value(report).map_err(|e| BridgeError::Malformed(e.to_string()))
        } else {
            Err(BridgeError::UnknownCommand(command.to_string()))
        }
    }
}

// ============================================================================
// In-Process Bus
// ============================================================================

/// Bus delivering to content scripts installed in the same process
#[derive(Default)]
pub struct LocalBus {
    listeners: RefCell<HashMap<TabId, Rc<dyn Listener>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the content script for a page load. A page whose listener
    /// flag is already set keeps its existing listener.
    pub fn install<P: PageDom + 'static>(&self, tab: TabId, page: P) -> bool {
        if !page.set_global_flag(LISTENER_FLAG) {
            tracing::debug!("Content script already listening in tab {}", tab);
            return false;
        }

        self.listeners
            .borrow_mut()
            .insert(tab, Rc::new(ContentScript::new(page)));
        true
    }

    /// Drop the listener of a tab, e.g. when it navigates away
    pub fn unload(&self, tab: TabId) {
        self.listeners.borrow_mut().remove(&tab);
    }

    pub fn is_listening(&self, tab: TabId) -> bool {
        self.listeners.borrow().contains_key(&tab)
    }
}

#[async_trait(?Send)]
impl MessageBus for LocalBus {
    async fn send_raw(&self, tab: TabId, message: Value) -> Result<Value, BridgeError> {
        let listener = self
            .listeners
            .borrow()
            .get(&tab)
            .cloned()
            .ok_or(BridgeError::NoReceiver(tab))?;
        listener.on_message(&message)
    }
}

// ============================================================================
// Tests
// ============================================================================
