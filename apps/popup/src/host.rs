//! Browser-extension APIs the popup consumes: tab query, clipboard,
//! toast notifications and host permissions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser tab identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait(?Send)]
pub trait Tabs {
    /// Active tab of the current window, if any
    async fn active_tab(&self) -> Option<TabId>;
}

#[async_trait(?Send)]
pub trait Clipboard {
    async fn write_text(&self, text: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Success,
    Warning,
    Error,
}

/// User-visible toast notifications
pub trait Notifier {
    fn notify(&self, message: &str, kind: ToastKind);
}

/// Host permissions for remote origins, as `<scheme>://<host>/*` patterns
#[async_trait(?Send)]
pub trait HostPermissions {
    async fn contains(&self, origin: &str) -> bool;

    /// Ask the user to grant `origin`; returns whether it was granted
    async fn request(&self, origin: &str) -> bool;
}

