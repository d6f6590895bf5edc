/*!
 * pwm popup - Controller of the test-account helper popup
 *
 * Owns the login lists, options, search and active filters, and talks to
 * the browser through the traits in `host`: storage areas, the message
 * bus to the content script, remote fetch, permissions, clipboard and
 * toast notifications.
 */

use pwm_logins::storage::{self, StorageArea};
use pwm_logins::{
    all_logins, logins_from_value, parse_logins, visible_logins, ActiveFilters, CategoryIndex,
    Login, LoginError, Options,
};
use std::rc::Rc;
use thiserror::Error;

pub mod host;
pub mod messaging;
pub mod sync;
#[cfg(test)]
mod testing;
#[cfg(feature = "web")]
pub mod web;

use host::{Clipboard, HostPermissions, Notifier, Tabs, ToastKind};
use messaging::{AutofillReport, AutofillRequest, MessageBus};
use sync::{origin_pattern, Fetch, FetchedSync, PendingSync, RemoteSync, SyncError, SyncOutcome};

// ============================================================================
// Storage Keys
// ============================================================================

pub const CUSTOM_LOGINS_KEY: &str = "pwmLoginCreds";
pub const OPTIONS_KEY: &str = "pwmLoginOptions";
pub const ACTIVE_FILTERS_KEY: &str = "pwmActiveFilters";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PopupError {
    #[error(transparent)]
    Logins(#[from] LoginError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Clipboard write failed: {0}")]
    Clipboard(String),
}

pub type Result<T> = std::result::Result<T, PopupError>;

// ============================================================================
// Host
// ============================================================================

/// Browser APIs available to the popup
pub struct ExtensionHost {
    /// Synced storage area, small per-item quota
    pub sync_storage: Box<dyn StorageArea>,
    /// Device-local storage area used when the sync quota overflows
    pub local_storage: Box<dyn StorageArea>,
    pub bus: Box<dyn MessageBus>,
    pub fetcher: Rc<dyn Fetch>,
    pub permissions: Box<dyn HostPermissions>,
    pub tabs: Box<dyn Tabs>,
    pub clipboard: Box<dyn Clipboard>,
    pub notifier: Box<dyn Notifier>,
}

/// Storage area a value ended up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageTier {
    Sync,
    Local,
}

/// Result of a login upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub admitted: usize,
    pub rejected: usize,
    pub tier: StorageTier,
}

// ============================================================================
// Popup Controller
// ============================================================================

/// Owns the popup state. The visible login list is derived from the
/// remote and custom logins, the search text and the active filters only.
pub struct Popup {
    host: ExtensionHost,
    remote_logins: Vec<Login>,
    custom_logins: Vec<Login>,
    options: Options,
    active_filters: ActiveFilters,
    search: String,
    categories: CategoryIndex,
    remote_sync: RemoteSync,
    last_sync: Option<SyncOutcome>,
}

impl Popup {
    pub fn new(host: ExtensionHost) -> Self {
        Self {
            host,
            remote_logins: Vec::new(),
            custom_logins: Vec::new(),
            options: Options::default(),
            active_filters: ActiveFilters::new(),
            search: String::new(),
            categories: CategoryIndex::default(),
            remote_sync: RemoteSync::default(),
            last_sync: None,
        }
    }

    /// Load persisted state in order (custom logins, options, filters),
    /// then sync from the configured remote URL. Load and sync failures
    /// leave defaults in place.
    pub async fn init(&mut self) {
        self.load_custom_logins().await;
        self.load_options().await;
        self.load_active_filters().await;
        self.reindex();

        if !self.options.remote_url.is_empty() {
            let url = self.options.remote_url.clone();
            if let Err(e) = self.sync_from_remote_url(&url).await {
                tracing::warn!("Startup sync from {} failed: {}", url, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // State accessors
    // ------------------------------------------------------------------------

    pub fn remote_logins(&self) -> &[Login] {
        &self.remote_logins
    }

    pub fn custom_logins(&self) -> &[Login] {
        &self.custom_logins
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn active_filters(&self) -> &ActiveFilters {
        &self.active_filters
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn categories(&self) -> &CategoryIndex {
        &self.categories
    }

    pub fn last_sync(&self) -> Option<&SyncOutcome> {
        self.last_sync.as_ref()
    }

    /// Logins to render: remote first, then custom
    pub fn visible_logins(&self) -> Vec<&Login> {
        visible_logins(
            all_logins(&self.remote_logins, &self.custom_logins),
            &self.search,
            &self.active_filters,
        )
    }

    // ------------------------------------------------------------------------
    // Search and filters
    // ------------------------------------------------------------------------

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.search = search.into();
    }

    /// Category select change; an empty value clears the key. The
    /// filters only change once they are saved.
    pub async fn select_category(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.active_filters.clone();
        next.select(key, value);

        let saved = storage::save(self.host.sync_storage.as_ref(), ACTIVE_FILTERS_KEY, &next).await;
        if let Err(e) = saved {
            tracing::warn!("Failed to save active filters: {}", e);
            self.notify("Could not save filters!", ToastKind::Error);
            return Err(e.into());
        }

        self.active_filters = next;
        Ok(())
    }

    pub async fn set_auto_login(&mut self, enabled: bool) -> Result<()> {
        let next = Options {
            auto_login: enabled,
            ..self.options.clone()
        };
        self.save_options(&next).await?;
        self.options = next;
        Ok(())
    }

    fn reindex(&mut self) {
        self.categories = CategoryIndex::build(self.custom_logins.iter().chain(&self.remote_logins));
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    async fn save_options(&self, options: &Options) -> Result<()> {
        if let Err(e) = storage::save(self.host.sync_storage.as_ref(), OPTIONS_KEY, options).await {
            tracing::warn!("Failed to save options: {}", e);
            self.notify("Could not save options!", ToastKind::Error);
            return Err(e.into());
        }
        tracing::debug!("Saved options");
        Ok(())
    }

    async fn load_options(&mut self) {
        match storage::load::<Options>(self.host.sync_storage.as_ref(), OPTIONS_KEY).await {
            Ok(Some(options)) => self.options = options,
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load options: {}", e),
        }
    }

    async fn load_active_filters(&mut self) {
        match storage::load::<ActiveFilters>(self.host.sync_storage.as_ref(), ACTIVE_FILTERS_KEY)
            .await
        {
            Ok(Some(filters)) => self.active_filters = filters,
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to load active filters: {}", e),
        }
    }

    /// Sync tier first, device-local tier as fallback
    async fn load_custom_logins(&mut self) {
        let tiers = [
            (StorageTier::Sync, self.host.sync_storage.as_ref()),
            (StorageTier::Local, self.host.local_storage.as_ref()),
        ];

        for (tier, area) in tiers {
            let value = match area.get(CUSTOM_LOGINS_KEY).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Failed to read {:?} storage: {}", tier, e);
                    continue;
                }
            };

            match logins_from_value(value) {
                Ok(report) => {
                    tracing::debug!(
                        "Loaded {} custom logins from {:?} storage",
                        report.logins.len(),
                        tier
                    );
                    if !report.rejected.is_empty() {
                        tracing::warn!(
                            "Skipped {} invalid custom logins in {:?} storage",
                            report.rejected.len(),
                            tier
                        );
                        self.notify(
                            &format!("Skipped {} invalid saved accounts", report.rejected.len()),
                            ToastKind::Warning,
                        );
                    }
                    self.custom_logins = report.logins;
                    return;
                }
                Err(e) => {
                    tracing::warn!("Stored custom logins in {:?} storage are invalid: {}", tier, e);
                    self.notify("Saved accounts could not be read!", ToastKind::Error);
                }
            }
        }
    }

    /// Write custom logins to the sync tier, or to the local tier when
    /// the sync quota is exceeded. The other tier is cleared so loading
    /// never picks up a stale copy.
    async fn persist_custom_logins(&self, logins: &[Login]) -> Result<StorageTier> {
        let sync_area = self.host.sync_storage.as_ref();
        let local_area = self.host.local_storage.as_ref();

        match storage::save(sync_area, CUSTOM_LOGINS_KEY, logins).await {
            Ok(()) => {
                if let Err(e) = local_area.remove(CUSTOM_LOGINS_KEY).await {
                    tracing::warn!("Failed to clear local custom logins: {}", e);
                }
                Ok(StorageTier::Sync)
            }
            Err(LoginError::QuotaExceeded { bytes, quota, .. }) => {
                tracing::warn!(
                    "Custom logins exceed sync quota ({} > {} bytes), using local storage",
                    bytes,
                    quota
                );
                storage::save(local_area, CUSTOM_LOGINS_KEY, logins).await?;
                sync_area.remove(CUSTOM_LOGINS_KEY).await?;
                self.notify(
                    "Too many accounts to sync, saved on this device only",
                    ToastKind::Warning,
                );
                Ok(StorageTier::Local)
            }
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Custom logins
    // ------------------------------------------------------------------------

    /// Append the valid records of an uploaded JSON array to the custom
    /// logins. On failure nothing changes.
    pub async fn upload_custom_logins(&mut self, text: &str) -> Result<UploadOutcome> {
        let report = match parse_logins(text) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Upload rejected: {}", e);
                self.notify("Upload failed: not a list of accounts", ToastKind::Error);
                return Err(e.into());
            }
        };

        let admitted = report.logins.len();
        let rejected = report.rejected.len();

        let mut next = self.custom_logins.clone();
        next.extend(report.logins);

        let tier = match self.persist_custom_logins(&next).await {
            Ok(tier) => tier,
            Err(e) => {
                tracing::warn!("Failed to save custom logins: {}", e);
                self.notify("Could not save uploaded accounts!", ToastKind::Error);
                return Err(e);
            }
        };

        self.custom_logins = next;
        self.reindex();
        tracing::info!(
            "Uploaded {} custom logins ({} rejected) to {:?} storage",
            admitted,
            rejected,
            tier
        );
        if rejected > 0 {
            self.notify(
                &format!("Skipped {} invalid accounts, {} uploaded", rejected, admitted),
                ToastKind::Warning,
            );
        }

        Ok(UploadOutcome {
            admitted,
            rejected,
            tier,
        })
    }

    pub async fn delete_custom_logins(&mut self) -> Result<()> {
        self.host.sync_storage.remove(CUSTOM_LOGINS_KEY).await?;
        self.host.local_storage.remove(CUSTOM_LOGINS_KEY).await?;

        self.custom_logins.clear();
        self.reindex();
        self.notify("Uploaded accounts deleted!", ToastKind::Success);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Remote sync
    // ------------------------------------------------------------------------

    /// Sync button handler: remember the URL, then sync from it.
    /// An empty URL does nothing.
    pub async fn sync_remote(&mut self, url: &str) -> Result<Option<SyncOutcome>> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(None);
        }

        // A failed save is already reported and does not block the sync
        let next = Options {
            remote_url: url.to_string(),
            ..self.options.clone()
        };
        if self.save_options(&next).await.is_ok() {
            self.options = next;
        }

        let outcome = self.sync_from_remote_url(url).await?;
        self.notify("Loaded accounts from remote URL!", ToastKind::Success);
        Ok(Some(outcome))
    }

    /// Replace the remote logins with the list at `url`. On failure the
    /// previous remote logins stay, a toast is raised and the error is
    /// returned.
    pub async fn sync_from_remote_url(&mut self, url: &str) -> std::result::Result<SyncOutcome, SyncError> {
        let pending = self.begin_sync(url).await?;
        let fetched = pending.fetch().await;
        self.finish_sync(fetched)
    }

    /// Check host permission and take a sync ticket. Denied permission
    /// aborts before any request is made.
    pub async fn begin_sync(&mut self, url: &str) -> std::result::Result<PendingSync, SyncError> {
        let origin = match origin_pattern(url) {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!("Cannot sync from '{}': {}", url, e);
                self.notify("Remote sync failed!", ToastKind::Error);
                return Err(e);
            }
        };

        let permitted = self.host.permissions.contains(&origin).await
            || self.host.permissions.request(&origin).await;
        if !permitted {
            let e = SyncError::PermissionDenied(origin);
            tracing::warn!("{}", e);
            self.notify(&e.to_string(), ToastKind::Error);
            return Err(e);
        }

        Ok(PendingSync {
            ticket: self.remote_sync.begin(),
            url: url.to_string(),
            fetcher: Rc::clone(&self.host.fetcher),
        })
    }

    /// Apply a fetched list if it belongs to the latest sync
    pub fn finish_sync(&mut self, fetched: FetchedSync) -> std::result::Result<SyncOutcome, SyncError> {
        let FetchedSync { ticket, url, body } = fetched;

        match self.remote_sync.complete(ticket, body) {
            Ok(report) => {
                let outcome = SyncOutcome {
                    url,
                    admitted: report.logins.len(),
                    rejected: report.rejected.len(),
                    synced_at: chrono::Utc::now(),
                };
                tracing::info!(
                    "Synced {} remote logins from {} ({} rejected)",
                    outcome.admitted,
                    outcome.url,
                    outcome.rejected
                );

                self.remote_logins = report.logins;
                self.reindex();
                self.last_sync = Some(outcome.clone());
                Ok(outcome)
            }
            Err(SyncError::Superseded) => {
                tracing::debug!("Discarding superseded sync from {}", url);
                Err(SyncError::Superseded)
            }
            Err(e) => {
                tracing::warn!("Remote sync from {} failed: {}", url, e);
                self.notify("Remote sync failed!", ToastKind::Error);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Clipboard and autofill
    // ------------------------------------------------------------------------

    /// Copy `text`, toasting with `label` ("Username", "Password")
    pub async fn copy_to_clipboard(&self, text: &str, label: &str) -> Result<()> {
        match self.host.clipboard.write_text(text).await {
            Ok(()) => {
                self.notify(&format!("{} copied to clipboard!", label), ToastKind::Success);
                Ok(())
            }
            Err(e) => {
                self.notify(&format!("Could not copy {} to clipboard!", label), ToastKind::Error);
                Err(PopupError::Clipboard(e))
            }
        }
    }

    pub async fn copy_username(&self, login: &Login) -> Result<()> {
        self.copy_to_clipboard(&login.username, "Username").await
    }

    pub async fn copy_password(&self, login: &Login) -> Result<()> {
        self.copy_to_clipboard(&login.password, "Password").await
    }

    /// Ask the content script of the active tab to fill in `login`.
    /// Delivery problems are logged, never raised.
    pub async fn autofill(&self, login: &Login) -> Option<AutofillReport> {
        let Some(tab) = self.host.tabs.active_tab().await else {
            tracing::warn!("No active tab to autofill");
            return None;
        };

        let request = AutofillRequest {
            username: login.username.clone(),
            password: login.password.clone(),
            use_auto_login: self.options.auto_login,
        };

        match messaging::send(self.host.bus.as_ref(), tab, &request).await {
            Ok(report) => {
                tracing::debug!("Autofill in tab {}: {:?}", tab, report);
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Autofill delivery to tab {} failed: {}", tab, e);
                None
            }
        }
    }

    fn notify(&self, message: &str, kind: ToastKind) {
        self.host.notifier.notify(message, kind);
    }
}

// ============================================================================
// Tests
// ============================================================================
