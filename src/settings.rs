//! Race-safe settings synchronization.
//!
//! Edits arrive as fast as the user types; the device answers over a link
//! that reorders completions freely. Every write carries a sequence number
//! drawn from one process-wide counter, and a key's registry remembers the
//! highest sequence issued for it: a completion whose sequence is no longer
//! the highest is superseded and discarded whole, ack and error included.
//! Keystroke edits are trailing-edge debounced per key (cancel-and-replace,
//! never stacked); blur, select changes, and default restores apply
//! immediately.
//!
//! The device's canonical key names have been renamed over firmware
//! revisions; [`canonical_key`] maps whatever key the UI control uses to the
//! current wire name, while the confirmed-value cache stays keyed by the UI
//! name so invalid edits revert correctly.

use crate::device::DeviceApi;
use crate::ui::UiHandle;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Legacy UI key → canonical wire key.
const KEY_ALIASES: &[(&str, &str)] = &[
    ("NOISE_ALPHA_SHIFT", "NOISE_AVERAGE_UPDATE_SPEED"),
    ("MOTION_HOLD_MS", "MOTION_HOLD_MILISECONDS"),
    ("RCWL_MIN_ACTIVE_MS", "RCWL_MIN_ACTIVE_MILISECONDS"),
    ("SAMPLE_PERIOD_US", "SAMPLE_PERIOD_MICROSECONDS"),
    ("MIN_PERIOD_US", "MIN_PERIOD_MICROSECONDS"),
    ("MAX_PERIOD_US", "MAX_PERIOD_MICROSECONDS"),
];

/// Numeric settings the device reports under a single, stable name.
const PLAIN_KEYS: &[&str] = &[
    "EVENTS_TO_TRIGGER",
    "MIN_AMPLITUDE",
    "MIN_AMPLITUDE_LEFT",
    "MIN_AMPLITUDE_RIGHT",
    "NOISE_MULT_LEFT",
    "NOISE_MULT_RIGHT",
    "NOISE_OFFSET_LEFT",
    "NOISE_OFFSET_RIGHT",
];

/// Boolean settings driven by true/false selects.
const BOOL_KEYS: &[&str] = &["ENABLE_RCWL_LEFT", "ENABLE_RCWL_RIGHT"];

/// Maps a UI-facing key to the key the device expects on the wire.
pub fn canonical_key(ui_key: &str) -> &str {
    KEY_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == ui_key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(ui_key)
}

/// Strict integer grammar for free-text fields: optional leading minus, then
/// digits. Empty, bare "-", and anything else ("12a", "1.5", "+5") is
/// rejected so transient keystroke states never reach the device.
pub fn is_valid_int(value: &str) -> bool {
    let value = value.trim();
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

struct PendingTimer {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SyncState {
    /// Last value confirmed applied or loaded, keyed by UI key.
    cache: HashMap<String, String>,
    /// Highest sequence issued per key; completions must match it exactly.
    latest_seq: HashMap<String, u64>,
    /// Pending debounce timer per key, replaced on every new edit.
    timers: HashMap<String, PendingTimer>,
    /// Bulk-load guard: suppresses every user-edit-triggered send while a
    /// settings load is populating fields.
    loading: bool,
}

struct Inner {
    device: Arc<dyn DeviceApi>,
    ui: UiHandle,
    debounce: Duration,
    seq: AtomicU64,
    timer_ids: AtomicU64,
    state: Mutex<SyncState>,
}

/// Handle to the synchronizer; cheap to clone, one instance per session.
#[derive(Clone)]
pub struct SettingsSync {
    inner: Arc<Inner>,
}

impl SettingsSync {
    pub fn new(device: Arc<dyn DeviceApi>, ui: UiHandle, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                ui,
                debounce,
                seq: AtomicU64::new(0),
                timer_ids: AtomicU64::new(0),
                state: Mutex::new(SyncState::default()),
            }),
        }
    }

    /// Queues `value` behind the key's quiet window. Each call replaces the
    /// pending timer, so only the latest value is ever sent, once the key has
    /// been idle for the full window.
    pub async fn set_debounced(&self, key: &str, value: &str) {
        let inner = Arc::clone(&self.inner);
        let mut st = self.inner.state.lock().await;
        if st.loading {
            return;
        }
        if let Some(prev) = st.timers.remove(key) {
            prev.handle.abort();
        }

        let id = self.inner.timer_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let timer_key = key.to_string();
        let timer_value = value.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let fired = {
                let mut st = inner.state.lock().await;
                match st.timers.get(&timer_key) {
                    Some(t) if t.id == id => {
                        st.timers.remove(&timer_key);
                        true
                    }
                    // replaced by a newer edit while we slept
                    _ => false,
                }
            };
            if fired {
                send_now(&inner, &timer_key, &timer_value).await;
            }
        });
        st.timers.insert(key.to_string(), PendingTimer { id, handle });
    }

    /// Cancels any pending debounce for the key and issues the write
    /// immediately. Returns the request task so shutdown paths and tests can
    /// join it; production callers drop it.
    pub async fn set_now(&self, key: &str, value: &str) -> Option<JoinHandle<()>> {
        send_now(&self.inner, key, value).await
    }

    /// Restore-default control: push the default into the field and cache,
    /// then apply it immediately. Ignored while a bulk load is populating.
    pub async fn apply_default(&self, key: &str, value: &str) -> Option<JoinHandle<()>> {
        {
            let mut st = self.inner.state.lock().await;
            if st.loading {
                return None;
            }
            st.cache.insert(key.to_string(), value.to_string());
        }
        self.inner.ui.set_field(key, value);
        self.set_now(key, value).await
    }

    /// Keystroke path: only complete integer values are forwarded, debounced.
    pub async fn handle_input(&self, key: &str, value: &str) {
        if !is_valid_int(value) {
            return;
        }
        self.set_debounced(key, value).await;
    }

    /// Blur path: invalid content reverts the field to the last confirmed
    /// value and sends nothing; valid content applies immediately.
    pub async fn handle_blur(&self, key: &str, value: &str) -> Option<JoinHandle<()>> {
        if !is_valid_int(value) {
            let st = self.inner.state.lock().await;
            if st.loading {
                return None;
            }
            if let Some(prev) = st.cache.get(key) {
                self.inner.ui.set_field(key, prev.clone());
            }
            return None;
        }
        self.set_now(key, value).await
    }

    /// Select controls apply on change; their values ("true"/"false" or an
    /// enumerated option) bypass the integer grammar.
    pub async fn handle_select(&self, key: &str, value: &str) -> Option<JoinHandle<()>> {
        self.set_now(key, value).await
    }

    /// Bulk read from the device. The loading guard is held across the fetch
    /// and populate so nothing the loader writes into fields is echoed back
    /// as if the user typed it.
    pub async fn load(&self) {
        self.set_loading(true).await;
        self.inner.ui.status("Loading settings...");
        match self.inner.device.read_settings().await {
            Ok(payload) => {
                self.populate(&payload).await;
                self.inner.ui.ack("none");
                self.inner.ui.status("Settings loaded");
            }
            Err(err) if err.is_parse() => self.inner.ui.error("settings parse error"),
            Err(err) => self
                .inner
                .ui
                .error(format!("settings get error ({})", err.status_code())),
        }
        self.set_loading(false).await;
    }

    /// Re-read settings from the device's SD card, then refresh the UI.
    pub async fn reload(&self) {
        self.inner.ui.status("Reloading from SD and applying...");
        match self.inner.device.reload_settings().await {
            Ok(()) => {
                self.load().await;
                self.inner.ui.status("Reloaded and applied");
            }
            Err(err) => self
                .inner
                .ui
                .error(format!("reload error ({})", err.status_code())),
        }
    }

    /// Persist the device's current settings to its SD card.
    pub async fn save(&self) {
        self.inner.ui.status("Saving to SD...");
        match self.inner.device.save_settings().await {
            Ok(()) => self.inner.ui.status("Saved to SD"),
            Err(err) => self
                .inner
                .ui
                .error(format!("save error ({})", err.status_code())),
        }
    }

    /// Fills cache and UI fields from a bulk settings payload, accepting
    /// either the canonical or the legacy spelling of renamed keys (canonical
    /// preferred) and mirroring the resolved value into both, so old and new
    /// control sets stay consistent.
    pub async fn populate(&self, payload: &Map<String, Value>) {
        let mut st = self.inner.state.lock().await;

        for (legacy, canonical) in KEY_ALIASES {
            let found = payload.get(*canonical).or_else(|| payload.get(*legacy));
            if let Some(text) = found.and_then(field_string) {
                st.cache.insert((*canonical).to_string(), text.clone());
                st.cache.insert((*legacy).to_string(), text.clone());
                self.inner.ui.set_field(*canonical, text.clone());
                self.inner.ui.set_field(*legacy, text);
            }
        }

        for key in PLAIN_KEYS {
            if let Some(text) = payload.get(*key).and_then(field_string) {
                st.cache.insert((*key).to_string(), text.clone());
                self.inner.ui.set_field(*key, text);
            }
        }

        for key in BOOL_KEYS {
            if let Some(value) = payload.get(*key) {
                let text = if value_truthy(value) { "true" } else { "false" };
                st.cache.insert((*key).to_string(), text.to_string());
                self.inner.ui.set_field(*key, text);
            }
        }
    }

    /// Last confirmed value for a key, if any.
    pub async fn cached(&self, key: &str) -> Option<String> {
        self.inner.state.lock().await.cache.get(key).cloned()
    }

    async fn set_loading(&self, loading: bool) {
        self.inner.state.lock().await.loading = loading;
    }
}

/// Allocates the next sequence, records it as the key's highest, cancels any
/// pending debounce, and spawns the write. Suppressed during a bulk load.
async fn send_now(inner: &Arc<Inner>, key: &str, value: &str) -> Option<JoinHandle<()>> {
    let seq = {
        let mut st = inner.state.lock().await;
        if st.loading {
            return None;
        }
        if let Some(prev) = st.timers.remove(key) {
            prev.handle.abort();
        }
        let seq = inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        st.latest_seq.insert(key.to_string(), seq);
        seq
    };
    Some(spawn_write(
        Arc::clone(inner),
        key.to_string(),
        value.to_string(),
        seq,
    ))
}

fn spawn_write(inner: Arc<Inner>, key: String, value: String, seq: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wire_key = canonical_key(&key).to_string();
        inner.ui.status(format!("Applying {wire_key} = {value}"));

        let result = inner.device.write_setting(&wire_key, &value).await;

        // The sequence check must run before any state mutation or UI output:
        // a superseded completion is dropped whole, ack and error included.
        let mut st = inner.state.lock().await;
        if st.latest_seq.get(&key).copied() != Some(seq) {
            return;
        }

        match result {
            Ok(reply) => {
                if let Some(ack) = reply.ack.filter(|a| !a.is_empty()) {
                    inner.ui.ack(ack);
                }
                // cache under the UI key so blur revert keeps working
                st.cache.insert(key, value.clone());
                inner.ui.status(format!("Applied: {wire_key} = {value}"));
            }
            Err(err) if err.is_parse() => inner.ui.error("set parse error"),
            Err(err) => inner
                .ui
                .error(format!("set error ({})", err.status_code())),
        }
    })
}

fn field_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !(s.is_empty() || s == "0" || s == "false"),
        _ => false,
    }
}
