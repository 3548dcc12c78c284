//! Query scope derived from the reader's text selection.
//!
//! The page publishes pointer-release events on a [`PointerEvents`] bus, each
//! carrying whatever text is selected at that moment. A [`ModeSelector`]
//! subscribes for as long as it lives and turns qualifying selections into a
//! `selected` query scope.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, Weak};

use crate::lock;

/// Selections shorter than this (after trimming) are treated as stray clicks.
pub const MIN_SELECTION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Global,
    Selected,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Global => "global",
            Mode::Selected => "selected",
        }
    }
}

/// What the next query is about. `Selected` always carries non-empty text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryScope {
    mode: Mode,
    selected_text: String,
}

impl QueryScope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The captured excerpt, only when the scope is `selected`.
    pub fn selected_text(&self) -> Option<&str> {
        match self.mode {
            Mode::Selected => Some(&self.selected_text),
            Mode::Global => None,
        }
    }

    /// Apply one selection event. Returns true when the scope changed.
    fn observe(&mut self, raw: &str) -> bool {
        let text = raw.trim();
        if text.chars().count() < MIN_SELECTION_CHARS {
            return false;
        }
        self.mode = Mode::Selected;
        self.selected_text = text.to_string();
        true
    }

    fn clear(&mut self) {
        self.mode = Mode::Global;
        self.selected_text.clear();
    }
}

type Listener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

/// Page-wide pointer-release notifications.
#[derive(Clone, Default)]
pub struct PointerEvents {
    inner: Arc<Mutex<Listeners>>,
}

impl PointerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it stays attached until the returned
    /// [`Subscription`] is detached or dropped.
    pub fn subscribe(&self, listener: impl Fn(&str) + Send + Sync + 'static) -> Subscription {
        let mut listeners = lock(&self.inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Arc::new(listener)));

        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            attached: true,
        }
    }

    /// Publish a pointer release with the text selected at that moment.
    pub fn pointer_released(&self, selection: &str) {
        // Snapshot first so a listener may subscribe or detach re-entrantly.
        let snapshot: Vec<Listener> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in snapshot {
            listener(selection);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

/// Handle for one attached listener.
pub struct Subscription {
    bus: Weak<Mutex<Listeners>>,
    id: u64,
    attached: bool,
}

impl Subscription {
    /// Idempotent.
    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        if let Some(bus) = self.bus.upgrade() {
            lock(&bus).entries.retain(|(id, _)| *id != self.id);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Tracks the query scope from selection events. Detaches from the bus when
/// dropped.
pub struct ModeSelector {
    scope: Arc<Mutex<QueryScope>>,
    subscription: Subscription,
}

impl ModeSelector {
    pub fn attach(events: &PointerEvents) -> Self {
        let scope = Arc::new(Mutex::new(QueryScope::global()));
        let listener_scope = scope.clone();
        let subscription = events.subscribe(move |selection| {
            if lock(&listener_scope).observe(selection) {
                tracing::debug!(chars = selection.trim().chars().count(), "query scope set to selection");
            }
        });

        Self { scope, subscription }
    }

    pub fn current(&self) -> QueryScope {
        lock(&self.scope).clone()
    }

    /// Read-only view of the scope for other components.
    pub fn reader(&self) -> ScopeReader {
        ScopeReader {
            scope: self.scope.clone(),
        }
    }

    /// Back to `global`; the stored excerpt is dropped.
    pub fn clear_selection(&self) {
        lock(&self.scope).clear();
    }

    pub fn detach(&mut self) {
        self.subscription.detach();
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_attached()
    }
}

#[derive(Clone)]
pub struct ScopeReader {
    scope: Arc<Mutex<QueryScope>>,
}

impl ScopeReader {
    pub fn current(&self) -> QueryScope {
        lock(&self.scope).clone()
    }
}
