pub mod client;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod persona;
pub mod selection;
pub mod session;
pub mod state;
pub mod store;

use std::sync::{Mutex, MutexGuard};

// Re-export main types for convenience
pub use client::RagClient;
pub use config::Config;
pub use conversation::ConversationStore;
pub use dispatch::{QueryDispatcher, QueryRequest, Transport};
pub use error::QueryError;
pub use persona::{Persona, PersonaPreference};
pub use selection::{Mode, ModeSelector, PointerEvents, QueryScope, ScopeReader};
pub use session::{ChatSession, SubmitOutcome};
pub use state::{Confidence, Message, QueryResponse, Role, SourceReference};
pub use store::{FileStore, MemoryStore, SessionStore};

// Every guarded value here is replaced wholesale, so a poisoned lock still
// holds consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
