//! The chat widget's controller.
//!
//! [`ChatSession`] owns the persisted conversation, persona and open flag, the
//! [`ModeSelector`] and the [`QueryDispatcher`]. Front-ends call into it and
//! render whatever it holds; nothing here fails the widget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::conversation::ConversationStore;
use crate::dispatch::{QueryDispatcher, QueryRequest};
use crate::error::QueryError;
use crate::lock;
use crate::persona::{Persona, PersonaPreference};
use crate::selection::{ModeSelector, QueryScope, ScopeReader};
use crate::state::Message;
use crate::store::{SessionStore, IS_OPEN_KEY};

pub const MAX_QUESTION_CHARS: usize = 1000;
pub const TOO_LONG_MESSAGE: &str =
    "Your question is too long (maximum 1000 characters). Please shorten it and try again.";

/// What became of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// Over the length limit; a notice was appended locally.
    TooLong,
    /// Another question is still in flight; this one was dropped.
    Busy,
    Answered,
    /// The classified error's message was appended.
    Failed(QueryError),
}

struct Widget {
    conversation: ConversationStore,
    persona: PersonaPreference,
    is_open: bool,
}

pub struct ChatSession {
    store: Arc<dyn SessionStore>,
    widget: Mutex<Widget>,
    selector: Mutex<ModeSelector>,
    dispatcher: QueryDispatcher,
    in_flight: AtomicBool,
}

impl ChatSession {
    /// Reads the persisted session state once; later changes are written back
    /// as they happen.
    pub fn new(store: Arc<dyn SessionStore>, dispatcher: QueryDispatcher, selector: ModeSelector) -> Self {
        let conversation = ConversationStore::open(store.clone());
        let persona = PersonaPreference::open(store.clone());
        let is_open = match store.load(IS_OPEN_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!(error = %e, "could not read widget open flag");
                false
            }
        };

        tracing::info!(
            messages = conversation.len(),
            persona = persona.get().as_str(),
            is_open,
            "chat session restored"
        );

        Self {
            store,
            widget: Mutex::new(Widget {
                conversation,
                persona,
                is_open,
            }),
            selector: Mutex::new(selector),
            dispatcher,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Handle one question from the input box.
    pub async fn submit(&self, input: &str) -> SubmitOutcome {
        let question = input.trim();
        if question.is_empty() {
            return SubmitOutcome::Ignored;
        }

        // The length notice is local, so it is appended even while busy.
        if question.chars().count() > MAX_QUESTION_CHARS {
            self.append(Message::assistant(TOO_LONG_MESSAGE));
            return SubmitOutcome::TooLong;
        }

        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("question dropped while another is in flight");
            return SubmitOutcome::Busy;
        };

        self.append(Message::user(question));
        let request = QueryRequest::new(question, &self.scope(), self.persona());

        match self.dispatcher.dispatch(&request).await {
            Ok(response) => {
                self.append(Message::from_response(response));
                SubmitOutcome::Answered
            }
            Err(e) => {
                tracing::info!(error = e.kind(), "query failed, reporting in conversation");
                self.append(Message::assistant(e.to_string()));
                SubmitOutcome::Failed(e)
            }
        }
    }

    fn append(&self, message: Message) {
        if let Err(e) = lock(&self.widget).conversation.append(message) {
            tracing::warn!(error = %e, "could not persist conversation history");
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.widget).conversation.messages().to_vec()
    }

    /// The welcome screen shows whenever there is no history.
    pub fn show_welcome(&self) -> bool {
        lock(&self.widget).conversation.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn clear_history(&self) {
        if let Err(e) = lock(&self.widget).conversation.clear() {
            tracing::warn!(error = %e, "could not remove persisted conversation history");
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.widget).is_open
    }

    pub fn set_open(&self, open: bool) {
        lock(&self.widget).is_open = open;
        if let Err(e) = self.store.save(IS_OPEN_KEY, if open { "true" } else { "false" }) {
            tracing::warn!(error = %e, "could not persist widget open flag");
        }
    }

    pub fn toggle_open(&self) -> bool {
        let open = !self.is_open();
        self.set_open(open);
        open
    }

    pub fn persona(&self) -> Persona {
        lock(&self.widget).persona.get()
    }

    pub fn set_persona(&self, persona: Persona) {
        if let Err(e) = lock(&self.widget).persona.set(persona) {
            tracing::warn!(error = %e, "could not persist persona preference");
        }
    }

    pub fn scope(&self) -> QueryScope {
        lock(&self.selector).current()
    }

    pub fn scope_reader(&self) -> ScopeReader {
        lock(&self.selector).reader()
    }

    pub fn clear_selection(&self) {
        lock(&self.selector).clear_selection();
    }

    /// Tear the widget down: abort any in-flight query and stop listening for
    /// selections. Safe to call more than once.
    pub fn teardown(&self) {
        self.dispatcher.shutdown();
        lock(&self.selector).detach();
        tracing::info!("chat session torn down");
    }
}

/// Marks a question as in flight until dropped.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
