use anyhow::{anyhow, Result};
use ratatui::layout::Rect;
use std::path::Path;
use std::sync::Arc;
use textbook_chat_core::{ChatSession, Persona, PointerEvents, RagClient};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

const BUILTIN_PAGE: &str = "\
# Chapter 1: Introduction to ROS 2

## What is ROS 2?

ROS 2 (Robot Operating System 2) is a middleware framework for building robot software. \
Despite the name it is not an operating system: it is a set of libraries and tools that let \
independent programs, called nodes, exchange data over a shared communication graph.

## Nodes, topics and services

A node is a single-purpose process such as a camera driver or a path planner. Nodes publish \
messages on named topics and subscribe to the topics they care about. Services add a \
request/response pattern for operations that need an answer, and actions cover long-running \
goals with feedback.

## Why DDS?

ROS 2 is built on DDS, an industry standard for real-time publish/subscribe. DDS gives ROS 2 \
discovery without a central master, configurable quality of service, and a path to \
safety-critical deployments.

Select any passage with the mouse to ask the assistant about it.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// A documentation page shown in the reader pane.
pub struct Page {
    pub title: String,
    pub lines: Vec<String>,
}

impl Page {
    pub fn builtin() -> Self {
        Self::from_markdown(BUILTIN_PAGE, "Introduction to ROS 2")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to open page {:?}: {}", path, e))?;
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        Ok(Self::from_markdown(&content, &fallback))
    }

    fn from_markdown(content: &str, fallback_title: &str) -> Self {
        let title = content
            .lines()
            .find_map(|line| line.strip_prefix("# "))
            .map(|t| t.trim().to_string())
            .unwrap_or_else(|| fallback_title.to_string());

        Self {
            title,
            lines: content.lines().map(str::to_string).collect(),
        }
    }
}

/// A point in the wrapped page view: (row, column), both in characters.
pub type ViewPos = (usize, usize);

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Reader pane
    pub page: Page,
    pub page_view: Vec<String>, // page wrapped to the pane width, rebuilt on render
    pub page_scroll: u16,
    pub page_area: Option<Rect>,
    pub drag_anchor: Option<ViewPos>,
    pub drag_cursor: Option<ViewPos>,

    // Chat panel
    pub session: Arc<ChatSession>,
    pub events: PointerEvents,
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars
    pub chat_scroll_back: u16, // lines scrolled up from the newest message
    pub chat_area: Option<Rect>,
    pub submit_task: Option<JoinHandle<()>>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Persona picker
    pub show_persona_picker: bool,
    pub persona_picker_idx: usize,

    pub api_url: String,
    pub backend_status: Option<Result<(), String>>,
    event_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        page: Page,
        session: Arc<ChatSession>,
        events: PointerEvents,
        event_tx: UnboundedSender<AppEvent>,
        api_url: String,
    ) -> Self {
        let input_mode = if session.is_open() {
            InputMode::Editing
        } else {
            InputMode::Normal
        };

        Self {
            should_quit: false,
            input_mode,
            page,
            page_view: Vec::new(),
            page_scroll: 0,
            page_area: None,
            drag_anchor: None,
            drag_cursor: None,
            session,
            events,
            query_input: String::new(),
            query_cursor: 0,
            chat_scroll_back: 0,
            chat_area: None,
            submit_task: None,
            animation_frame: 0,
            show_persona_picker: false,
            persona_picker_idx: 0,
            api_url,
            backend_status: None,
            event_tx,
        }
    }

    /// Check the backend in the background; the header shows the result.
    pub fn check_health(&self, client: RagClient) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let status = client.health().await.map_err(|e| e.to_string());
            if let Err(ref e) = status {
                tracing::warn!(error = %e, "backend health check failed");
            }
            let _ = tx.send(AppEvent::Health(status));
        });
    }

    pub fn toggle_chat(&mut self) {
        let open = self.session.toggle_open();
        self.input_mode = if open { InputMode::Editing } else { InputMode::Normal };
        self.show_persona_picker = false;
    }

    /// Send the input box contents. While a question is in flight the input
    /// box keeps its text, like a disabled form.
    pub fn submit_query(&mut self) {
        if self.session.is_loading() || self.query_input.trim().is_empty() {
            return;
        }

        let question = std::mem::take(&mut self.query_input);
        self.query_cursor = 0;
        self.chat_scroll_back = 0;

        let session = self.session.clone();
        let tx = self.event_tx.clone();
        self.submit_task = Some(tokio::spawn(async move {
            let outcome = session.submit(&question).await;
            tracing::debug!(?outcome, "question resolved");
            let _ = tx.send(AppEvent::QueryResolved);
        }));
        // Redraw once so the question and typing indicator show immediately.
        let _ = self.event_tx.send(AppEvent::Tick);
    }

    pub fn on_query_resolved(&mut self) {
        if self.submit_task.as_ref().is_some_and(|t| t.is_finished()) {
            self.submit_task = None;
        }
        self.chat_scroll_back = 0;
    }

    pub fn clear_history(&mut self) {
        self.session.clear_history();
        self.chat_scroll_back = 0;
    }

    pub fn open_persona_picker(&mut self) {
        let current = self.session.persona();
        self.persona_picker_idx = Persona::all()
            .iter()
            .position(|p| *p == current)
            .unwrap_or(0);
        self.show_persona_picker = true;
    }

    pub fn persona_picker_nav_down(&mut self) {
        let len = Persona::all().len();
        self.persona_picker_idx = (self.persona_picker_idx + 1) % len;
    }

    pub fn persona_picker_nav_up(&mut self) {
        let len = Persona::all().len();
        self.persona_picker_idx = (self.persona_picker_idx + len - 1) % len;
    }

    pub fn select_persona(&mut self) {
        if let Some(persona) = Persona::all().get(self.persona_picker_idx) {
            self.session.set_persona(*persona);
        }
        self.show_persona_picker = false;
    }

    pub fn tick_animation(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_page_down(&mut self, lines: u16) {
        let max = self.page_view.len().saturating_sub(1) as u16;
        self.page_scroll = self.page_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_page_up(&mut self, lines: u16) {
        self.page_scroll = self.page_scroll.saturating_sub(lines);
    }

    /// Map a terminal cell inside the reader pane to a view position.
    pub fn page_pos(&self, column: u16, row: u16) -> Option<ViewPos> {
        let area = self.page_area?;
        // Borders take one cell on each side.
        let inner_x = area.x + 1;
        let inner_y = area.y + 1;
        if column < inner_x || row < inner_y || column >= area.x + area.width.saturating_sub(1) {
            return None;
        }
        if row >= area.y + area.height.saturating_sub(1) {
            return None;
        }
        let line = (row - inner_y) as usize + self.page_scroll as usize;
        if line >= self.page_view.len() {
            return None;
        }
        Some((line, (column - inner_x) as usize))
    }

    pub fn begin_drag(&mut self, pos: Option<ViewPos>) {
        self.drag_anchor = pos;
        self.drag_cursor = pos;
    }

    pub fn extend_drag(&mut self, pos: Option<ViewPos>) {
        if self.drag_anchor.is_some() {
            if let Some(pos) = pos {
                self.drag_cursor = Some(pos);
            }
        }
    }

    /// Pointer released: publish whatever is selected now. The highlight
    /// stays until the next press.
    pub fn finish_drag(&mut self) {
        let text = match (self.drag_anchor, self.drag_cursor) {
            (Some(anchor), Some(cursor)) => selected_text(&self.page_view, anchor, cursor),
            _ => String::new(),
        };
        self.events.pointer_released(&text);
    }

    /// Ordered selection range, if any.
    pub fn selection_range(&self) -> Option<(ViewPos, ViewPos)> {
        let (a, b) = (self.drag_anchor?, self.drag_cursor?);
        Some(if a <= b { (a, b) } else { (b, a) })
    }

    /// Tear the session down, then wait for the submit task to record how its
    /// question ended.
    pub async fn shutdown(&mut self) {
        self.session.teardown();
        if let Some(task) = self.submit_task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "submit task did not finish cleanly");
            }
        }
    }
}

/// Break page lines into rows of at most `width` characters.
pub fn wrap_lines(lines: &[String], width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut rows = Vec::new();
    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        if chars.is_empty() {
            rows.push(String::new());
            continue;
        }
        for chunk in chars.chunks(width) {
            rows.push(chunk.iter().collect());
        }
    }
    rows
}

/// Text between two view positions, inclusive of both ends. Rows are joined
/// with newlines.
pub fn selected_text(view: &[String], a: ViewPos, b: ViewPos) -> String {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    let mut parts = Vec::new();

    for row in start.0..=end.0.min(view.len().saturating_sub(1)) {
        let Some(line) = view.get(row) else { break };
        let from = if row == start.0 { start.1 } else { 0 };
        let to = if row == end.0 { end.1 + 1 } else { usize::MAX };
        let part: String = line.chars().skip(from).take(to.saturating_sub(from)).collect();
        parts.push(part);
    }

    parts.join("\n")
}
