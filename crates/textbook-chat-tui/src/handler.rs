use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use textbook_chat_core::Mode;

use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::QueryResolved => app.on_query_resolved(),
        AppEvent::Health(status) => app.backend_status = Some(status),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_persona_picker {
        handle_persona_picker(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_persona_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.persona_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.persona_picker_nav_up(),
        KeyCode::Enter => app.select_persona(),
        KeyCode::Esc | KeyCode::Char('q') => app.show_persona_picker = false,
        _ => {}
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    let chat_open = app.session.is_open();

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Reader scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_page_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_page_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_page_down(10)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_page_up(10)
        }
        KeyCode::Char('g') => app.page_scroll = 0,

        // Chat panel
        KeyCode::Char('a') => app.toggle_chat(),
        KeyCode::Char('i') | KeyCode::Enter if chat_open => app.input_mode = InputMode::Editing,
        KeyCode::Char('p') if chat_open => app.open_persona_picker(),
        KeyCode::Char('x') if chat_open && !app.session.show_welcome() => app.clear_history(),
        KeyCode::Esc if app.session.scope().mode() == Mode::Selected => {
            app.session.clear_selection();
            app.begin_drag(None);
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_query(),
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if app.query_cursor < app.query_input.chars().count() {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            if app.query_cursor < app.query_input.chars().count() {
                app.query_cursor += 1;
            }
        }
        KeyCode::Home => app.query_cursor = 0,
        KeyCode::End => app.query_cursor = app.query_input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
            app.query_input.insert(byte_pos, c);
            app.query_cursor += 1;
        }
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let (x, y) = (mouse.column, mouse.row);
    let in_page = app.page_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let pos = if in_page { app.page_pos(x, y) } else { None };
            app.begin_drag(pos);
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            let pos = app.page_pos(x, y);
            app.extend_drag(pos);
        }
        // Every release is published, even outside the page; the selector
        // decides whether the selection counts.
        MouseEventKind::Up(MouseButton::Left) => app.finish_drag(),
        MouseEventKind::ScrollDown => {
            if in_page {
                app.scroll_page_down(3);
            } else if in_chat {
                app.chat_scroll_back = app.chat_scroll_back.saturating_sub(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_page {
                app.scroll_page_up(3);
            } else if in_chat {
                app.chat_scroll_back = app.chat_scroll_back.saturating_add(3);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 0), 0);
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 10), 6);
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 2, 4, 3);
        assert!(point_in_rect(2, 2, rect));
        assert!(point_in_rect(5, 4, rect));
        assert!(!point_in_rect(6, 4, rect));
        assert!(!point_in_rect(1, 3, rect));
    }
}
