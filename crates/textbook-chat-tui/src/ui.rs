use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use textbook_chat_core::{Confidence, Message, Mode, Persona, Role};

use crate::app::{wrap_lines, App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("**") else { break };
        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        spans.push(Span::styled(
            after[..end].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after[end + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    if app.session.is_open() {
        let [page_area, chat_area] = Layout::horizontal([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .areas(body_area);
        render_page(app, frame, page_area);
        render_chat(app, frame, chat_area);
    } else {
        app.chat_area = None;
        render_page(app, frame, body_area);
    }

    render_footer(app, frame, footer_area);

    if app.show_persona_picker {
        render_persona_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let backend = match &app.backend_status {
        None => Span::styled(" checking backend... ", Style::default().fg(Color::Gray)),
        Some(Ok(())) => Span::styled(format!(" {} ", app.api_url), Style::default().fg(Color::Green)),
        Some(Err(_)) => Span::styled(
            format!(" {} unreachable ", app.api_url),
            Style::default().fg(Color::Red),
        ),
    };

    let title = Line::from(vec![
        Span::styled(" Physical AI Textbook ", Style::default().fg(Color::Cyan).bold()),
        backend,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let hints = if app.show_persona_picker {
        "j/k: move | Enter: choose | Esc: cancel"
    } else {
        match (app.input_mode, app.session.is_open()) {
            (InputMode::Editing, _) => "Enter: send | Esc: stop typing",
            (InputMode::Normal, true) => {
                "i: type | p: persona | x: clear history | a: close chat | drag: select text | q: quit"
            }
            (InputMode::Normal, false) => "a: AI assistant | j/k: scroll | drag: select text | q: quit",
        }
    };

    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().fg(Color::Black).bg(Color::Cyan),
        InputMode::Editing => Style::default().fg(Color::Black).bg(Color::Yellow),
    };
    let mode_label = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    let footer = Line::from(vec![
        Span::styled(mode_label, mode_style),
        Span::styled(format!(" {}", hints), Style::default().fg(Color::Gray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn render_page(app: &mut App, frame: &mut Frame, area: Rect) {
    app.page_area = Some(area);
    let inner_width = area.width.saturating_sub(2) as usize;
    app.page_view = wrap_lines(&app.page.lines, inner_width);

    let selection = app.selection_range();
    let lines: Vec<Line> = app
        .page_view
        .iter()
        .enumerate()
        .map(|(row, text)| highlight_row(row, text, selection))
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.page.title));

    let page = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.page_scroll, 0));
    frame.render_widget(page, area);
}

fn highlight_row(
    row: usize,
    text: &str,
    selection: Option<((usize, usize), (usize, usize))>,
) -> Line<'static> {
    let heading_style = if text.starts_with('#') {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let Some((start, end)) = selection else {
        return Line::styled(text.to_string(), heading_style);
    };
    if row < start.0 || row > end.0 {
        return Line::styled(text.to_string(), heading_style);
    }

    let chars: Vec<char> = text.chars().collect();
    let from = if row == start.0 { start.1.min(chars.len()) } else { 0 };
    let to = if row == end.0 { (end.1 + 1).min(chars.len()) } else { chars.len() };
    let to = to.max(from);

    let selected = Style::default().bg(Color::Blue).fg(Color::White);
    Line::from(vec![
        Span::styled(chars[..from].iter().collect::<String>(), heading_style),
        Span::styled(chars[from..to].iter().collect::<String>(), selected),
        Span::styled(chars[to..].iter().collect::<String>(), heading_style),
    ])
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let scope = app.session.scope();
    let status_height = if scope.mode() == Mode::Selected { 2 } else { 1 };

    let [status_area, messages_area, input_area] = Layout::vertical([
        Constraint::Length(status_height),
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);
    app.chat_area = Some(messages_area);

    // Persona and mode indicator
    let mut status = vec![Line::from(vec![
        Span::styled(" Persona: ", Style::default().fg(Color::Gray)),
        Span::styled(
            app.session.persona().display_name(),
            Style::default().fg(Color::Magenta).bold(),
        ),
    ])];
    if let Some(excerpt) = scope.selected_text() {
        let preview: String = excerpt.chars().take(40).collect();
        status.push(Line::from(vec![
            Span::styled(" Asking about selected text ", Style::default().fg(Color::Black).bg(Color::Yellow)),
            Span::styled(format!(" \"{}...\" (Esc clears)", preview), Style::default().fg(Color::Gray)),
        ]));
    }
    frame.render_widget(Paragraph::new(status), status_area);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Ask the Textbook ");

    let lines = if app.session.show_welcome() && !app.session.is_loading() {
        welcome_lines()
    } else {
        conversation_lines(&app.session.messages(), app.session.is_loading(), app.animation_frame)
    };

    // Keep the newest message in view unless the reader scrolled back.
    let inner_width = messages_area.width.saturating_sub(2).max(1) as usize;
    let inner_height = messages_area.height.saturating_sub(2) as usize;
    let total: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(inner_width))
        .sum();
    let max_scroll = total.saturating_sub(inner_height) as u16;
    app.chat_scroll_back = app.chat_scroll_back.min(max_scroll);
    let scroll = max_scroll - app.chat_scroll_back;

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(chat, messages_area);

    render_input(app, frame, input_area);
}

fn welcome_lines() -> Vec<Line<'static>> {
    vec![
        Line::default(),
        Line::from(Span::styled(
            "Welcome to the Physical AI Textbook!",
            Style::default().fg(Color::Cyan).bold(),
        )),
        Line::default(),
        Line::from("Hi! I can answer questions about Physical AI & Humanoid Robotics."),
        Line::default(),
        Line::from(Span::styled(
            "Try asking about ROS 2, digital twins, NVIDIA Isaac, or VLA models.",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )),
        Line::from(Span::styled(
            "Select a passage on the left to ask about it directly.",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )),
    ]
}

fn conversation_lines(messages: &[Message], loading: bool, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.content.clone()));
            }
            Role::Assistant => {
                lines.push(Line::from(Span::styled(
                    "AI:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(parse_markdown_line(line));
                }

                let sources = msg.visible_sources();
                if !sources.is_empty() {
                    lines.push(Line::from(Span::styled("Sources:", Style::default().bold())));
                    for src in sources {
                        lines.push(Line::from(vec![
                            Span::raw("  • "),
                            Span::styled(src.section_title.clone(), Style::default().fg(Color::Blue)),
                            Span::styled(
                                format!(" ({}%)", src.relevance_percent()),
                                Style::default().fg(Color::Gray),
                            ),
                        ]));
                        lines.push(Line::from(Span::styled(
                            format!("    {}", src.url),
                            Style::default().fg(Color::DarkGray),
                        )));
                    }
                }

                if let (Some(badge), Some(confidence)) = (msg.confidence_badge(), msg.confidence) {
                    let color = match confidence {
                        Confidence::Medium => Color::Yellow,
                        _ => Color::Red,
                    };
                    lines.push(Line::from(Span::styled(
                        format!("[{}]", badge),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    )));
                }
            }
        }
        lines.push(Line::default());
    }

    if loading {
        lines.push(Line::from(Span::styled(
            "AI:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        )));
    }

    lines
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let loading = app.session.is_loading();

    let border_color = if loading {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(if loading { " Waiting for answer... " } else { " Ask a question... " });

    let input = Paragraph::new(app.query_input.as_str()).block(block);
    frame.render_widget(input, area);

    if editing && !loading {
        let inner_width = area.width.saturating_sub(2);
        let cursor_x = (app.query_cursor as u16).min(inner_width.saturating_sub(1));
        frame.set_cursor_position((area.x + 1 + cursor_x, area.y + 1));
    }
}

fn render_persona_picker(app: &App, frame: &mut Frame, area: Rect) {
    let personas = Persona::all();
    let current = app.session.persona();

    // Calculate popup size and position (centered)
    let popup_width = 36.min(area.width.saturating_sub(4));
    let popup_height = (personas.len() as u16 + 2).min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Persona ");

    let items: Vec<ListItem> = personas
        .iter()
        .map(|persona| {
            let style = if *persona == current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", persona.display_name())).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default().with_selected(Some(app.persona_picker_idx));
    frame.render_stateful_widget(list, popup_area, &mut state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use textbook_chat_core::{QueryResponse, SourceReference};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_parse_markdown_bold() {
        let line = parse_markdown_line("ROS 2 uses **DDS** underneath");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "DDS");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_unclosed_is_literal() {
        assert_eq!(line_text(&parse_markdown_line("a **b")), "a **b");
    }

    #[test]
    fn test_answer_shows_source_percentage_without_badge() {
        let msg = Message::from_response(QueryResponse {
            answer: "ROS 2 is...".to_string(),
            sources: vec![SourceReference {
                chapter_title: "Chapter 1".to_string(),
                section_title: "What is ROS 2?".to_string(),
                module: "module-1-ros2".to_string(),
                url: "/module-1-ros2/chapter-1".to_string(),
                relevance_score: 0.92,
            }],
            confidence: Confidence::High,
            mode_used: "global".to_string(),
            chunks_retrieved: 4,
        });

        let text: Vec<String> = conversation_lines(&[msg], false, 0).iter().map(line_text).collect();
        assert!(text.contains(&"  • What is ROS 2? (92%)".to_string()));
        assert!(!text.iter().any(|l| l.contains("confidence") || l.contains("Not found")));
    }

    #[test]
    fn test_low_confidence_badge() {
        let mut msg = Message::assistant("Maybe...");
        msg.confidence = Some(Confidence::Low);
        let text: Vec<String> = conversation_lines(&[msg], false, 0).iter().map(line_text).collect();
        assert!(text.contains(&"[Low confidence]".to_string()));
    }

    #[test]
    fn test_loading_indicator() {
        let text: Vec<String> = conversation_lines(&[], true, 2).iter().map(line_text).collect();
        assert_eq!(text, vec!["AI:".to_string(), "Thinking...".to_string()]);
    }

    #[test]
    fn test_highlight_row_marks_selection() {
        let line = highlight_row(0, "Nodes publish messages", Some(((0, 6), (0, 12))));
        assert_eq!(line.spans[1].content, "publish");
        assert_eq!(line_text(&line), "Nodes publish messages");
    }
}
