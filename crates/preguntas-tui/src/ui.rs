use chrono::Local;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};
use crate::app::{App, FocusPane, InputMode};
use crate::history;

const CODE_STYLE: Style = Style::new().fg(Color::Green);

/// Parse a line of text and convert **bold** and `code` markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else if c == '`' {
            let mut code_text = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '`' {
                    found_close = true;
                    break;
                }
                code_text.push(c);
            }

            if found_close && !code_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(code_text, CODE_STYLE));
            } else {
                current_text.push('`');
                current_text.push_str(&code_text);
                if found_close {
                    current_text.push('`');
                }
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Render an answer body: fenced blocks in the code style (fence lines
/// kept, dimmed), everything else through `parse_markdown_line`.
fn render_answer(content: &str) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut in_code = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
            lines.push(Line::from(Span::styled(
                line.to_string(),
                Style::default().fg(Color::DarkGray),
            )));
        } else if in_code {
            lines.push(Line::from(Span::styled(line.to_string(), CODE_STYLE)));
        } else {
            lines.push(parse_markdown_line(line));
        }
    }

    if lines.is_empty() {
        lines.push(Line::default());
    }
    lines
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

    let [history_area, main_area] = Layout::horizontal([
        Constraint::Percentage(25),
        Constraint::Percentage(75),
    ])
    .areas(body_area);

    render_history(app, frame, history_area);
    render_main(app, frame, main_area);
    render_footer(app, frame, footer_area);

    if app.confirm_clear {
        render_confirm_clear(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" LLM Q&A Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.api_url.clone(), Style::default().fg(Color::Gray)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " NORMAL ",
        InputMode::Editing => " INSERT ",
    };

    let hints = match app.input_mode {
        InputMode::Editing => " Enter send  Esc normal  Ctrl+L clear history  Ctrl+C quit ",
        InputMode::Normal => {
            if app.state().error().is_some() {
                " i type  Esc dismiss  j/k scroll  Tab history  y copy  q quit "
            } else {
                " i type  j/k scroll  g/G top/bottom  Tab history  y copy  Ctrl+L clear  q quit "
            }
        }
    };

    let mut spans = vec![
        Span::styled(mode_text, mode_style),
        Span::styled(hints, Style::default().fg(Color::Gray)),
    ];
    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!(" {} ", status),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_history(app: &mut App, frame: &mut Frame, area: Rect) {
    app.history_area = Some(area);

    let focused = app.focus == FocusPane::History;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" History ");

    let today = Local::now().date_naive();
    let groups = history::group_by_day(app.exchanges(), &Local, today);

    if groups.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "No conversation history",
            Style::default().fg(Color::DarkGray),
        ))
        .alignment(Alignment::Center)
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    // Group headers are rows too, so map the exchange selection onto the
    // visual row index.
    let preview_width = (area.width.saturating_sub(4) as usize).clamp(8, history::PREVIEW_LEN);
    let mut items: Vec<ListItem> = Vec::new();
    let mut selected_row = None;
    let mut exchange_idx = 0usize;

    for group in &groups {
        items.push(ListItem::new(Line::from(Span::styled(
            group.label.to_uppercase(),
            Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
        ))));
        for exchange in &group.items {
            if app.history_selected == Some(exchange_idx) {
                selected_row = Some(items.len());
            }
            items.push(ListItem::new(vec![
                Line::from(history::truncate(&exchange.query, preview_width)),
                Line::from(Span::styled(
                    history::format_time(&exchange.timestamp, &Local),
                    Style::default().fg(Color::DarkGray),
                )),
            ]));
            exchange_idx += 1;
        }
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(if focused { Color::Cyan } else { Color::DarkGray })
                .fg(Color::Black),
        );

    let mut state = ListState::default();
    state.select(selected_row);
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_main(app: &mut App, frame: &mut Frame, area: Rect) {
    let error = app.state().error().map(str::to_string);
    let error_height = if error.is_some() { 3 } else { 0 };

    let [chat_area, error_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(error_height),
        Constraint::Length(3),
    ])
    .areas(area);

    render_chat(app, frame, chat_area);

    if let Some(message) = error {
        let banner = Paragraph::new(Line::from(vec![
            Span::styled(message, Style::default().fg(Color::Red)),
            Span::styled("  (Esc to dismiss)", Style::default().fg(Color::DarkGray)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Error "),
        )
        .wrap(Wrap { trim: true });
        frame.render_widget(banner, error_area);
    }

    render_input(app, frame, input_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.query_chat_height = area.height.saturating_sub(2);
    app.query_chat_width = area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Conversation ({}) ", app.exchanges().len()));

    if app.exchanges().is_empty() && !app.is_loading() {
        let empty = Paragraph::new(Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "No conversations yet",
                Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD),
            )),
            Line::from(Span::styled(
                "Ask a question to get started!",
                Style::default().fg(Color::DarkGray),
            )),
        ]))
        .alignment(Alignment::Center)
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let user_style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let ai_style = Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD);
    let time_style = Style::default().fg(Color::DarkGray);

    // Line layout must match app::chat_lines_before
    let mut lines: Vec<Line> = Vec::new();
    for exchange in app.exchanges() {
        let time = history::format_time(&exchange.timestamp, &Local);

        lines.push(Line::from(vec![
            Span::styled("You", user_style),
            Span::styled(format!("  {}", time), time_style),
        ]));
        let query_lines: Vec<Line> = exchange.query.lines().map(|l| Line::from(l.to_string())).collect();
        if query_lines.is_empty() {
            lines.push(Line::default());
        } else {
            lines.extend(query_lines);
        }
        lines.push(Line::default());

        lines.push(Line::from(vec![
            Span::styled("AI Assistant", ai_style),
            Span::styled(format!("  {}", time), time_style),
        ]));
        lines.extend(render_answer(&exchange.response));
        lines.push(Line::default());
    }

    if app.is_loading() {
        lines.push(Line::from(Span::styled("AI Assistant", ai_style)));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.query_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if app.is_loading() {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };

    let title = if app.is_loading() { " Sending... " } else { " Ask a question " };
    let char_count = app.query_input.chars().count();
    let counter = if char_count > 0 {
        format!(" {} characters ", char_count)
    } else {
        " Type your question ".to_string()
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title)
        .title_bottom(Line::from(counter).alignment(Alignment::Right));

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .query_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_confirm_clear(frame: &mut Frame, area: Rect) {
    let width = 40.min(area.width);
    let height = 5.min(area.height);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };

    let text = Text::from(vec![
        Line::from("Clear all conversation history?"),
        Line::default(),
        Line::from(Span::styled("y = clear   any other key = cancel", Style::default().fg(Color::Gray))),
    ]);

    let dialog = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Clear History "),
        );

    frame.render_widget(Clear, popup);
    frame.render_widget(dialog, popup);
}
