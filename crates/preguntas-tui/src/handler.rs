use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, FocusPane, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => {
            if app.input_mode == InputMode::Editing {
                insert_text(app, &text);
            }
        }
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
    app.poll_query().await;
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.confirm_clear {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => app.clear_history(),
            _ => app.confirm_clear = false,
        }
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Esc dismisses the error banner
        KeyCode::Esc => app.dismiss_error(),

        KeyCode::Char('i') | KeyCode::Char('a') => {
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Enter => {
            if app.focus == FocusPane::History {
                app.jump_to_selected();
            } else {
                app.input_mode = InputMode::Editing;
            }
        }

        KeyCode::Tab => {
            app.focus = match app.focus {
                FocusPane::Chat => {
                    if app.history_selected.is_none() && !app.exchanges().is_empty() {
                        app.history_selected = Some(0);
                    }
                    FocusPane::History
                }
                FocusPane::History => FocusPane::Chat,
            };
        }

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            FocusPane::History => app.history_nav_down(),
            FocusPane::Chat => app.scroll_down(1),
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            FocusPane::History => app.history_nav_up(),
            FocusPane::Chat => app.scroll_up(1),
        },
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_query_to_bottom(),

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::PageUp => app.scroll_half_page_up(),

        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.request_clear();
        }

        KeyCode::Char('y') => {
            if let Some(answer) = app.last_answer().map(str::to_string) {
                app.status = Some(if copy_to_clipboard(&answer) {
                    "Copied last answer".to_string()
                } else {
                    "Could not copy: needs pbcopy, wl-copy or xclip".to_string()
                });
            }
        }

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        // Ctrl+L works while typing too
        KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.request_clear();
        }
        KeyCode::Enter => {
            app.submit_query();
        }
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.query_input.chars().count();
            if app.query_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
                app.query_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.query_input.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = app.query_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
            app.query_input.insert(byte_pos, c);
            app.query_cursor += 1;
        }
        _ => {}
    }
}

/// Pasted text goes in at the cursor; newlines become spaces since the input
/// box is a single line.
fn insert_text(app: &mut App, text: &str) {
    let cleaned: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    let byte_pos = char_to_byte_index(&app.query_input, app.query_cursor);
    app.query_input.insert_str(byte_pos, &cleaned);
    app.query_cursor += cleaned.chars().count();
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_history = app.history_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_history {
                app.history_nav_down();
            } else if in_chat {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_history {
                app.history_nav_up();
            } else if in_chat {
                app.scroll_up(3);
            }
        }
        _ => {}
    }
}

/// Hand `text` to the first clipboard tool that starts.
fn copy_to_clipboard(text: &str) -> bool {
    let tools: [(&str, &[&str]); 3] = [
        ("pbcopy", &[]),
        ("wl-copy", &[]),
        ("xclip", &["-selection", "clipboard"]),
    ];

    for (program, args) in tools {
        if let Some(copied) = pipe_to(program, args, text) {
            return copied;
        }
    }
    false
}

/// Write `text` to the stdin of `program`. `None` if it could not be started,
/// otherwise whether it took all of the input and exited cleanly.
fn pipe_to(program: &str, args: &[&str], text: &str) -> Option<bool> {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .ok()?;

    // stdin must be dropped before waiting or the tool never sees EOF
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(text.as_bytes()).is_ok(),
        None => false,
    };
    let exited_ok = child.wait().map(|status| status.success()).unwrap_or(false);
    Some(written && exited_ok)
}
