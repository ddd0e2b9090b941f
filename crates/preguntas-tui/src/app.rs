use chrono::Local;
use preguntas_core::{
    Exchange, Persistence, QueryOrchestrator, QueryState, Rejected, ServiceError, Settled,
    Storage, Submission,
};
use ratatui::layout::Rect;
use tokio::task::JoinHandle;

use crate::history;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    History,
    Chat,
}

pub type Orchestrator = QueryOrchestrator<Box<dyn Storage>>;

/// A question that has left for the service.
pub struct InFlight {
    pub submission: Submission,
    pub task: JoinHandle<Result<String, ServiceError>>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,
    pub confirm_clear: bool,

    // Input box
    pub query_input: String,
    pub query_cursor: usize, // cursor position in query_input, in chars

    // Chat pane
    pub query_scroll: u16,
    pub query_chat_height: u16, // Height of chat area for scroll calculations
    pub query_chat_width: u16,  // Width of chat area for wrap calculations

    // History sidebar, index into history::display_order
    pub history_selected: Option<usize>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Footer notice (persistence warnings, clipboard result)
    pub status: Option<String>,

    // Panel areas for mouse hit-testing (updated during render)
    pub history_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    pub api_url: String,
    pub orchestrator: Orchestrator,
    pub in_flight: Option<InFlight>,
}

impl App {
    pub fn new(orchestrator: Orchestrator, api_url: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Chat,
            confirm_clear: false,

            query_input: String::new(),
            query_cursor: 0,

            query_scroll: 0,
            query_chat_height: 0,
            query_chat_width: 0,

            history_selected: None,

            animation_frame: 0,
            status: None,

            history_area: None,
            chat_area: None,

            api_url: api_url.into(),
            orchestrator,
            in_flight: None,
        }
    }

    pub fn exchanges(&self) -> &[Exchange] {
        self.orchestrator.exchanges()
    }

    pub fn state(&self) -> &QueryState {
        self.orchestrator.state()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_pending()
    }

    /// Send the input box contents. The input is kept when the submission is
    /// refused so nothing the user typed is lost.
    pub fn submit_query(&mut self) {
        match self.orchestrator.begin(&self.query_input) {
            Ok(submission) => {
                let service = self.orchestrator.service();
                let query = submission.query().to_string();
                let task = tokio::spawn(async move { service.ask(&query).await });
                self.in_flight = Some(InFlight { submission, task });

                self.query_input.clear();
                self.query_cursor = 0;
                self.status = None;
                self.scroll_query_to_bottom();
            }
            Err(Rejected::EmptyQuestion) | Err(Rejected::AlreadyPending) => {}
        }
    }

    /// Fold a finished request back into the conversation. Cheap to call
    /// every loop turn; does nothing while the request is still running.
    pub async fn poll_query(&mut self) {
        let finished = self
            .in_flight
            .as_ref()
            .map(|f| f.task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }
        let Some(InFlight { submission, task }) = self.in_flight.take() else {
            return;
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(ServiceError::Interrupted(e.to_string())),
        };

        match self.orchestrator.settle(submission, result) {
            Settled::Answered(persistence) => {
                self.note_persistence(persistence);
                self.scroll_query_to_bottom();
            }
            Settled::Failed(_) => {}
        }
    }

    pub fn dismiss_error(&mut self) {
        self.orchestrator.reset();
    }

    /// Ask for confirmation before wiping history; no-op when empty.
    pub fn request_clear(&mut self) {
        if !self.exchanges().is_empty() {
            self.confirm_clear = true;
        }
    }

    pub fn clear_history(&mut self) {
        self.confirm_clear = false;
        let persistence = self.orchestrator.clear();
        self.note_persistence(persistence);
        self.history_selected = None;
        self.query_scroll = 0;
    }

    fn note_persistence(&mut self, persistence: Persistence) {
        if let Persistence::Degraded(e) = persistence {
            self.status = Some(format!("History not saved: {}", e));
        }
    }

    pub fn last_answer(&self) -> Option<&str> {
        self.exchanges().last().map(|e| e.response.as_str())
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling
    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
        self.query_scroll = self.query_scroll.saturating_add(lines).min(max_scroll);
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.query_scroll = self.query_scroll.saturating_sub(lines);
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down(self.visible_height() / 2);
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up(self.visible_height() / 2);
    }

    pub fn scroll_to_top(&mut self) {
        self.query_scroll = 0;
    }

    /// Scroll chat to bottom so the newest message (or "Thinking...") is visible
    pub fn scroll_query_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = self.visible_height();
        self.query_scroll = total_lines.saturating_sub(visible_height);
    }

    fn wrap_width(&self) -> usize {
        // Default to 50 before the first render has measured the pane
        if self.query_chat_width > 0 {
            self.query_chat_width as usize
        } else {
            50
        }
    }

    fn visible_height(&self) -> u16 {
        if self.query_chat_height > 0 {
            self.query_chat_height
        } else {
            20
        }
    }

    fn total_chat_lines(&self) -> u16 {
        let wrap_width = self.wrap_width();
        let mut total = chat_lines_before(self.exchanges(), self.exchanges().len(), wrap_width);
        if self.is_loading() {
            total += 2; // "AI" + "Thinking..."
        }
        total
    }

    // History sidebar
    pub fn history_nav_down(&mut self) {
        let len = self.exchanges().len();
        if len > 0 {
            let i = self.history_selected.map(|i| i + 1).unwrap_or(0);
            self.history_selected = Some(i.min(len - 1));
        }
    }

    pub fn history_nav_up(&mut self) {
        if !self.exchanges().is_empty() {
            let i = self.history_selected.unwrap_or(0);
            self.history_selected = Some(i.saturating_sub(1));
        }
    }

    /// Scroll the chat pane so the exchange selected in the sidebar is at
    /// the top.
    pub fn jump_to_selected(&mut self) {
        let Some(selected) = self.history_selected else {
            return;
        };
        let today = Local::now().date_naive();
        let order = history::display_order(self.exchanges(), &Local, today);
        let Some(target) = order.get(selected).map(|e| e.id.clone()) else {
            return;
        };
        if let Some(position) = self.exchanges().iter().position(|e| e.id == target) {
            let offset = chat_lines_before(self.exchanges(), position, self.wrap_width());
            let max_scroll = self.total_chat_lines().saturating_sub(self.visible_height());
            self.query_scroll = offset.min(max_scroll);
            self.focus = FocusPane::Chat;
        }
    }
}

/// Rendered line count of the first `count` exchanges. Must agree with the
/// layout in `ui::render_chat`.
pub fn chat_lines_before(exchanges: &[Exchange], count: usize, wrap_width: usize) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total_lines: u16 = 0;
    for exchange in exchanges.iter().take(count) {
        for content in [&exchange.query, &exchange.response] {
            total_lines = total_lines.saturating_add(1); // Role line
            total_lines = total_lines.saturating_add(wrapped_lines(content, wrap_width));
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }
    }
    total_lines
}

fn wrapped_lines(text: &str, wrap_width: usize) -> u16 {
    let mut lines: u16 = 0;
    for line in text.lines() {
        // Character count, not byte length, for UTF-8 text
        let char_count = line.chars().count();
        let rows = if char_count == 0 { 1 } else { char_count.div_ceil(wrap_width) };
        lines = lines.saturating_add(rows as u16);
    }
    lines.max(1)
}
