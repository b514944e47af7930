use chrono::{DateTime, Utc};

use crate::command::Privilege;

/// Entries kept per session, the oldest are dropped first
pub const MAX_HISTORY: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub line: String,
    pub at: DateTime<Utc>,
}

/// Per-client state the dispatcher reads and handlers update
#[derive(Clone, Debug)]
pub struct SessionState {
    pub privilege: Privilege,
    /// Nested configuration mode, prepended to config lines
    pub edit_path: String,
    history: Vec<HistoryEntry>,
    closed: bool,
}

impl SessionState {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            privilege,
            edit_path: String::new(),
            history: Vec::new(),
            closed: false,
        }
    }
}

/// A command client: where output goes and whose state the line runs under
pub trait Session: Send {
    fn state(&self) -> &SessionState;
    fn state_mut(&mut self) -> &mut SessionState;
    fn sendln(&mut self, line: &str);

    fn privilege(&self) -> Privilege {
        self.state().privilege
    }

    fn set_privilege(&mut self, level: Privilege) {
        self.state_mut().privilege = level;
    }

    fn edit_path(&self) -> &str {
        &self.state().edit_path
    }

    fn set_edit_path(&mut self, path: String) {
        self.state_mut().edit_path = path;
    }

    fn history_add(&mut self, line: &str) {
        let history = &mut self.state_mut().history;
        if history.len() >= MAX_HISTORY {
            let excess = history.len() + 1 - MAX_HISTORY;
            history.drain(..excess);
        }
        history.push(HistoryEntry {
            line: line.to_string(),
            at: Utc::now(),
        });
    }

    fn history(&self) -> &[HistoryEntry] {
        &self.state().history
    }

    /// Ask the line source to close this session
    fn quit(&mut self) {
        self.state_mut().closed = true;
    }

    fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Session collecting its output in memory (config loading, tests)
#[derive(Debug)]
pub struct CaptureSession {
    state: SessionState,
    pub output: Vec<String>,
}

impl CaptureSession {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            state: SessionState::new(privilege),
            output: Vec::new(),
        }
    }

    /// Drain captured output
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}

impl Session for CaptureSession {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    fn sendln(&mut self, line: &str) {
        self.output.push(line.to_string());
    }
}
