use crate::types::{Cursor, StopReason};
use std::collections::VecDeque;

/// How many recent cursors are remembered for cycle detection.
pub const CURSOR_WINDOW_SIZE: usize = 2;

/// The last few cursors handed out for one feed. A cursor already in the
/// window means the server is cycling, including A, B, A oscillation.
#[derive(Debug, Clone, Default)]
pub struct CursorWindow {
    recent: VecDeque<Cursor>,
}

impl CursorWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, cursor: &Cursor) -> bool {
        self.recent.iter().any(|seen| seen == cursor)
    }

    pub fn push(&mut self, cursor: Cursor) {
        self.recent.push_back(cursor);
        while self.recent.len() > CURSOR_WINDOW_SIZE {
            self.recent.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

/// Recognises cursors the server hands out when it has nothing valid left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorPredicate {
    Never,
    Contains(String),
}

impl CursorPredicate {
    pub fn is_invalid(&self, cursor: &Cursor) -> bool {
        match self {
            CursorPredicate::Never => false,
            CursorPredicate::Contains(pattern) => cursor.as_str().contains(pattern.as_str()),
        }
    }
}

impl Default for CursorPredicate {
    fn default() -> Self {
        CursorPredicate::Contains("null".to_string())
    }
}

impl From<Option<String>> for CursorPredicate {
    fn from(pattern: Option<String>) -> Self {
        match pattern {
            Some(pattern) if !pattern.is_empty() => CursorPredicate::Contains(pattern),
            _ => CursorPredicate::Never,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorStep {
    Advance(Cursor),
    Stop(StopReason),
}

/// Decide what to do with the cursor returned alongside a persisted page.
///
/// Checks run in order: missing cursor, invalid cursor, recently seen cursor.
/// Only an advancing cursor is pushed into `window`.
pub fn next_cursor(
    returned: Option<Cursor>,
    window: &mut CursorWindow,
    predicate: &CursorPredicate,
) -> CursorStep {
    let Some(cursor) = returned else {
        return CursorStep::Stop(StopReason::EndOfFeed);
    };
    if predicate.is_invalid(&cursor) {
        return CursorStep::Stop(StopReason::InvalidCursor);
    }
    if window.contains(&cursor) {
        return CursorStep::Stop(StopReason::CursorCycle);
    }
    window.push(cursor.clone());
    CursorStep::Advance(cursor)
}
