//! # Folio History
//!
//! Undo/redo for a Folio editor.
//!
//! ## Design
//!
//! - Every committed change pushes the state it replaced onto the undo stack
//! - Undo restores the top of the undo stack and moves the current state to
//!   the redo stack
//! - New changes clear the redo stack
//! - Consecutive typing into the same text run within the merge delay counts
//!   as one undo step
//! - Updates tagged `historic` (undo/redo themselves) are not recorded;
//!   updates tagged `history-merge` fold into the current entry
//!
//! ## Example
//!
//! ```rust,ignore
//! let history = Rc::new(RefCell::new(HistoryState::new()));
//! let _handles = register_history(&editor, history.clone());
//!
//! editor.dispatch_command(&UNDO_COMMAND, ())?;
//! editor.flush()?;
//! ```

use folio_core::commands::{REDO_COMMAND, UNDO_COMMAND};
use folio_core::{
    Command, CommandPriority, Editor, EditorResult, EditorState, NodeKey, Transaction, TreeView,
    Unregister, UpdatePayload,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tag carried by updates that undo or redo
pub const HISTORIC_TAG: &str = "historic";
/// Tag that folds an update into the current history entry
pub const HISTORY_MERGE_TAG: &str = "history-merge";

pub const CLEAR_HISTORY_COMMAND: Command<()> = Command::new("CLEAR_HISTORY_COMMAND");

const DEFAULT_MAX_DEPTH: usize = 100;
const DEFAULT_MERGE_DELAY: Duration = Duration::from_millis(1000);

/// Undo and redo stacks of an editor
#[derive(Debug)]
pub struct HistoryState {
    /// States before each recorded change (most recent last)
    undo_stack: Vec<EditorState>,

    /// States undone (most recent last)
    redo_stack: Vec<EditorState>,

    /// State the stacks are relative to
    current: Option<EditorState>,

    /// Maximum number of undo levels (0 = unlimited)
    max_depth: usize,

    merge_delay: Duration,

    /// Text run and time of the last recorded typing change
    last_typing: Option<(NodeKey, Instant)>,
}

impl Default for HistoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryState {
    /// Create a history with default max depth (100) and merge delay (1s)
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            current: None,
            max_depth: DEFAULT_MAX_DEPTH,
            merge_delay: DEFAULT_MERGE_DELAY,
            last_typing: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Typing within `delay` of the previous keystroke merges into one step.
    /// `Duration::ZERO` records every change separately.
    pub fn with_merge_delay(mut self, delay: Duration) -> Self {
        self.merge_delay = delay;
        self
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Forget all recorded changes; the current state stays
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.last_typing = None;
    }

    fn record(&mut self, payload: &UpdatePayload<'_>) {
        if payload.has_tag(HISTORIC_TAG) {
            return;
        }
        let now = Instant::now();
        let selection_only = payload.dirty_leaves.is_empty() && payload.dirty_elements.is_empty();
        let typing = typing_target(payload);

        let merge = selection_only
            || payload.has_tag(HISTORY_MERGE_TAG)
            || match (typing, self.last_typing) {
                (Some(key), Some((last, at))) => key == last && now.duration_since(at) < self.merge_delay,
                _ => false,
            };

        if !merge {
            if let Some(previous) = self.current.take() {
                self.push_undo(previous);
            }
            self.redo_stack.clear();
            debug!(undo = self.undo_stack.len(), version = payload.next.version(), "history entry recorded");
        }
        if !selection_only {
            self.last_typing = typing.map(|key| (key, now));
        }
        self.current = Some(payload.next.clone());
    }

    fn push_undo(&mut self, state: EditorState) {
        self.undo_stack.push(state);
        if self.max_depth > 0 && self.undo_stack.len() > self.max_depth {
            let excess = self.undo_stack.len() - self.max_depth;
            self.undo_stack.drain(..excess);
        }
    }

    fn undo(&mut self, tx: &mut Transaction<'_>) -> EditorResult<bool> {
        let Some(state) = self.undo_stack.pop() else {
            return Ok(false);
        };
        if let Some(current) = self.current.take() {
            self.redo_stack.push(current);
        }
        self.apply(tx, state)
    }

    fn redo(&mut self, tx: &mut Transaction<'_>) -> EditorResult<bool> {
        let Some(state) = self.redo_stack.pop() else {
            return Ok(false);
        };
        if let Some(current) = self.current.take() {
            self.push_undo(current);
        }
        self.apply(tx, state)
    }

    fn apply(&mut self, tx: &mut Transaction<'_>, state: EditorState) -> EditorResult<bool> {
        tx.restore_state(&state)?;
        tx.add_tag(HISTORIC_TAG);
        self.current = Some(state);
        self.last_typing = None;
        debug!(undo = self.undo_stack.len(), redo = self.redo_stack.len(), "history applied");
        Ok(true)
    }
}

/// The text run a change typed into: one dirty leaf, no nodes added or
/// removed
fn typing_target(payload: &UpdatePayload<'_>) -> Option<NodeKey> {
    if payload.dirty_leaves.len() != 1 || payload.prev.len() != payload.next.len() {
        return None;
    }
    let key = payload.dirty_leaves.iter().next().copied()?;
    let node = payload.next.node(key)?;
    (node.is_text() && payload.prev.node(key).is_some()).then_some(key)
}

/// Record every commit of `editor` in `history` and handle the undo, redo
/// and clear commands
pub fn register_history(editor: &Editor, history: Rc<RefCell<HistoryState>>) -> Vec<Unregister> {
    {
        let mut state = history.borrow_mut();
        if state.current.is_none() {
            state.current = Some(editor.get_editor_state());
        }
    }

    let recorder = history.clone();
    let undo = history.clone();
    let redo = history.clone();
    let clear = history;
    vec![
        editor.register_update_listener(move |payload| recorder.borrow_mut().record(payload)),
        editor.register_command(
            &UNDO_COMMAND,
            move |_, tx| undo.borrow_mut().undo(tx),
            CommandPriority::Editor,
        ),
        editor.register_command(
            &REDO_COMMAND,
            move |_, tx| redo.borrow_mut().redo(tx),
            CommandPriority::Editor,
        ),
        editor.register_command(
            &CLEAR_HISTORY_COMMAND,
            move |_, _| {
                clear.borrow_mut().clear();
                Ok(true)
            },
            CommandPriority::Editor,
        ),
    ]
}
