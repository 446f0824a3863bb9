//! # Commands
//!
//! A command is a named signal with a typed payload. Handlers are registered
//! on the editor with a priority and run inside the dispatching transaction,
//! from the highest priority down, until one of them reports the command as
//! handled.

use crate::errors::EditorResult;
use crate::key::NodeKey;
use crate::node::TextFormat;
use crate::transaction::Transaction;
use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

/// Type-erased handler as stored in the listener table
pub type CommandHandler = Rc<dyn Fn(&dyn Any, &mut Transaction<'_>) -> EditorResult<bool>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandPriority {
    Editor,
    Low,
    Normal,
    High,
    Critical,
}

/// Command identity plus its payload type
pub struct Command<P> {
    name: &'static str,
    _payload: PhantomData<fn(P)>,
}

impl<P> Command<P> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Command<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Command<P> {}

impl<P> std::fmt::Debug for Command<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command({})", self.name)
    }
}

/// Wrap a typed handler so it can live in the listener table. Payloads of
/// another type are left unhandled.
pub(crate) fn erase<P, F>(handler: F) -> CommandHandler
where
    P: 'static,
    F: Fn(&P, &mut Transaction<'_>) -> EditorResult<bool> + 'static,
{
    Rc::new(move |payload: &dyn Any, tx: &mut Transaction<'_>| {
        match payload.downcast_ref::<P>() {
            Some(payload) => handler(payload, tx),
            None => Ok(false),
        }
    })
}

/// Pointer click on the surface, already mapped onto the node under it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub target: Option<NodeKey>,
    pub shift: bool,
}

pub const SELECTION_CHANGE_COMMAND: Command<()> = Command::new("SELECTION_CHANGE_COMMAND");
pub const CLICK_COMMAND: Command<PointerEvent> = Command::new("CLICK_COMMAND");
pub const KEY_BACKSPACE_COMMAND: Command<()> = Command::new("KEY_BACKSPACE_COMMAND");
pub const KEY_DELETE_COMMAND: Command<()> = Command::new("KEY_DELETE_COMMAND");
/// Payload: true for a backward delete
pub const DELETE_CHARACTER_COMMAND: Command<bool> = Command::new("DELETE_CHARACTER_COMMAND");
pub const CONTROLLED_TEXT_INSERTION_COMMAND: Command<String> =
    Command::new("CONTROLLED_TEXT_INSERTION_COMMAND");
pub const INSERT_PARAGRAPH_COMMAND: Command<()> = Command::new("INSERT_PARAGRAPH_COMMAND");
pub const INSERT_LINE_BREAK_COMMAND: Command<()> = Command::new("INSERT_LINE_BREAK_COMMAND");
pub const FORMAT_TEXT_COMMAND: Command<TextFormat> = Command::new("FORMAT_TEXT_COMMAND");
pub const REMOVE_TEXT_COMMAND: Command<()> = Command::new("REMOVE_TEXT_COMMAND");
pub const UNDO_COMMAND: Command<()> = Command::new("UNDO_COMMAND");
pub const REDO_COMMAND: Command<()> = Command::new("REDO_COMMAND");
