//! Listener tables shared by the editor and its transactions

use crate::commands::{CommandHandler, CommandPriority};
use crate::editor_state::EditorState;
use crate::errors::EditorResult;
use crate::key::NodeKey;
use crate::transaction::Transaction;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::{Rc, Weak};

/// What happened to a node during one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeMutation {
    Created,
    Updated,
    Destroyed,
}

/// Everything an update listener learns about a commit
#[derive(Debug)]
pub struct UpdatePayload<'a> {
    pub prev: &'a EditorState,
    pub next: &'a EditorState,
    pub dirty_leaves: &'a HashSet<NodeKey>,
    pub dirty_elements: &'a HashMap<NodeKey, bool>,
    pub tags: &'a HashSet<String>,
}

impl UpdatePayload<'_> {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

pub type UpdateListener = Rc<dyn Fn(&UpdatePayload<'_>)>;
pub type MutationListener = Rc<dyn Fn(&BTreeMap<NodeKey, NodeMutation>, &UpdatePayload<'_>)>;
pub type NodeTransform = Rc<dyn Fn(NodeKey, &mut Transaction<'_>) -> EditorResult<()>>;

pub(crate) struct HandlerEntry {
    pub id: u64,
    pub priority: CommandPriority,
    pub handler: CommandHandler,
}

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    pub commands: HashMap<&'static str, Vec<HandlerEntry>>,
    pub update: Vec<(u64, UpdateListener)>,
    pub mutation: HashMap<String, Vec<(u64, MutationListener)>>,
    pub transforms: HashMap<String, Vec<(u64, NodeTransform)>>,
}

impl Listeners {
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn add_command(&mut self, name: &'static str, priority: CommandPriority, handler: CommandHandler) -> u64 {
        let id = self.next_id();
        let entries = self.commands.entry(name).or_default();
        entries.push(HandlerEntry {
            id,
            priority,
            handler,
        });
        // Highest priority first; registration order among equals
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    pub fn handlers(&self, name: &str) -> Vec<CommandHandler> {
        self.commands
            .get(name)
            .map(|entries| entries.iter().map(|e| e.handler.clone()).collect())
            .unwrap_or_default()
    }

    pub fn transforms_for(&self, node_type: &str) -> Vec<NodeTransform> {
        self.transforms
            .get(node_type)
            .map(|entries| entries.iter().map(|(_, t)| t.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_transforms(&self) -> bool {
        self.transforms.values().any(|t| !t.is_empty())
    }

    pub fn mutation_listeners(&self) -> Vec<(String, MutationListener)> {
        self.mutation
            .iter()
            .flat_map(|(node_type, entries)| {
                entries
                    .iter()
                    .map(move |(_, listener)| (node_type.clone(), listener.clone()))
            })
            .collect()
    }

    fn remove(&mut self, id: u64) {
        for entries in self.commands.values_mut() {
            entries.retain(|e| e.id != id);
        }
        self.update.retain(|(i, _)| *i != id);
        for entries in self.mutation.values_mut() {
            entries.retain(|(i, _)| *i != id);
        }
        for entries in self.transforms.values_mut() {
            entries.retain(|(i, _)| *i != id);
        }
    }
}

/// Handle returned by every registration. Dropping it keeps the listener;
/// call [`Unregister::unregister`] to remove it.
#[must_use = "keep the handle to unregister the listener later"]
pub struct Unregister {
    listeners: Weak<RefCell<Listeners>>,
    id: u64,
}

impl Unregister {
    pub(crate) fn new(listeners: &Rc<RefCell<Listeners>>, id: u64) -> Self {
        Self {
            listeners: Rc::downgrade(listeners),
            id,
        }
    }

    pub fn unregister(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.borrow_mut().remove(self.id);
        }
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unregister").field("id", &self.id).finish()
    }
}
