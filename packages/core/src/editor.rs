//! # Editor
//!
//! The editor owns the committed [`EditorState`], the listener tables and,
//! once a surface is mounted, the [`Reconciler`].
//!
//! ## Ticks
//!
//! ```text
//! update(f) ─┐
//! update(g) ─┼─► pending state ──flush()──► transforms ► normalize ► gc
//!            │                               ► selection ► freeze ► reconcile
//! dispatch ──┘                               ► mutation listeners ► update listeners
//! ```
//!
//! Every `update` issued before a `flush` works on the same pending state,
//! so they produce one snapshot and one reconciliation. Updates requested
//! while a commit is running are deferred to the next tick of the same
//! `flush`.

use crate::commands::{erase, Command, CommandPriority, SELECTION_CHANGE_COMMAND};
use crate::config::EditorConfig;
use crate::dom::{DomId, Surface};
use crate::editor_state::EditorState;
use crate::errors::{EditorError, EditorResult};
use crate::key::{KeyGenerator, NodeKey};
use crate::listeners::{Listeners, NodeMutation, Unregister, UpdateListener, UpdatePayload};
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::registry::{NodeBehavior, NodeRegistry};
use crate::selection::{PointKind, RangeSelection, Selection};
use crate::serialize::{self, SerializedEditorState};
use crate::transaction::{DirtySet, PendingState, Transaction};
use crate::tree::TreeView;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Consecutive ticks one `flush` may run
const MAX_TICKS: usize = 100;

/// Transform passes one commit may run
const MAX_TRANSFORM_PASSES: usize = 100;

type UpdateFn = Box<dyn FnOnce(&mut Transaction<'_>) -> EditorResult<()>>;
type ErrorHandler = Box<dyn Fn(&EditorError)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// An update closure is running against the pending state
    Updating,
    /// Transforms, normalization and reconciliation
    Committing,
    /// Listeners are being told about the new state
    Notifying,
}

pub struct Editor {
    config: EditorConfig,
    registry: Arc<NodeRegistry>,
    listeners: Rc<RefCell<Listeners>>,
    keys: KeyGenerator,
    state: RefCell<EditorState>,
    pending: RefCell<Option<PendingState>>,
    /// Requested while an update closure runs; joins the current tick
    queued: RefCell<VecDeque<UpdateFn>>,
    /// Requested while committing; runs in the next tick
    deferred: RefCell<VecDeque<UpdateFn>>,
    phase: Cell<Phase>,
    reconciler: RefCell<Option<Reconciler>>,
    on_error: Option<ErrorHandler>,
    composition: Cell<Option<NodeKey>>,
    reconciliations: Cell<u64>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("namespace", &self.config.namespace)
            .field("version", &self.state.borrow().version())
            .field("phase", &self.phase.get())
            .finish()
    }
}

impl Editor {
    pub fn builder() -> EditorBuilder {
        EditorBuilder::new()
    }

    /// Editor with the built-in node types only
    pub fn new(config: EditorConfig) -> Self {
        Self::from_parts(config, NodeRegistry::new(), None)
    }

    fn from_parts(config: EditorConfig, registry: NodeRegistry, on_error: Option<ErrorHandler>) -> Self {
        let registry = Arc::new(registry);
        Self {
            state: RefCell::new(EditorState::empty(registry.clone())),
            config,
            registry,
            listeners: Rc::new(RefCell::new(Listeners::default())),
            keys: KeyGenerator::new(),
            pending: RefCell::new(None),
            queued: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(VecDeque::new()),
            phase: Cell::new(Phase::Idle),
            reconciler: RefCell::new(None),
            on_error,
            composition: Cell::new(None),
            reconciliations: Cell::new(0),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// The last committed state
    pub fn get_editor_state(&self) -> EditorState {
        self.state.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&EditorState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Whether updates are waiting for the next `flush`. Always true from
    /// inside an update closure or a command handler it dispatched.
    pub fn has_pending_updates(&self) -> bool {
        if self.phase.get() == Phase::Updating {
            return true;
        }
        let pending = self.pending.try_borrow().map_or(true, |pending| pending.is_some());
        pending || !self.deferred.borrow().is_empty()
    }

    /// Number of reconciliation passes run against the mounted surface
    pub fn reconciliations(&self) -> u64 {
        self.reconciliations.get()
    }

    // ---- updates --------------------------------------------------------

    /// Run `f` against the pending state of the current tick
    pub fn update<F>(&self, f: F) -> EditorResult<()>
    where
        F: FnOnce(&mut Transaction<'_>) -> EditorResult<()> + 'static,
    {
        let f: UpdateFn = Box::new(f);
        match self.phase.get() {
            Phase::Updating => {
                self.queued.borrow_mut().push_back(f);
                Ok(())
            }
            Phase::Committing | Phase::Notifying => {
                self.deferred.borrow_mut().push_back(f);
                Ok(())
            }
            Phase::Idle => {
                let result = self.run_update(f);
                self.handle(result)
            }
        }
    }

    /// `update` followed by `flush`
    pub fn update_discrete<F>(&self, f: F) -> EditorResult<()>
    where
        F: FnOnce(&mut Transaction<'_>) -> EditorResult<()> + 'static,
    {
        self.update(f)?;
        self.flush()
    }

    fn run_update(&self, f: UpdateFn) -> EditorResult<()> {
        self.phase.set(Phase::Updating);
        let mut result = self.with_transaction(f);
        while result.is_ok() {
            let next = self.queued.borrow_mut().pop_front();
            let Some(next) = next else {
                break;
            };
            result = self.with_transaction(next);
        }
        self.phase.set(Phase::Idle);

        if let Err(e) = &result {
            warn!(error = %e, "update failed, pending tick discarded");
            self.pending.borrow_mut().take();
            self.queued.borrow_mut().clear();
        }
        result
    }

    fn with_transaction<R>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> EditorResult<R>,
    ) -> EditorResult<R> {
        let mut pending = self.pending.borrow_mut();
        let pending = pending.get_or_insert_with(|| PendingState::from_state(&self.state.borrow()));
        let mut tx = Transaction::new(
            pending,
            &self.registry,
            &self.config,
            &self.listeners,
            &self.keys,
            self.composition.get(),
        );
        f(&mut tx)
    }

    fn handle(&self, result: EditorResult<()>) -> EditorResult<()> {
        match (result, &self.on_error) {
            (Err(e), Some(on_error)) => {
                on_error(&e);
                Ok(())
            }
            (result, _) => result,
        }
    }

    /// Commit the pending tick, then every tick its listeners schedule
    #[instrument(skip_all, fields(namespace = %self.config.namespace))]
    pub fn flush(&self) -> EditorResult<()> {
        if self.phase.get() != Phase::Idle {
            return Ok(());
        }
        let result = self.run_ticks();
        if result.is_err() {
            self.pending.borrow_mut().take();
            self.deferred.borrow_mut().clear();
        }
        self.handle(result)
    }

    fn run_ticks(&self) -> EditorResult<()> {
        let mut ticks = 0;
        loop {
            if self.pending.borrow().is_some() {
                ticks += 1;
                if ticks > MAX_TICKS {
                    return Err(EditorError::UpdateLoop(MAX_TICKS));
                }
                self.commit()?;
                continue;
            }

            let deferred: Vec<UpdateFn> = self.deferred.borrow_mut().drain(..).collect();
            if deferred.is_empty() {
                return Ok(());
            }
            for f in deferred {
                self.run_update(f)?;
            }
        }
    }

    fn commit(&self) -> EditorResult<()> {
        let Some(mut pending) = self.pending.borrow_mut().take() else {
            return Ok(());
        };
        self.phase.set(Phase::Committing);
        let result = self
            .prepare(&mut pending)
            .and_then(|()| self.publish(pending));
        self.phase.set(Phase::Idle);
        result
    }

    /// Transforms, normalization, garbage collection, selection
    fn prepare(&self, pending: &mut PendingState) -> EditorResult<()> {
        let mut tx = Transaction::new(
            pending,
            &self.registry,
            &self.config,
            &self.listeners,
            &self.keys,
            self.composition.get(),
        );
        self.run_transforms(&mut tx)?;

        let leaves: Vec<NodeKey> = tx.dirty().leaves.iter().copied().collect();
        for key in leaves {
            tx.normalize_text_node(key)?;
        }
        let removed = tx.collect_garbage();
        tx.validate_selection();
        debug!(removed = removed.len(), "tick prepared");
        Ok(())
    }

    fn run_transforms(&self, tx: &mut Transaction<'_>) -> EditorResult<()> {
        let mut round = tx.take_recent();
        if !self.listeners.borrow().has_transforms() {
            return Ok(());
        }
        round.insert(NodeKey::ROOT);

        let mut passes = 0;
        while !round.is_empty() {
            passes += 1;
            if passes > MAX_TRANSFORM_PASSES {
                return Err(EditorError::TransformLoop(MAX_TRANSFORM_PASSES));
            }

            let mut keys: Vec<NodeKey> = round.into_iter().collect();
            keys.sort();
            // Transforms see merged text runs
            for key in &keys {
                if tx.node(*key).map_or(false, |n| n.is_text()) {
                    tx.normalize_text_node(*key)?;
                }
            }
            for key in keys {
                let Some(node) = tx.node(key) else {
                    continue;
                };
                let transforms = self.listeners.borrow().transforms_for(node.node_type());
                for transform in transforms {
                    if !tx.contains(key) || !tx.is_attached(key) {
                        break;
                    }
                    transform(key, tx)?;
                }
            }
            round = tx.take_recent();
        }
        debug!(passes, "node transforms settled");
        Ok(())
    }

    /// Freeze, reconcile and notify
    fn publish(&self, pending: PendingState) -> EditorResult<()> {
        let prev = self.state.borrow().clone();
        if !pending.differs_from(&prev) {
            debug!("tick changed nothing");
            return Ok(());
        }

        let PendingState {
            nodes,
            selection,
            dirty,
            tags,
        } = pending;
        let next = EditorState {
            nodes: Arc::new(nodes),
            selection,
            version: prev.version() + 1,
            registry: self.registry.clone(),
        };

        if let Some(reconciler) = self.reconciler.borrow_mut().as_mut() {
            match reconciler.reconcile(&prev, &next, &dirty, &self.config) {
                Ok(report) => {
                    if self.composition.get().is_none() {
                        reconciler.sync_selection(&next);
                    }
                    self.reconciliations.set(self.reconciliations.get() + 1);
                    debug!(
                        created = report.created,
                        updated = report.updated,
                        replaced = report.replaced,
                        moved = report.moved,
                        destroyed = report.destroyed,
                        "surface reconciled"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "reconciliation failed, re-rendering last committed state");
                    if let Err(reset) = reconciler.render(&prev, &self.config) {
                        warn!(error = %reset, "surface could not be restored");
                    }
                    return Err(e);
                }
            }
        }

        info!(
            version = next.version(),
            dirty_leaves = dirty.leaves.len(),
            dirty_elements = dirty.elements.len(),
            "state committed"
        );
        *self.state.borrow_mut() = next.clone();

        self.phase.set(Phase::Notifying);
        self.notify(&prev, &next, &dirty, &tags);
        Ok(())
    }

    fn notify(&self, prev: &EditorState, next: &EditorState, dirty: &DirtySet, tags: &HashSet<String>) {
        let payload = UpdatePayload {
            prev,
            next,
            dirty_leaves: &dirty.leaves,
            dirty_elements: &dirty.elements,
            tags,
        };

        let mutation_listeners = self.listeners.borrow().mutation_listeners();
        if !mutation_listeners.is_empty() {
            let mutations = collect_mutations(prev, next, dirty);
            for (node_type, listener) in mutation_listeners {
                if let Some(changes) = mutations.get(&node_type) {
                    listener(changes, &payload);
                }
            }
        }

        let update_listeners: Vec<UpdateListener> = self
            .listeners
            .borrow()
            .update
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in update_listeners {
            listener(&payload);
        }
    }

    // ---- commands and listeners -----------------------------------------

    /// Dispatch `command` in a transaction of its own. The transaction joins
    /// the pending tick; call `flush` to commit it.
    pub fn dispatch_command<P: 'static>(&self, command: &Command<P>, payload: P) -> EditorResult<bool> {
        match self.phase.get() {
            Phase::Updating => Err(EditorError::NoActiveTransaction),
            Phase::Committing | Phase::Notifying => {
                let command = *command;
                self.deferred.borrow_mut().push_back(Box::new(move |tx| {
                    tx.dispatch_command(&command, payload).map(|_| ())
                }));
                Ok(false)
            }
            Phase::Idle => {
                let handled = Rc::new(Cell::new(false));
                let out = handled.clone();
                let command = *command;
                let result = self.run_update(Box::new(move |tx| {
                    out.set(tx.dispatch_command(&command, payload)?);
                    Ok(())
                }));
                self.handle(result)?;
                Ok(handled.get())
            }
        }
    }

    pub fn register_command<P, F>(&self, command: &Command<P>, handler: F, priority: CommandPriority) -> Unregister
    where
        P: 'static,
        F: Fn(&P, &mut Transaction<'_>) -> EditorResult<bool> + 'static,
    {
        let id = self
            .listeners
            .borrow_mut()
            .add_command(command.name(), priority, erase(handler));
        Unregister::new(&self.listeners, id)
    }

    pub fn register_update_listener<F>(&self, listener: F) -> Unregister
    where
        F: Fn(&UpdatePayload<'_>) + 'static,
    {
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id();
            listeners.update.push((id, Rc::new(listener)));
            id
        };
        Unregister::new(&self.listeners, id)
    }

    pub fn register_mutation_listener<F>(&self, node_type: &str, listener: F) -> EditorResult<Unregister>
    where
        F: Fn(&BTreeMap<NodeKey, NodeMutation>, &UpdatePayload<'_>) + 'static,
    {
        self.registry.get(node_type)?;
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id();
            listeners
                .mutation
                .entry(node_type.to_string())
                .or_default()
                .push((id, Rc::new(listener)));
            id
        };
        Ok(Unregister::new(&self.listeners, id))
    }

    /// Register a transform for `node_type`. Existing nodes of that type are
    /// marked dirty so the transform sees them on the next flush.
    pub fn register_node_transform<F>(&self, node_type: &str, transform: F) -> EditorResult<Unregister>
    where
        F: Fn(NodeKey, &mut Transaction<'_>) -> EditorResult<()> + 'static,
    {
        self.registry.get(node_type)?;
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id();
            listeners
                .transforms
                .entry(node_type.to_string())
                .or_default()
                .push((id, Rc::new(transform)));
            id
        };

        let existing: Vec<NodeKey> = self.read(|state| {
            state
                .node_map()
                .values()
                .filter(|node| node.node_type() == node_type)
                .map(|node| node.key())
                .collect()
        });
        if !existing.is_empty() {
            self.update(move |tx| {
                for key in existing {
                    if tx.contains(key) {
                        tx.get_writable(key)?;
                    }
                }
                Ok(())
            })?;
        }
        Ok(Unregister::new(&self.listeners, id))
    }

    // ---- surface --------------------------------------------------------

    /// Mount a surface and render the committed state into it
    pub fn set_surface<S: Surface>(&self, surface: S) -> EditorResult<ReconcileReport> {
        let state = self.state.borrow();
        let (mut reconciler, report) = Reconciler::mount(Box::new(surface), &state, &self.config)?;
        if self.composition.get().is_none() {
            reconciler.sync_selection(&state);
        }
        info!(created = report.created, version = state.version(), "surface mounted");
        *self.reconciler.borrow_mut() = Some(reconciler);
        Ok(report)
    }

    /// Unmount the surface and hand it back
    pub fn take_surface(&self) -> Option<Box<dyn Surface>> {
        self.reconciler.borrow_mut().take().map(Reconciler::into_surface)
    }

    pub fn has_surface(&self) -> bool {
        self.reconciler.borrow().is_some()
    }

    pub fn with_surface<S: Surface, R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let reconciler = self.reconciler.borrow();
        let surface = reconciler.as_ref()?.surface().as_any().downcast_ref::<S>()?;
        Some(f(surface))
    }

    pub fn with_surface_mut<S: Surface, R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut reconciler = self.reconciler.borrow_mut();
        let surface = reconciler
            .as_mut()?
            .surface_mut()
            .as_any_mut()
            .downcast_mut::<S>()?;
        Some(f(surface))
    }

    /// Surface element rendering `key`
    pub fn surface_node(&self, key: NodeKey) -> Option<DomId> {
        self.reconciler.borrow().as_ref()?.dom_for(key)
    }

    /// Closest node rendered at or above a surface node
    pub fn nearest_node_from_dom(&self, dom: DomId) -> Option<NodeKey> {
        self.reconciler.borrow().as_ref()?.nearest_key(dom)
    }

    /// Take the surface's selection into the model and dispatch
    /// `SELECTION_CHANGE_COMMAND`
    pub fn select_from_surface(&self) -> EditorResult<()> {
        let range = {
            let reconciler = self.reconciler.borrow();
            let Some(reconciler) = reconciler.as_ref() else {
                return Ok(());
            };
            let state = self.state.borrow();
            reconciler.surface().selection().and_then(|dom| {
                let anchor = reconciler.resolve_dom_point(&state, dom.anchor)?;
                let focus = reconciler.resolve_dom_point(&state, dom.focus)?;
                Some(RangeSelection::new(anchor, focus))
            })
        };

        self.update(move |tx| {
            match range {
                Some(range) if range.is_collapsed() && range.anchor.kind == PointKind::Text => {
                    tx.set_caret(range.anchor)
                }
                Some(range) => tx.set_selection(Some(Selection::Range(range))),
                None => tx.set_selection(None),
            }
            tx.dispatch_command(&SELECTION_CHANGE_COMMAND, ())?;
            Ok(())
        })
    }

    /// Start or end an IME composition on a text node. Composed text is
    /// neither merged nor removed while empty, and the surface selection is
    /// left alone.
    pub fn set_composition_key(&self, key: Option<NodeKey>) -> EditorResult<()> {
        let previous = self.composition.replace(key);
        match previous {
            Some(ended) if key != Some(ended) => self.update(move |tx| {
                // Normalize the composed node now that it is settled
                if tx.contains(ended) && tx.get(ended)?.is_text() {
                    tx.get_writable(ended)?;
                }
                Ok(())
            }),
            _ => Ok(()),
        }
    }

    pub fn composition_key(&self) -> Option<NodeKey> {
        self.composition.get()
    }

    // ---- states ---------------------------------------------------------

    /// Build a state from its JSON form without committing it
    pub fn parse_editor_state(&self, json: &str) -> EditorResult<EditorState> {
        let serialized: SerializedEditorState = serde_json::from_str(json)?;
        self.state_from_serialized(&serialized)
    }

    pub fn state_from_serialized(&self, serialized: &SerializedEditorState) -> EditorResult<EditorState> {
        let empty = EditorState::empty(self.registry.clone());
        let mut pending = PendingState::from_state(&empty);
        {
            let mut tx = Transaction::new(
                &mut pending,
                &self.registry,
                &self.config,
                &self.listeners,
                &self.keys,
                None,
            );
            serialize::import_state(&mut tx, serialized)?;
        }
        let state = EditorState {
            nodes: Arc::new(pending.nodes),
            selection: None,
            version: self.state.borrow().version(),
            registry: self.registry.clone(),
        };
        state.check_integrity()?;
        Ok(state)
    }

    /// Make `state` the content of the next tick
    pub fn set_editor_state(&self, state: EditorState) -> EditorResult<()> {
        if let Some(max) = state.node_map().keys().max() {
            self.keys.reserve(*max);
        }
        self.update(move |tx| tx.restore_state(&state))
    }

    /// Decorator payloads of the committed state, by key
    pub fn decorators(&self) -> BTreeMap<NodeKey, Value> {
        let state = self.state.borrow();
        state
            .node_map()
            .values()
            .filter(|node| node.is_decorator())
            .filter_map(|node| {
                self.registry
                    .behavior_for(node)
                    .decorate(node, &self.config)
                    .map(|payload| (node.key(), payload))
            })
            .collect()
    }
}

/// Per node type: what happened to each dirty node of that type
fn collect_mutations(
    prev: &EditorState,
    next: &EditorState,
    dirty: &DirtySet,
) -> HashMap<String, BTreeMap<NodeKey, NodeMutation>> {
    let mut out: HashMap<String, BTreeMap<NodeKey, NodeMutation>> = HashMap::new();
    for key in dirty.keys() {
        let (node_type, mutation) = match (prev.node(key), next.node(key)) {
            (None, Some(node)) => (node.node_type(), NodeMutation::Created),
            (Some(node), None) => (node.node_type(), NodeMutation::Destroyed),
            (Some(_), Some(node)) if !prev.shares_node(next, key) => (node.node_type(), NodeMutation::Updated),
            _ => continue,
        };
        out.entry(node_type.to_string()).or_default().insert(key, mutation);
    }
    out
}

/// Collects node types, replacements and the error callback for an [`Editor`]
#[derive(Default)]
pub struct EditorBuilder {
    config: EditorConfig,
    behaviors: Vec<Arc<dyn NodeBehavior>>,
    replacements: Vec<(String, String)>,
    on_error: Option<ErrorHandler>,
}

impl EditorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EditorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node<B: NodeBehavior>(mut self, behavior: B) -> Self {
        self.behaviors.push(Arc::new(behavior));
        self
    }

    pub fn nodes(mut self, behaviors: impl IntoIterator<Item = Arc<dyn NodeBehavior>>) -> Self {
        self.behaviors.extend(behaviors);
        self
    }

    /// Create `to` nodes wherever `from` nodes are requested
    pub fn replace_node(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.replacements.push((from.into(), to.into()));
        self
    }

    /// Report errors here instead of returning them from `update`/`flush`
    pub fn on_error(mut self, handler: impl Fn(&EditorError) + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> EditorResult<Editor> {
        let mut registry = NodeRegistry::new();
        for behavior in self.behaviors {
            registry.register_arc(behavior)?;
        }
        for (from, to) in &self.replacements {
            registry.register_replacement(from, to)?;
        }
        debug!(
            namespace = %self.config.namespace,
            types = registry.types().count(),
            "editor built"
        );
        Ok(Editor::from_parts(self.config, registry, self.on_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::INSERT_PARAGRAPH_COMMAND;
    use crate::dom::VirtualSurface;

    fn editor_with_text(text: &'static str) -> Editor {
        let editor = Editor::new(EditorConfig::default());
        editor
            .update_discrete(move |tx| {
                let paragraph = tx.create_paragraph()?;
                let text = tx.create_text(text)?;
                tx.append(paragraph, text)?;
                tx.append(NodeKey::ROOT, paragraph)?;
                Ok(())
            })
            .unwrap();
        editor
    }

    #[test]
    fn test_update_is_pending_until_flush() {
        let editor = Editor::new(EditorConfig::default());
        editor
            .update(|tx| {
                let paragraph = tx.create_paragraph()?;
                tx.append(NodeKey::ROOT, paragraph)
            })
            .unwrap();
        assert!(editor.has_pending_updates());
        assert_eq!(editor.get_editor_state().version(), 0);

        editor.flush().unwrap();
        assert!(!editor.has_pending_updates());
        assert_eq!(editor.get_editor_state().version(), 1);
    }

    #[test]
    fn test_failed_update_discards_tick() {
        let editor = editor_with_text("hello");
        let before = editor.get_editor_state();

        let result = editor.update(|tx| {
            let text = tx.create_text("x")?;
            tx.append(NodeKey::ROOT, text)
        });
        assert!(matches!(result, Err(EditorError::InvalidMove(_))));
        assert!(!editor.has_pending_updates());
        editor.flush().unwrap();
        assert_eq!(editor.get_editor_state(), before);
    }

    #[test]
    fn test_on_error_receives_errors() {
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let editor = Editor::builder()
            .on_error(move |_| counter.set(counter.get() + 1))
            .build()
            .unwrap();

        editor
            .update(|tx| tx.remove(NodeKey(99)))
            .unwrap();
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_no_op_tick_keeps_state() {
        let editor = editor_with_text("hello");
        let before = editor.get_editor_state();
        editor
            .update_discrete(|tx| {
                let text = tx.first_descendant(NodeKey::ROOT)?;
                tx.set_text(text, "hello")
            })
            .unwrap();
        assert_eq!(editor.get_editor_state().version(), before.version());
    }

    #[test]
    fn test_dispatch_inside_update_fails() {
        let editor = Rc::new(Editor::new(EditorConfig::default()));
        let inner = Rc::downgrade(&editor);
        let outcome = Rc::new(RefCell::new(None));
        let seen = outcome.clone();
        editor
            .update(move |_tx| {
                if let Some(editor) = inner.upgrade() {
                    *seen.borrow_mut() = Some(editor.dispatch_command(&INSERT_PARAGRAPH_COMMAND, ()));
                }
                Ok(())
            })
            .unwrap();
        let outcome = outcome.borrow_mut().take().unwrap();
        assert!(matches!(outcome, Err(EditorError::NoActiveTransaction)));
    }

    #[test]
    fn test_surface_mount_renders_state() {
        let editor = editor_with_text("hello");
        let report = editor.set_surface(VirtualSurface::new()).unwrap();
        assert_eq!(report.created, 2);
        let html = editor.with_surface(|s: &VirtualSurface| s.to_html()).unwrap();
        assert!(html.contains("hello"));
    }

    #[test]
    fn test_decorators_map() {
        struct Widget;
        impl NodeBehavior for Widget {
            fn node_type(&self) -> &'static str {
                "widget"
            }
            fn base(&self) -> crate::node::NodeBase {
                crate::node::NodeBase::Decorator
            }
        }

        let editor = Editor::builder().node(Widget).build().unwrap();
        editor
            .update_discrete(|tx| {
                let widget = tx.create_decorator("widget", serde_json::json!({ "id": 7 }))?;
                tx.append(NodeKey::ROOT, widget)
            })
            .unwrap();
        let decorators = editor.decorators();
        assert_eq!(decorators.len(), 1);
        assert_eq!(decorators.values().next(), Some(&serde_json::json!({ "id": 7 })));
    }
}
