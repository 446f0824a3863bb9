//! # Folio Core
//!
//! Document model, transactional update engine and reconciler of the Folio
//! rich-text editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Editor: update(f) / flush() / commands      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Transaction: copy-on-write working table    │
//! │  - tree edits, text edits, selection        │
//! │  - dirty tracking for the reconciler        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ EditorState: frozen snapshot (Arc nodes)    │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ Reconciler: keyed diff onto a Surface       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use folio_core::{Editor, EditorConfig, NodeKey, VirtualSurface};
//!
//! let editor = Editor::new(EditorConfig::default());
//! editor.set_surface(VirtualSurface::new())?;
//!
//! editor.update_discrete(|tx| {
//!     let paragraph = tx.create_paragraph()?;
//!     let text = tx.create_text("Hello")?;
//!     tx.append(paragraph, text)?;
//!     tx.append(NodeKey::ROOT, paragraph)
//! })?;
//! ```

pub mod commands;
pub mod config;
pub mod dom;
pub mod editing;
pub mod editor;
pub mod editor_state;
pub mod errors;
pub mod html;
pub mod key;
pub mod listeners;
pub mod node;
pub mod reconciler;
pub mod registry;
pub mod selection;
pub mod serialize;
pub mod transaction;
pub mod tree;

pub use commands::{Command, CommandHandler, CommandPriority, PointerEvent};
pub use config::EditorConfig;
pub use dom::{DomElement, DomId, DomPoint, DomSelection, Surface, SurfaceStats, VirtualSurface};
pub use editor::{Editor, EditorBuilder};
pub use editor_state::EditorState;
pub use errors::{EditorError, EditorResult};
pub use html::{ExternalElement, ExternalNode};
pub use key::NodeKey;
pub use listeners::{NodeMutation, Unregister, UpdatePayload};
pub use node::{
    Direction, ElementData, ElementFormat, Node, NodeBase, NodeInit, NodeKind, TextData, TextFormat, TextMode,
};
pub use reconciler::ReconcileReport;
pub use registry::{ConversionOutput, DomConversion, NodeBehavior, NodeRegistry};
pub use selection::{NodeSelection, Point, PointKind, RangeSelection, Selection};
pub use serialize::{SerializedEditorState, SerializedNode};
pub use transaction::{DirtySet, Transaction};
pub use tree::TreeView;
