//! termdeck core: process runtime state, pane layout and terminal output
//! rendering, free of any UI toolkit.

pub mod ansi;
pub mod config;
pub mod content;
pub mod drag;
pub mod event;
pub mod handle;
pub mod layout;
pub mod model;
pub mod port;
pub mod registry;
pub mod supervisor;
pub mod wire;
pub mod workspace;

pub use event::{EventBus, EventEnvelope, EventSubscription, ProcessEvent};
pub use handle::{ProcessKind, TerminalHandle};
pub use layout::{Pane, PaneId, PaneLayout, Side};
pub use registry::{RuntimeRecord, RuntimeRegistry};
pub use workspace::{Visibility, Workspace, WorkspaceChange};
