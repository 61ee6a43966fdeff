//! # void_foundation - Nested Scene Composition
//!
//! Lets one scene host another as a reusable, streamable unit:
//! - Composite identities derived from the hosting chain
//! - Recursive-load detection on every content assignment
//! - Batched, unload-before-load streaming once per tick
//! - Exclusive edit sessions that propagate commits to sibling instances
//! - Bounds for loaded and unloaded nodes
//!
//! ```text
//!   register_node ──► Registry ◄── IdentityResolver
//!         │              ▲
//!   set_content_ref      │
//!    (CycleGuard)        │
//!         │              │
//!         ▼              │
//!   StreamingScheduler ──┴──► HostScene / ContentStore
//!         ▲
//!         │ force reload
//!   EditSessionManager
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use void_foundation::prelude::*;
//!
//! let mut foundation = Foundation::new(FoundationConfig::default(), scene, store, NoTransactions);
//! foundation.register_node(node, NodeDesc::host(StableId::new(), Some("/Game/Kitchen".into())))?;
//!
//! // Apply queued streaming work once per frame
//! foundation.tick();
//!
//! foundation.check_out(node)?;
//! // ... edit through the store ...
//! foundation.commit(&ContentPath::new("/Game/Kitchen"), false)?;
//! ```

pub mod bounds;
pub mod config;
pub mod content;
pub mod cycle;
pub mod edit;
pub mod error;
pub mod event;
pub mod host;
pub mod identity;
pub mod registry;
pub mod streaming;
pub mod subsystem;

pub use bounds::{Bounds, BoundsAggregator, Placement};
pub use config::{FoundationConfig, WorldKind};
pub use content::{
    ContentHandle, ContentPath, ContentRef, ContentStore, Resolution, SaveOutcome, WritableHandle,
};
pub use cycle::CycleGuard;
pub use edit::{CheckOut, EditSessionManager};
pub use error::{ConfigError, FoundationError, Result};
pub use event::FoundationEvent;
pub use host::{
    Attachment, ContainerId, HostScene, NoTransactions, NodeDesc, NodeId, NodeKind, TransactionLog,
};
pub use identity::{CompositeId, IdentityResolution, IdentityResolver, StableId};
pub use registry::{DeferredResolution, EditSession, EditState, NodeRecord, PendingOps, Registry, StreamedInstance};
pub use streaming::{StreamingScheduler, TickStats};
pub use subsystem::Foundation;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::bounds::{Bounds, Placement};
    pub use crate::config::{FoundationConfig, WorldKind};
    pub use crate::content::{ContentPath, ContentRef, ContentStore};
    pub use crate::edit::CheckOut;
    pub use crate::error::{FoundationError, Result};
    pub use crate::event::FoundationEvent;
    pub use crate::host::{HostScene, NoTransactions, NodeDesc, NodeId, NodeKind, TransactionLog};
    pub use crate::identity::{CompositeId, StableId};
    pub use crate::registry::EditState;
    pub use crate::subsystem::Foundation;
}
