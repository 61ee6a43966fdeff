//! # void_foundation_sim - In-Memory Collaborators
//!
//! Host scene, content store and transaction log backed by an in-memory
//! package library, for driving [`void_foundation`] without an engine.
//! Worlds are usually described by a TOML [`Fixture`].
//!
//! ## Example
//!
//! ```ignore
//! use void_foundation_sim::prelude::*;
//!
//! let mut world = Fixture::load("fixtures/estate.toml")?.build(FoundationConfig::default())?;
//! world.foundation.block_on_loading();
//! ```

pub mod calls;
pub mod fixture;
pub mod library;
pub mod scene;
pub mod store;
pub mod transactions;

pub use calls::{CallLog, SimCall};
pub use fixture::{Fixture, FixtureError, NodeSpec, PackageSpec, SimFoundation, SimWorld};
pub use library::{stable_id_for, ContentLibrary, NodeTemplate, Package, SharedLibrary};
pub use scene::SimScene;
pub use store::{SavePolicy, SimContentStore};
pub use transactions::SimTransactionLog;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::calls::{CallLog, SimCall};
    pub use crate::fixture::{Fixture, SimFoundation, SimWorld};
    pub use crate::store::SavePolicy;
    pub use void_foundation::prelude::*;
}
