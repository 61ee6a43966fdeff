//! Node identity
//!
//! Every node carries a [`StableId`] assigned once at creation. A node's
//! [`CompositeId`] folds its own stable id and those of every ancestor into an
//! order-sensitive hash, so the same content instantiated at two places in the
//! hierarchy gets two independent identities, while reloading the same
//! nesting path reproduces the same identity in any process.

use core::fmt;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::host::{HostScene, NodeId};
use crate::registry::Registry;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Globally unique, never reused node identifier
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StableId(Uuid);

impl StableId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The invalid id
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Id from raw bits
    pub const fn from_u128(bits: u128) -> Self {
        Self(Uuid::from_u128(bits))
    }

    /// Wrap an existing uuid
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Check if this id was ever assigned
    pub fn is_valid(&self) -> bool {
        !self.0.is_nil()
    }

    /// Raw bytes, in a fixed order
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for StableId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableId({})", self.0)
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a node derived from its position in the hierarchy
///
/// `chain` holds the node's own stable id followed by each ancestor's, up to
/// the root.
#[derive(Clone, Eq)]
pub struct CompositeId {
    chain: Box<[StableId]>,
    hash: u64,
}

impl CompositeId {
    /// Build from a chain ordered self-first
    pub fn from_chain(chain: Vec<StableId>) -> Self {
        debug_assert!(!chain.is_empty(), "composite id needs at least one stable id");
        let mut hash = FNV_OFFSET;
        for id in &chain {
            for byte in id.as_bytes() {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        Self {
            chain: chain.into_boxed_slice(),
            hash,
        }
    }

    /// The 64-bit hash
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Stable ids, self first
    pub fn chain(&self) -> &[StableId] {
        &self.chain
    }

    /// Number of ancestors above the node
    pub fn depth(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }
}

impl PartialEq for CompositeId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.chain == other.chain
    }
}

impl Hash for CompositeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl PartialOrd for CompositeId {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CompositeId {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.chain.cmp(&other.chain))
    }
}

impl fmt::Debug for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeId({:016x}, depth {})", self.hash, self.depth())
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.hash)
    }
}

/// Result of resolving a node's composite identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityResolution {
    /// Every ancestor is registered
    Resolved(CompositeId),
    /// An ancestor is not registered yet; retry once it is
    Deferred { waiting_on: NodeId },
}

/// Computes composite identities by walking the hosting chain
pub struct IdentityResolver;

impl IdentityResolver {
    /// Compute the composite id of a registered node
    ///
    /// Returns `None` if `node` itself is not registered or has no stable id.
    pub fn compute_composite_id(
        registry: &Registry,
        host: &dyn HostScene,
        node: NodeId,
        max_depth: usize,
    ) -> Option<IdentityResolution> {
        let record = registry.node(node)?;
        if !record.stable_id.is_valid() {
            return None;
        }

        let mut chain = vec![record.stable_id];
        let mut current = node;
        while let Some(ancestor) = host.ancestor_of(current) {
            if chain.len() > max_depth {
                log::error!(
                    "Hosting chain of node {} exceeds {} levels, deferring identity",
                    node,
                    max_depth
                );
                return Some(IdentityResolution::Deferred { waiting_on: ancestor });
            }
            match registry.node(ancestor) {
                Some(parent) if parent.stable_id.is_valid() => chain.push(parent.stable_id),
                _ => return Some(IdentityResolution::Deferred { waiting_on: ancestor }),
            }
            current = ancestor;
        }

        Some(IdentityResolution::Resolved(CompositeId::from_chain(chain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_is_invalid() {
        assert!(!StableId::nil().is_valid());
        assert!(StableId::new().is_valid());
        assert_ne!(StableId::new(), StableId::new());
    }

    #[test]
    fn test_same_chain_same_id() {
        let a = StableId::from_u128(1);
        let b = StableId::from_u128(2);

        let first = CompositeId::from_chain(vec![a, b]);
        let second = CompositeId::from_chain(vec![a, b]);
        assert_eq!(first, second);
        assert_eq!(first.hash_value(), second.hash_value());
    }

    #[test]
    fn test_order_matters() {
        let a = StableId::from_u128(1);
        let b = StableId::from_u128(2);

        let ab = CompositeId::from_chain(vec![a, b]);
        let ba = CompositeId::from_chain(vec![b, a]);
        assert_ne!(ab, ba);
        assert_ne!(ab.hash_value(), ba.hash_value());
    }

    #[test]
    fn test_hash_is_process_independent() {
        // FNV-1a over fixed bytes; pinned so identities survive across runs
        let id = CompositeId::from_chain(vec![StableId::nil()]);
        let mut expected = FNV_OFFSET;
        for _ in 0..16 {
            expected = expected.wrapping_mul(FNV_PRIME);
        }
        assert_eq!(id.hash_value(), expected);
    }

    #[test]
    fn test_depth() {
        let id = CompositeId::from_chain(vec![StableId::new(), StableId::new(), StableId::new()]);
        assert_eq!(id.depth(), 2);
    }
}
