//! Content references and the Content Store boundary
//!
//! A content package is an addressable unit of scene content. The composition
//! core never looks inside one; it only knows the package's path and asks the
//! [`ContentStore`] to resolve, open, save or describe it.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::bounds::Bounds;

/// Path naming a content package
///
/// Leading and trailing whitespace is stripped on construction. The empty
/// path is valid to hold but never resolves.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentPath(Box<str>);

impl ContentPath {
    /// Create a path
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(path.as_ref().trim().into())
    }

    /// The empty path
    pub fn empty() -> Self {
        Self("".into())
    }

    /// Path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the path is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentPath({:?})", self.0)
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContentPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Lazily-resolved reference to a content package
///
/// Equality is path equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef {
    path: ContentPath,
}

impl ContentRef {
    /// Create a reference to the package at `path`
    pub fn new(path: impl Into<ContentPath>) -> Self {
        Self { path: path.into() }
    }

    /// The referenced path
    pub fn path(&self) -> &ContentPath {
        &self.path
    }

    /// A reference with an empty path can never resolve
    pub fn is_valid(&self) -> bool {
        !self.path.is_empty()
    }

    /// Resolve through the store
    ///
    /// Fails softly: returns `None` for an empty path, an unknown package, or
    /// a load that has not finished yet.
    pub fn resolve(&self, store: &mut dyn ContentStore) -> Option<ContentHandle> {
        if !self.is_valid() {
            return None;
        }
        match store.resolve(&self.path) {
            Resolution::Ready(handle) => Some(handle),
            Resolution::Pending | Resolution::Missing => None,
        }
    }
}

impl fmt::Debug for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentRef").field(&self.path.as_str()).finish()
    }
}

impl From<&str> for ContentRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Read-only handle to resolved content, issued by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHandle(pub u64);

/// Writable checkout of a package's content, issued by the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WritableHandle(pub u64);

/// Outcome of asking the store for a package
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Content is available now
    Ready(ContentHandle),
    /// Content is still loading; ask again next frame
    Pending,
    /// No such package
    Missing,
}

/// Outcome of a save request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Every in-scope dirty package was written
    Saved,
    /// The user or environment declined to save
    Declined,
    /// Writing failed
    Failed(String),
}

impl SaveOutcome {
    /// Check if the save went through
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

/// The persistence/asset system that loads and saves packages by path
pub trait ContentStore {
    /// Resolve a package for streaming
    fn resolve(&mut self, path: &ContentPath) -> Resolution;

    /// Check if a package exists at all
    fn exists(&self, path: &ContentPath) -> bool;

    /// Content paths referenced by nodes stored inside a package
    fn nested_content(&self, path: &ContentPath) -> Vec<ContentPath>;

    /// Open a package's content for writing
    fn open_for_edit(&mut self, path: &ContentPath) -> Option<WritableHandle>;

    /// Release a writable checkout without saving
    fn close_edit(&mut self, world: WritableHandle);

    /// Dirty packages reachable from a writable checkout
    fn dirty_packages(&self, world: WritableHandle) -> Vec<ContentPath>;

    /// Check if a writable checkout has unsaved changes
    fn is_dirty(&self, world: WritableHandle) -> bool {
        !self.dirty_packages(world).is_empty()
    }

    /// Check if any of a writable checkout's packages were saved since it
    /// was opened
    fn saved_since_open(&self, world: WritableHandle) -> bool;

    /// Run the save flow for `worlds`, restricted to packages accepted by `scope`
    fn save(&mut self, worlds: &[WritableHandle], scope: &dyn Fn(&ContentPath) -> bool) -> SaveOutcome;

    /// Bounds recorded alongside the package at its last save
    fn bounds_metadata(&self, path: &ContentPath) -> Option<Bounds>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_trimmed() {
        let path = ContentPath::new("  /Game/Rooms/Kitchen ");
        assert_eq!(path.as_str(), "/Game/Rooms/Kitchen");
        assert_eq!(path, ContentPath::from("/Game/Rooms/Kitchen"));
    }

    #[test]
    fn test_empty_ref_is_invalid() {
        assert!(!ContentRef::new("   ").is_valid());
        assert!(ContentRef::new("/Game/A").is_valid());
    }

    /// Store knowing one ready package and one still loading
    struct TwoPackages;

    impl ContentStore for TwoPackages {
        fn resolve(&mut self, path: &ContentPath) -> Resolution {
            match path.as_str() {
                "/Game/Ready" => Resolution::Ready(ContentHandle(1)),
                "/Game/Streaming" => Resolution::Pending,
                _ => Resolution::Missing,
            }
        }

        fn exists(&self, path: &ContentPath) -> bool {
            matches!(path.as_str(), "/Game/Ready" | "/Game/Streaming")
        }

        fn nested_content(&self, _path: &ContentPath) -> Vec<ContentPath> {
            Vec::new()
        }

        fn open_for_edit(&mut self, _path: &ContentPath) -> Option<WritableHandle> {
            None
        }

        fn close_edit(&mut self, _world: WritableHandle) {}

        fn dirty_packages(&self, _world: WritableHandle) -> Vec<ContentPath> {
            Vec::new()
        }

        fn saved_since_open(&self, _world: WritableHandle) -> bool {
            false
        }

        fn save(&mut self, _worlds: &[WritableHandle], _scope: &dyn Fn(&ContentPath) -> bool) -> SaveOutcome {
            SaveOutcome::Declined
        }

        fn bounds_metadata(&self, _path: &ContentPath) -> Option<Bounds> {
            None
        }
    }

    #[test]
    fn test_resolve_fails_softly() {
        let mut store = TwoPackages;

        assert_eq!(ContentRef::from("/Game/Ready").resolve(&mut store), Some(ContentHandle(1)));
        assert_eq!(ContentRef::from("/Game/Streaming").resolve(&mut store), None);
        assert_eq!(ContentRef::from("/Game/Nowhere").resolve(&mut store), None);
        assert_eq!(ContentRef::new("").resolve(&mut store), None);
    }

    #[test]
    fn test_ref_equality_is_path_equality() {
        assert_eq!(ContentRef::from("/Game/A"), ContentRef::new(String::from(" /Game/A")));
        assert_ne!(ContentRef::from("/Game/A"), ContentRef::from("/Game/B"));
    }
}
