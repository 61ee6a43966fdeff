//! In-memory content store
//!
//! Resolution can be delayed per path to exercise asynchronous loads, and
//! the save flow follows a configurable policy. Dirty packages are tracked
//! per writable world; the save flow gathers every dirty package of every
//! open world and keeps only those the caller's scope accepts.

use std::collections::{BTreeMap, BTreeSet};

use void_foundation::{
    Bounds, ContentPath, ContentStore, Resolution, SaveOutcome, WritableHandle,
};

use crate::calls::{CallLog, SimCall};
use crate::library::SharedLibrary;

/// How the simulated save prompt answers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SavePolicy {
    #[default]
    Accept,
    Decline,
    Fail(String),
}

/// Content store backed by a [`ContentLibrary`](crate::ContentLibrary)
pub struct SimContentStore {
    library: SharedLibrary,
    calls: CallLog,
    policy: SavePolicy,
    delays: BTreeMap<ContentPath, u32>,
    dirty: BTreeMap<WritableHandle, BTreeSet<ContentPath>>,
    /// Worlds with at least one package saved since they were opened
    saved: BTreeSet<WritableHandle>,
}

impl SimContentStore {
    pub fn new(library: SharedLibrary, calls: CallLog) -> Self {
        Self {
            library,
            calls,
            policy: SavePolicy::Accept,
            delays: BTreeMap::new(),
            dirty: BTreeMap::new(),
            saved: BTreeSet::new(),
        }
    }

    pub fn set_save_policy(&mut self, policy: SavePolicy) {
        self.policy = policy;
    }

    /// Answer `Pending` for the next `polls` resolutions of `path`
    pub fn set_delay(&mut self, path: impl Into<ContentPath>, polls: u32) {
        self.delays.insert(path.into(), polls);
    }

    /// Mark `package` as modified in `world`
    pub fn mark_dirty(&mut self, world: WritableHandle, package: impl Into<ContentPath>) {
        self.dirty.entry(world).or_default().insert(package.into());
    }

    /// Modify the package being edited at `path`
    ///
    /// Returns false if nothing is editing `path`.
    pub fn touch(&mut self, path: &ContentPath) -> bool {
        self.touch_package(path, path.clone())
    }

    /// Modify `package` through the world editing `path`
    pub fn touch_package(&mut self, path: &ContentPath, package: ContentPath) -> bool {
        let Some(world) = self.library.read().world_for(path) else {
            return false;
        };
        self.mark_dirty(world, package);
        true
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.values().map(BTreeSet::len).sum()
    }
}

impl ContentStore for SimContentStore {
    fn resolve(&mut self, path: &ContentPath) -> Resolution {
        self.calls.push(SimCall::Resolve { path: path.clone() });
        if !self.library.read().contains(path) {
            return Resolution::Missing;
        }
        if let Some(remaining) = self.delays.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Resolution::Pending;
            }
        }
        match self.library.write().handle_for(path) {
            Some(handle) => Resolution::Ready(handle),
            None => Resolution::Missing,
        }
    }

    fn exists(&self, path: &ContentPath) -> bool {
        self.library.read().contains(path)
    }

    fn nested_content(&self, path: &ContentPath) -> Vec<ContentPath> {
        self.library.read().nested_content(path)
    }

    fn open_for_edit(&mut self, path: &ContentPath) -> Option<WritableHandle> {
        self.calls.push(SimCall::OpenForEdit { path: path.clone() });
        self.library.write().open_world(path)
    }

    fn close_edit(&mut self, world: WritableHandle) {
        self.dirty.remove(&world);
        self.saved.remove(&world);
        if let Some(path) = self.library.write().close_world(world) {
            self.calls.push(SimCall::CloseEdit { path });
        }
    }

    fn dirty_packages(&self, world: WritableHandle) -> Vec<ContentPath> {
        self.dirty
            .get(&world)
            .map(|packages| packages.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn saved_since_open(&self, world: WritableHandle) -> bool {
        self.saved.contains(&world)
    }

    fn save(&mut self, worlds: &[WritableHandle], scope: &dyn Fn(&ContentPath) -> bool) -> SaveOutcome {
        match &self.policy {
            SavePolicy::Accept => {}
            SavePolicy::Decline => {
                self.calls.push(SimCall::SaveDeclined);
                return SaveOutcome::Declined;
            }
            SavePolicy::Fail(reason) => {
                self.calls.push(SimCall::SaveFailed);
                return SaveOutcome::Failed(reason.clone());
            }
        }

        let candidates: BTreeSet<ContentPath> = self.dirty.values().flatten().cloned().collect();
        let packages: Vec<ContentPath> = candidates.into_iter().filter(|package| scope(package)).collect();
        log::debug!(
            "Saving {} packages for {} worlds",
            packages.len(),
            worlds.len()
        );

        for (world, dirty) in self.dirty.iter_mut() {
            if dirty.iter().any(|package| packages.contains(package)) {
                self.saved.insert(*world);
            }
            dirty.retain(|package| !packages.contains(package));
        }
        {
            let mut library = self.library.write();
            for package in &packages {
                library.mark_saved(package);
            }
        }
        self.calls.push(SimCall::Save { packages });
        SaveOutcome::Saved
    }

    fn bounds_metadata(&self, path: &ContentPath) -> Option<Bounds> {
        self.library.read().get(path).and_then(|package| package.saved_bounds)
    }
}
