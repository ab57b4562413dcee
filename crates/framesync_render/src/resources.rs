//! # Resource Tables
//!
//! Per-kind tables that resource handlers fill. Each resource is a
//! `TripleBuffer<T>` keyed by its Guid, stored in a `DeferredMap`:
//!
//! ```text
//!   create_or_update(new guid)   ──> queued add of a fresh triple buffer
//!   create_or_update(known guid) ──> write into the existing triple buffer
//!   remove(guid)                 ──> queued remove
//! ```
//!
//! Nothing becomes visible to the consumer until the pipeline commits the
//! frame and the consumer activates it. The payload type is chosen by the
//! handler; a handler with several resource kinds uses an enum.

use framesync_core::{DeferredMap, FrameTracker, Guid, TripleBuffer};

use crate::error::{RenderError, RenderResult};

/// Existence check the binding resolver runs in checked mode.
pub trait ResourceLookup {
    /// Returns true if `guid` names a live (or pending) resource.
    fn contains_resource(&self, guid: Guid) -> bool;
}

/// Resources of one kind, keyed by Guid.
pub struct ResourceTable<T> {
    tracker: FrameTracker,
    resources: DeferredMap<Guid, TripleBuffer<T>>,
}

impl<T> ResourceTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty table that commits with `tracker`.
    #[must_use]
    pub fn new(tracker: &FrameTracker) -> Self {
        Self {
            tracker: tracker.clone(),
            resources: DeferredMap::tracked(tracker),
        }
    }

    /// Creates `guid` or stores a new value for it.
    ///
    /// A resource created this frame is written in place, so several updates
    /// inside one frame never queue more than one add.
    pub fn create_or_update(&self, guid: Guid, value: T) {
        match self.resources.get_latest(&guid) {
            Some(cell) => cell.write(value),
            None => self
                .resources
                .add(guid, TripleBuffer::tracked(&self.tracker, value)),
        }
    }

    /// Queues removal of `guid`.
    pub fn remove(&self, guid: Guid) {
        self.resources.remove(guid);
    }

    /// Returns the cell for `guid`, including resources created this frame.
    ///
    /// # Errors
    ///
    /// `RenderError::ResourceNotFound` if `guid` was never created.
    pub fn cell(&self, guid: Guid) -> RenderResult<TripleBuffer<T>> {
        self.resources
            .get(&guid)
            .map_err(|_| RenderError::ResourceNotFound(guid))
    }

    /// Clones the active value of `guid`.
    ///
    /// # Errors
    ///
    /// `RenderError::ResourceNotFound` if `guid` was never created.
    pub fn read(&self, guid: Guid) -> RenderResult<T> {
        Ok(self.cell(guid)?.active_value())
    }

    /// Returns true if `guid` exists once pending changes are applied.
    #[must_use]
    pub fn contains(&self, guid: Guid) -> bool {
        self.resources.exists(&guid)
    }

    /// Number of committed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len_committed()
    }

    /// Returns true if no resource is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Committed Guids.
    #[must_use]
    pub fn guids(&self) -> Vec<Guid> {
        self.resources.keys()
    }
}

impl<T> ResourceLookup for ResourceTable<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn contains_resource(&self, guid: Guid) -> bool {
        self.contains(guid)
    }
}

impl<T> std::fmt::Debug for ResourceTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTable")
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Mesh {
        Vertices(u32),
        Indexed { vertices: u32, indices: u32 },
    }

    fn frame(tracker: &FrameTracker) {
        let touched = tracker.commit_touched();
        tracker.activate(touched);
    }

    #[test]
    fn test_create_is_visible_after_frame() {
        let tracker = FrameTracker::new();
        let table = ResourceTable::new(&tracker);
        let cube = Guid::new("res_test_cube");

        table.create_or_update(cube, Mesh::Vertices(36));
        assert!(table.contains(cube));
        assert_eq!(table.len(), 0);

        frame(&tracker);
        assert_eq!(table.len(), 1);
        assert_eq!(table.read(cube).unwrap(), Mesh::Vertices(36));
    }

    #[test]
    fn test_update_after_commit_writes_existing_cell() {
        let tracker = FrameTracker::new();
        let table = ResourceTable::new(&tracker);
        let cube = Guid::new("res_test_update");

        table.create_or_update(cube, Mesh::Vertices(36));
        frame(&tracker);
        let before = table.cell(cube).unwrap();

        table.create_or_update(
            cube,
            Mesh::Indexed {
                vertices: 24,
                indices: 36,
            },
        );
        // Old value stays active until the next frame.
        assert_eq!(table.read(cube).unwrap(), Mesh::Vertices(36));

        frame(&tracker);
        let after = table.cell(cube).unwrap();
        assert!(before.ptr_eq(&after));
        assert_eq!(
            table.read(cube).unwrap(),
            Mesh::Indexed {
                vertices: 24,
                indices: 36
            }
        );
    }

    #[test]
    fn test_double_create_in_one_frame_queues_one_add() {
        let tracker = FrameTracker::new();
        let table = ResourceTable::new(&tracker);
        let cube = Guid::new("res_test_double");

        table.create_or_update(cube, Mesh::Vertices(1));
        table.create_or_update(cube, Mesh::Vertices(2));
        frame(&tracker);

        // Second write went into the cell queued by the first call.
        assert_eq!(table.len(), 1);
        assert_eq!(table.read(cube).unwrap(), Mesh::Vertices(2));
    }

    #[test]
    fn test_remove_and_missing() {
        let tracker = FrameTracker::new();
        let table = ResourceTable::new(&tracker);
        let cube = Guid::new("res_test_remove");

        table.create_or_update(cube, Mesh::Vertices(3));
        frame(&tracker);
        table.remove(cube);
        assert!(!table.contains_resource(cube));

        frame(&tracker);
        assert!(table.is_empty());
        assert_eq!(table.read(cube), Err(RenderError::ResourceNotFound(cube)));
    }
}
