//! # Resource Binding
//!
//! Bind names are resolved to resources through one of three scopes:
//!
//! ```text
//!   GLOBAL  name ───────────────────────────────────────────> resource
//!   GROUP   name ──> groups[current_group][name].active   ──> resource
//!   ENTITY  name ──> entities[current_entity][name].active ──> resource
//! ```
//!
//! Each binding is a `TripleBuffer<Guid>`. Rebinding writes a new Guid into
//! the existing buffer, so readers on the frame in flight keep seeing the
//! previous binding until the consumer activates the next frame.

use std::fmt;

use framesync_core::{FrameTracker, Guid, LayeredDeferredMap, TripleBuffer};

use crate::config::ValidationMode;
use crate::error::{RenderError, RenderResult};
use crate::resources::ResourceLookup;

/// How a bind name is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Association {
    /// The name already is the resource.
    Global,
    /// Looked up in the current group's bindings.
    Group,
    /// Looked up in the current entity's bindings.
    Entity,
}

/// Which binding table a scope lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Group-level bindings, shared by every entity in the group.
    Group,
    /// Per-entity bindings.
    Entity,
}

/// Identifier of an entity or a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl From<u32> for ScopeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// scope → bind name → bound resource.
pub type BindingTable = LayeredDeferredMap<ScopeId, Guid, TripleBuffer<Guid>>;

/// Entity and group binding tables.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone, Debug)]
pub struct BindingTables {
    tracker: FrameTracker,
    entities: BindingTable,
    groups: BindingTable,
}

impl BindingTables {
    /// Creates empty tables that commit with `tracker`.
    #[must_use]
    pub fn new(tracker: &FrameTracker) -> Self {
        Self {
            tracker: tracker.clone(),
            entities: BindingTable::tracked(tracker),
            groups: BindingTable::tracked(tracker),
        }
    }

    /// The table holding `kind` scopes.
    #[must_use]
    pub fn table(&self, kind: ScopeKind) -> &BindingTable {
        match kind {
            ScopeKind::Group => &self.groups,
            ScopeKind::Entity => &self.entities,
        }
    }

    /// Queues creation of an empty scope.
    pub fn add_scope(&self, kind: ScopeKind, scope: ScopeId) {
        self.table(kind).add_outer(scope);
    }

    /// Queues removal of a scope and every binding in it.
    pub fn remove_scope(&self, kind: ScopeKind, scope: ScopeId) {
        self.table(kind).remove_outer(scope);
    }

    /// Binds `name` to `resource` inside `scope`.
    ///
    /// An existing binding is rebound by writing into its triple buffer. A
    /// new binding is queued and appears at the next frame boundary; the
    /// scope is created if needed.
    pub fn bind(&self, kind: ScopeKind, scope: ScopeId, name: Guid, resource: Guid) {
        let table = self.table(kind);
        match table.get_latest(&scope, &name) {
            Some(cell) => cell.write(resource),
            None => table.add_inner(scope, name, TripleBuffer::tracked(&self.tracker, resource)),
        }
        tracing::trace!(?kind, %scope, %name, %resource, "bind");
    }

    /// Queues removal of one binding.
    pub fn unbind(&self, kind: ScopeKind, scope: ScopeId, name: Guid) {
        self.table(kind).remove_inner(scope, name);
    }

    /// Returns true if `name` is bound in `scope` once pending changes apply.
    #[must_use]
    pub fn is_bound(&self, kind: ScopeKind, scope: ScopeId, name: Guid) -> bool {
        self.table(kind).exists(&scope, &name)
    }

    /// Returns the binding cell, including bindings queued this frame.
    ///
    /// # Errors
    ///
    /// `RenderError::BindingNotFound` if there is no such binding.
    pub fn binding(
        &self,
        kind: ScopeKind,
        scope: ScopeId,
        name: Guid,
    ) -> RenderResult<TripleBuffer<Guid>> {
        self.table(kind)
            .get(&scope, &name)
            .map_err(|_| RenderError::BindingNotFound {
                association: kind.into(),
                scope: Some(scope),
                name,
            })
    }
}

impl From<ScopeKind> for Association {
    fn from(kind: ScopeKind) -> Self {
        match kind {
            ScopeKind::Group => Self::Group,
            ScopeKind::Entity => Self::Entity,
        }
    }
}

/// Resolves bind names on the command-recording path.
///
/// ## Usage
///
/// ```rust,ignore
/// let resolver = BindingResolver::new(&bindings, ValidationMode::Checked);
/// let vb = resolver.resolve_checked(
///     Association::Entity,
///     Guid::new("VB0"),
///     Some(ScopeId(7)),
///     None,
///     &vertex_buffers,
/// )?;
/// ```
#[derive(Clone, Copy, Debug)]
pub struct BindingResolver<'a> {
    tables: &'a BindingTables,
    mode: ValidationMode,
}

impl<'a> BindingResolver<'a> {
    /// Creates a resolver over `tables`.
    #[must_use]
    pub fn new(tables: &'a BindingTables, mode: ValidationMode) -> Self {
        Self { tables, mode }
    }

    /// The checking level.
    #[must_use]
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Resolves `name` to the resource bound in the active frame.
    ///
    /// `Global` returns `name` itself. `Group` and `Entity` read the active
    /// slot of the binding in the supplied scope.
    ///
    /// # Errors
    ///
    /// `RenderError::BindingNotFound` if the scope context is missing, or
    /// the scope or name has no binding.
    pub fn resolve(
        &self,
        association: Association,
        name: Guid,
        entity: Option<ScopeId>,
        group: Option<ScopeId>,
    ) -> RenderResult<Guid> {
        let (kind, scope) = match association {
            Association::Global => return Ok(name),
            Association::Group => (ScopeKind::Group, group),
            Association::Entity => (ScopeKind::Entity, entity),
        };

        let not_found = move || RenderError::BindingNotFound {
            association,
            scope,
            name,
        };

        let scope = scope.ok_or_else(not_found)?;
        self.tables
            .table(kind)
            .get(&scope, &name)
            .map(|cell| *cell.read_active())
            .map_err(|_| not_found())
    }

    /// Resolves like `resolve`, then checks the resource exists.
    ///
    /// The existence check is skipped in `ValidationMode::Unchecked`.
    ///
    /// # Errors
    ///
    /// `RenderError::BindingNotFound` as for `resolve`;
    /// `RenderError::ResourceNotFound` if `resources` has no such Guid.
    pub fn resolve_checked(
        &self,
        association: Association,
        name: Guid,
        entity: Option<ScopeId>,
        group: Option<ScopeId>,
        resources: &dyn ResourceLookup,
    ) -> RenderResult<Guid> {
        let resource = self.resolve(association, name, entity, group)?;
        if self.mode == ValidationMode::Checked && !resources.contains_resource(resource) {
            return Err(RenderError::ResourceNotFound(resource));
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceTable;

    fn frame(tracker: &FrameTracker) {
        let touched = tracker.commit_touched();
        tracker.activate(touched);
    }

    #[test]
    fn test_global_returns_name() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let resolver = BindingResolver::new(&tables, ValidationMode::Checked);
        let name = Guid::new("bind_global_sky");

        assert_eq!(resolver.resolve(Association::Global, name, None, None), Ok(name));
    }

    #[test]
    fn test_entity_binding_resolves_after_frame() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let vb0 = Guid::new("bind_entity_VB0");
        let cube = Guid::new("bind_entity_cube_vb");

        tables.bind(ScopeKind::Entity, ScopeId(7), vb0, cube);
        assert!(tables.is_bound(ScopeKind::Entity, ScopeId(7), vb0));
        frame(&tracker);

        let resolver = BindingResolver::new(&tables, ValidationMode::Checked);
        let resolved = resolver.resolve(Association::Entity, vb0, Some(ScopeId(7)), None);
        assert_eq!(resolved, Ok(cube));
    }

    #[test]
    fn test_rebind_keeps_previous_until_activated() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let albedo = Guid::new("bind_group_albedo");
        let brick = Guid::new("bind_group_brick");
        let stone = Guid::new("bind_group_stone");

        tables.bind(ScopeKind::Group, ScopeId(2), albedo, brick);
        frame(&tracker);
        let cell = tables.binding(ScopeKind::Group, ScopeId(2), albedo).unwrap();

        tables.bind(ScopeKind::Group, ScopeId(2), albedo, stone);
        let resolver = BindingResolver::new(&tables, ValidationMode::Checked);
        assert_eq!(
            resolver.resolve(Association::Group, albedo, None, Some(ScopeId(2))),
            Ok(brick)
        );

        let touched = tracker.commit_touched();
        assert_eq!(
            resolver.resolve(Association::Group, albedo, None, Some(ScopeId(2))),
            Ok(brick)
        );
        tracker.activate(touched);
        assert_eq!(
            resolver.resolve(Association::Group, albedo, None, Some(ScopeId(2))),
            Ok(stone)
        );

        // Same table entry, new value.
        let after = tables.binding(ScopeKind::Group, ScopeId(2), albedo).unwrap();
        assert!(cell.ptr_eq(&after));
    }

    #[test]
    fn test_missing_scope_context_is_binding_not_found() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let resolver = BindingResolver::new(&tables, ValidationMode::Unchecked);
        let name = Guid::new("bind_missing_ctx");

        let err = resolver
            .resolve(Association::Entity, name, None, Some(ScopeId(1)))
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::BindingNotFound {
                association: Association::Entity,
                scope: None,
                name,
            }
        );
    }

    #[test]
    fn test_unknown_name_in_known_scope() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        tables.add_scope(ScopeKind::Entity, ScopeId(3));
        frame(&tracker);

        let resolver = BindingResolver::new(&tables, ValidationMode::Unchecked);
        let name = Guid::new("bind_unknown_name");
        let err = resolver
            .resolve(Association::Entity, name, Some(ScopeId(3)), None)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::BindingNotFound {
                scope: Some(ScopeId(3)),
                ..
            }
        ));
    }

    #[test]
    fn test_unbind_and_remove_scope() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let a = Guid::new("bind_unbind_a");
        let b = Guid::new("bind_unbind_b");
        let res = Guid::new("bind_unbind_res");

        tables.bind(ScopeKind::Entity, ScopeId(4), a, res);
        tables.bind(ScopeKind::Entity, ScopeId(4), b, res);
        frame(&tracker);

        tables.unbind(ScopeKind::Entity, ScopeId(4), a);
        frame(&tracker);
        assert!(!tables.is_bound(ScopeKind::Entity, ScopeId(4), a));
        assert!(tables.is_bound(ScopeKind::Entity, ScopeId(4), b));

        tables.remove_scope(ScopeKind::Entity, ScopeId(4));
        frame(&tracker);
        assert!(tables.binding(ScopeKind::Entity, ScopeId(4), b).is_err());
    }

    #[test]
    fn test_rebind_after_pending_unbind_creates_new_binding() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let name = Guid::new("bind_rebind_name");
        let first = Guid::new("bind_rebind_first");
        let second = Guid::new("bind_rebind_second");

        tables.bind(ScopeKind::Entity, ScopeId(5), name, first);
        frame(&tracker);
        let old = tables.binding(ScopeKind::Entity, ScopeId(5), name).unwrap();

        tables.unbind(ScopeKind::Entity, ScopeId(5), name);
        tables.bind(ScopeKind::Entity, ScopeId(5), name, second);
        frame(&tracker);

        let new = tables.binding(ScopeKind::Entity, ScopeId(5), name).unwrap();
        assert!(!old.ptr_eq(&new));
        assert_eq!(*new.read_active(), second);
        assert_eq!(*old.read_active(), first);
    }

    #[test]
    fn test_checked_mode_reports_missing_resource() {
        let tracker = FrameTracker::new();
        let tables = BindingTables::new(&tracker);
        let meshes: ResourceTable<u32> = ResourceTable::new(&tracker);
        let vb = Guid::new("bind_checked_vb");
        let cube = Guid::new("bind_checked_cube");

        tables.bind(ScopeKind::Entity, ScopeId(9), vb, cube);
        frame(&tracker);

        let checked = BindingResolver::new(&tables, ValidationMode::Checked);
        let unchecked = BindingResolver::new(&tables, ValidationMode::Unchecked);
        let ctx = Some(ScopeId(9));

        assert_eq!(
            checked.resolve_checked(Association::Entity, vb, ctx, None, &meshes),
            Err(RenderError::ResourceNotFound(cube))
        );
        assert_eq!(
            unchecked.resolve_checked(Association::Entity, vb, ctx, None, &meshes),
            Ok(cube)
        );

        meshes.create_or_update(cube, 36);
        frame(&tracker);
        assert_eq!(
            checked.resolve_checked(Association::Entity, vb, ctx, None, &meshes),
            Ok(cube)
        );
    }
}
