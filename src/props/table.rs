//! Copy-on-write property tables.

use std::sync::Arc;

use indexmap::set::Slice;
use indexmap::{IndexMap, IndexSet};
use tracing::trace;

use super::{Intents, PropertyType};
use crate::diagnostics::{AdditionType, DebugContext, DebugEvent, DebugNodeId};

/// Identifier of a node listed as a property value.
pub type TargetId = u32;

/// Ordered-unique values of one property.
pub type PropertyValues = IndexSet<TargetId>;

/// Property lists of one node, keyed by property type in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InducedProps {
    props: IndexMap<PropertyType, PropertyValues>,
}

// Value order is significant, so compare lists as slices.
impl PartialEq for InducedProps {
    fn eq(&self, other: &Self) -> bool {
        self.props.len() == other.props.len()
            && self.props.iter().all(|(ty, list)| {
                other
                    .props
                    .get(ty)
                    .is_some_and(|theirs| theirs.as_slice() == list.as_slice())
            })
    }
}

impl Eq for InducedProps {}

impl InducedProps {
    /// Whether `ty` is declared, possibly with no values.
    #[must_use]
    pub fn has_type(&self, ty: PropertyType) -> bool {
        self.props.contains_key(&ty)
    }

    /// Values of `ty`; empty when undeclared.
    #[must_use]
    pub fn get(&self, ty: PropertyType) -> &Slice<TargetId> {
        self.props
            .get(&ty)
            .map(IndexSet::as_slice)
            .unwrap_or_default()
    }

    /// Whether `ty` is declared and holds every element of `values`.
    #[must_use]
    pub fn has_all<'v>(
        &self,
        ty: PropertyType,
        mut values: impl Iterator<Item = &'v TargetId>,
    ) -> bool {
        self.props
            .get(&ty)
            .is_some_and(|list| values.all(|value| list.contains(value)))
    }

    /// Declared types with their values.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyType, &Slice<TargetId>)> {
        self.props.iter().map(|(ty, list)| (*ty, list.as_slice()))
    }

    /// Whether a declared type holds no values.
    #[must_use]
    pub fn has_empty_types(&self) -> bool {
        self.props.values().any(IndexSet::is_empty)
    }

    /// Number of declared types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Whether no type is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

/// The property table handle of one graph node.
///
/// Clones share the table; the first divergent write through a shared
/// handle copies it.
#[derive(Debug, Clone)]
pub struct NodeProperties<'d> {
    node: DebugNodeId,
    ctx: &'d DebugContext,
    table: Option<Arc<InducedProps>>,
}

impl<'d> NodeProperties<'d> {
    /// An empty handle for `node`.
    #[must_use]
    pub const fn new(node: DebugNodeId, ctx: &'d DebugContext) -> Self {
        Self {
            node,
            ctx,
            table: None,
        }
    }

    /// Node owning the handle.
    #[must_use]
    pub const fn node(&self) -> DebugNodeId {
        self.node
    }

    /// Whether no property type is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.as_deref().is_none_or(InducedProps::is_empty)
    }

    /// Whether another handle points at the same table.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.table
            .as_ref()
            .is_some_and(|table| Arc::strong_count(table) > 1)
    }

    /// Whether both handles point at the same table.
    #[must_use]
    pub fn shares_with(&self, other: &Self) -> bool {
        match (&self.table, &other.table) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether `ty` is declared.
    #[must_use]
    pub fn has(&self, ty: PropertyType) -> bool {
        self.table.as_deref().is_some_and(|table| table.has_type(ty))
    }

    /// Values of `ty`; empty when undeclared.
    #[must_use]
    pub fn get(&self, ty: PropertyType) -> &Slice<TargetId> {
        self.table
            .as_deref()
            .map(|table| table.get(ty))
            .unwrap_or_default()
    }

    /// Declared types with their values.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyType, &Slice<TargetId>)> {
        self.table
            .as_deref()
            .into_iter()
            .flat_map(|table| table.iter())
    }

    /// Add one value; returns whether it was new.
    pub fn add_one(&mut self, ty: PropertyType, value: TargetId, addition: AdditionType) -> bool {
        self.add_all(ty, &[value], addition)
    }

    /// Add `values` in order; returns whether any was new. Nothing is
    /// written, and a shared table stays shared, when all are present.
    pub fn add_all(&mut self, ty: PropertyType, values: &[TargetId], addition: AdditionType) -> bool {
        self.add_values(ty, values.iter(), addition)
    }

    fn add_values<'v>(
        &mut self,
        ty: PropertyType,
        values: impl Iterator<Item = &'v TargetId> + Clone,
        addition: AdditionType,
    ) -> bool {
        if values.clone().next().is_none() {
            return false;
        }
        let (node, ctx) = (self.node, self.ctx);
        let Some(table) = self.writable(|table| table.has_all(ty, values.clone())) else {
            return false;
        };
        let list = table.props.entry(ty).or_default();
        let mut added = false;
        for &value in values {
            let is_new = list.insert(value);
            added |= is_new;
            ctx.property_event(|| DebugEvent::PropertyAdd {
                node,
                property: ty,
                value,
                is_new,
                addition,
            });
        }
        added
    }

    /// Declare `ty` without values.
    pub fn add_type(&mut self, ty: PropertyType) {
        let node = self.node;
        if let Some(table) = self.writable(|table| table.has_type(ty)) {
            table.props.insert(ty, PropertyValues::new());
            trace!(%node, ?ty, "declared property");
        }
    }

    /// Replace the values of `ty`.
    pub fn set_values(&mut self, ty: PropertyType, values: PropertyValues, addition: AdditionType) {
        let (node, ctx) = (self.node, self.ctx);
        let Some(table) = self.writable(|_| false) else {
            return;
        };
        let list = table.props.entry(ty).or_default();
        *list = values;
        if ctx.properties_enabled() {
            for &value in list.iter() {
                ctx.property_event(|| DebugEvent::PropertyAdd {
                    node,
                    property: ty,
                    value,
                    is_new: true,
                    addition,
                });
            }
        }
    }

    /// Remove the values of `ty`, keeping it declared.
    pub fn clear(&mut self, ty: PropertyType) {
        let (node, ctx) = (self.node, self.ctx);
        let Some(table) = self.writable(|table| table.get(ty).is_empty()) else {
            return;
        };
        if let Some(list) = table.props.get_mut(&ty) {
            list.clear();
        }
        ctx.property_event(|| DebugEvent::PropertyClear {
            node,
            property: Some(ty),
        });
    }

    /// Drop the whole table; other handles keep their view.
    pub fn clear_all(&mut self) {
        if self.table.take().is_some() {
            self.ctx.property_event(|| DebugEvent::PropertyClear {
                node: self.node,
                property: None,
            });
        }
    }

    /// Inherit the properties of `from` whose intent is in `intents`,
    /// except those listed in `skip`. Types declared without values are
    /// never inherited.
    ///
    /// When this handle is empty and nothing is filtered out, the table is
    /// shared rather than copied.
    pub fn copy_from(
        &mut self,
        from: &NodeProperties<'_>,
        intents: Intents,
        skip: Option<&IndexSet<PropertyType>>,
    ) {
        let Some(source) = from.table.as_ref() else {
            return;
        };
        let keep = |ty: PropertyType| {
            intents.has(ty.intent()) && skip.is_none_or(|skipped| !skipped.contains(&ty))
        };
        if self.table.is_none()
            && !source.has_empty_types()
            && source.props.keys().all(|&ty| keep(ty))
        {
            self.table = Some(Arc::clone(source));
            self.log_copied(source);
            return;
        }
        for (ty, values) in source.iter() {
            if keep(ty) {
                self.add_values(ty, values.iter(), AdditionType::Copied);
            }
        }
    }

    fn log_copied(&self, source: &InducedProps) {
        if !self.ctx.properties_enabled() {
            return;
        }
        for (ty, values) in source.iter() {
            for &value in values {
                self.ctx.property_event(|| DebugEvent::PropertyAdd {
                    node: self.node,
                    property: ty,
                    value,
                    is_new: true,
                    addition: AdditionType::Copied,
                });
            }
        }
    }

    /// A mutable table, created or unshared as needed; `None` when
    /// `already_done` reports that the write would change nothing.
    fn writable(
        &mut self,
        already_done: impl FnOnce(&InducedProps) -> bool,
    ) -> Option<&mut InducedProps> {
        if self.table.as_deref().is_some_and(already_done) {
            return None;
        }
        let table = self.table.get_or_insert_with(Arc::default);
        if Arc::strong_count(table) > 1 {
            trace!(node = %self.node, "unsharing property table");
        }
        Some(Arc::make_mut(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DISABLED, MemorySink};
    use crate::props::Intent;

    const INCL: PropertyType = PropertyType::new(1, Intent::InducedDeps);
    const CMD: PropertyType = PropertyType::new(2, Intent::CommandProps);

    fn props(name: &str) -> NodeProperties<'static> {
        NodeProperties::new(DebugNodeId::new(name, None), &DISABLED)
    }

    #[test]
    fn missing_property_reads_as_empty() {
        let node = props("a");
        assert!(!node.has(INCL));
        assert!(node.get(INCL).is_empty());
        assert!(node.is_empty());
    }

    #[test]
    fn adds_preserve_first_insertion_order() {
        let mut node = props("a");
        assert!(node.add_all(INCL, &[5, 3, 5], AdditionType::Created));
        assert!(!node.add_one(INCL, 3, AdditionType::Created));
        assert!(node.add_one(INCL, 7, AdditionType::Created));
        assert_eq!(*node.get(INCL), [5, 3, 7]);
    }

    #[test]
    fn redundant_write_keeps_table_shared() {
        let mut child = props("child");
        child.add_all(INCL, &[1, 2], AdditionType::Created);
        let mut parent = props("parent");
        parent.copy_from(&child, Intents::ALL, None);
        assert!(parent.shares_with(&child));
        assert!(!parent.add_one(INCL, 2, AdditionType::FromNode));
        assert!(parent.shares_with(&child));
        assert!(parent.add_one(INCL, 3, AdditionType::FromNode));
        assert!(!parent.shares_with(&child));
        assert_eq!(*child.get(INCL), [1, 2]);
        assert_eq!(*parent.get(INCL), [1, 2, 3]);
    }

    #[test]
    fn copy_filters_by_intent_and_skip_list() {
        let mut child = props("child");
        child.add_one(INCL, 1, AdditionType::Created);
        child.add_one(CMD, 2, AdditionType::Created);

        let mut only_cmd = props("a");
        only_cmd.copy_from(&child, Intents::from(Intent::CommandProps), None);
        assert!(!only_cmd.has(INCL));
        assert_eq!(*only_cmd.get(CMD), [2]);
        assert!(!only_cmd.shares_with(&child));

        let skip = IndexSet::from([CMD]);
        let mut skipped = props("b");
        skipped.copy_from(&child, Intents::ALL, Some(&skip));
        assert_eq!(*skipped.get(INCL), [1]);
        assert!(!skipped.has(CMD));
    }

    #[test]
    fn declared_types_and_clearing() {
        let mut node = props("a");
        node.add_type(CMD);
        assert!(node.has(CMD));
        assert!(node.get(CMD).is_empty());
        node.add_all(INCL, &[4], AdditionType::Created);
        node.clear(INCL);
        assert!(node.has(INCL));
        assert!(node.get(INCL).is_empty());
        node.set_values(INCL, [9, 8].into_iter().collect(), AdditionType::FromNode);
        assert_eq!(*node.get(INCL), [9, 8]);
        node.clear_all();
        assert!(node.is_empty());
    }

    #[test]
    fn declared_empty_types_are_not_inherited() {
        let mut child = props("child");
        child.add_one(INCL, 1, AdditionType::Created);
        child.add_type(CMD);

        let mut fresh = props("fresh");
        fresh.copy_from(&child, Intents::ALL, None);
        let mut busy = props("busy");
        busy.add_one(INCL, 5, AdditionType::Created);
        busy.copy_from(&child, Intents::ALL, None);

        assert!(!fresh.has(CMD));
        assert!(!busy.has(CMD));
        assert_eq!(*fresh.get(INCL), [1]);
        assert_eq!(*busy.get(INCL), [5, 1]);
    }

    #[test]
    fn tables_compare_values_in_order() {
        let mut first = props("a");
        first.add_all(INCL, &[1, 2], AdditionType::Created);
        let mut second = props("b");
        second.add_all(INCL, &[2, 1], AdditionType::Created);
        let mut third = props("c");
        third.add_all(INCL, &[1, 2], AdditionType::Created);
        let table = |node: &NodeProperties<'_>| node.table.as_deref().cloned();
        assert_ne!(table(&first), table(&second));
        assert_eq!(table(&first), table(&third));
    }

    #[test]
    fn clear_all_leaves_other_handles_intact() {
        let mut child = props("child");
        child.add_one(INCL, 1, AdditionType::Created);
        let mut parent = props("parent");
        parent.copy_from(&child, Intents::ALL, None);
        assert!(child.is_shared());
        parent.clear_all();
        assert!(!child.is_shared());
        assert_eq!(*child.get(INCL), [1]);
    }

    #[test]
    fn additions_are_logged() {
        let sink = MemorySink::default();
        let ctx = DebugContext::new(sink.clone());
        let mut node = NodeProperties::new(DebugNodeId::new("a", None), &ctx);
        node.add_all(INCL, &[1, 1], AdditionType::Created);
        let fresh: Vec<bool> = sink
            .events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                DebugEvent::PropertyAdd { is_new, .. } => Some(is_new),
                _ => None,
            })
            .collect();
        assert_eq!(fresh, [true, false]);
    }
}
