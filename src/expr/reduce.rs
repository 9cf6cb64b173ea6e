//! Partial evaluation of flat expressions.
//!
//! [`reduce_if`] rebuilds the tree behind the flat encoding in an arena,
//! replaces every maximal call whose head satisfies [`Reducer::condition`]
//! with its folded constant, and flattens the tree again with freshly
//! numbered back-references. Back-references to values that disappeared
//! inside a folded call become copies of the folded constant.

use tracing::debug;

use super::{Expression, Node, NodeKind, corrupted};
use crate::ids::{ConstId, FuncId, VarId};

/// Folding callbacks for [`reduce_if`].
pub trait Reducer {
    /// Intermediate value produced before it is interned with
    /// [`Reducer::wrap`].
    type Value;

    /// Whether calls to `func` are foldable.
    fn condition(&self, func: FuncId) -> bool;

    /// Value of a variable inside a folded call.
    fn evaluate_var(&mut self, id: VarId) -> Self::Value;

    /// Apply `func` to already folded arguments.
    fn evaluate_func(&mut self, func: FuncId, args: &[ConstId]) -> Self::Value;

    /// Intern a value as a constant.
    fn wrap(&mut self, value: Self::Value) -> ConstId;
}

#[derive(Debug)]
struct TreeNode {
    head: Node,
    children: Vec<usize>,
    /// Arena slot of the referenced node a back-reference reuses.
    target: Option<usize>,
}

/// Arena slots coincide with positions in the source expression.
struct Tree {
    nodes: Vec<TreeNode>,
    memo: Vec<Option<ConstId>>,
}

const ROOT: usize = 0;

impl Tree {
    fn unflatten(expr: &Expression) -> Self {
        let mut nodes: Vec<TreeNode> = Vec::with_capacity(expr.len());
        // Slots of referenced nodes, in completion order.
        let mut stores: Vec<usize> = Vec::new();
        // Open calls as (slot, arguments still expected).
        let mut open: Vec<(usize, usize)> = Vec::new();

        for (slot, &head) in expr.nodes().iter().enumerate() {
            let target = match head.kind() {
                NodeKind::Backref(distance) => Some(
                    stores
                        .len()
                        .checked_sub(distance as usize)
                        .and_then(|at| stores.get(at))
                        .copied()
                        .unwrap_or_else(|| corrupted("dangling back-reference")),
                ),
                _ => None,
            };
            nodes.push(TreeNode {
                head,
                children: Vec::new(),
                target,
            });
            if let Some(&(parent, _)) = open.last()
                && let Some(parent) = nodes.get_mut(parent)
            {
                parent.children.push(slot);
            }
            if head.arity() > 0 {
                open.push((slot, head.arity()));
                continue;
            }
            let mut done = slot;
            loop {
                if nodes.get(done).is_some_and(|node| node.head.is_referenced()) {
                    stores.push(done);
                }
                let Some((parent, remaining)) = open.last_mut() else {
                    break;
                };
                *remaining -= 1;
                if *remaining > 0 {
                    break;
                }
                done = *parent;
                open.pop();
            }
        }
        if !open.is_empty() {
            corrupted("expression ends inside a call");
        }
        let memo = vec![None; nodes.len()];
        Self { nodes, memo }
    }

    fn node(&self, slot: usize) -> &TreeNode {
        self.nodes
            .get(slot)
            .unwrap_or_else(|| corrupted("arena slot out of range"))
    }

    fn memo(&self, slot: usize) -> Option<ConstId> {
        self.memo.get(slot).copied().flatten()
    }

    fn remember(&mut self, slot: usize, value: ConstId) {
        if let Some(entry) = self.memo.get_mut(slot) {
            *entry = Some(value);
        }
    }

    /// Fold every maximal foldable call; returns the number of folds.
    fn reduce<R: Reducer + ?Sized>(&mut self, reducer: &mut R) -> usize {
        let mut folded = 0;
        let mut pending = vec![ROOT];
        while let Some(slot) = pending.pop() {
            let node = self.node(slot);
            if let NodeKind::Function(func) = node.head.kind()
                && reducer.condition(func)
            {
                self.fold(slot, reducer);
                folded += 1;
            } else {
                pending.extend(node.children.iter().rev().copied());
            }
        }
        folded
    }

    fn fold<R: Reducer + ?Sized>(&mut self, slot: usize, reducer: &mut R) {
        let value = self.value(slot, reducer);
        if let Some(node) = self.nodes.get_mut(slot) {
            node.head = node.head.assign_constant(value);
            node.children.clear();
        }
    }

    /// Constant value of the subtree at `start`, evaluating each slot at most
    /// once across the whole reduction.
    fn value<R: Reducer + ?Sized>(&mut self, start: usize, reducer: &mut R) -> ConstId {
        let mut stack = vec![(start, false)];
        while let Some(&(slot, expanded)) = stack.last() {
            if self.memo(slot).is_some() {
                stack.pop();
                continue;
            }
            let node = self.node(slot);
            match node.head.kind() {
                NodeKind::Constant(id) => {
                    stack.pop();
                    self.remember(slot, id);
                }
                NodeKind::Variable(id) => {
                    stack.pop();
                    let value = reducer.evaluate_var(id);
                    let id = reducer.wrap(value);
                    self.remember(slot, id);
                }
                NodeKind::Backref(_) => {
                    let target = node
                        .target
                        .unwrap_or_else(|| corrupted("back-reference without target"));
                    if let Some(value) = self.memo(target) {
                        stack.pop();
                        self.remember(slot, value);
                    } else {
                        stack.push((target, false));
                    }
                }
                NodeKind::Function(func) if expanded => {
                    stack.pop();
                    let args: Vec<ConstId> = node
                        .children
                        .iter()
                        .map(|&child| {
                            self.memo(child)
                                .unwrap_or_else(|| corrupted("argument folded out of order"))
                        })
                        .collect();
                    let value = reducer.evaluate_func(func, &args);
                    let id = reducer.wrap(value);
                    self.remember(slot, id);
                }
                NodeKind::Function(_) => {
                    let children: Vec<usize> = node
                        .children
                        .iter()
                        .rev()
                        .copied()
                        .filter(|&child| self.memo(child).is_none())
                        .collect();
                    if let Some(top) = stack.last_mut() {
                        top.1 = true;
                    }
                    stack.extend(children.into_iter().map(|child| (child, false)));
                }
            }
        }
        self.memo(start)
            .unwrap_or_else(|| corrupted("subtree left without a value"))
    }

    fn flatten(&self) -> Expression {
        let mut out = Expression::new();
        let mut store_ids: Vec<Option<u32>> = vec![None; self.nodes.len()];
        let mut completed = 0u32;
        let mut stack: Vec<(usize, usize)> = vec![(ROOT, 0)];
        out.push(self.emitted(ROOT, &store_ids, completed));

        while let Some((slot, next)) = stack.last_mut() {
            let node = self.node(*slot);
            if let Some(&child) = node.children.get(*next) {
                *next += 1;
                out.push(self.emitted(child, &store_ids, completed));
                stack.push((child, 0));
                continue;
            }
            let done = *slot;
            stack.pop();
            if node.head.is_referenced()
                && let Some(entry) = store_ids.get_mut(done)
            {
                *entry = Some(completed);
                completed += 1;
            }
        }
        out
    }

    /// The node written for `slot`, with back-references renumbered against
    /// the stores already completed in the output.
    fn emitted(&self, slot: usize, store_ids: &[Option<u32>], completed: u32) -> Node {
        let node = self.node(slot);
        let Some(target) = node.target else {
            return node.head;
        };
        if let Some(store) = store_ids.get(target).copied().flatten() {
            let fresh = Node::backref(completed - store);
            return if node.head.is_referenced() {
                fresh.referenced()
            } else {
                fresh
            };
        }
        // The target vanished inside a folded call.
        let value = self
            .memo(target)
            .unwrap_or_else(|| corrupted("back-reference into an unfolded removed node"));
        node.head.assign_constant(value)
    }
}

/// Fold every maximal call whose head satisfies `reducer.condition`.
///
/// Calls that do not satisfy the condition are kept and searched for
/// foldable arguments. Every subexpression, including shared ones reached
/// through back-references, is evaluated at most once.
///
/// # Panics
///
/// Panics when the expression is structurally corrupted.
pub fn reduce_if<R: Reducer + ?Sized>(expr: &Expression, reducer: &mut R) -> Expression {
    if expr.is_empty() {
        return Expression::new();
    }
    let mut tree = Tree::unflatten(expr);
    let folded = tree.reduce(reducer);
    if folded == 0 {
        return expr.clone();
    }
    let reduced = tree.flatten();
    debug!(
        folded,
        before = expr.len(),
        after = reduced.len(),
        "reduced expression"
    );
    reduced
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::expr::{ExpressionBuilder, evaluate_with};
    use std::collections::HashMap;

    const SUM: u32 = 0;
    const PROD: u32 = 1;
    const WRAPPED: u32 = 2;

    /// Folds `SUM` calls; `PROD` stays symbolic.
    #[derive(Default)]
    struct Folder {
        wrapped: Vec<i64>,
        vars: HashMap<u32, i64>,
        calls: usize,
    }

    impl Folder {
        fn constant(&self, id: ConstId) -> i64 {
            if id.storage() == WRAPPED {
                self.wrapped
                    .get(id.index() as usize)
                    .copied()
                    .expect("wrapped value")
            } else {
                i64::from(id.index())
            }
        }

        fn apply(func: FuncId, args: &[i64]) -> i64 {
            match func.index() {
                SUM => args.iter().sum(),
                PROD => args.iter().product(),
                other => panic!("unknown function {other}"),
            }
        }

        fn eval(&self, expr: &Expression) -> i64 {
            evaluate_with(
                expr,
                |c| self.constant(c),
                |v| self.vars.get(&v.get()).copied().unwrap_or_default(),
                Self::apply,
            )
        }
    }

    impl Reducer for Folder {
        type Value = i64;

        fn condition(&self, func: FuncId) -> bool {
            func.index() == SUM
        }

        fn evaluate_var(&mut self, id: VarId) -> i64 {
            self.vars.get(&id.get()).copied().unwrap_or_default()
        }

        fn evaluate_func(&mut self, func: FuncId, args: &[ConstId]) -> i64 {
            self.calls += 1;
            let values: Vec<i64> = args.iter().map(|&c| self.constant(c)).collect();
            Self::apply(func, &values)
        }

        fn wrap(&mut self, value: i64) -> ConstId {
            let index = u32::try_from(self.wrapped.len()).expect("small table");
            self.wrapped.push(value);
            ConstId::new(WRAPPED, index).expect("fits")
        }
    }

    fn konst(value: u32) -> ConstId {
        ConstId::new(0, value).expect("fits")
    }

    fn func(index: u32, arity: usize) -> FuncId {
        FuncId::new(index, arity).expect("fits")
    }

    #[test]
    fn folds_only_matching_calls() {
        // prod(sum(2, 3), $x)
        let mut builder = ExpressionBuilder::new();
        builder.call(func(PROD, 2));
        builder.call(func(SUM, 2)).constant(konst(2)).constant(konst(3));
        builder.var(VarId::new(0).expect("fits"));
        let expr = builder.finish().expect("complete");

        let mut folder = Folder::default();
        folder.vars.insert(0, 7);
        let reduced = reduce_if(&expr, &mut folder);
        assert_eq!(reduced.len(), 3);
        assert!(matches!(
            reduced.nodes().get(1).map(|n| n.kind()),
            Some(NodeKind::Constant(c)) if c.storage() == WRAPPED
        ));
        assert_eq!(folder.eval(&reduced), 35);
        assert_eq!(folder.eval(&expr), 35);
    }

    #[test]
    fn backrefs_into_folded_calls_become_constants() {
        // prod(sum([$0 = 4], 1), $0, [$1 = sum(2, $0)], $1)
        let mut builder = ExpressionBuilder::new();
        builder.begin_variadic(func(PROD, 0));
        builder.call(func(SUM, 2));
        let four = builder.shared(|b| {
            b.constant(konst(4));
        });
        builder.constant(konst(1));
        builder.backref(four);
        let six = builder.shared(|b| {
            b.call(func(SUM, 2));
            b.constant(konst(2));
            b.backref(four);
        });
        builder.backref(six);
        builder.end_variadic();
        let expr = builder.finish().expect("complete");

        let mut folder = Folder::default();
        let reduced = reduce_if(&expr, &mut folder);
        reduced.validate().expect("valid");
        assert_eq!(folder.eval(&reduced), 5 * 4 * 6 * 6);
        assert_eq!(folder.eval(&expr), 5 * 4 * 6 * 6);
        let kinds: Vec<_> = reduced.nodes().iter().map(|n| n.kind()).collect();
        // The folded shared call survives as the only store.
        assert_eq!(kinds.len(), 5);
        assert!(matches!(kinds.get(2), Some(NodeKind::Constant(c)) if *c == konst(4)));
        assert!(matches!(kinds.last(), Some(NodeKind::Backref(1))));
        assert_eq!(
            reduced.nodes().iter().filter(|n| n.is_referenced()).count(),
            1
        );
    }

    #[test]
    fn folded_call_reads_shared_value_from_outside() {
        // prod([$0 = prod(3, 3)], sum($0, 1))
        let mut builder = ExpressionBuilder::new();
        builder.call(func(PROD, 2));
        let nine = builder.shared(|b| {
            b.call(func(PROD, 2));
            b.constant(konst(3)).constant(konst(3));
        });
        builder.call(func(SUM, 2)).backref(nine).constant(konst(1));
        let expr = builder.finish().expect("complete");

        let mut folder = Folder::default();
        let reduced = reduce_if(&expr, &mut folder);
        reduced.validate().expect("valid");
        assert_eq!(folder.eval(&reduced), 90);
        // The shared call is evaluated to fold the sum but kept in place.
        assert_eq!(reduced.len(), 5);
        assert!(reduced.nodes().get(1).is_some_and(|n| n.is_referenced()));
    }

    #[test]
    fn reduction_is_idempotent() {
        let mut builder = ExpressionBuilder::new();
        builder.call(func(PROD, 2));
        builder.call(func(SUM, 1)).constant(konst(8));
        builder.call(func(PROD, 1)).var(VarId::new(1).expect("fits"));
        let expr = builder.finish().expect("complete");

        let mut folder = Folder::default();
        let once = reduce_if(&expr, &mut folder);
        let twice = reduce_if(&once, &mut folder);
        assert_eq!(once, twice);
    }

    #[test]
    fn root_call_folds_to_single_constant() {
        let mut builder = ExpressionBuilder::new();
        builder.call(func(SUM, 2)).constant(konst(1)).constant(konst(2));
        let expr = builder.finish().expect("complete");
        let mut folder = Folder::default();
        let reduced = reduce_if(&expr, &mut folder);
        assert_eq!(reduced.len(), 1);
        assert_eq!(folder.eval(&reduced), 3);
        assert_eq!(folder.calls, 1);
    }
}
