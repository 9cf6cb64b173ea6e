//! Incremental construction of flat expressions.
//!
//! Fixed-arity calls close on their own once the last argument is complete;
//! variadic calls stay open until [`ExpressionBuilder::end_variadic`] patches
//! the final arity into the head node. Structural mistakes do not interrupt
//! construction: they are recorded and reported by
//! [`ExpressionBuilder::finish`].

use thiserror::Error;

use super::{Expression, ExpressionError, Node};
use crate::ids::{ConstId, FuncId, IdError, VarId};

/// Handle to a shared sub-expression, valid for the builder that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ref(u32);

impl Ref {
    /// Position of the value on the stores stack.
    #[must_use]
    pub const fn store(self) -> u32 {
        self.0
    }
}

/// Errors reported when a builder is finished.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Calls were still open when the expression was finished.
    #[error("{open} call(s) still open")]
    Unclosed {
        /// Number of open calls.
        open: usize,
    },
    /// The builder holds no expression or more than one.
    #[error("expected one top-level expression, found {count}")]
    Roots {
        /// Number of complete top-level expressions.
        count: usize,
    },
    /// `end_variadic` ran while the innermost open call was not variadic.
    #[error("no variadic call to close")]
    NotVariadic,
    /// A shared block built something other than one subexpression.
    #[error("shared block produced {count} subexpressions")]
    SharedArity {
        /// Number of subexpressions built inside the block.
        count: usize,
    },
    /// A variadic call received more arguments than an arity can hold.
    #[error(transparent)]
    Id(#[from] IdError),
    /// The produced nodes failed validation.
    #[error(transparent)]
    Invalid(#[from] ExpressionError),
}

#[derive(Debug)]
enum Frame {
    Fixed { remaining: usize },
    Variadic { slot: usize, func: FuncId, args: usize },
    Shared { count: usize },
}

/// Appends nodes in prefix order and tracks the stores they create.
#[derive(Debug, Default)]
pub struct ExpressionBuilder {
    expr: Expression,
    open: Vec<Frame>,
    stores: u32,
    roots: usize,
    fault: Option<BuildError>,
}

impl ExpressionBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes emitted so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.expr.len()
    }

    /// Whether nothing has been emitted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.expr.is_empty()
    }

    /// Append a constant operand.
    pub fn constant(&mut self, id: ConstId) -> &mut Self {
        self.expr.push(Node::constant(id));
        self.complete();
        self
    }

    /// Append a variable operand.
    pub fn var(&mut self, id: VarId) -> &mut Self {
        self.expr.push(Node::variable(id));
        self.complete();
        self
    }

    /// Append a reuse of a shared sub-expression.
    pub fn backref(&mut self, target: Ref) -> &mut Self {
        match self.stores.checked_sub(target.0) {
            Some(distance) if distance > 0 => {
                self.expr.push(Node::backref(distance));
                self.complete();
            }
            _ => self.record(BuildError::Invalid(ExpressionError::DanglingBackref {
                position: self.expr.len(),
                distance: 0,
                available: self.stores as usize,
            })),
        }
        self
    }

    /// Open a fixed-arity call; it closes after `func.arity()` arguments.
    pub fn call(&mut self, func: FuncId) -> &mut Self {
        self.expr.push(Node::function(func));
        if func.arity() == 0 {
            self.complete();
        } else {
            self.open.push(Frame::Fixed {
                remaining: func.arity(),
            });
        }
        self
    }

    /// Open a call whose arity is the number of arguments seen before
    /// [`ExpressionBuilder::end_variadic`].
    pub fn begin_variadic(&mut self, func: FuncId) -> &mut Self {
        let slot = self.expr.len();
        self.expr.push(Node::function(func));
        self.open.push(Frame::Variadic {
            slot,
            func,
            args: 0,
        });
        self
    }

    /// Close the innermost variadic call.
    pub fn end_variadic(&mut self) -> &mut Self {
        let Some(Frame::Variadic { slot, func, args }) = self.open.last() else {
            self.record(BuildError::NotVariadic);
            return self;
        };
        let (slot, func, args) = (*slot, *func, *args);
        self.open.pop();
        match func.with_arity(args) {
            Ok(patched) => {
                let head = self.expr.get(slot).map_or(Node::function(patched), |node| {
                    if node.is_referenced() {
                        Node::function(patched).referenced()
                    } else {
                        Node::function(patched)
                    }
                });
                self.expr.set(slot, head);
            }
            Err(err) => self.record(err.into()),
        }
        self.complete();
        self
    }

    /// Build exactly one subexpression with `build` and share it.
    ///
    /// The returned [`Ref`] feeds [`ExpressionBuilder::backref`] for every
    /// later reuse.
    pub fn shared(&mut self, build: impl FnOnce(&mut Self)) -> Ref {
        let start = self.expr.len();
        let depth = self.open.len();
        self.open.push(Frame::Shared { count: 0 });
        build(self);
        // Calls left open inside the block are abandoned.
        self.open.truncate(depth + 1);
        let count = match self.open.pop() {
            Some(Frame::Shared { count }) => count,
            _ => 0,
        };
        if count != 1 {
            self.record(BuildError::SharedArity { count });
        }
        if let Some(head) = self.expr.get(start) {
            self.expr.set(start, head.referenced());
        }
        let handle = Ref(self.stores);
        self.stores += 1;
        self.complete();
        handle
    }

    /// Take the finished expression.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] for unclosed calls, a wrong number of top-level
    /// expressions, or any mistake recorded during construction.
    pub fn finish(self) -> Result<Expression, BuildError> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        if !self.open.is_empty() {
            return Err(BuildError::Unclosed {
                open: self.open.len(),
            });
        }
        if self.roots != 1 {
            return Err(BuildError::Roots { count: self.roots });
        }
        self.expr.validate()?;
        Ok(self.expr)
    }

    fn record(&mut self, fault: BuildError) {
        self.fault.get_or_insert(fault);
    }

    fn complete(&mut self) {
        loop {
            match self.open.last_mut() {
                None => {
                    self.roots += 1;
                    return;
                }
                Some(Frame::Fixed { remaining }) => {
                    *remaining -= 1;
                    if *remaining > 0 {
                        return;
                    }
                    self.open.pop();
                }
                Some(Frame::Variadic { args, .. }) => {
                    *args += 1;
                    return;
                }
                Some(Frame::Shared { count }) => {
                    *count += 1;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::expr::NodeKind;

    fn konst(index: u32) -> ConstId {
        ConstId::new(0, index).expect("fits")
    }

    #[test]
    fn fixed_calls_close_themselves() {
        let mut builder = ExpressionBuilder::new();
        builder.call(FuncId::new(0, 2).expect("fits"));
        builder.call(FuncId::new(1, 1).expect("fits"));
        builder.constant(konst(1));
        builder.constant(konst(2));
        let expr = builder.finish().expect("complete");
        assert_eq!(expr.len(), 4);
    }

    #[test]
    fn variadic_arity_is_patched() {
        let mut builder = ExpressionBuilder::new();
        builder.begin_variadic(FuncId::new(3, 0).expect("fits"));
        builder.constant(konst(1)).constant(konst(2)).constant(konst(3));
        builder.end_variadic();
        let expr = builder.finish().expect("complete");
        let head = expr.nodes().first().copied().expect("head");
        assert_eq!(head.arity(), 3);
    }

    #[test]
    fn shared_blocks_number_stores_in_completion_order() {
        let mut builder = ExpressionBuilder::new();
        builder.begin_variadic(FuncId::new(0, 0).expect("fits"));
        let inner = builder.shared(|b| {
            b.constant(konst(7));
        });
        let outer = builder.shared(|b| {
            b.call(FuncId::new(1, 1).expect("fits"));
            b.backref(inner);
        });
        builder.backref(inner).backref(outer);
        builder.end_variadic();
        let expr = builder.finish().expect("complete");
        let kinds: Vec<_> = expr.nodes().iter().map(|n| n.kind()).collect();
        assert_eq!(
            kinds.get(3..),
            Some(&[NodeKind::Backref(1), NodeKind::Backref(2), NodeKind::Backref(1)][..])
        );
        assert!(expr.nodes().get(2).is_some_and(|n| n.is_referenced()));
    }

    #[test]
    fn finish_reports_open_calls() {
        let mut builder = ExpressionBuilder::new();
        builder.begin_variadic(FuncId::new(0, 0).expect("fits"));
        assert_eq!(builder.finish(), Err(BuildError::Unclosed { open: 1 }));
    }

    #[test]
    fn end_variadic_without_variadic_is_recorded() {
        let mut builder = ExpressionBuilder::new();
        builder.constant(konst(1));
        builder.end_variadic();
        assert_eq!(builder.finish(), Err(BuildError::NotVariadic));
    }
}
