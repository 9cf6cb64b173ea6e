//! Single-pass stack evaluation of flat expressions.

use super::{Expression, NodeKind, corrupted};
use crate::ids::{ConstId, FuncId, VarId};

/// Callbacks that give meaning to the leaves and functions of an expression.
pub trait Evaluator {
    /// Value produced for every subexpression.
    type Value: Clone;

    /// Value of a constant.
    fn constant(&mut self, id: ConstId) -> Self::Value;

    /// Value of a variable.
    fn variable(&mut self, id: VarId) -> Self::Value;

    /// Apply a function to its evaluated arguments.
    fn function(&mut self, id: FuncId, args: &[Self::Value]) -> Self::Value;
}

struct Closures<C, V, F> {
    constant: C,
    variable: V,
    function: F,
}

impl<T, C, V, F> Evaluator for Closures<C, V, F>
where
    T: Clone,
    C: FnMut(ConstId) -> T,
    V: FnMut(VarId) -> T,
    F: FnMut(FuncId, &[T]) -> T,
{
    type Value = T;

    fn constant(&mut self, id: ConstId) -> T {
        (self.constant)(id)
    }

    fn variable(&mut self, id: VarId) -> T {
        (self.variable)(id)
    }

    fn function(&mut self, id: FuncId, args: &[T]) -> T {
        (self.function)(id, args)
    }
}

struct Frame {
    func: FuncId,
    referenced: bool,
    first_arg: usize,
}

/// Evaluate the subexpression starting at `pos`.
///
/// Returns its value and the position just past the nodes it consumed, so
/// callers can walk the arguments of an enclosing function one by one.
/// Back-references inside the subexpression must target stores created
/// inside it.
///
/// # Panics
///
/// Panics when `pos` is out of range or the expression is structurally
/// corrupted (a dangling back-reference or a truncated call).
pub fn evaluate_from<E: Evaluator + ?Sized>(
    expr: &Expression,
    pos: usize,
    eval: &mut E,
) -> (E::Value, usize) {
    let nodes = expr.nodes();
    let mut frames: Vec<Frame> = Vec::new();
    let mut args: Vec<E::Value> = Vec::new();
    let mut stores: Vec<E::Value> = Vec::new();
    let mut cursor = pos;

    loop {
        if args.len() == 1 && frames.is_empty() {
            break;
        }
        let Some(node) = nodes.get(cursor).copied() else {
            corrupted("expression ends inside a call");
        };
        cursor += 1;
        match node.kind() {
            NodeKind::Constant(id) => args.push(eval.constant(id)),
            NodeKind::Variable(id) => args.push(eval.variable(id)),
            NodeKind::Function(func) => frames.push(Frame {
                func,
                referenced: node.is_referenced(),
                first_arg: args.len(),
            }),
            NodeKind::Backref(distance) => {
                let value = stores
                    .len()
                    .checked_sub(distance as usize)
                    .and_then(|at| stores.get(at))
                    .cloned()
                    .unwrap_or_else(|| corrupted("dangling back-reference"));
                args.push(value);
            }
        }
        if node.is_referenced()
            && !matches!(node.kind(), NodeKind::Function(_))
            && let Some(value) = args.last()
        {
            stores.push(value.clone());
        }

        while let Some(frame) = frames.last() {
            if args.len() != frame.first_arg + frame.func.arity() {
                break;
            }
            let first_arg = frame.first_arg;
            let func = frame.func;
            let referenced = frame.referenced;
            frames.pop();
            let value = eval.function(func, args.get(first_arg..).unwrap_or_default());
            args.truncate(first_arg);
            if referenced {
                stores.push(value.clone());
            }
            args.push(value);
        }
    }

    match args.pop() {
        Some(value) => (value, cursor),
        None => corrupted("empty expression"),
    }
}

/// Evaluate a whole expression.
///
/// # Panics
///
/// Panics when the expression is empty, corrupted, or has nodes after its
/// first complete subexpression.
pub fn evaluate<E: Evaluator + ?Sized>(expr: &Expression, eval: &mut E) -> E::Value {
    let (value, end) = evaluate_from(expr, 0, eval);
    if end != expr.len() {
        corrupted("trailing nodes");
    }
    value
}

/// Evaluate a whole expression with three closures instead of an
/// [`Evaluator`] implementation.
///
/// # Panics
///
/// See [`evaluate`].
pub fn evaluate_with<T, C, V, F>(expr: &Expression, constant: C, variable: V, function: F) -> T
where
    T: Clone,
    C: FnMut(ConstId) -> T,
    V: FnMut(VarId) -> T,
    F: FnMut(FuncId, &[T]) -> T,
{
    evaluate(
        expr,
        &mut Closures {
            constant,
            variable,
            function,
        },
    )
}

/// Visit the arguments of the call at `pos` when its head is function
/// `expected` (compared by index).
///
/// `visitor` receives the start of each argument and returns the position
/// just past it, typically via [`evaluate_from`]. Returns the position past
/// the last argument, or `pos` unchanged when the node is not a call to
/// `expected`.
pub fn visit_fn_args(
    expr: &Expression,
    pos: usize,
    expected: FuncId,
    mut visitor: impl FnMut(usize) -> usize,
) -> usize {
    let Some(NodeKind::Function(func)) = expr.get(pos).map(|node| node.kind()) else {
        return pos;
    };
    if func.index() != expected.index() {
        return pos;
    }
    let mut cursor = pos + 1;
    for _ in 0..func.arity() {
        cursor = visitor(cursor);
    }
    cursor
}
