//! Human-readable rendering of flat expressions.
//!
//! Shared subexpressions print as `[$N = ...]` where they are defined and as
//! `$N` where they are reused; variables print with a leading `$`.

use std::borrow::Cow;
use std::fmt::{self, Write};
use std::ops::Range;

use super::{Expression, NodeKind, corrupted};
use crate::ids::{ConstId, FuncId, VarId};

/// Supplies display names for the ids found in an expression.
pub trait NameResolver {
    /// Display form of a constant.
    fn constant_name(&self, id: ConstId) -> Cow<'_, str>;
    /// Name of a variable, printed after `$`.
    fn variable_name(&self, id: VarId) -> Cow<'_, str>;
    /// Name of a function, printed before its argument list.
    fn function_name(&self, id: FuncId) -> Cow<'_, str>;
}

/// A node range wrapped in caller-chosen markers.
#[derive(Debug, Clone)]
pub struct Highlight<'a> {
    /// Half-open range of node positions.
    pub nodes: Range<usize>,
    /// Emitted before the first highlighted node.
    pub open: &'a str,
    /// Emitted once the last highlighted node and the calls it closes are
    /// printed.
    pub close: &'a str,
}

struct Frame {
    head: usize,
    referenced: bool,
    first_arg: usize,
    last_arg: usize,
}

/// Print `expr` into `out`.
///
/// # Errors
///
/// Propagates failures of `out`.
///
/// # Panics
///
/// Panics when a back-reference reaches past the first store.
pub fn print<W, N>(out: &mut W, expr: &Expression, names: &N) -> fmt::Result
where
    W: Write + ?Sized,
    N: NameResolver + ?Sized,
{
    render(out, expr, names, None)
}

/// Print `expr` into `out`, wrapping `highlight` in its markers.
///
/// # Errors
///
/// Propagates failures of `out`.
///
/// # Panics
///
/// See [`print`].
pub fn print_highlighted<W, N>(
    out: &mut W,
    expr: &Expression,
    names: &N,
    highlight: &Highlight<'_>,
) -> fmt::Result
where
    W: Write + ?Sized,
    N: NameResolver + ?Sized,
{
    render(out, expr, names, Some(highlight))
}

fn render<W, N>(
    out: &mut W,
    expr: &Expression,
    names: &N,
    highlight: Option<&Highlight<'_>>,
) -> fmt::Result
where
    W: Write + ?Sized,
    N: NameResolver + ?Sized,
{
    let mut frames: Vec<Frame> = Vec::new();
    let mut args = 0usize;
    let mut next_ref = 0u32;
    // Display numbers of open referenced functions, innermost last.
    let mut open_refs: Vec<u32> = Vec::new();
    // Display numbers in store order.
    let mut stores: Vec<u32> = Vec::new();
    let mut closing = false;

    for (pos, node) in expr.nodes().iter().enumerate() {
        if let Some(hl) = highlight
            && hl.nodes.start == pos
            && !hl.nodes.is_empty()
        {
            out.write_str(hl.open)?;
        }
        if node.is_referenced() {
            write!(out, "[${next_ref} = ")?;
            next_ref += 1;
        }
        match node.kind() {
            NodeKind::Constant(id) => {
                out.write_str(&names.constant_name(id))?;
                args += 1;
            }
            NodeKind::Variable(id) => {
                write!(out, "${}", names.variable_name(id))?;
                args += 1;
            }
            NodeKind::Function(id) => {
                write!(out, "{}(", names.function_name(id))?;
                frames.push(Frame {
                    head: pos,
                    referenced: node.is_referenced(),
                    first_arg: args,
                    last_arg: args + id.arity(),
                });
            }
            NodeKind::Backref(distance) => {
                let shown = stores
                    .len()
                    .checked_sub(distance as usize)
                    .and_then(|at| stores.get(at))
                    .copied()
                    .unwrap_or_else(|| corrupted("dangling back-reference"));
                write!(out, "${shown}")?;
                args += 1;
            }
        }
        if node.is_referenced() {
            if matches!(node.kind(), NodeKind::Function(_)) {
                open_refs.push(next_ref - 1);
            } else {
                out.write_str("]")?;
                stores.push(next_ref - 1);
            }
        }
        if let Some(hl) = highlight
            && hl.nodes.end == pos + 1
            && !hl.nodes.is_empty()
        {
            closing = true;
        }

        while let Some(frame) = frames.last() {
            if frame.last_arg != args {
                break;
            }
            if closing
                && let Some(hl) = highlight
                && frame.head < hl.nodes.start
            {
                out.write_str(hl.close)?;
                closing = false;
            }
            args = frame.first_arg + 1;
            let referenced = frame.referenced;
            frames.pop();
            out.write_str(")")?;
            if referenced {
                out.write_str("]")?;
                if let Some(shown) = open_refs.pop() {
                    stores.push(shown);
                }
            }
        }
        if closing && let Some(hl) = highlight {
            out.write_str(hl.close)?;
            closing = false;
        }
        if frames.last().is_some_and(|frame| frame.first_arg != args) {
            out.write_str(", ")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::expr::ExpressionBuilder;
    use rstest::rstest;

    struct Names;

    impl NameResolver for Names {
        fn constant_name(&self, id: ConstId) -> Cow<'_, str> {
            Cow::Owned(format!("c{}", id.index()))
        }

        fn variable_name(&self, id: VarId) -> Cow<'_, str> {
            Cow::Owned(format!("V{}", id.get()))
        }

        fn function_name(&self, id: FuncId) -> Cow<'_, str> {
            Cow::Borrowed(if id.index() == 0 { "f" } else { "g" })
        }
    }

    fn sample() -> Expression {
        let mut builder = ExpressionBuilder::new();
        builder.begin_variadic(FuncId::new(0, 0).expect("fits"));
        let shared = builder.shared(|b| {
            b.call(FuncId::new(1, 2).expect("fits"));
            b.constant(ConstId::new(0, 1).expect("fits"));
            b.var(VarId::new(2).expect("fits"));
        });
        builder.backref(shared);
        builder.end_variadic();
        builder.finish().expect("complete")
    }

    #[test]
    fn prints_shared_values_and_reuses() {
        let mut out = String::new();
        print(&mut out, &sample(), &Names).expect("write");
        assert_eq!(out, "f([$0 = g(c1, $V2)], $0)");
    }

    #[rstest]
    #[case(1..4, "f(<[$0 = g(c1, $V2)]>, $0)")]
    #[case(2..3, "f([$0 = g(<c1>, $V2)], $0)")]
    #[case(4..5, "f([$0 = g(c1, $V2)], <$0>)")]
    #[case(0..5, "<f([$0 = g(c1, $V2)], $0)>")]
    fn highlights_node_ranges(#[case] nodes: Range<usize>, #[case] expected: &str) {
        let mut out = String::new();
        let highlight = Highlight {
            nodes,
            open: "<",
            close: ">",
        };
        print_highlighted(&mut out, &sample(), &Names, &highlight).expect("write");
        assert_eq!(out, expected);
    }
}
