//! Lowering of syntax trees into flat expressions.
//!
//! The script becomes `Cmds(Args(Terms(...), ...), ...)`. A substitution
//! `${m1:v m2:BODY}` becomes `m1(v, m2(BODY))`, where a multi-piece value is
//! wrapped in `Cat` and a body other than a single constant or variable is
//! wrapped in `Terms`. A macro call becomes `NAME(Args(...), ...)` with one
//! `Args` per formal parameter.

use tracing::debug;

use super::error::CompileError;
use super::schema::{Builtin, CommandSchema};
use super::syntax::{Argument, Call, Script, Term, Transformation};
use crate::expr::{Expression, ExpressionBuilder};

/// Lower `script` using the function ids of `schema`.
///
/// # Errors
///
/// Returns [`CompileError`] when the tree still holds parser placeholders,
/// names undeclared modifiers or macros, or passes the wrong number of
/// arguments to one of them.
pub fn compile(script: &Script, schema: &CommandSchema) -> Result<Expression, CompileError> {
    let mut lowering = Lowering {
        schema,
        builder: ExpressionBuilder::new(),
    };
    lowering.begin(Builtin::Cmds);
    for command in &script.commands {
        lowering.begin(Builtin::Args);
        for arg in &command.args {
            lowering.argument(arg)?;
        }
        lowering.builder.end_variadic();
    }
    lowering.builder.end_variadic();
    let expr = lowering.builder.finish()?;
    debug!(
        commands = script.commands.len(),
        nodes = expr.len(),
        "compiled command"
    );
    Ok(expr)
}

struct Lowering<'a> {
    schema: &'a CommandSchema,
    builder: ExpressionBuilder,
}

impl Lowering<'_> {
    fn begin(&mut self, builtin: Builtin) {
        self.builder.begin_variadic(self.schema.builtin(builtin));
    }

    fn argument(&mut self, arg: &Argument) -> Result<(), CompileError> {
        self.begin(Builtin::Terms);
        for term in &arg.terms {
            self.term(term)?;
        }
        self.builder.end_variadic();
        Ok(())
    }

    fn term(&mut self, term: &Term) -> Result<(), CompileError> {
        match term {
            Term::Const { id } => {
                self.builder.constant(*id);
            }
            Term::Var { id } => {
                self.builder.var(*id);
            }
            Term::Transformation(transformation) => self.transformation(transformation)?,
            Term::Call(call) => self.call(call)?,
            Term::IdOrString { .. } => {
                return Err(CompileError::UnresolvedPlaceholder { what: "bare word" });
            }
            Term::Unexpanded(_) => {
                return Err(CompileError::UnresolvedPlaceholder {
                    what: "unbound macro call",
                });
            }
        }
        Ok(())
    }

    fn transformation(&mut self, transformation: &Transformation) -> Result<(), CompileError> {
        for modifier in &transformation.modifiers {
            let func = self.schema.modifier(&modifier.name).ok_or_else(|| {
                CompileError::UnknownModifier {
                    name: modifier.name.clone(),
                }
            })?;
            if func.arity() != modifier.values.len() + 1 {
                return Err(CompileError::Arity {
                    name: modifier.name.clone(),
                    expected: func.arity().saturating_sub(1),
                    given: modifier.values.len(),
                });
            }
            self.builder.call(func);
            for value in &modifier.values {
                self.pieces(value, Builtin::Cat)?;
            }
        }
        // The innermost modifier closes once the body is complete.
        self.pieces(&transformation.body, Builtin::Terms)
    }

    /// A single constant or variable stays bare; anything else is wrapped.
    fn pieces(&mut self, pieces: &[Term], wrapper: Builtin) -> Result<(), CompileError> {
        if let [piece @ (Term::Const { .. } | Term::Var { .. })] = pieces {
            return self.term(piece);
        }
        self.begin(wrapper);
        for piece in pieces {
            self.term(piece)?;
        }
        self.builder.end_variadic();
        Ok(())
    }

    fn call(&mut self, call: &Call) -> Result<(), CompileError> {
        let (func, _) =
            self.schema
                .macro_signature(&call.name)
                .ok_or_else(|| CompileError::UnknownMacro {
                    name: call.name.clone(),
                })?;
        if func.arity() != call.params.len() {
            return Err(CompileError::Arity {
                name: call.name.clone(),
                expected: func.arity(),
                given: call.params.len(),
            });
        }
        self.builder.call(func);
        for param in &call.params {
            self.begin(Builtin::Args);
            for arg in &param.args {
                self.argument(arg)?;
            }
            self.builder.end_variadic();
        }
        Ok(())
    }
}
