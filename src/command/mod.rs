//! The command language: parsing build commands and lowering them into
//! expressions.
//!
//! A command line is a `&&`-separated list of commands made of
//! whitespace-separated words. Words may hold quoted strings, variables
//! (`$NAME`), substitutions with modifier chains (`${pre=-I:INCLUDES}`) and
//! macro calls (`$CC($SRC, OUT $OUT)`). Parsing produces a [`Script`];
//! [`compile`] flattens it into an [`Expression`].
//!
//! ```
//! use buildsig::command::{CommandSchema, MacroSignature, MacroValues, compile_command};
//!
//! let mut schema = CommandSchema::default();
//! schema
//!     .add_macro("CC", MacroSignature::new(&["SRC", "OUT"], &["OUT"]).expect("sig"))
//!     .expect("declare");
//! let mut values = MacroValues::new();
//! let expr = compile_command("$CC($SRC, OUT $OUT)", &schema, &mut values).expect("compile");
//! assert!(!expr.is_empty());
//! ```

mod binding;
mod compile;
mod error;
mod parser;
mod schema;
mod syntax;

use std::borrow::Cow;

pub use binding::bind;
pub use compile::compile;
pub use error::{CommandError, CommandSyntaxError, CompileError, SNIPPET_CHARS, SyntaxErrorReason};
pub use parser::parse;
pub use schema::{
    Builtin, CommandSchema, DEFAULT_MODIFIERS, MacroParam, MacroSignature, MacroValues, ParamKind,
    SchemaError, VARIADIC_SUFFIX, ValueTable,
};
pub use syntax::{Argument, BoundParam, Call, Command, Modifier, Script, Term, Transformation, Unexpanded};

use crate::expr::{Expression, NameResolver};
use crate::ids::{ConstId, FuncId, VarId};

/// Parse `source` and lower it in one step.
///
/// # Errors
///
/// Returns [`CommandError`] when parsing or lowering fails.
pub fn compile_command(
    source: &str,
    schema: &CommandSchema,
    values: &mut dyn ValueTable,
) -> Result<Expression, CommandError> {
    let script = parse(source, schema, values)?;
    Ok(compile(&script, schema)?)
}

/// Resolves names of compiled command expressions for printing.
#[derive(Debug, Clone, Copy)]
pub struct CommandNames<'a> {
    /// Function table used for lowering.
    pub schema: &'a CommandSchema,
    /// Values interned while parsing.
    pub values: &'a MacroValues,
}

impl NameResolver for CommandNames<'_> {
    fn constant_name(&self, id: ConstId) -> Cow<'_, str> {
        self.values.string(id).map_or_else(
            || Cow::Owned(format!("c{}:{}", id.storage(), id.index())),
            |text| Cow::Owned(format!("{text:?}")),
        )
    }

    fn variable_name(&self, id: VarId) -> Cow<'_, str> {
        self.values
            .var_name(id)
            .map_or_else(|| Cow::Owned(format!("V{}", id.get())), Cow::Borrowed)
    }

    fn function_name(&self, id: FuncId) -> Cow<'_, str> {
        self.schema
            .function_name(id)
            .map_or_else(|| Cow::Owned(format!("f{}", id.index())), Cow::Borrowed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::expr::print;

    #[test]
    fn compiled_command_prints_with_names() {
        let mut schema = CommandSchema::default();
        schema
            .add_macro("CC", MacroSignature::new(&["SRC"], &[] as &[&str]).expect("sig"))
            .expect("declare");
        let mut values = MacroValues::new();
        let expr = compile_command("$CC($SRC) -c", &schema, &mut values).expect("compile");
        let mut out = String::new();
        print(
            &mut out,
            &expr,
            &CommandNames {
                schema: &schema,
                values: &values,
            },
        )
        .expect("print");
        assert_eq!(
            out,
            "Cmds(Args(Terms(CC(Args(Terms($SRC)))), Terms(\"-c\")))"
        );
    }
}
