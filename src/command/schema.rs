//! Function tables and value interning for the command language.
//!
//! A [`CommandSchema`] assigns dense function indices: the four built-in
//! variadic functions come first, then modifiers and macros in the order
//! they are registered. Values met while parsing go through a
//! [`ValueTable`]; [`MacroValues`] is the reference implementation.

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::ids::{ConstId, FuncId, IdError, VarId};

/// Built-in variadic functions used by the lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Whole script: one argument per command.
    Cmds,
    /// One command: one argument per shell word.
    Args,
    /// One shell word: its adjacent pieces.
    Terms,
    /// A multi-piece modifier value.
    Cat,
}

impl Builtin {
    /// Every built-in, in index order.
    pub const ALL: [Self; 4] = [Self::Cmds, Self::Args, Self::Terms, Self::Cat];

    /// Function index of the built-in.
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Cmds => 0,
            Self::Args => 1,
            Self::Terms => 2,
            Self::Cat => 3,
        }
    }

    /// Display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cmds => "Cmds",
            Self::Args => "Args",
            Self::Terms => "Terms",
            Self::Cat => "Cat",
        }
    }

    /// The built-in with function index `index`, if any.
    #[must_use]
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.index() == index)
    }
}

/// Modifiers known to every schema, with the number of values each takes.
pub const DEFAULT_MODIFIERS: &[(&str, usize)] = &[
    ("hide", 0),
    ("clear", 0),
    ("input", 0),
    ("output", 0),
    ("tool", 0),
    ("pre", 1),
    ("suf", 1),
    ("quo", 0),
    ("noext", 0),
    ("lastext", 0),
    ("ext", 1),
    ("env", 0),
    ("kv", 0),
    ("msvs_source", 0),
    ("noauto", 0),
];

/// Errors raised while declaring modifiers and macros.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A modifier or macro name is declared twice.
    #[error("function `{name}` is already declared")]
    DuplicateFunction {
        /// Offending name.
        name: String,
    },
    /// A macro declares the same parameter twice.
    #[error("macro parameter `{name}` is declared twice")]
    DuplicateParameter {
        /// Offending parameter.
        name: String,
    },
    /// A variadic parameter is not the last one.
    #[error("variadic parameter `{name}` must be the last parameter")]
    VariadicNotLast {
        /// Offending parameter.
        name: String,
    },
    /// A keyword names no declared parameter, or names the variadic one.
    #[error("keyword `{name}` is not a plain parameter of the macro")]
    UnknownKeyword {
        /// Offending keyword.
        name: String,
    },
    /// A parameter name is empty or not an identifier.
    #[error("invalid parameter name `{name}`")]
    InvalidParameter {
        /// Offending parameter.
        name: String,
    },
    /// The function table cannot hold another entry.
    #[error("function table is full")]
    TableFull(#[from] IdError),
}

/// How a macro parameter receives its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Filled by position.
    Positional,
    /// Filled by the groups following its name.
    Keyword,
    /// Collects positional overflow; always the last parameter.
    Variadic,
}

/// One formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MacroParam {
    /// Parameter name without the variadic suffix.
    pub name: String,
    /// Binding mode.
    pub kind: ParamKind,
}

/// Ordered formal parameters of a macro.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MacroSignature {
    params: Vec<MacroParam>,
}

/// Suffix marking the variadic parameter.
pub const VARIADIC_SUFFIX: &str = "[]";

pub(crate) fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MacroSignature {
    /// Declare a signature from parameter names in order; `NAME[]` marks the
    /// variadic parameter, and every name listed in `keywords` becomes a
    /// keyword parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for duplicate or malformed names, a variadic
    /// parameter that is not last, or a keyword that names no plain
    /// parameter.
    ///
    /// # Examples
    /// ```rust
    /// use buildsig::command::{MacroSignature, ParamKind};
    ///
    /// let sig = MacroSignature::new(&["SRC", "OUT", "FLAGS[]"], &["OUT"]).expect("valid");
    /// let kinds: Vec<_> = sig.params().iter().map(|p| p.kind).collect();
    /// assert_eq!(kinds, [ParamKind::Positional, ParamKind::Keyword, ParamKind::Variadic]);
    /// ```
    pub fn new<P, K>(params: &[P], keywords: &[K]) -> Result<Self, SchemaError>
    where
        P: AsRef<str>,
        K: AsRef<str>,
    {
        let mut declared: Vec<MacroParam> = Vec::with_capacity(params.len());
        for (position, raw) in params.iter().enumerate() {
            let raw = raw.as_ref();
            let (name, kind) = match raw.strip_suffix(VARIADIC_SUFFIX) {
                Some(name) => {
                    if position + 1 != params.len() {
                        return Err(SchemaError::VariadicNotLast { name: name.into() });
                    }
                    (name, ParamKind::Variadic)
                }
                None => (raw, ParamKind::Positional),
            };
            if !is_identifier(name) {
                return Err(SchemaError::InvalidParameter { name: raw.into() });
            }
            if declared.iter().any(|param| param.name == name) {
                return Err(SchemaError::DuplicateParameter { name: name.into() });
            }
            declared.push(MacroParam {
                name: name.into(),
                kind,
            });
        }
        for keyword in keywords {
            let keyword = keyword.as_ref();
            let param = declared
                .iter_mut()
                .find(|param| param.name == keyword && param.kind != ParamKind::Variadic)
                .ok_or_else(|| SchemaError::UnknownKeyword {
                    name: keyword.into(),
                })?;
            param.kind = ParamKind::Keyword;
        }
        Ok(Self { params: declared })
    }

    /// Formal parameters in declaration order.
    #[must_use]
    pub fn params(&self) -> &[MacroParam] {
        &self.params
    }

    /// Slot of keyword parameter `name`.
    #[must_use]
    pub fn keyword_slot(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|param| param.kind == ParamKind::Keyword && param.name == name)
    }

    /// Slots of positional parameters, in order.
    pub fn positional_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.kind == ParamKind::Positional)
            .map(|(slot, _)| slot)
    }

    /// Slot of the variadic parameter, when declared.
    #[must_use]
    pub fn variadic_slot(&self) -> Option<usize> {
        self.params
            .iter()
            .position(|param| param.kind == ParamKind::Variadic)
    }
}

#[derive(Debug, Clone)]
struct MacroEntry {
    func: FuncId,
    signature: MacroSignature,
}

/// Modifier and macro declarations with their function ids.
#[derive(Debug, Clone)]
pub struct CommandSchema {
    modifiers: IndexMap<String, FuncId>,
    macros: IndexMap<String, MacroEntry>,
    next_index: u32,
}

impl Default for CommandSchema {
    fn default() -> Self {
        let mut schema = Self::empty();
        for &(name, values) in DEFAULT_MODIFIERS {
            // A fresh schema holds far fewer entries than the index budget.
            if let Err(err) = schema.add_modifier(name, values) {
                tracing::error!(%err, name, "default modifier rejected");
            }
        }
        schema
    }
}

impl CommandSchema {
    /// A schema with the built-ins only.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            modifiers: IndexMap::new(),
            macros: IndexMap::new(),
            next_index: u32::try_from(Builtin::ALL.len()).unwrap_or(u32::MAX),
        }
    }

    fn allocate(&mut self, name: &str, arity: usize) -> Result<FuncId, SchemaError> {
        if self.modifiers.contains_key(name) || self.macros.contains_key(name) {
            return Err(SchemaError::DuplicateFunction { name: name.into() });
        }
        let func = FuncId::new(self.next_index, arity)?;
        self.next_index += 1;
        Ok(func)
    }

    /// Declare a modifier taking `values` values.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the name is taken or the table is full.
    pub fn add_modifier(&mut self, name: &str, values: usize) -> Result<FuncId, SchemaError> {
        let func = self.allocate(name, values + 1)?;
        self.modifiers.insert(name.into(), func);
        Ok(func)
    }

    /// Declare a macro.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when the name is taken or the table is full.
    pub fn add_macro(
        &mut self,
        name: &str,
        signature: MacroSignature,
    ) -> Result<FuncId, SchemaError> {
        let func = self.allocate(name, signature.params().len())?;
        self.macros
            .insert(name.into(), MacroEntry { func, signature });
        Ok(func)
    }

    /// Function id of a built-in, with arity zero until a call patches it.
    #[must_use]
    pub fn builtin(&self, builtin: Builtin) -> FuncId {
        FuncId::from_repr(builtin.index())
    }

    /// Function id of modifier `name`.
    #[must_use]
    pub fn modifier(&self, name: &str) -> Option<FuncId> {
        self.modifiers.get(name).copied()
    }

    /// Function id and signature of macro `name`.
    #[must_use]
    pub fn macro_signature(&self, name: &str) -> Option<(FuncId, &MacroSignature)> {
        self.macros
            .get(name)
            .map(|entry| (entry.func, &entry.signature))
    }

    /// Name of the function with the index of `func`.
    #[must_use]
    pub fn function_name(&self, func: FuncId) -> Option<&str> {
        let index = func.index();
        if let Some(builtin) = Builtin::from_index(index) {
            return Some(builtin.name());
        }
        self.modifiers
            .iter()
            .find(|(_, id)| id.index() == index)
            .map(|(name, _)| name.as_str())
            .or_else(|| {
                self.macros
                    .iter()
                    .find(|(_, entry)| entry.func.index() == index)
                    .map(|(name, _)| name.as_str())
            })
    }

    /// Declared macro names, in registration order.
    pub fn macro_names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }
}

/// Interns the strings and variable names found while parsing.
pub trait ValueTable {
    /// Constant for a literal string.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when the table cannot hold another string.
    fn insert_str(&mut self, text: &str) -> Result<ConstId, IdError>;

    /// Identifier of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when the table cannot hold another variable.
    fn insert_var(&mut self, name: &str) -> Result<VarId, IdError>;
}

/// In-memory [`ValueTable`] keeping strings and variable names in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct MacroValues {
    strings: IndexSet<String>,
    vars: IndexSet<String>,
}

impl MacroValues {
    /// Storage class of interned strings.
    pub const STRING_STORAGE: u32 = 1;

    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of an interned string constant.
    #[must_use]
    pub fn string(&self, id: ConstId) -> Option<&str> {
        if id.storage() != Self::STRING_STORAGE {
            return None;
        }
        self.strings
            .get_index(id.index() as usize)
            .map(String::as_str)
    }

    /// Name of an interned variable.
    #[must_use]
    pub fn var_name(&self, id: VarId) -> Option<&str> {
        self.vars.get_index(id.get() as usize).map(String::as_str)
    }

    /// Interned strings with their constants, in insertion order.
    pub fn strings(&self) -> impl Iterator<Item = (ConstId, &str)> {
        self.strings.iter().enumerate().filter_map(|(index, text)| {
            ConstId::new(Self::STRING_STORAGE, dense_index(index))
                .ok()
                .map(|id| (id, text.as_str()))
        })
    }

    /// Interned variable names, in insertion order.
    pub fn var_names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(String::as_str)
    }

    /// Identifier of an already interned variable.
    #[must_use]
    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.vars
            .get_index_of(name)
            .and_then(|index| u32::try_from(index).ok())
            .and_then(|index| VarId::new(index).ok())
    }
}

fn dense_index(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

impl ValueTable for MacroValues {
    fn insert_str(&mut self, text: &str) -> Result<ConstId, IdError> {
        let index = match self.strings.get_index_of(text) {
            Some(index) => index,
            None => {
                ConstId::new(Self::STRING_STORAGE, dense_index(self.strings.len()))?;
                self.strings.insert_full(text.into()).0
            }
        };
        ConstId::new(Self::STRING_STORAGE, dense_index(index))
    }

    fn insert_var(&mut self, name: &str) -> Result<VarId, IdError> {
        let index = match self.vars.get_index_of(name) {
            Some(index) => index,
            None => {
                VarId::new(dense_index(self.vars.len()))?;
                self.vars.insert_full(name.into()).0
            }
        };
        VarId::new(dense_index(index))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use rstest::rstest;

    #[test]
    fn builtins_precede_declared_functions() {
        let mut schema = CommandSchema::empty();
        let pre = schema.add_modifier("pre", 1).expect("declare");
        let cc = schema
            .add_macro("CC", MacroSignature::new(&["SRC"], &[] as &[&str]).expect("sig"))
            .expect("declare");
        assert_eq!((pre.index(), pre.arity()), (4, 2));
        assert_eq!((cc.index(), cc.arity()), (5, 1));
        assert_eq!(schema.function_name(cc), Some("CC"));
        assert_eq!(schema.function_name(schema.builtin(Builtin::Terms)), Some("Terms"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut schema = CommandSchema::default();
        assert_eq!(
            schema.add_modifier("pre", 1),
            Err(SchemaError::DuplicateFunction { name: "pre".into() })
        );
    }

    #[rstest]
    #[case(&["A[]", "B"], &[], SchemaError::VariadicNotLast { name: "A".into() })]
    #[case(&["A", "A"], &[], SchemaError::DuplicateParameter { name: "A".into() })]
    #[case(&["A", "B[]"], &["B"], SchemaError::UnknownKeyword { name: "B".into() })]
    #[case(&["A", "1x"], &[], SchemaError::InvalidParameter { name: "1x".into() })]
    fn malformed_signatures_are_rejected(
        #[case] params: &[&str],
        #[case] keywords: &[&str],
        #[case] expected: SchemaError,
    ) {
        assert_eq!(MacroSignature::new(params, keywords), Err(expected));
    }

    #[test]
    fn values_are_interned_once() {
        let mut values = MacroValues::new();
        let a = values.insert_str("a.c").expect("fits");
        let b = values.insert_str("b.c").expect("fits");
        assert_eq!(values.insert_str("a.c").expect("fits"), a);
        assert_ne!(a, b);
        assert_eq!(values.string(b), Some("b.c"));
        let var = values.insert_var("SRC").expect("fits");
        assert_eq!(values.var_id("SRC"), Some(var));
        assert_eq!(values.var_name(var), Some("SRC"));
    }
}
