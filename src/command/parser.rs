//! Character-walking parser for the command language.
//!
//! Grammar, informally:
//!
//! ```text
//! script   := command ( "&&" command )*
//! command  := word ( whitespace word )*
//! word     := piece+                       adjacent pieces concatenate
//! piece    := literal | 'quoted' | "quoted" | $NAME | $NAME(args) | ${subst}
//! args     := word ( (whitespace | ",") word )*
//! subst    := [ modifier ( (whitespace | ";") modifier )* ":" ] body
//! modifier := KEY [ (":" | "=") value ( "," value )* ]
//! ```
//!
//! The body of a substitution starts after the last top-level `:`. Macro
//! calls are bound to their signatures as soon as they close, so the
//! returned tree holds no parser placeholders.

use super::binding::bind;
use super::error::{CommandSyntaxError, SyntaxErrorReason};
use super::schema::{CommandSchema, ValueTable, is_identifier};
use super::syntax::{Argument, Command, Modifier, Script, Term, Transformation, Unexpanded};

/// Parse `source` into a syntax tree, interning values into `values`.
///
/// # Errors
///
/// Returns [`CommandSyntaxError`] with the offending span for malformed
/// quoting or escapes, unknown macros and modifiers, wrong modifier value
/// counts and positional overflow in macro calls.
///
/// # Examples
/// ```rust
/// use buildsig::command::{CommandSchema, MacroValues, parse};
///
/// let mut values = MacroValues::new();
/// let script = parse("cc -c $SRC && ar rcs lib.a", &CommandSchema::default(), &mut values)
///     .expect("parse");
/// assert_eq!(script.commands.len(), 2);
/// assert_eq!(script.commands[0].args.len(), 3);
/// ```
pub fn parse(
    source: &str,
    schema: &CommandSchema,
    values: &mut dyn ValueTable,
) -> Result<Script, CommandSyntaxError> {
    let mut parser = Parser {
        source,
        chars: source.char_indices().collect(),
        pos: 0,
        end: 0,
        schema,
        values,
    };
    parser.end = parser.chars.len();
    let script = parser.script()?;
    tracing::trace!(commands = script.commands.len(), "parsed command");
    Ok(script)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    /// A word of a command.
    Top,
    /// A word inside `$NAME(...)`.
    Call,
    /// A modifier value inside `${...}`.
    Value,
    /// The body of `${...}`.
    Body,
}

impl Context {
    fn stops_at(self, ch: char) -> bool {
        if ch.is_whitespace() {
            return true;
        }
        match self {
            Self::Top | Self::Body => false,
            Self::Call => matches!(ch, ',' | ')'),
            Self::Value => matches!(ch, ',' | ';'),
        }
    }
}

/// Pieces of the word being parsed; adjacent literal text is merged.
struct Word {
    terms: Vec<Term>,
    text: Option<String>,
    bare: bool,
}

impl Word {
    const fn new() -> Self {
        Self {
            terms: Vec::new(),
            text: None,
            bare: true,
        }
    }

    fn push_char(&mut self, ch: char) {
        self.text.get_or_insert_with(String::new).push(ch);
    }

    fn flush(&mut self, values: &mut dyn ValueTable) -> Result<(), SyntaxErrorReason> {
        if let Some(text) = self.text.take() {
            let id = values.insert_str(&text)?;
            self.terms.push(Term::Const { id });
        }
        Ok(())
    }

    fn push_term(&mut self, term: Term, values: &mut dyn ValueTable) -> Result<(), SyntaxErrorReason> {
        self.flush(values)?;
        self.terms.push(term);
        Ok(())
    }

    const fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.text.is_none()
    }

    fn finish(
        mut self,
        context: Context,
        values: &mut dyn ValueTable,
    ) -> Result<Argument, SyntaxErrorReason> {
        if context == Context::Call
            && self.bare
            && self.terms.is_empty()
            && let Some(text) = self.text.take_if(|text| is_identifier(text))
        {
            return Ok(Argument::single(Term::IdOrString { word: text }));
        }
        self.flush(values)?;
        Ok(Argument { terms: self.terms })
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    /// Current position, in characters.
    pos: usize,
    /// Exclusive limit of the region being parsed, in characters.
    end: usize,
    schema: &'a CommandSchema,
    values: &'a mut dyn ValueTable,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.peek_at(self.pos)
    }

    fn peek_at(&self, pos: usize) -> Option<char> {
        if pos < self.end {
            self.chars.get(pos).map(|&(_, ch)| ch)
        } else {
            None
        }
    }

    fn offset(&self, pos: usize) -> usize {
        self.chars
            .get(pos)
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn error(&self, from: usize, to: usize, reason: SyntaxErrorReason) -> CommandSyntaxError {
        let start = self.offset(from);
        let stop = self.offset(to.max(from + 1));
        CommandSyntaxError::new(self.source, start, stop.saturating_sub(start), reason)
    }

    fn at_error(&self, reason: SyntaxErrorReason) -> CommandSyntaxError {
        self.error(self.pos, self.pos + 1, reason)
    }

    fn skip_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn at_separator(&self) -> bool {
        self.peek() == Some('&') && self.peek_at(self.pos + 1) == Some('&')
    }

    fn script(&mut self) -> Result<Script, CommandSyntaxError> {
        let mut script = Script::default();
        let mut command = Command::default();
        loop {
            self.skip_while(char::is_whitespace);
            if self.peek().is_none() {
                break;
            }
            if self.at_separator() {
                if command.args.is_empty() {
                    return Err(self.at_error(SyntaxErrorReason::UnexpectedChar { found: '&' }));
                }
                script.commands.push(std::mem::take(&mut command));
                self.pos += 2;
                continue;
            }
            command.args.push(self.word(Context::Top)?);
        }
        if command.args.is_empty() {
            if !script.commands.is_empty() {
                // A trailing `&&` has nothing to separate.
                let at = self.end.saturating_sub(1);
                return Err(self.error(at, at + 1, SyntaxErrorReason::UnexpectedChar { found: '&' }));
            }
        } else {
            script.commands.push(command);
        }
        Ok(script)
    }

    fn word(&mut self, context: Context) -> Result<Argument, CommandSyntaxError> {
        let start = self.pos;
        let mut word = Word::new();
        while let Some(ch) = self.peek() {
            if context.stops_at(ch) {
                break;
            }
            match ch {
                '\'' | '"' => self.quoted(ch, &mut word)?,
                '$' => {
                    let term = self.dollar(context != Context::Value && context != Context::Body)?;
                    word.bare = false;
                    self.push(&mut word, term, start)?;
                }
                '\\' => {
                    self.escape(&mut word)?;
                }
                _ => {
                    word.push_char(ch);
                    self.pos += 1;
                }
            }
        }
        word.finish(context, &mut *self.values)
            .map_err(|reason| self.error(start, self.pos, reason))
    }

    fn push(&mut self, word: &mut Word, term: Term, start: usize) -> Result<(), CommandSyntaxError> {
        word.push_term(term, &mut *self.values)
            .map_err(|reason| self.error(start, self.pos, reason))
    }

    fn escape(&mut self, word: &mut Word) -> Result<(), CommandSyntaxError> {
        let Some(next) = self.peek_at(self.pos + 1) else {
            return Err(self.at_error(SyntaxErrorReason::IncompleteEscape));
        };
        if !matches!(next, '\'' | '"' | '\\' | '/') {
            word.push_char('\\');
        }
        word.push_char(next);
        word.bare = false;
        self.pos += 2;
        Ok(())
    }

    fn quoted(&mut self, quote: char, word: &mut Word) -> Result<(), CommandSyntaxError> {
        let start = self.pos;
        self.pos += 1;
        word.bare = false;
        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error(start, self.pos, SyntaxErrorReason::UnterminatedQuote { quote }));
            };
            match ch {
                _ if ch == quote => {
                    self.pos += 1;
                    // An empty quoted string still yields a piece.
                    if word.is_empty() {
                        word.text = Some(String::new());
                    }
                    return Ok(());
                }
                '\\' => self.escape(word)?,
                '$' => {
                    let term = self.dollar(false)?;
                    self.push(word, term, start)?;
                }
                _ => {
                    word.push_char(ch);
                    self.pos += 1;
                }
            }
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            self.skip_while(|c| c.is_ascii_alphanumeric() || c == '_');
        }
        self.chars
            .get(start..self.pos)
            .map(|chars| chars.iter().map(|&(_, ch)| ch).collect())
            .unwrap_or_default()
    }

    /// `$NAME`, `$NAME(...)` or `${...}`, starting at the `$`.
    fn dollar(&mut self, allow_call: bool) -> Result<Term, CommandSyntaxError> {
        let start = self.pos;
        self.pos += 1;
        if self.peek() == Some('{') {
            return self.substitution(start);
        }
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error(start, self.pos, SyntaxErrorReason::EmptyVariableName));
        }
        if allow_call && self.peek() == Some('(') {
            return self.call(name, start);
        }
        let id = self
            .values
            .insert_var(&name)
            .map_err(|err| self.error(start, self.pos, err.into()))?;
        Ok(Term::Var { id })
    }

    fn call(&mut self, name: String, start: usize) -> Result<Term, CommandSyntaxError> {
        let name_end = self.pos;
        self.pos += 1;
        let mut args = Vec::new();
        loop {
            self.skip_while(|c| c.is_whitespace() || c == ',');
            match self.peek() {
                None => {
                    return Err(self.error(start, self.pos, SyntaxErrorReason::UnterminatedCall));
                }
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => args.push(self.word(Context::Call)?),
            }
        }
        let Some((_, signature)) = self.schema.macro_signature(&name) else {
            return Err(self.error(start, name_end, SyntaxErrorReason::UnknownMacro { name }));
        };
        let call = bind(Unexpanded { name, args }, signature, &mut *self.values)
            .map_err(|reason| self.error(start, self.pos, reason))?;
        Ok(Term::Call(call))
    }

    /// Position of the closing `}` of the substitution whose content starts
    /// at the current position, and of the last top-level `:` before it.
    fn substitution_bounds(&self) -> Option<(usize, Option<usize>)> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut colon = None;
        let mut pos = self.pos;
        while let Some(ch) = self.peek_at(pos) {
            match (quote, ch) {
                (_, '\\') => pos += 1,
                (Some(q), _) if ch == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(ch),
                (None, '$') if self.peek_at(pos + 1) == Some('{') => {
                    depth += 1;
                    pos += 1;
                }
                (None, '}') if depth == 0 => return Some((pos, colon)),
                (None, '}') => depth -= 1,
                (None, ':') if depth == 0 => colon = Some(pos),
                (None, _) => {}
            }
            pos += 1;
        }
        None
    }

    /// `${...}`, starting at the `$`.
    fn substitution(&mut self, start: usize) -> Result<Term, CommandSyntaxError> {
        self.pos += 1;
        let Some((close, colon)) = self.substitution_bounds() else {
            return Err(self.error(start, self.end, SyntaxErrorReason::UnterminatedSubstitution));
        };
        let outer_end = self.end;

        let mut modifiers = Vec::new();
        if let Some(colon) = colon {
            self.end = colon;
            let parsed = self.modifiers(&mut modifiers);
            self.end = outer_end;
            parsed?;
            self.pos = colon + 1;
        }

        self.end = close;
        let body = self.body(start);
        self.end = outer_end;
        let body = body?;
        self.pos = close + 1;

        if modifiers.is_empty()
            && let [Term::Var { id }] = body.as_slice()
        {
            return Ok(Term::Var { id: *id });
        }
        Ok(Term::Transformation(Transformation { modifiers, body }))
    }

    fn modifiers(&mut self, out: &mut Vec<Modifier>) -> Result<(), CommandSyntaxError> {
        loop {
            self.skip_while(|c| c.is_whitespace() || c == ';');
            let Some(ch) = self.peek() else {
                return Ok(());
            };
            let key_start = self.pos;
            self.skip_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if self.pos == key_start {
                return Err(self.at_error(SyntaxErrorReason::UnexpectedChar { found: ch }));
            }
            let key_end = self.pos;
            let name: String = self
                .chars
                .get(key_start..key_end)
                .map(|chars| chars.iter().map(|&(_, c)| c).collect())
                .unwrap_or_default();

            let mut values = Vec::new();
            if matches!(self.peek(), Some(':' | '=')) {
                self.pos += 1;
                loop {
                    values.push(self.word(Context::Value)?.terms);
                    if self.peek() == Some(',') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }

            let Some(func) = self.schema.modifier(&name) else {
                return Err(self.error(key_start, key_end, SyntaxErrorReason::UnknownModifier { name }));
            };
            let expected = func.arity().saturating_sub(1);
            if values.len() != expected {
                return Err(self.error(
                    key_start,
                    self.pos,
                    SyntaxErrorReason::ModifierArity {
                        name,
                        expected,
                        given: values.len(),
                    },
                ));
            }
            out.push(Modifier { name, values });
        }
    }

    fn body(&mut self, start: usize) -> Result<Vec<Term>, CommandSyntaxError> {
        self.skip_while(char::is_whitespace);
        let body_start = self.pos;
        let name = self.identifier();
        self.skip_while(char::is_whitespace);
        if !name.is_empty() && self.peek().is_none() {
            let id = self
                .values
                .insert_var(&name)
                .map_err(|err| self.error(body_start, self.pos, err.into()))?;
            return Ok(vec![Term::Var { id }]);
        }
        self.pos = body_start;
        let word = self.word(Context::Body)?;
        self.skip_while(char::is_whitespace);
        if let Some(found) = self.peek() {
            return Err(self.at_error(SyntaxErrorReason::UnexpectedChar { found }));
        }
        if word.terms.is_empty() {
            return Err(self.error(start, self.end, SyntaxErrorReason::EmptyVariableName));
        }
        Ok(word.terms)
    }
}
