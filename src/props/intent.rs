//! Propagation intents and property keys.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a graph walk propagates a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Induced dependencies such as parsed includes.
    InducedDeps,
    /// Properties used to build commands.
    CommandProps,
    /// Properties of modules.
    ModuleProps,
    /// Module discovery.
    GetModules,
}

/// A name that denotes no intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown intent `{name}`")]
pub struct UnknownIntent {
    name: String,
}

impl Intent {
    /// Every intent, in bit order.
    pub const ALL: [Self; 4] = [
        Self::InducedDeps,
        Self::CommandProps,
        Self::ModuleProps,
        Self::GetModules,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// One-letter label: `I`, `C`, `M` or `G`.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::InducedDeps => 'I',
            Self::CommandProps => 'C',
            Self::ModuleProps => 'M',
            Self::GetModules => 'G',
        }
    }

    /// Parse an intent name, accepting the short aliases `ParsedIncls`,
    /// `Cmd` and `Mod`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownIntent`] for any other name.
    pub fn from_name(name: &str) -> Result<Self, UnknownIntent> {
        match name {
            "InducedDeps" | "ParsedIncls" => Ok(Self::InducedDeps),
            "CommandProps" | "Cmd" => Ok(Self::CommandProps),
            "ModuleProps" | "Mod" => Ok(Self::ModuleProps),
            "GetModules" => Ok(Self::GetModules),
            _ => Err(UnknownIntent {
                name: name.to_owned(),
            }),
        }
    }

    const fn from_repr(repr: u64) -> Option<Self> {
        match repr {
            0 => Some(Self::InducedDeps),
            1 => Some(Self::CommandProps),
            2 => Some(Self::ModuleProps),
            3 => Some(Self::GetModules),
            _ => None,
        }
    }
}

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name)
    }
}

/// A set of intents.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u8);

impl Intents {
    /// The empty set.
    pub const NONE: Self = Self(0);
    /// Every intent.
    pub const ALL: Self = Self((1 << Intent::ALL.len()) - 1);

    /// A set holding `intents`.
    #[must_use]
    pub fn of(intents: &[Intent]) -> Self {
        intents.iter().fold(Self::NONE, |set, &intent| set.with(intent))
    }

    /// Whether `intent` is in the set.
    #[must_use]
    pub const fn has(self, intent: Intent) -> bool {
        self.0 & intent.bit() != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The set plus `intent`.
    #[must_use]
    pub const fn with(self, intent: Intent) -> Self {
        Self(self.0 | intent.bit())
    }

    /// The set minus every member of `other`.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Members in bit order.
    pub fn iter(self) -> impl Iterator<Item = Intent> {
        Intent::ALL.into_iter().filter(move |&intent| self.has(intent))
    }
}

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for Intents {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<Intent> for Intents {
    fn from(intent: Intent) -> Self {
        Self::NONE.with(intent)
    }
}

impl fmt::Display for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for intent in self.iter() {
            write!(f, "{}", intent.as_char())?;
        }
        f.write_str("]")
    }
}

impl fmt::Debug for Intents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Intents{self}")
    }
}

/// A property key: a symbol id from the caller's name table plus an intent.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyType(u64);

impl PropertyType {
    /// Key for symbol `symbol` under `intent`.
    #[must_use]
    pub const fn new(symbol: u32, intent: Intent) -> Self {
        Self((symbol as u64) << 16 | intent as u64)
    }

    /// Rebuild a key from [`PropertyType::repr`]; `None` when the intent
    /// bits are out of range.
    #[must_use]
    pub const fn from_repr(repr: u64) -> Option<Self> {
        match Intent::from_repr(repr & 0xFFFF) {
            Some(_) => Some(Self(repr)),
            None => None,
        }
    }

    /// Packed form.
    #[must_use]
    pub const fn repr(self) -> u64 {
        self.0
    }

    /// Symbol id.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "keys are only built from u32 symbols"
    )]
    pub const fn symbol(self) -> u32 {
        (self.0 >> 16) as u32
    }

    /// Intent.
    #[must_use]
    pub const fn intent(self) -> Intent {
        match Intent::from_repr(self.0 & 0xFFFF) {
            Some(intent) => intent,
            None => Intent::InducedDeps,
        }
    }

    /// Human label: the intent letter, a colon and the symbol name.
    #[must_use]
    pub fn label(self, name: &str) -> String {
        format!("{}:{name}", self.intent().as_char())
    }
}

impl fmt::Debug for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:#{}", self.intent().as_char(), self.symbol())
    }
}
