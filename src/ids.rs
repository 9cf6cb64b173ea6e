//! Dense identifiers for constants, variables and functions.
//!
//! Every identifier packs into the 29-bit payload of an expression node, so
//! the constructors reject anything that would not survive that packing.
//!
//! ```
//! use buildsig::ids::{ConstId, FuncId};
//!
//! let string = ConstId::new(1, 42).expect("fits");
//! assert_eq!((string.storage(), string.index()), (1, 42));
//!
//! let cat = FuncId::new(3, 2).expect("fits");
//! assert_eq!((cat.index(), cat.arity()), (3, 2));
//! assert!(FuncId::new(FuncId::MAX_INDEX + 1, 0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of the payload shared by all node kinds.
pub const PAYLOAD_BITS: u32 = 29;
/// Mask selecting the payload bits.
pub const PAYLOAD_MASK: u32 = (1 << PAYLOAD_BITS) - 1;

const CONST_INDEX_BITS: u32 = 25;
const CONST_STORAGE_BITS: u32 = 4;
const FUNC_INDEX_BITS: u32 = 13;
const FUNC_ARITY_BITS: u32 = 16;

/// Errors raised when an identifier does not fit its bit budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdError {
    /// The storage class of a constant exceeds four bits.
    #[error("constant storage class {storage} exceeds {max}")]
    StorageOverflow {
        /// Requested storage class.
        storage: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// The index of a constant, variable or function exceeds its budget.
    #[error("index {index} exceeds {max}")]
    IndexOverflow {
        /// Requested index.
        index: u32,
        /// Largest accepted value.
        max: u32,
    },
    /// The arity of a function exceeds sixteen bits.
    #[error("arity {arity} exceeds {max}")]
    ArityOverflow {
        /// Requested arity.
        arity: usize,
        /// Largest accepted value.
        max: usize,
    },
}

/// Identifier of a constant held in one of the caller's value tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstId(u32);

impl ConstId {
    /// Largest storage class.
    pub const MAX_STORAGE: u32 = (1 << CONST_STORAGE_BITS) - 1;
    /// Largest index inside one storage class.
    pub const MAX_INDEX: u32 = (1 << CONST_INDEX_BITS) - 1;

    /// Pack a storage class and an index.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when either component exceeds its budget.
    pub fn new(storage: u32, index: u32) -> Result<Self, IdError> {
        if storage > Self::MAX_STORAGE {
            return Err(IdError::StorageOverflow {
                storage,
                max: Self::MAX_STORAGE,
            });
        }
        if index > Self::MAX_INDEX {
            return Err(IdError::IndexOverflow {
                index,
                max: Self::MAX_INDEX,
            });
        }
        Ok(Self(storage << CONST_INDEX_BITS | index))
    }

    /// Rebuild an identifier from its packed form.
    #[must_use]
    pub const fn from_repr(repr: u32) -> Self {
        Self(repr & PAYLOAD_MASK)
    }

    /// The packed form stored in expression nodes.
    #[must_use]
    pub const fn repr(self) -> u32 {
        self.0
    }

    /// Storage class selecting the value table.
    #[must_use]
    pub const fn storage(self) -> u32 {
        self.0 >> CONST_INDEX_BITS
    }

    /// Index inside the value table.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::MAX_INDEX
    }
}

/// Opaque variable identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarId(u32);

impl VarId {
    /// Largest identifier that still packs into a node.
    pub const MAX: u32 = PAYLOAD_MASK;

    /// Build a variable identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::IndexOverflow`] when `id` exceeds [`VarId::MAX`].
    pub const fn new(id: u32) -> Result<Self, IdError> {
        if id > Self::MAX {
            return Err(IdError::IndexOverflow {
                index: id,
                max: Self::MAX,
            });
        }
        Ok(Self(id))
    }

    pub(crate) const fn from_repr(repr: u32) -> Self {
        Self(repr & PAYLOAD_MASK)
    }

    /// Raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for VarId {
    type Error = IdError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Identifier of a callable function together with its fixed arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuncId(u32);

impl FuncId {
    /// Largest function index.
    pub const MAX_INDEX: u32 = (1 << FUNC_INDEX_BITS) - 1;
    /// Largest arity.
    pub const MAX_ARITY: usize = (1 << FUNC_ARITY_BITS) - 1;

    /// Pack a function index and an arity.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] when the index or the arity exceeds its budget.
    pub fn new(index: u32, arity: usize) -> Result<Self, IdError> {
        if index > Self::MAX_INDEX {
            return Err(IdError::IndexOverflow {
                index,
                max: Self::MAX_INDEX,
            });
        }
        let packed_arity = u32::try_from(arity)
            .ok()
            .filter(|a| *a as usize <= Self::MAX_ARITY)
            .ok_or(IdError::ArityOverflow {
                arity,
                max: Self::MAX_ARITY,
            })?;
        Ok(Self(packed_arity << FUNC_INDEX_BITS | index))
    }

    /// Rebuild an identifier from its packed form.
    #[must_use]
    pub const fn from_repr(repr: u32) -> Self {
        Self(repr & PAYLOAD_MASK)
    }

    /// The packed form stored in expression nodes.
    #[must_use]
    pub const fn repr(self) -> u32 {
        self.0
    }

    /// Function index, independent of arity.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 & Self::MAX_INDEX
    }

    /// Number of arguments the function consumes.
    #[must_use]
    pub const fn arity(self) -> usize {
        (self.0 >> FUNC_INDEX_BITS) as usize
    }

    /// The same function with a different arity.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::ArityOverflow`] when `arity` exceeds sixteen bits.
    pub fn with_arity(self, arity: usize) -> Result<Self, IdError> {
        Self::new(self.index(), arity)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0)]
    #[case(1, 7)]
    #[case(ConstId::MAX_STORAGE, ConstId::MAX_INDEX)]
    fn const_id_packs_components(#[case] storage: u32, #[case] index: u32) {
        let id = ConstId::new(storage, index).expect("fits");
        assert_eq!(id.storage(), storage);
        assert_eq!(id.index(), index);
        assert_eq!(ConstId::from_repr(id.repr()), id);
        assert!(id.repr() <= PAYLOAD_MASK);
    }

    #[test]
    fn const_id_rejects_overflow() {
        assert!(matches!(
            ConstId::new(ConstId::MAX_STORAGE + 1, 0),
            Err(IdError::StorageOverflow { .. })
        ));
        assert!(matches!(
            ConstId::new(0, ConstId::MAX_INDEX + 1),
            Err(IdError::IndexOverflow { .. })
        ));
    }

    #[test]
    fn func_id_rejects_overflow() {
        assert!(matches!(
            FuncId::new(FuncId::MAX_INDEX + 1, 0),
            Err(IdError::IndexOverflow { .. })
        ));
        assert!(matches!(
            FuncId::new(0, FuncId::MAX_ARITY + 1),
            Err(IdError::ArityOverflow { .. })
        ));
    }

    #[test]
    fn func_id_keeps_index_when_arity_changes() {
        let id = FuncId::new(12, 0).expect("fits");
        let wider = id.with_arity(FuncId::MAX_ARITY).expect("fits");
        assert_eq!(wider.index(), 12);
        assert_eq!(wider.arity(), FuncId::MAX_ARITY);
        assert!(wider.repr() <= PAYLOAD_MASK);
    }

    #[test]
    fn var_id_bounds() {
        assert!(VarId::new(VarId::MAX).is_ok());
        assert!(VarId::try_from(VarId::MAX + 1).is_err());
    }
}
