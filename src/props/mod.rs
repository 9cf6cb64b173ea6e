//! Induced properties: per-node lists of target nodes, keyed by
//! [`PropertyType`] and propagated along graph edges according to
//! [`Intents`].
//!
//! Tables sit behind a reference-counted handle. Propagating a child's
//! table unchanged to a parent shares it; the first write that would change
//! a shared table copies it first.
//!
//! ```
//! use buildsig::diagnostics::{AdditionType, DISABLED, DebugNodeId};
//! use buildsig::props::{Intent, Intents, NodeProperties, PropertyType};
//!
//! let incl = PropertyType::new(7, Intent::InducedDeps);
//! let mut header = NodeProperties::new(DebugNodeId::new("a.h", None), &DISABLED);
//! header.add_one(incl, 11, AdditionType::Created);
//!
//! let mut source = NodeProperties::new(DebugNodeId::new("a.c", None), &DISABLED);
//! source.copy_from(&header, Intents::ALL, None);
//! assert!(source.shares_with(&header));
//!
//! source.add_one(incl, 12, AdditionType::FromNode);
//! assert_eq!(*header.get(incl), [11]);
//! assert_eq!(*source.get(incl), [11, 12]);
//! ```

mod intent;
mod table;

pub use intent::{Intent, Intents, PropertyType, UnknownIntent};
pub use table::{InducedProps, NodeProperties, PropertyValues, TargetId};
