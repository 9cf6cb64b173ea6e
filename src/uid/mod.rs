//! Content-addressed node identities.
//!
//! [`HashValue`] is the streaming primitive, [`NodeHashes`] groups the
//! accumulators of one node under a [`Profile`] and [`CycleUids`] gives a
//! single identity to a dependency cycle.
//!
//! ```
//! use buildsig::diagnostics::{DISABLED, DebugNodeId};
//! use buildsig::uid::{EdgeKind, NodeHashes, Profile};
//!
//! let mut lib = NodeHashes::new(Profile::StructureContent, DebugNodeId::new("lib.a", None), &DISABLED);
//! lib.add_command(b"ar rcs lib.a a.o");
//! let lib = lib.finish();
//!
//! let mut app = NodeHashes::new(Profile::StructureContent, DebugNodeId::new("app", None), &DISABLED);
//! app.add_command(b"ld -o app lib.a");
//! app.pass_dependency(EdgeKind::Input, DebugNodeId::new("lib.a", None), &lib);
//! assert!(!app.finish().full_uid().is_empty());
//! ```

mod cycle;
mod profile;
mod signature;
mod value;

pub use cycle::{CycleHasher, CycleMember, CycleUids};
pub use profile::{
    ContextSignatures, Dependency, EdgeKind, NodeHashes, NodeSignatures, Profile, SplitSignatures,
};
pub use signature::{HashSignature, SIGNATURE_LEN, SignatureParseError};
pub use value::{HashValue, combine};
