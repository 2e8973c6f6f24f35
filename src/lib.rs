//! Legacy IR lowering for GraphQL code generation.
//!
//! This crate takes a typed, polymorphism-aware compiler IR (operations and
//! fragments resolved against a schema, with selection sets annotated by the
//! concrete object types they can resolve to) and lowers it into the flattened
//! shape that older code generators consume.
//!
//! The interesting work is polymorphism flattening: a selection set on an
//! interface or union exposes different field sets depending on which concrete
//! type matches at runtime. The lowering materializes that variability as one
//! inline fragment per concrete type, drops the ones that are redundant with
//! the default case, and re-attaches which named fragments are visible at each
//! level of narrowing.
//!
//! ## Pipeline position
//!
//! ```text
//! Document + Schema
//!   -> [compiler] CompilerContext
//!   -> [legacy_ir] LegacyCompilerContext
//!   -> downstream generators
//! ```
//!
//! The whole transformation is a pure, synchronous tree walk: the upstream
//! context is never mutated, every operation and fragment is transformed
//! independently, and the output is an immutable snapshot.

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod compiler;
mod display_helpers;
pub mod error;
pub mod legacy_ir;
pub mod schema;

pub use crate::compiler::CompilerContext;
pub use crate::compiler::CompilerOptions;
pub use crate::error::LegacyIrError;
pub use crate::legacy_ir::LegacyCompilerContext;
pub use crate::legacy_ir::transform_to_legacy_ir;
pub use crate::schema::CompilerSchema;
