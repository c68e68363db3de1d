//! Pure, deterministic helpers shared by the pipeline core.
//!
//! Nothing in here performs I/O. Functions operate on in-memory records and
//! values and are safe to call from any step.

pub mod coerce;
pub mod hash;
pub mod id;
pub mod net;
pub mod predicate;
pub mod record;
pub mod shape;
pub mod text;
pub mod validate;
