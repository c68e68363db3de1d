//! The asynchronous pipeline core.
//!
//! [`step::Step`] is the unit of work, [`pipeline::Pipeline`] chains steps over
//! a record, and the remaining modules are combinators built on top of it.

pub mod combinators;
pub mod contract;
pub mod page;
pub mod params;
pub mod pipeline;
pub mod retry;
pub mod series;
pub mod step;
