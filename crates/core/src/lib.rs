//! Task feed domain logic.
//!
//! Pure types and functions with no I/O: form schema and typed values,
//! template validation, workflow rule evaluation, the department task state
//! machine, and the post rollup.

pub mod department;
pub mod dispatch;
pub mod error;
pub mod form;
pub mod post;
pub mod rules;
pub mod seed;
pub mod task;
pub mod template;
pub mod types;
