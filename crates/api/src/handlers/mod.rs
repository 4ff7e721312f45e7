pub mod posts;
pub mod tasks;
pub mod templates;
