//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept any `PgExecutor` as the first argument, so the same query runs
//! against `&PgPool` or inside a transaction via `&mut *tx`.

pub mod department_task_repo;
pub mod form_link_repo;
pub mod post_repo;
pub mod rule_dispatch_repo;
pub mod template_repo;

pub use department_task_repo::DepartmentTaskRepo;
pub use form_link_repo::FormLinkRepo;
pub use post_repo::PostRepo;
pub use rule_dispatch_repo::RuleDispatchRepo;
pub use template_repo::TemplateRepo;
