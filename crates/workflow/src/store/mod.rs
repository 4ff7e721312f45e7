//! Persistence boundary of the engine.
//!
//! Each [`TaskFeedStore`] method is one atomic unit: fan-out, a task
//! transition with its rollup, or an override. Implementations must hold
//! the post row lock (or equivalent) while recomputing a rollup.

#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod pg;

use async_trait::async_trait;
use serde::Serialize;
use taskfeed_core::dispatch::{DispatchClaim, DispatchStatus, FormLink, LinkedReference, RuleDispatch};
use taskfeed_core::error::CoreError;
use taskfeed_core::post::{Post, PostMetadata, PostStatus};
use taskfeed_core::rules::RuleAction;
use taskfeed_core::task::{DepartmentTask, TaskCommand};
use taskfeed_core::template::{ButtonType, Template, TemplateDefinition};
use taskfeed_core::types::DbId;

use crate::error::WorkflowError;

pub use pg::PgTaskFeedStore;

pub type StoreResult<T> = Result<T, WorkflowError>;

/// Default page size for post listings.
pub const DEFAULT_POST_LIMIT: i64 = 50;

fn superseded(name: &str, id: DbId, newer: DbId) -> CoreError {
    CoreError::Conflict(format!(
        "Template '{name}' ({id}) was superseded by version {newer}; edit the current version instead"
    ))
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub active_only: bool,
    /// Templates usable from this department, including `any`.
    pub triggering_department: Option<String>,
    pub button_type: Option<ButtonType>,
}

impl TemplateFilter {
    pub fn matches(&self, template: &Template) -> bool {
        let def = &template.definition;
        (!self.active_only || def.is_active)
            && self
                .triggering_department
                .as_deref()
                .is_none_or(|dept| def.triggering_department.admits(dept))
            && self.button_type.is_none_or(|b| def.button_type == b)
    }
}

#[derive(Debug, Clone)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub template_id: Option<DbId>,
    /// Posts that fan out to this department.
    pub department_code: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for PostFilter {
    fn default() -> Self {
        Self {
            status: None,
            template_id: None,
            department_code: None,
            limit: DEFAULT_POST_LIMIT,
            offset: 0,
        }
    }
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        self.status.is_none_or(|s| post.status == s)
            && self.template_id.is_none_or(|id| post.template_id == id)
            && self
                .department_code
                .as_deref()
                .is_none_or(|dept| post.assigned_departments.iter().any(|d| d == dept))
    }
}

/// A validated submission ready to fan out.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub organization_id: DbId,
    /// Snapshot frozen into the post.
    pub template: Template,
    /// Canonical typed form data.
    pub form_data: serde_json::Value,
    pub metadata: PostMetadata,
    pub created_by: DbId,
}

#[derive(Debug, Clone)]
pub struct NewFormLink {
    pub organization_id: DbId,
    pub post_id: DbId,
    pub department_task_id: Option<DbId>,
    pub form_type: String,
    pub form_id: String,
    pub created_by: Option<DbId>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// How a template edit was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateRevision {
    /// The row was updated in place.
    Updated(Template),
    /// The template was referenced by posts; a new version was created and
    /// the previous row deactivated.
    Versioned { previous_id: DbId, template: Template },
}

impl TemplateRevision {
    pub fn template(&self) -> &Template {
        match self {
            TemplateRevision::Updated(t) | TemplateRevision::Versioned { template: t, .. } => t,
        }
    }

    pub fn into_template(self) -> Template {
        match self {
            TemplateRevision::Updated(t) | TemplateRevision::Versioned { template: t, .. } => t,
        }
    }
}

/// Result of a department task transition.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTransition {
    pub task: DepartmentTask,
    /// The parent post with its recomputed rollup.
    pub post: Post,
    pub previous_post_status: PostStatus,
    pub form_link: Option<FormLink>,
}

impl TaskTransition {
    pub fn post_status_changed(&self) -> bool {
        self.post.status != self.previous_post_status
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostCancellation {
    pub post: Post,
    /// Tasks that were open and are now skipped.
    pub skipped_tasks: Vec<DepartmentTask>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TaskFeedStore: Send + Sync {
    // Templates

    async fn insert_template(
        &self,
        organization_id: DbId,
        definition: &TemplateDefinition,
        created_by: Option<DbId>,
    ) -> StoreResult<Template>;

    async fn find_template(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Template>>;

    async fn template_name_exists(&self, organization_id: DbId, name: &str) -> StoreResult<bool>;

    async fn list_templates(
        &self,
        organization_id: DbId,
        filter: &TemplateFilter,
    ) -> StoreResult<Vec<Template>>;

    /// Replace a template's definition.
    ///
    /// When `content_changed` and at least one post references the
    /// template, a new version is created (`version + 1`,
    /// `supersedes_id = id`) and the old row deactivated. Otherwise the row
    /// is updated in place. A version that a newer one already replaced is
    /// read-only and fails with `Conflict`.
    async fn revise_template(
        &self,
        organization_id: DbId,
        id: DbId,
        definition: &TemplateDefinition,
        content_changed: bool,
        actor: DbId,
    ) -> StoreResult<TemplateRevision>;

    // Posts

    /// Assign the post number and persist the post with one pending task
    /// per assigned department, atomically.
    ///
    /// Fails with `PartialFanOut` (persisting nothing) when the created task
    /// set does not match the assigned departments.
    async fn create_post(&self, input: NewPost) -> StoreResult<(Post, Vec<DepartmentTask>)>;

    async fn find_post(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Post>>;

    async fn list_posts(&self, organization_id: DbId, filter: &PostFilter) -> StoreResult<Vec<Post>>;

    async fn list_post_tasks(&self, post_id: DbId) -> StoreResult<Vec<DepartmentTask>>;

    async fn list_form_links(&self, post_id: DbId) -> StoreResult<Vec<FormLink>>;

    async fn add_form_link(&self, link: NewFormLink) -> StoreResult<FormLink>;

    // Department tasks

    async fn find_task(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<DepartmentTask>>;

    async fn list_department_tasks(
        &self,
        organization_id: DbId,
        department_code: &str,
        open_only: bool,
    ) -> StoreResult<Vec<DepartmentTask>>;

    /// Apply `command` to a task and persist the parent's recomputed rollup
    /// in the same unit of work.
    async fn transition_task(
        &self,
        organization_id: DbId,
        task_id: DbId,
        command: &TaskCommand,
        actor: DbId,
        linked_reference: Option<&LinkedReference>,
    ) -> StoreResult<TaskTransition>;

    // Overrides

    async fn cancel_post(
        &self,
        organization_id: DbId,
        post_id: DbId,
        reason: &str,
    ) -> StoreResult<PostCancellation>;

    async fn flag_followup(&self, organization_id: DbId, post_id: DbId, reason: &str) -> StoreResult<Post>;

    /// Drop the follow-up override and re-derive the rollup.
    async fn clear_followup(&self, organization_id: DbId, post_id: DbId) -> StoreResult<Post>;

    // Dispatch ledger

    /// Claim the ledger entry for (post, rule) before dispatching.
    async fn claim_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        action: RuleAction,
    ) -> StoreResult<DispatchClaim>;

    async fn finish_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        status: DispatchStatus,
        external_ref: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<RuleDispatch>;

    async fn list_rule_dispatches(&self, post_id: DbId) -> StoreResult<Vec<RuleDispatch>>;
}
