//! The task feed engine.

use std::sync::Arc;

use taskfeed_core::dispatch::{DispatchClaim, DispatchStatus, LinkedReference, FORM_TYPE_WORK_ORDER};
use taskfeed_core::error::CoreError;
use taskfeed_core::form::FormData;
use taskfeed_core::post::{validate_submission, Post, PostMetadata, PostStatus};
use taskfeed_core::rules::{evaluate_rules, RuleAction, RuleDecision, WorkflowRule};
use taskfeed_core::seed::default_templates;
use taskfeed_core::task::{DepartmentTask, TaskCommand};
use taskfeed_core::template::{validate_definition, Template, TemplateDefinition, TemplatePatch};
use taskfeed_core::types::{DbId, TenantContext};

use crate::cmms::{CmmsClient, UnconfiguredCmms, WorkOrderRequest};
use crate::error::{DispatchError, WorkflowError};
use crate::notify::{AlertRequest, Notifier, UnconfiguredNotifier};
use crate::outcome::{PostCreation, PostDetail, RuleOutcome, SeedFailure, SeedReport};
use crate::permissions::{AllowAllPermissions, TaskPermissions};
use crate::store::{
    NewFormLink, NewPost, PostCancellation, PostFilter, TaskFeedStore, TaskTransition,
    TemplateFilter, TemplateRevision,
};

/// Template store, post fan-out, department task tracker and rule dispatch.
///
/// Every operation takes the caller's [`TenantContext`]; records of other
/// organizations are reported as not found.
#[derive(Clone)]
pub struct TaskFeedService {
    store: Arc<dyn TaskFeedStore>,
    notifier: Arc<dyn Notifier>,
    cmms: Arc<dyn CmmsClient>,
    permissions: Arc<dyn TaskPermissions>,
}

impl TaskFeedService {
    /// A service with no alert channel or CMMS configured and the
    /// allow-all skip policy.
    pub fn new(store: Arc<dyn TaskFeedStore>) -> Self {
        Self {
            store,
            notifier: Arc::new(UnconfiguredNotifier),
            cmms: Arc::new(UnconfiguredCmms),
            permissions: Arc::new(AllowAllPermissions),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cmms(mut self, cmms: Arc<dyn CmmsClient>) -> Self {
        self.cmms = cmms;
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<dyn TaskPermissions>) -> Self {
        self.permissions = permissions;
        self
    }

    // -----------------------------------------------------------------------
    // Template store
    // -----------------------------------------------------------------------

    pub async fn create_template(
        &self,
        ctx: &TenantContext,
        definition: TemplateDefinition,
    ) -> Result<Template, WorkflowError> {
        validate_definition(&definition)?;
        let template = self
            .store
            .insert_template(ctx.organization_id, &definition, Some(ctx.user_id))
            .await?;

        tracing::info!(
            template_id = template.id,
            name = %template.name(),
            organization_id = ctx.organization_id,
            "Template created",
        );
        Ok(template)
    }

    /// Apply `patch` and validate the result.
    ///
    /// A template referenced by posts is never edited in place: a content
    /// change creates the next version and deactivates this one. Toggling
    /// `is_active` alone always updates in place.
    pub async fn update_template(
        &self,
        ctx: &TenantContext,
        id: DbId,
        patch: TemplatePatch,
    ) -> Result<Template, WorkflowError> {
        let current = self.get_template(ctx, id).await?;
        let content_changed = patch.changes_content();
        let definition = patch.apply(&current.definition);
        validate_definition(&definition)?;

        let revision = self
            .store
            .revise_template(ctx.organization_id, id, &definition, content_changed, ctx.user_id)
            .await?;

        match &revision {
            TemplateRevision::Updated(t) => {
                tracing::info!(template_id = t.id, version = t.version, "Template updated in place");
            }
            TemplateRevision::Versioned {
                previous_id,
                template,
            } => {
                tracing::info!(
                    template_id = template.id,
                    previous_id,
                    version = template.version,
                    "Template referenced by posts, created new version",
                );
            }
        }
        Ok(revision.into_template())
    }

    pub async fn get_template(&self, ctx: &TenantContext, id: DbId) -> Result<Template, WorkflowError> {
        self.store
            .find_template(ctx.organization_id, id)
            .await?
            .ok_or_else(|| CoreError::NotFound { entity: "template", id }.into())
    }

    pub async fn list_templates(
        &self,
        ctx: &TenantContext,
        filter: &TemplateFilter,
    ) -> Result<Vec<Template>, WorkflowError> {
        self.store.list_templates(ctx.organization_id, filter).await
    }

    /// Install the built-in catalog.
    ///
    /// Names already present in the organization are skipped; failures are
    /// collected per template and never abort the batch.
    pub async fn seed_defaults(&self, ctx: &TenantContext) -> SeedReport {
        let mut report = SeedReport::default();

        for definition in default_templates() {
            let name = definition.name.clone();
            match self.seed_one(ctx, definition).await {
                Ok(true) => report.created.push(name),
                Ok(false) => report.skipped.push(name),
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "Failed to seed default template");
                    report.errors.push(SeedFailure {
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            organization_id = ctx.organization_id,
            created = report.created.len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Default templates seeded",
        );
        report
    }

    async fn seed_one(
        &self,
        ctx: &TenantContext,
        definition: TemplateDefinition,
    ) -> Result<bool, WorkflowError> {
        if self
            .store
            .template_name_exists(ctx.organization_id, &definition.name)
            .await?
        {
            return Ok(false);
        }
        self.create_template(ctx, definition).await?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Post fan-out
    // -----------------------------------------------------------------------

    /// Validate a submission, persist the post with one task per assigned
    /// department, then evaluate and dispatch the template's rules.
    ///
    /// Dispatch failures are reported as warnings on the returned
    /// [`RuleOutcome`]s; the post stays committed.
    pub async fn create_post(
        &self,
        ctx: &TenantContext,
        template_id: DbId,
        form_data: &serde_json::Value,
        metadata: PostMetadata,
    ) -> Result<PostCreation, WorkflowError> {
        let template = self.get_template(ctx, template_id).await?;
        if !template.definition.is_active {
            return Err(CoreError::Validation(format!(
                "Template '{}' is inactive and cannot be used for new posts",
                template.name()
            ))
            .into());
        }

        let data = validate_submission(&template, form_data, &metadata)?;

        let (post, tasks) = self
            .store
            .create_post(NewPost {
                organization_id: ctx.organization_id,
                form_data: data.to_json(),
                template,
                metadata,
                created_by: ctx.user_id,
            })
            .await
            .inspect_err(|e| {
                if let Some(CoreError::PartialFanOut { .. }) = e.core() {
                    tracing::error!(template_id, error = %e, "Fan-out aborted");
                }
            })?;

        tracing::info!(
            post_id = post.id,
            post_number = %post.post_number,
            template_id,
            task_count = tasks.len(),
            "Post created",
        );

        let rule_outcomes = self.dispatch_rules(ctx, &post, &data).await;
        Ok(PostCreation {
            post,
            tasks,
            rule_outcomes,
        })
    }

    /// Re-run the snapshot's rules against the stored form data.
    ///
    /// Rules whose side effect already went out are not dispatched again;
    /// failed ones are retried.
    pub async fn reevaluate_rules(
        &self,
        ctx: &TenantContext,
        post_id: DbId,
    ) -> Result<Vec<RuleOutcome>, WorkflowError> {
        let post = self.get_post_row(ctx, post_id).await?;
        if post.status == PostStatus::Cancelled {
            return Err(CoreError::Conflict(format!(
                "Post {} is cancelled; its rules are not re-evaluated",
                post.post_number
            ))
            .into());
        }
        let data = post.form_values();
        Ok(self.dispatch_rules(ctx, &post, &data).await)
    }

    pub async fn get_post(&self, ctx: &TenantContext, post_id: DbId) -> Result<PostDetail, WorkflowError> {
        let post = self.get_post_row(ctx, post_id).await?;
        let tasks = self.store.list_post_tasks(post.id).await?;
        let form_links = self.store.list_form_links(post.id).await?;
        let rule_dispatches = self.store.list_rule_dispatches(post.id).await?;
        Ok(PostDetail {
            post,
            tasks,
            form_links,
            rule_dispatches,
        })
    }

    pub async fn list_posts(
        &self,
        ctx: &TenantContext,
        filter: &PostFilter,
    ) -> Result<Vec<Post>, WorkflowError> {
        self.store.list_posts(ctx.organization_id, filter).await
    }

    async fn get_post_row(&self, ctx: &TenantContext, post_id: DbId) -> Result<Post, WorkflowError> {
        self.store
            .find_post(ctx.organization_id, post_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "post",
                    id: post_id,
                }
                .into()
            })
    }

    // -----------------------------------------------------------------------
    // Rule dispatch
    // -----------------------------------------------------------------------

    async fn dispatch_rules(&self, ctx: &TenantContext, post: &Post, data: &FormData) -> Vec<RuleOutcome> {
        let rules = &post.template_snapshot.definition.workflow_rules;
        let mut outcomes = Vec::with_capacity(rules.len());

        for decision in evaluate_rules(rules, data) {
            let outcome = if decision.fired {
                self.dispatch_rule(ctx, post, &rules[decision.rule_index], &decision)
                    .await
            } else {
                RuleOutcome::not_fired(&decision)
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Claim, dispatch, then record the result in the ledger.
    async fn dispatch_rule(
        &self,
        ctx: &TenantContext,
        post: &Post,
        rule: &WorkflowRule,
        decision: &RuleDecision,
    ) -> RuleOutcome {
        let Ok(rule_index) = i32::try_from(decision.rule_index) else {
            return RuleOutcome::unclaimed(
                decision,
                DispatchError::Ledger(format!("rule index {} out of range", decision.rule_index)),
            );
        };

        let attempt = match self.store.claim_dispatch(post.id, rule_index, decision.action).await {
            Ok(DispatchClaim::Claimed { attempt }) => attempt,
            Ok(DispatchClaim::AlreadyHandled(entry)) => {
                tracing::debug!(
                    post_id = post.id,
                    rule_index,
                    status = entry.status.as_str(),
                    "Rule already handled",
                );
                return RuleOutcome::already_handled(decision, &entry);
            }
            Err(e) => {
                tracing::warn!(post_id = post.id, rule_index, error = %e, "Failed to claim rule dispatch");
                return RuleOutcome::unclaimed(decision, DispatchError::Ledger(e.to_string()));
            }
        };

        let result = match decision.action {
            RuleAction::CreateWorkOrder => self
                .cmms
                .create_work_order(&WorkOrderRequest::for_rule(post, decision.rule_index, rule))
                .await
                .map(Some),
            RuleAction::AlertPersonnel => self
                .notifier
                .alert_personnel(&AlertRequest::for_rule(post, rule))
                .await
                .map(|()| None),
            RuleAction::Notify | RuleAction::StoreOnly => Ok(None),
        };

        let (status, external_ref, mut warning) = match result {
            Ok(external_ref) if decision.action.has_external_effect() => {
                (DispatchStatus::Dispatched, external_ref, None)
            }
            Ok(external_ref) => (DispatchStatus::Recorded, external_ref, None),
            Err(e) => {
                tracing::warn!(
                    post_id = post.id,
                    post_number = %post.post_number,
                    rule_index,
                    action = decision.action.as_str(),
                    attempt,
                    error = %e,
                    "Rule side effect failed",
                );
                (DispatchStatus::Failed, None, Some(e))
            }
        };

        if let (RuleAction::CreateWorkOrder, Some(work_order_id)) = (decision.action, &external_ref) {
            let link = NewFormLink {
                organization_id: post.organization_id,
                post_id: post.id,
                department_task_id: None,
                form_type: FORM_TYPE_WORK_ORDER.to_string(),
                form_id: work_order_id.clone(),
                created_by: Some(ctx.user_id),
            };
            if let Err(e) = self.store.add_form_link(link).await {
                tracing::warn!(post_id = post.id, work_order_id = %work_order_id, error = %e, "Failed to link work order");
            }
        }

        let error_text = warning.as_ref().map(ToString::to_string);
        if let Err(e) = self
            .store
            .finish_dispatch(post.id, rule_index, status, external_ref.as_deref(), error_text.as_deref())
            .await
        {
            tracing::error!(post_id = post.id, rule_index, error = %e, "Failed to record rule dispatch");
            warning.get_or_insert(DispatchError::Ledger(e.to_string()));
        }

        if status != DispatchStatus::Failed {
            tracing::info!(
                post_id = post.id,
                rule_index,
                action = decision.action.as_str(),
                status = status.as_str(),
                external_ref = external_ref.as_deref(),
                "Rule dispatched",
            );
        }
        RuleOutcome::dispatched(decision, status, external_ref, warning)
    }

    // -----------------------------------------------------------------------
    // Department tasks
    // -----------------------------------------------------------------------

    pub async fn start_task(&self, ctx: &TenantContext, task_id: DbId) -> Result<TaskTransition, WorkflowError> {
        self.transition(ctx, task_id, TaskCommand::Start, None).await
    }

    /// Complete a task, optionally linking the record that closed it out.
    pub async fn complete_task(
        &self,
        ctx: &TenantContext,
        task_id: DbId,
        notes: Option<String>,
        linked_reference: Option<LinkedReference>,
    ) -> Result<TaskTransition, WorkflowError> {
        if let Some(reference) = &linked_reference {
            if reference.form_type.trim().is_empty() || reference.form_id.trim().is_empty() {
                return Err(CoreError::Validation(
                    "A linked reference needs both form_type and form_id".into(),
                )
                .into());
            }
        }
        let notes = notes.filter(|n| !n.trim().is_empty());
        self.transition(
            ctx,
            task_id,
            TaskCommand::Complete { notes },
            linked_reference.as_ref(),
        )
        .await
    }

    pub async fn skip_task(
        &self,
        ctx: &TenantContext,
        task_id: DbId,
        reason: &str,
    ) -> Result<TaskTransition, WorkflowError> {
        let task = self.get_task(ctx, task_id).await?;
        if !self.permissions.can_skip(ctx, &task).await {
            return Err(CoreError::Forbidden(format!(
                "User {} may not skip department task {}",
                ctx.user_id, task.id
            ))
            .into());
        }
        self.transition(
            ctx,
            task_id,
            TaskCommand::Skip {
                reason: reason.trim().to_string(),
            },
            None,
        )
        .await
    }

    pub async fn list_department_tasks(
        &self,
        ctx: &TenantContext,
        department_code: &str,
        open_only: bool,
    ) -> Result<Vec<DepartmentTask>, WorkflowError> {
        self.store
            .list_department_tasks(ctx.organization_id, department_code, open_only)
            .await
    }

    async fn get_task(&self, ctx: &TenantContext, task_id: DbId) -> Result<DepartmentTask, WorkflowError> {
        self.store
            .find_task(ctx.organization_id, task_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "department task",
                    id: task_id,
                }
                .into()
            })
    }

    async fn transition(
        &self,
        ctx: &TenantContext,
        task_id: DbId,
        command: TaskCommand,
        linked_reference: Option<&LinkedReference>,
    ) -> Result<TaskTransition, WorkflowError> {
        let transition = self
            .store
            .transition_task(ctx.organization_id, task_id, &command, ctx.user_id, linked_reference)
            .await?;

        tracing::info!(
            task_id,
            post_id = transition.post.id,
            department_code = %transition.task.department_code,
            command = command.name(),
            task_status = transition.task.status.as_str(),
            post_status = transition.post.status.as_str(),
            "Department task updated",
        );
        if transition.post_status_changed() {
            tracing::info!(
                post_id = transition.post.id,
                post_number = %transition.post.post_number,
                from = transition.previous_post_status.as_str(),
                to = transition.post.status.as_str(),
                "Post status rolled up",
            );
        }
        Ok(transition)
    }

    // -----------------------------------------------------------------------
    // Operator overrides
    // -----------------------------------------------------------------------

    /// Cancel a post; its open tasks are skipped with the same reason.
    pub async fn cancel_post(
        &self,
        ctx: &TenantContext,
        post_id: DbId,
        reason: &str,
    ) -> Result<PostCancellation, WorkflowError> {
        let reason = required_reason(reason, "cancel a post")?;
        let cancellation = self
            .store
            .cancel_post(ctx.organization_id, post_id, reason)
            .await?;
        tracing::info!(
            post_id,
            post_number = %cancellation.post.post_number,
            skipped_tasks = cancellation.skipped_tasks.len(),
            "Post cancelled",
        );
        Ok(cancellation)
    }

    pub async fn flag_followup(
        &self,
        ctx: &TenantContext,
        post_id: DbId,
        reason: &str,
    ) -> Result<Post, WorkflowError> {
        let reason = required_reason(reason, "flag a post for follow-up")?;
        let post = self
            .store
            .flag_followup(ctx.organization_id, post_id, reason)
            .await?;
        tracing::info!(post_id, post_number = %post.post_number, "Post flagged for follow-up");
        Ok(post)
    }

    pub async fn clear_followup(&self, ctx: &TenantContext, post_id: DbId) -> Result<Post, WorkflowError> {
        let post = self.store.clear_followup(ctx.organization_id, post_id).await?;
        tracing::info!(
            post_id,
            post_number = %post.post_number,
            status = post.status.as_str(),
            "Follow-up cleared",
        );
        Ok(post)
    }
}

fn required_reason<'a>(reason: &'a str, action: &str) -> Result<&'a str, CoreError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CoreError::Validation(format!("A reason is required to {action}")));
    }
    Ok(reason)
}
