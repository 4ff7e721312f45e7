//! PostgreSQL implementation of [`TaskFeedStore`].

use async_trait::async_trait;
use chrono::Utc;
use taskfeed_core::dispatch::{
    DispatchClaim, DispatchStatus, FormLink, LinkedReference, RuleDispatch,
};
use taskfeed_core::error::CoreError;
use taskfeed_core::post::{recompute_rollup, rollup_after_followup, Post, RollupUpdate};
use taskfeed_core::rules::RuleAction;
use taskfeed_core::task::{apply_command, DepartmentTask, TaskCommand};
use taskfeed_core::template::{Template, TemplateDefinition};
use taskfeed_core::types::DbId;
use taskfeed_db::models::department_task::DepartmentTaskRow;
use taskfeed_db::models::form_link::CreateFormLink;
use taskfeed_db::models::post::{CreatePost, PostListParams};
use taskfeed_db::models::rule_dispatch::RuleDispatchRow;
use taskfeed_db::models::template::{CreateTemplate, TemplateListParams};
use taskfeed_db::repositories::{
    DepartmentTaskRepo, FormLinkRepo, PostRepo, RuleDispatchRepo, TemplateRepo,
};
use taskfeed_db::DbPool;

use super::{
    superseded, NewFormLink, NewPost, PostCancellation, PostFilter, StoreResult, TaskFeedStore,
    TaskTransition, TemplateFilter, TemplateRevision,
};

pub struct PgTaskFeedStore {
    pool: DbPool,
}

impl PgTaskFeedStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn tasks_from_rows(rows: Vec<DepartmentTaskRow>) -> Result<Vec<DepartmentTask>, CoreError> {
    rows.into_iter().map(DepartmentTask::try_from).collect()
}

fn dispatches_from_rows(rows: Vec<RuleDispatchRow>) -> Result<Vec<RuleDispatch>, CoreError> {
    rows.into_iter().map(RuleDispatch::try_from).collect()
}

fn post_not_found(id: DbId) -> CoreError {
    CoreError::NotFound { entity: "post", id }
}

fn rollup_changed(post: &Post, rollup: &RollupUpdate) -> bool {
    rollup.status != post.status || rollup.completed_at != post.completed_at
}

#[async_trait]
impl TaskFeedStore for PgTaskFeedStore {
    async fn insert_template(
        &self,
        organization_id: DbId,
        definition: &TemplateDefinition,
        created_by: Option<DbId>,
    ) -> StoreResult<Template> {
        let row = TemplateRepo::create(
            &self.pool,
            &CreateTemplate {
                organization_id,
                definition,
                version: 1,
                supersedes_id: None,
                created_by,
            },
        )
        .await?;
        Ok(Template::try_from(row)?)
    }

    async fn find_template(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Template>> {
        let row = TemplateRepo::find_by_id(&self.pool, organization_id, id).await?;
        Ok(row.map(Template::try_from).transpose()?)
    }

    async fn template_name_exists(&self, organization_id: DbId, name: &str) -> StoreResult<bool> {
        Ok(TemplateRepo::exists_by_name(&self.pool, organization_id, name).await?)
    }

    async fn list_templates(
        &self,
        organization_id: DbId,
        filter: &TemplateFilter,
    ) -> StoreResult<Vec<Template>> {
        let params = TemplateListParams {
            active_only: filter.active_only,
            triggering_department: filter.triggering_department.clone(),
            button_type: filter.button_type.map(|b| b.as_str().to_string()),
        };
        let rows = TemplateRepo::list(&self.pool, organization_id, &params).await?;
        Ok(rows
            .into_iter()
            .map(Template::try_from)
            .collect::<Result<_, _>>()?)
    }

    async fn revise_template(
        &self,
        organization_id: DbId,
        id: DbId,
        definition: &TemplateDefinition,
        content_changed: bool,
        actor: DbId,
    ) -> StoreResult<TemplateRevision> {
        let mut tx = self.pool.begin().await?;

        let current = TemplateRepo::lock(&mut *tx, organization_id, id)
            .await?
            .ok_or(CoreError::NotFound { entity: "template", id })?;
        if let Some(newer) = TemplateRepo::superseded_by(&mut *tx, id).await? {
            return Err(superseded(&current.name, id, newer).into());
        }
        let referenced = PostRepo::count_for_template(&mut *tx, id).await? > 0;

        let revision = if referenced && content_changed {
            TemplateRepo::set_active(&mut *tx, id, false).await?;
            let row = TemplateRepo::create(
                &mut *tx,
                &CreateTemplate {
                    organization_id,
                    definition,
                    version: current.version + 1,
                    supersedes_id: Some(id),
                    created_by: Some(actor),
                },
            )
            .await?;
            TemplateRevision::Versioned {
                previous_id: id,
                template: Template::try_from(row)?,
            }
        } else {
            let row = TemplateRepo::update_in_place(&mut *tx, id, definition).await?;
            TemplateRevision::Updated(Template::try_from(row)?)
        };

        tx.commit().await?;
        Ok(revision)
    }

    async fn create_post(&self, input: NewPost) -> StoreResult<(Post, Vec<DepartmentTask>)> {
        let snapshot = serde_json::to_value(&input.template)
            .map_err(|e| CoreError::Internal(format!("Failed to snapshot template: {e}")))?;
        let departments = input.template.definition.assigned_departments.clone();

        let mut tx = self.pool.begin().await?;

        let sequence = PostRepo::next_sequence(&mut *tx, input.organization_id).await?;
        let post_row = PostRepo::create(
            &mut *tx,
            &CreatePost {
                organization_id: input.organization_id,
                post_number: taskfeed_core::post::format_post_number(sequence),
                template_id: input.template.id,
                template_snapshot: snapshot,
                form_data: input.form_data,
                assigned_departments: departments.clone(),
                photo_url: input.metadata.photo_url,
                source_department: input.metadata.source_department,
                notes: input.metadata.notes,
                created_by: input.created_by,
            },
        )
        .await?;
        let post = Post::try_from(post_row)?;

        let task_rows =
            DepartmentTaskRepo::create_many(&mut *tx, input.organization_id, post.id, &departments)
                .await?;
        if task_rows.len() != departments.len() {
            // Dropping `tx` rolls the post back.
            return Err(CoreError::PartialFanOut {
                post_id: post.id,
                expected: departments.len(),
                actual: task_rows.len(),
            }
            .into());
        }
        let tasks = tasks_from_rows(task_rows)?;

        tx.commit().await?;
        Ok((post, tasks))
    }

    async fn find_post(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Post>> {
        let row = PostRepo::find_by_id(&self.pool, organization_id, id).await?;
        Ok(row.map(Post::try_from).transpose()?)
    }

    async fn list_posts(&self, organization_id: DbId, filter: &PostFilter) -> StoreResult<Vec<Post>> {
        let params = PostListParams {
            status: filter.status.map(|s| s.as_str().to_string()),
            template_id: filter.template_id,
            department_code: filter.department_code.clone(),
            limit: filter.limit,
            offset: filter.offset,
        };
        let rows = PostRepo::list(&self.pool, organization_id, &params).await?;
        Ok(rows.into_iter().map(Post::try_from).collect::<Result<_, _>>()?)
    }

    async fn list_post_tasks(&self, post_id: DbId) -> StoreResult<Vec<DepartmentTask>> {
        let rows = DepartmentTaskRepo::list_for_post(&self.pool, post_id).await?;
        Ok(tasks_from_rows(rows)?)
    }

    async fn list_form_links(&self, post_id: DbId) -> StoreResult<Vec<FormLink>> {
        let rows = FormLinkRepo::list_for_post(&self.pool, post_id).await?;
        Ok(rows.into_iter().map(FormLink::from).collect())
    }

    async fn add_form_link(&self, link: NewFormLink) -> StoreResult<FormLink> {
        let row = FormLinkRepo::create(
            &self.pool,
            &CreateFormLink {
                organization_id: link.organization_id,
                post_id: link.post_id,
                department_task_id: link.department_task_id,
                form_type: link.form_type,
                form_id: link.form_id,
                created_by: link.created_by,
            },
        )
        .await?;
        Ok(FormLink::from(row))
    }

    async fn find_task(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<DepartmentTask>> {
        let row = DepartmentTaskRepo::find_by_id(&self.pool, organization_id, id).await?;
        Ok(row.map(DepartmentTask::try_from).transpose()?)
    }

    async fn list_department_tasks(
        &self,
        organization_id: DbId,
        department_code: &str,
        open_only: bool,
    ) -> StoreResult<Vec<DepartmentTask>> {
        let rows = DepartmentTaskRepo::list_for_department(
            &self.pool,
            organization_id,
            department_code,
            open_only,
        )
        .await?;
        Ok(tasks_from_rows(rows)?)
    }

    async fn transition_task(
        &self,
        organization_id: DbId,
        task_id: DbId,
        command: &TaskCommand,
        actor: DbId,
        linked_reference: Option<&LinkedReference>,
    ) -> StoreResult<TaskTransition> {
        let not_found = CoreError::NotFound {
            entity: "department task",
            id: task_id,
        };
        let mut tx = self.pool.begin().await?;

        // Lock order: post, then task. Sibling transitions serialize on the post.
        let post_id = DepartmentTaskRepo::find_by_id(&mut *tx, organization_id, task_id)
            .await?
            .ok_or(not_found)?
            .post_id;
        let post = PostRepo::lock(&mut *tx, organization_id, post_id)
            .await?
            .ok_or_else(|| post_not_found(post_id))?;
        let post = Post::try_from(post)?;
        let task = DepartmentTaskRepo::lock(&mut *tx, organization_id, task_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "department task",
                id: task_id,
            })?;
        let task = DepartmentTask::try_from(task)?;

        post.ensure_accepts_task_updates()?;
        let now = Utc::now();
        let next = apply_command(&task, command, actor, now)?;
        let task = DepartmentTask::try_from(DepartmentTaskRepo::update_state(&mut *tx, &next).await?)?;

        let form_link = match linked_reference {
            Some(reference) => {
                let row = FormLinkRepo::create(
                    &mut *tx,
                    &CreateFormLink {
                        organization_id,
                        post_id,
                        department_task_id: Some(task.id),
                        form_type: reference.form_type.clone(),
                        form_id: reference.form_id.clone(),
                        created_by: Some(actor),
                    },
                )
                .await?;
                Some(FormLink::from(row))
            }
            None => None,
        };

        let tasks = tasks_from_rows(DepartmentTaskRepo::list_for_post(&mut *tx, post_id).await?)?;
        let rollup = recompute_rollup(&post, &tasks, now);
        let previous_post_status = post.status;
        let post = if rollup_changed(&post, &rollup) {
            let row = PostRepo::update_rollup(
                &mut *tx,
                post_id,
                rollup.status.as_str(),
                rollup.completed_at,
            )
            .await?;
            Post::try_from(row)?
        } else {
            post
        };

        tx.commit().await?;
        Ok(TaskTransition {
            task,
            post,
            previous_post_status,
            form_link,
        })
    }

    async fn cancel_post(
        &self,
        organization_id: DbId,
        post_id: DbId,
        reason: &str,
    ) -> StoreResult<PostCancellation> {
        let mut tx = self.pool.begin().await?;

        let post = PostRepo::lock(&mut *tx, organization_id, post_id)
            .await?
            .ok_or_else(|| post_not_found(post_id))?;
        Post::try_from(post)?.ensure_can_cancel()?;

        let skipped = DepartmentTaskRepo::skip_open_for_post(&mut *tx, post_id, reason).await?;
        let post = PostRepo::mark_cancelled(&mut *tx, post_id, reason).await?;

        tx.commit().await?;
        Ok(PostCancellation {
            post: Post::try_from(post)?,
            skipped_tasks: tasks_from_rows(skipped)?,
        })
    }

    async fn flag_followup(&self, organization_id: DbId, post_id: DbId, reason: &str) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let post = PostRepo::lock(&mut *tx, organization_id, post_id)
            .await?
            .ok_or_else(|| post_not_found(post_id))?;
        Post::try_from(post)?.ensure_can_flag_followup()?;
        let post = PostRepo::mark_followup(&mut *tx, post_id, reason).await?;

        tx.commit().await?;
        Ok(Post::try_from(post)?)
    }

    async fn clear_followup(&self, organization_id: DbId, post_id: DbId) -> StoreResult<Post> {
        let mut tx = self.pool.begin().await?;

        let post = PostRepo::lock(&mut *tx, organization_id, post_id)
            .await?
            .ok_or_else(|| post_not_found(post_id))?;
        let post = Post::try_from(post)?;
        post.ensure_requires_followup()?;

        let tasks = tasks_from_rows(DepartmentTaskRepo::list_for_post(&mut *tx, post_id).await?)?;
        let rollup = rollup_after_followup(&post, &tasks, Utc::now());
        let post = PostRepo::clear_followup(
            &mut *tx,
            post_id,
            rollup.status.as_str(),
            rollup.completed_at,
        )
        .await?;

        tx.commit().await?;
        Ok(Post::try_from(post)?)
    }

    async fn claim_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        action: RuleAction,
    ) -> StoreResult<DispatchClaim> {
        if let Some(row) =
            RuleDispatchRepo::try_claim(&self.pool, post_id, rule_index, action.as_str()).await?
        {
            return Ok(DispatchClaim::Claimed {
                attempt: row.attempts,
            });
        }
        let existing = RuleDispatchRepo::find(&self.pool, post_id, rule_index)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(format!(
                    "Dispatch entry for post {post_id} rule {rule_index} vanished after claim"
                ))
            })?;
        Ok(DispatchClaim::AlreadyHandled(RuleDispatch::try_from(existing)?))
    }

    async fn finish_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        status: DispatchStatus,
        external_ref: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<RuleDispatch> {
        let row = RuleDispatchRepo::finish(
            &self.pool,
            post_id,
            rule_index,
            status.as_str(),
            external_ref,
            error,
        )
        .await?;
        Ok(RuleDispatch::try_from(row)?)
    }

    async fn list_rule_dispatches(&self, post_id: DbId) -> StoreResult<Vec<RuleDispatch>> {
        let rows = RuleDispatchRepo::list_for_post(&self.pool, post_id).await?;
        Ok(dispatches_from_rows(rows)?)
    }
}
