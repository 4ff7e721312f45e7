//! In-memory [`TaskFeedStore`] for tests and local runs without Postgres.
//!
//! Mirrors the Postgres store's atomicity: every method mutates state under
//! one lock and only after all checks pass. When built with a
//! [`ChangeHub`], every write is published as a [`RowChange`] the way the
//! database triggers do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use taskfeed_core::dispatch::{
    DispatchClaim, DispatchStatus, FormLink, LinkedReference, RuleDispatch,
};
use taskfeed_core::error::CoreError;
use taskfeed_core::post::{
    format_post_number, recompute_rollup, rollup_after_followup, Post, PostStatus,
};
use taskfeed_core::rules::RuleAction;
use taskfeed_core::task::{apply_command, DepartmentTask, DepartmentTaskStatus, TaskCommand};
use taskfeed_core::template::{Template, TemplateDefinition};
use taskfeed_core::types::DbId;
use taskfeed_events::change::{
    ChangeEventType, TABLE_DEPARTMENT_TASKS, TABLE_FORM_LINKS, TABLE_POSTS, TABLE_TEMPLATES,
};
use taskfeed_events::{ChangeHub, RowChange};

use super::{
    superseded, NewFormLink, NewPost, PostCancellation, PostFilter, StoreResult, TaskFeedStore,
    TaskTransition, TemplateFilter, TemplateRevision,
};

#[derive(Default)]
struct State {
    last_id: DbId,
    templates: Vec<Template>,
    posts: Vec<Post>,
    tasks: Vec<DepartmentTask>,
    links: Vec<FormLink>,
    dispatches: Vec<RuleDispatch>,
    sequences: HashMap<DbId, i64>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }

    fn post_index(&self, organization_id: DbId, id: DbId) -> Result<usize, CoreError> {
        self.posts
            .iter()
            .position(|p| p.organization_id == organization_id && p.id == id)
            .ok_or(CoreError::NotFound { entity: "post", id })
    }

    fn post_tasks(&self, post_id: DbId) -> Vec<DepartmentTask> {
        self.tasks
            .iter()
            .filter(|t| t.post_id == post_id)
            .cloned()
            .collect()
    }

    fn dispatch_index(&self, post_id: DbId, rule_index: i32) -> Option<usize> {
        self.dispatches
            .iter()
            .position(|d| d.post_id == post_id && d.rule_index == rule_index)
    }

    fn add_link(&mut self, link: NewFormLink, changes: &mut Vec<RowChange>) -> FormLink {
        if let Some(existing) = self.links.iter_mut().find(|l| {
            l.post_id == link.post_id && l.form_type == link.form_type && l.form_id == link.form_id
        }) {
            if existing.department_task_id.is_none() && link.department_task_id.is_some() {
                let old = existing.clone();
                existing.department_task_id = link.department_task_id;
                changes.push(row_change(
                    TABLE_FORM_LINKS,
                    ChangeEventType::Update,
                    &*existing,
                    Some(&old),
                ));
            }
            return existing.clone();
        }
        let created = FormLink {
            id: self.next_id(),
            organization_id: link.organization_id,
            post_id: link.post_id,
            department_task_id: link.department_task_id,
            form_type: link.form_type,
            form_id: link.form_id,
            created_by: link.created_by,
            created_at: Utc::now(),
        };
        changes.push(row_change(TABLE_FORM_LINKS, ChangeEventType::Insert, &created, None));
        self.links.push(created.clone());
        created
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

fn row_change<T: Serialize>(
    table: &str,
    event_type: ChangeEventType,
    new: &T,
    old: Option<&T>,
) -> RowChange {
    RowChange::new(table, event_type, Some(to_json(new)), old.map(to_json))
}

pub struct MemoryStore {
    state: Mutex<State>,
    hub: Option<Arc<ChangeHub>>,
    drop_next_task_insert: AtomicBool,
    failing_template_name: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            hub: None,
            drop_next_task_insert: AtomicBool::new(false),
            failing_template_name: Mutex::new(None),
        }
    }

    /// Publish every write to `hub`.
    pub fn with_change_hub(mut self, hub: Arc<ChangeHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Make the next fan-out lose one department task, exercising the
    /// partial fan-out guard.
    pub fn drop_next_task_insert(&self) {
        self.drop_next_task_insert.store(true, Ordering::SeqCst);
    }

    /// Make every insert of a template called `name` fail.
    pub fn fail_template_insert(&self, name: impl Into<String>) {
        *self
            .failing_template_name
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(name.into());
    }

    /// Total number of posts across all organizations.
    pub fn post_count(&self) -> usize {
        self.lock().posts.len()
    }

    /// Total number of department tasks across all organizations.
    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, changes: Vec<RowChange>) {
        if let Some(hub) = &self.hub {
            for change in changes {
                hub.publish(change);
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskFeedStore for MemoryStore {
    async fn insert_template(
        &self,
        organization_id: DbId,
        definition: &TemplateDefinition,
        created_by: Option<DbId>,
    ) -> StoreResult<Template> {
        let failing = self
            .failing_template_name
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_deref()
            == Some(definition.name.as_str());
        if failing {
            return Err(CoreError::Internal(format!(
                "insert of template '{}' failed",
                definition.name
            ))
            .into());
        }

        let template = {
            let mut state = self.lock();
            let now = Utc::now();
            let template = Template {
                id: state.next_id(),
                organization_id,
                definition: definition.clone(),
                version: 1,
                supersedes_id: None,
                created_by,
                created_at: now,
                updated_at: now,
            };
            state.templates.push(template.clone());
            template
        };
        self.publish(vec![row_change(
            TABLE_TEMPLATES,
            ChangeEventType::Insert,
            &template,
            None,
        )]);
        Ok(template)
    }

    async fn find_template(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Template>> {
        Ok(self
            .lock()
            .templates
            .iter()
            .find(|t| t.organization_id == organization_id && t.id == id)
            .cloned())
    }

    async fn template_name_exists(&self, organization_id: DbId, name: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .templates
            .iter()
            .any(|t| t.organization_id == organization_id && t.name() == name))
    }

    async fn list_templates(
        &self,
        organization_id: DbId,
        filter: &TemplateFilter,
    ) -> StoreResult<Vec<Template>> {
        let mut templates: Vec<Template> = self
            .lock()
            .templates
            .iter()
            .filter(|t| t.organization_id == organization_id && filter.matches(t))
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name().cmp(b.name()).then(b.version.cmp(&a.version)));
        Ok(templates)
    }

    async fn revise_template(
        &self,
        organization_id: DbId,
        id: DbId,
        definition: &TemplateDefinition,
        content_changed: bool,
        actor: DbId,
    ) -> StoreResult<TemplateRevision> {
        let mut changes = Vec::new();
        let revision = {
            let mut state = self.lock();
            let index = state
                .templates
                .iter()
                .position(|t| t.organization_id == organization_id && t.id == id)
                .ok_or(CoreError::NotFound { entity: "template", id })?;
            if let Some(newer) = state.templates.iter().find(|t| t.supersedes_id == Some(id)) {
                return Err(superseded(state.templates[index].name(), id, newer.id).into());
            }
            let referenced = state.posts.iter().any(|p| p.template_id == id);
            let now = Utc::now();
            let old = state.templates[index].clone();

            if referenced && content_changed {
                let new_id = state.next_id();
                let previous = &mut state.templates[index];
                previous.definition.is_active = false;
                previous.updated_at = now;
                let previous = previous.clone();

                let template = Template {
                    id: new_id,
                    organization_id,
                    definition: definition.clone(),
                    version: old.version + 1,
                    supersedes_id: Some(id),
                    created_by: Some(actor),
                    created_at: now,
                    updated_at: now,
                };
                state.templates.push(template.clone());
                changes.push(row_change(TABLE_TEMPLATES, ChangeEventType::Update, &previous, Some(&old)));
                changes.push(row_change(TABLE_TEMPLATES, ChangeEventType::Insert, &template, None));
                TemplateRevision::Versioned {
                    previous_id: id,
                    template,
                }
            } else {
                let current = &mut state.templates[index];
                current.definition = definition.clone();
                current.updated_at = now;
                let current = current.clone();
                changes.push(row_change(TABLE_TEMPLATES, ChangeEventType::Update, &current, Some(&old)));
                TemplateRevision::Updated(current)
            }
        };
        self.publish(changes);
        Ok(revision)
    }

    async fn create_post(&self, input: NewPost) -> StoreResult<(Post, Vec<DepartmentTask>)> {
        let mut changes = Vec::new();
        let created = {
            let mut state = self.lock();
            let now = Utc::now();
            let departments = input.template.definition.assigned_departments.clone();
            let sequence = state
                .sequences
                .get(&input.organization_id)
                .copied()
                .unwrap_or(0)
                + 1;

            let post = Post {
                id: state.next_id(),
                organization_id: input.organization_id,
                post_number: format_post_number(sequence),
                template_id: input.template.id,
                template_snapshot: input.template,
                form_data: input.form_data,
                status: PostStatus::Pending,
                assigned_departments: departments.clone(),
                photo_url: input.metadata.photo_url,
                source_department: input.metadata.source_department,
                notes: input.metadata.notes,
                created_by: input.created_by,
                created_at: now,
                updated_at: now,
                completed_at: None,
                cancelled_at: None,
                cancel_reason: None,
                followup_reason: None,
            };

            let mut tasks = Vec::with_capacity(departments.len());
            for department_code in &departments {
                tasks.push(DepartmentTask {
                    id: state.next_id(),
                    organization_id: post.organization_id,
                    post_id: post.id,
                    department_code: department_code.clone(),
                    status: DepartmentTaskStatus::Pending,
                    started_at: None,
                    completed_by_id: None,
                    completed_at: None,
                    completion_notes: None,
                    skip_reason: None,
                    created_at: now,
                    updated_at: now,
                });
            }
            if self.drop_next_task_insert.swap(false, Ordering::SeqCst) {
                tasks.pop();
            }

            if tasks.len() != departments.len() {
                return Err(CoreError::PartialFanOut {
                    post_id: post.id,
                    expected: departments.len(),
                    actual: tasks.len(),
                }
                .into());
            }

            state.sequences.insert(post.organization_id, sequence);
            changes.push(row_change(TABLE_POSTS, ChangeEventType::Insert, &post, None));
            for task in &tasks {
                changes.push(row_change(TABLE_DEPARTMENT_TASKS, ChangeEventType::Insert, task, None));
            }
            state.posts.push(post.clone());
            state.tasks.extend(tasks.iter().cloned());
            (post, tasks)
        };
        self.publish(changes);
        Ok(created)
    }

    async fn find_post(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<Post>> {
        Ok(self
            .lock()
            .posts
            .iter()
            .find(|p| p.organization_id == organization_id && p.id == id)
            .cloned())
    }

    async fn list_posts(&self, organization_id: DbId, filter: &PostFilter) -> StoreResult<Vec<Post>> {
        let state = self.lock();
        Ok(state
            .posts
            .iter()
            .rev()
            .filter(|p| p.organization_id == organization_id && filter.matches(p))
            .skip(usize::try_from(filter.offset).unwrap_or(0))
            .take(usize::try_from(filter.limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn list_post_tasks(&self, post_id: DbId) -> StoreResult<Vec<DepartmentTask>> {
        Ok(self.lock().post_tasks(post_id))
    }

    async fn list_form_links(&self, post_id: DbId) -> StoreResult<Vec<FormLink>> {
        Ok(self
            .lock()
            .links
            .iter()
            .filter(|l| l.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn add_form_link(&self, link: NewFormLink) -> StoreResult<FormLink> {
        let mut changes = Vec::new();
        let created = self.lock().add_link(link, &mut changes);
        self.publish(changes);
        Ok(created)
    }

    async fn find_task(&self, organization_id: DbId, id: DbId) -> StoreResult<Option<DepartmentTask>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .find(|t| t.organization_id == organization_id && t.id == id)
            .cloned())
    }

    async fn list_department_tasks(
        &self,
        organization_id: DbId,
        department_code: &str,
        open_only: bool,
    ) -> StoreResult<Vec<DepartmentTask>> {
        Ok(self
            .lock()
            .tasks
            .iter()
            .rev()
            .filter(|t| {
                t.organization_id == organization_id
                    && t.department_code == department_code
                    && (!open_only || !t.status.is_terminal())
            })
            .cloned()
            .collect())
    }

    async fn transition_task(
        &self,
        organization_id: DbId,
        task_id: DbId,
        command: &TaskCommand,
        actor: DbId,
        linked_reference: Option<&LinkedReference>,
    ) -> StoreResult<TaskTransition> {
        let mut changes = Vec::new();
        let transition = {
            let mut state = self.lock();
            let task_index = state
                .tasks
                .iter()
                .position(|t| t.organization_id == organization_id && t.id == task_id)
                .ok_or(CoreError::NotFound {
                    entity: "department task",
                    id: task_id,
                })?;
            let post_id = state.tasks[task_index].post_id;
            let post_index = state.post_index(organization_id, post_id)?;
            let post = state.posts[post_index].clone();
            post.ensure_accepts_task_updates()?;

            let now = Utc::now();
            let old_task = state.tasks[task_index].clone();
            let task = apply_command(&old_task, command, actor, now)?;
            state.tasks[task_index] = task.clone();
            changes.push(row_change(
                TABLE_DEPARTMENT_TASKS,
                ChangeEventType::Update,
                &task,
                Some(&old_task),
            ));

            let form_link = linked_reference.map(|reference| {
                state.add_link(
                    NewFormLink {
                        organization_id,
                        post_id,
                        department_task_id: Some(task.id),
                        form_type: reference.form_type.clone(),
                        form_id: reference.form_id.clone(),
                        created_by: Some(actor),
                    },
                    &mut changes,
                )
            });

            let rollup = recompute_rollup(&post, &state.post_tasks(post_id), now);
            let previous_post_status = post.status;
            let post = if rollup.status != post.status || rollup.completed_at != post.completed_at {
                let updated = &mut state.posts[post_index];
                updated.status = rollup.status;
                updated.completed_at = rollup.completed_at;
                updated.updated_at = now;
                let updated = updated.clone();
                changes.push(row_change(TABLE_POSTS, ChangeEventType::Update, &updated, Some(&post)));
                updated
            } else {
                post
            };

            TaskTransition {
                task,
                post,
                previous_post_status,
                form_link,
            }
        };
        self.publish(changes);
        Ok(transition)
    }

    async fn cancel_post(
        &self,
        organization_id: DbId,
        post_id: DbId,
        reason: &str,
    ) -> StoreResult<PostCancellation> {
        let mut changes = Vec::new();
        let cancellation = {
            let mut state = self.lock();
            let post_index = state.post_index(organization_id, post_id)?;
            let old_post = state.posts[post_index].clone();
            old_post.ensure_can_cancel()?;
            let now = Utc::now();

            let mut skipped_tasks = Vec::new();
            for task in state
                .tasks
                .iter_mut()
                .filter(|t| t.post_id == post_id && !t.status.is_terminal())
            {
                let old_task = task.clone();
                task.status = DepartmentTaskStatus::Skipped;
                task.skip_reason = Some(reason.to_string());
                task.updated_at = now;
                changes.push(row_change(
                    TABLE_DEPARTMENT_TASKS,
                    ChangeEventType::Update,
                    &*task,
                    Some(&old_task),
                ));
                skipped_tasks.push(task.clone());
            }

            let post = &mut state.posts[post_index];
            post.status = PostStatus::Cancelled;
            post.cancelled_at = Some(now);
            post.cancel_reason = Some(reason.to_string());
            post.updated_at = now;
            let post = post.clone();
            changes.push(row_change(TABLE_POSTS, ChangeEventType::Update, &post, Some(&old_post)));

            PostCancellation {
                post,
                skipped_tasks,
            }
        };
        self.publish(changes);
        Ok(cancellation)
    }

    async fn flag_followup(&self, organization_id: DbId, post_id: DbId, reason: &str) -> StoreResult<Post> {
        let (post, change) = {
            let mut state = self.lock();
            let post_index = state.post_index(organization_id, post_id)?;
            let old_post = state.posts[post_index].clone();
            old_post.ensure_can_flag_followup()?;

            let post = &mut state.posts[post_index];
            post.status = PostStatus::RequiresFollowup;
            post.followup_reason = Some(reason.to_string());
            post.updated_at = Utc::now();
            let post = post.clone();
            let change = row_change(TABLE_POSTS, ChangeEventType::Update, &post, Some(&old_post));
            (post, change)
        };
        self.publish(vec![change]);
        Ok(post)
    }

    async fn clear_followup(&self, organization_id: DbId, post_id: DbId) -> StoreResult<Post> {
        let (post, change) = {
            let mut state = self.lock();
            let post_index = state.post_index(organization_id, post_id)?;
            let old_post = state.posts[post_index].clone();
            old_post.ensure_requires_followup()?;

            let now = Utc::now();
            let rollup = rollup_after_followup(&old_post, &state.post_tasks(post_id), now);
            let post = &mut state.posts[post_index];
            post.status = rollup.status;
            post.completed_at = rollup.completed_at;
            post.followup_reason = None;
            post.updated_at = now;
            let post = post.clone();
            let change = row_change(TABLE_POSTS, ChangeEventType::Update, &post, Some(&old_post));
            (post, change)
        };
        self.publish(vec![change]);
        Ok(post)
    }

    async fn claim_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        action: RuleAction,
    ) -> StoreResult<DispatchClaim> {
        let mut state = self.lock();
        let now = Utc::now();
        match state.dispatch_index(post_id, rule_index) {
            Some(index) => {
                let entry = &mut state.dispatches[index];
                if !entry.status.is_retryable() {
                    return Ok(DispatchClaim::AlreadyHandled(entry.clone()));
                }
                entry.status = DispatchStatus::Pending;
                entry.attempts += 1;
                entry.error = None;
                entry.updated_at = now;
                Ok(DispatchClaim::Claimed {
                    attempt: entry.attempts,
                })
            }
            None => {
                let id = state.next_id();
                state.dispatches.push(RuleDispatch {
                    id,
                    post_id,
                    rule_index,
                    action,
                    status: DispatchStatus::Pending,
                    external_ref: None,
                    error: None,
                    attempts: 1,
                    created_at: now,
                    updated_at: now,
                });
                Ok(DispatchClaim::Claimed { attempt: 1 })
            }
        }
    }

    async fn finish_dispatch(
        &self,
        post_id: DbId,
        rule_index: i32,
        status: DispatchStatus,
        external_ref: Option<&str>,
        error: Option<&str>,
    ) -> StoreResult<RuleDispatch> {
        let mut state = self.lock();
        let index = state.dispatch_index(post_id, rule_index).ok_or_else(|| {
            CoreError::Internal(format!(
                "No dispatch entry for post {post_id} rule {rule_index}"
            ))
        })?;
        let entry = &mut state.dispatches[index];
        entry.status = status;
        entry.external_ref = external_ref.map(str::to_string);
        entry.error = error.map(str::to_string);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn list_rule_dispatches(&self, post_id: DbId) -> StoreResult<Vec<RuleDispatch>> {
        let mut entries: Vec<RuleDispatch> = self
            .lock()
            .dispatches
            .iter()
            .filter(|d| d.post_id == post_id)
            .cloned()
            .collect();
        entries.sort_by_key(|d| d.rule_index);
        Ok(entries)
    }
}
