//! Repository for the `task_feed_templates` table.

use sqlx::types::Json;
use sqlx::PgExecutor;
use taskfeed_core::template::TemplateDefinition;
use taskfeed_core::types::DbId;

use crate::models::template::{CreateTemplate, TemplateListParams, TemplateRow};

/// Column list for task_feed_templates queries.
const COLUMNS: &str = "id, organization_id, name, description, button_type, \
    triggering_department, assigned_departments, form_fields, photo_required, \
    workflow_rules, is_active, version, supersedes_id, created_by, created_at, updated_at";

/// Provides CRUD operations for task feed templates.
pub struct TemplateRepo;

impl TemplateRepo {
    /// Insert a template version, returning the created row.
    pub async fn create<'e, E>(
        executor: E,
        input: &CreateTemplate<'_>,
    ) -> Result<TemplateRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let def = input.definition;
        let query = format!(
            "INSERT INTO task_feed_templates
                (organization_id, name, description, button_type, triggering_department,
                 assigned_departments, form_fields, photo_required, workflow_rules,
                 is_active, version, supersedes_id, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(input.organization_id)
            .bind(&def.name)
            .bind(&def.description)
            .bind(def.button_type.as_str())
            .bind(def.triggering_department.as_str())
            .bind(&def.assigned_departments)
            .bind(Json(&def.form_fields))
            .bind(def.photo_required)
            .bind(Json(&def.workflow_rules))
            .bind(def.is_active)
            .bind(input.version)
            .bind(input.supersedes_id)
            .bind(input.created_by)
            .fetch_one(executor)
            .await
    }

    /// Find a template by ID within an organization.
    pub async fn find_by_id<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<TemplateRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_templates
             WHERE organization_id = $1 AND id = $2"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Whether any template (active or not) with this name exists.
    pub async fn exists_by_name<'e, E>(
        executor: E,
        organization_id: DbId,
        name: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                SELECT 1 FROM task_feed_templates
                WHERE organization_id = $1 AND name = $2
             )",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_one(executor)
        .await
    }

    /// List templates for an organization, ordered by name then newest version.
    pub async fn list<'e, E>(
        executor: E,
        organization_id: DbId,
        params: &TemplateListParams,
    ) -> Result<Vec<TemplateRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_templates
             WHERE organization_id = $1
               AND ($2 = false OR is_active = true)
               AND ($3::text IS NULL OR triggering_department = 'any' OR triggering_department = $3)
               AND ($4::text IS NULL OR button_type = $4)
             ORDER BY name ASC, version DESC"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(organization_id)
            .bind(params.active_only)
            .bind(&params.triggering_department)
            .bind(&params.button_type)
            .fetch_all(executor)
            .await
    }

    /// Overwrite a template's content in place.
    pub async fn update_in_place<'e, E>(
        executor: E,
        id: DbId,
        def: &TemplateDefinition,
    ) -> Result<TemplateRow, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE task_feed_templates SET
                name = $2,
                description = $3,
                button_type = $4,
                triggering_department = $5,
                assigned_departments = $6,
                form_fields = $7,
                photo_required = $8,
                workflow_rules = $9,
                is_active = $10,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(id)
            .bind(&def.name)
            .bind(&def.description)
            .bind(def.button_type.as_str())
            .bind(def.triggering_department.as_str())
            .bind(&def.assigned_departments)
            .bind(Json(&def.form_fields))
            .bind(def.photo_required)
            .bind(Json(&def.workflow_rules))
            .bind(def.is_active)
            .fetch_one(executor)
            .await
    }

    /// Set `is_active` on a template. Returns `true` if a row was updated.
    pub async fn set_active<'e, E>(executor: E, id: DbId, active: bool) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE task_feed_templates SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(active)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Id of the version that replaced `id`, if any.
    pub async fn superseded_by<'e, E>(executor: E, id: DbId) -> Result<Option<DbId>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM task_feed_templates WHERE supersedes_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Lock a template row for the rest of the transaction.
    pub async fn lock<'e, E>(
        executor: E,
        organization_id: DbId,
        id: DbId,
    ) -> Result<Option<TemplateRow>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM task_feed_templates
             WHERE organization_id = $1 AND id = $2
             FOR UPDATE"
        );
        sqlx::query_as::<_, TemplateRow>(&query)
            .bind(organization_id)
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}
