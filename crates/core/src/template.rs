//! Post templates and authoring-time validation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::department::TriggeringDepartment;
use crate::error::{CoreError, FieldViolation};
use crate::form::{ordered_fields, FormField};
use crate::rules::{RuleAction, RuleOperator, WorkflowRule};
use crate::types::{DbId, Timestamp};

/// The feed button a template is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonType {
    AddTask,
    ReportIssue,
    RequestPurchase,
}

impl ButtonType {
    pub fn as_str(self) -> &'static str {
        match self {
            ButtonType::AddTask => "add_task",
            ButtonType::ReportIssue => "report_issue",
            ButtonType::RequestPurchase => "request_purchase",
        }
    }
}

impl std::str::FromStr for ButtonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add_task" => Ok(ButtonType::AddTask),
            "report_issue" => Ok(ButtonType::ReportIssue),
            "request_purchase" => Ok(ButtonType::RequestPurchase),
            other => Err(format!("Unknown button type '{other}'")),
        }
    }
}

/// The authored part of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub button_type: ButtonType,
    pub triggering_department: TriggeringDepartment,
    pub assigned_departments: Vec<String>,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
    #[serde(default)]
    pub photo_required: bool,
    #[serde(default)]
    pub workflow_rules: Vec<WorkflowRule>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// A persisted template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: DbId,
    pub organization_id: DbId,
    #[serde(flatten)]
    pub definition: TemplateDefinition,
    pub version: i32,
    pub supersedes_id: Option<DbId>,
    pub created_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn ordered_fields(&self) -> Vec<&FormField> {
        ordered_fields(&self.definition.form_fields)
    }
}

/// Partial update of a template definition. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub button_type: Option<ButtonType>,
    pub triggering_department: Option<TriggeringDepartment>,
    pub assigned_departments: Option<Vec<String>>,
    pub form_fields: Option<Vec<FormField>>,
    pub photo_required: Option<bool>,
    pub workflow_rules: Option<Vec<WorkflowRule>>,
    pub is_active: Option<bool>,
}

impl TemplatePatch {
    /// Apply onto a copy of `base`.
    pub fn apply(self, base: &TemplateDefinition) -> TemplateDefinition {
        let mut next = base.clone();
        if let Some(v) = self.name {
            next.name = v;
        }
        if let Some(v) = self.description {
            next.description = Some(v);
        }
        if let Some(v) = self.button_type {
            next.button_type = v;
        }
        if let Some(v) = self.triggering_department {
            next.triggering_department = v;
        }
        if let Some(v) = self.assigned_departments {
            next.assigned_departments = v;
        }
        if let Some(v) = self.form_fields {
            next.form_fields = v;
        }
        if let Some(v) = self.photo_required {
            next.photo_required = v;
        }
        if let Some(v) = self.workflow_rules {
            next.workflow_rules = v;
        }
        if let Some(v) = self.is_active {
            next.is_active = v;
        }
        next
    }

    /// Whether the patch touches anything besides the active flag.
    pub fn changes_content(&self) -> bool {
        self.name.is_some()
            || self.description.is_some()
            || self.button_type.is_some()
            || self.triggering_department.is_some()
            || self.assigned_departments.is_some()
            || self.form_fields.is_some()
            || self.photo_required.is_some()
            || self.workflow_rules.is_some()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Check a definition, collecting every violation.
pub fn validate_definition(def: &TemplateDefinition) -> Result<(), CoreError> {
    let mut violations = Vec::new();

    if def.name.trim().is_empty() {
        violations.push(FieldViolation::new("name", "blank", "Template name is required"));
    }

    if def.assigned_departments.is_empty() {
        violations.push(FieldViolation::new(
            "assigned_departments",
            "empty",
            "At least one department must be assigned",
        ));
    }
    let mut seen_departments = HashSet::new();
    for (i, code) in def.assigned_departments.iter().enumerate() {
        if code.trim().is_empty() {
            violations.push(FieldViolation::new(
                format!("assigned_departments[{i}]"),
                "blank",
                "Department code must not be blank",
            ));
        } else if !seen_departments.insert(code.as_str()) {
            violations.push(FieldViolation::new(
                format!("assigned_departments[{i}]"),
                "duplicate",
                format!("Department '{code}' is assigned more than once"),
            ));
        }
    }

    let mut seen_fields = HashSet::new();
    for (i, field) in def.form_fields.iter().enumerate() {
        if field.id.trim().is_empty() {
            violations.push(FieldViolation::new(
                format!("form_fields[{i}].id"),
                "blank",
                "Field id must not be blank",
            ));
        } else if !seen_fields.insert(field.id.as_str()) {
            violations.push(FieldViolation::new(
                format!("form_fields[{i}].id"),
                "duplicate",
                format!("Field id '{}' is used more than once", field.id),
            ));
        }

        if field.field_type.requires_options() {
            if field.options.is_empty() {
                violations.push(FieldViolation::new(
                    format!("form_fields[{i}].options"),
                    "missing_options",
                    format!("Field '{}' must declare at least one option", field.id),
                ));
            }
            let mut seen_options = HashSet::new();
            for option in &field.options {
                if !seen_options.insert(option.as_str()) {
                    violations.push(FieldViolation::new(
                        format!("form_fields[{i}].options"),
                        "duplicate_option",
                        format!("Option '{option}' appears more than once on '{}'", field.id),
                    ));
                }
            }
        }
    }

    for (i, rule) in def.workflow_rules.iter().enumerate() {
        if let Some(condition) = &rule.condition {
            match def.form_fields.iter().find(|f| f.id == condition.field_id) {
                None => violations.push(FieldViolation::new(
                    format!("workflow_rules[{i}].condition.field_id"),
                    "unknown_field",
                    format!(
                        "Rule condition references unknown field '{}'",
                        condition.field_id
                    ),
                )),
                // An exact comparison against a value that can never be
                // selected would never fire.
                Some(field)
                    if field.field_type.requires_options()
                        && condition.operator != RuleOperator::Contains
                        && !field.options.iter().any(|o| *o == condition.value) =>
                {
                    violations.push(FieldViolation::new(
                        format!("workflow_rules[{i}].condition.value"),
                        "unknown_option",
                        format!(
                            "'{}' is not an option of field '{}'",
                            condition.value, field.id
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        if rule.action == RuleAction::AlertPersonnel && rule.alert_personnel_ids.is_empty() {
            violations.push(FieldViolation::new(
                format!("workflow_rules[{i}].alert_personnel_ids"),
                "missing_personnel",
                "An alert_personnel rule must list at least one person",
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(CoreError::TemplateValidation(violations))
    }
}
