//! Built-in template catalog installed by `seed_defaults`.

use crate::department::{
    TriggeringDepartment, DEPT_MAINTENANCE, DEPT_PRODUCTION, DEPT_PURCHASING, DEPT_QUALITY,
    DEPT_SAFETY, DEPT_SANITATION, DEPT_WAREHOUSE,
};
use crate::form::{FieldType, FormField};
use crate::rules::{RuleAction, RuleOperator, WorkOrderPriority, WorkflowRule};
use crate::template::{ButtonType, TemplateDefinition};

pub const TEMPLATE_PRE_OP: &str = "Pre-OP";
pub const TEMPLATE_EQUIPMENT_FAILURE: &str = "Equipment Failure";
pub const TEMPLATE_SANITATION_ISSUE: &str = "Sanitation Issue";
pub const TEMPLATE_SAFETY_CONCERN: &str = "Safety Concern";
pub const TEMPLATE_PURCHASE_REQUEST: &str = "Purchase Request";

fn field(id: &str, label: &str, field_type: FieldType, required: bool, sort_order: i32) -> FormField {
    FormField {
        id: id.to_string(),
        label: label.to_string(),
        field_type,
        required,
        options: Vec::new(),
        placeholder: None,
        sort_order,
    }
}

fn choice_field(
    id: &str,
    label: &str,
    field_type: FieldType,
    options: &[&str],
    sort_order: i32,
) -> FormField {
    FormField {
        options: options.iter().map(|o| o.to_string()).collect(),
        ..field(id, label, field_type, true, sort_order)
    }
}

fn severity_field(sort_order: i32) -> FormField {
    choice_field(
        "severity",
        "Severity",
        FieldType::Dropdown,
        &["low", "medium", "high", "critical"],
        sort_order,
    )
}

fn work_order_when_critical() -> WorkflowRule {
    WorkflowRule {
        create_work_order_priority: Some(WorkOrderPriority::Critical),
        ..WorkflowRule::unconditional(RuleAction::CreateWorkOrder).when(
            "severity",
            RuleOperator::Equals,
            "critical",
        )
    }
}

/// The catalog, in installation order.
pub fn default_templates() -> Vec<TemplateDefinition> {
    vec![
        TemplateDefinition {
            name: TEMPLATE_PRE_OP.into(),
            description: Some("Pre-operational line inspection before production start".into()),
            button_type: ButtonType::AddTask,
            triggering_department: TriggeringDepartment::Department(DEPT_PRODUCTION.into()),
            assigned_departments: vec![
                DEPT_SANITATION.into(),
                DEPT_QUALITY.into(),
                DEPT_MAINTENANCE.into(),
            ],
            form_fields: vec![
                field("line", "Production Line", FieldType::TextInput, true, 0),
                choice_field(
                    "result",
                    "Inspection Result",
                    FieldType::Radio,
                    &["pass", "fail"],
                    1,
                ),
                field("inspection_date", "Inspection Date", FieldType::Date, true, 2),
                field("notes", "Notes", FieldType::TextArea, false, 3),
            ],
            photo_required: false,
            workflow_rules: vec![
                WorkflowRule::unconditional(RuleAction::StoreOnly),
                WorkflowRule {
                    message: Some("Pre-OP inspection failed".into()),
                    ..WorkflowRule::unconditional(RuleAction::Notify).when(
                        "result",
                        RuleOperator::Equals,
                        "fail",
                    )
                },
            ],
            is_active: true,
        },
        TemplateDefinition {
            name: TEMPLATE_EQUIPMENT_FAILURE.into(),
            description: Some("Report a machine breakdown or malfunction".into()),
            button_type: ButtonType::ReportIssue,
            triggering_department: TriggeringDepartment::Any,
            assigned_departments: vec![DEPT_MAINTENANCE.into()],
            form_fields: vec![
                field("equipment", "Equipment", FieldType::TextInput, true, 0),
                severity_field(1),
                field("description", "What happened?", FieldType::TextArea, false, 2),
            ],
            photo_required: false,
            workflow_rules: vec![work_order_when_critical()],
            is_active: true,
        },
        TemplateDefinition {
            name: TEMPLATE_SANITATION_ISSUE.into(),
            description: Some("Report a sanitation or cleanliness deviation".into()),
            button_type: ButtonType::ReportIssue,
            triggering_department: TriggeringDepartment::Any,
            assigned_departments: vec![DEPT_SANITATION.into(), DEPT_QUALITY.into()],
            form_fields: vec![
                field("area", "Area", FieldType::TextInput, true, 0),
                choice_field(
                    "issue_type",
                    "Issue Type",
                    FieldType::Checkbox,
                    &["residue", "pest", "standing water", "allergen"],
                    1,
                ),
                field("notes", "Notes", FieldType::TextArea, false, 2),
            ],
            photo_required: true,
            workflow_rules: vec![WorkflowRule {
                message: Some("Allergen contamination reported".into()),
                ..WorkflowRule::unconditional(RuleAction::Notify).when(
                    "issue_type",
                    RuleOperator::Contains,
                    "allergen",
                )
            }],
            is_active: true,
        },
        TemplateDefinition {
            name: TEMPLATE_SAFETY_CONCERN.into(),
            description: Some("Raise a workplace safety hazard or near miss".into()),
            button_type: ButtonType::ReportIssue,
            triggering_department: TriggeringDepartment::Any,
            assigned_departments: vec![DEPT_SAFETY.into(), DEPT_PRODUCTION.into()],
            form_fields: vec![
                field("location", "Location", FieldType::TextInput, true, 0),
                severity_field(1),
                field("description", "Description", FieldType::TextArea, true, 2),
            ],
            photo_required: false,
            workflow_rules: vec![WorkflowRule::unconditional(RuleAction::StoreOnly)],
            is_active: true,
        },
        TemplateDefinition {
            name: TEMPLATE_PURCHASE_REQUEST.into(),
            description: Some("Request parts or supplies".into()),
            button_type: ButtonType::RequestPurchase,
            triggering_department: TriggeringDepartment::Any,
            assigned_departments: vec![DEPT_PURCHASING.into(), DEPT_WAREHOUSE.into()],
            form_fields: vec![
                field("item", "Item", FieldType::TextInput, true, 0),
                field("quantity", "Quantity", FieldType::Number, true, 1),
                field("needed_by", "Needed By", FieldType::Date, false, 2),
            ],
            photo_required: false,
            workflow_rules: vec![WorkflowRule::unconditional(RuleAction::StoreOnly)],
            is_active: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::validate_definition;

    #[test]
    fn every_default_template_is_valid() {
        for def in default_templates() {
            validate_definition(&def).unwrap_or_else(|e| panic!("{}: {e}", def.name));
        }
    }

    #[test]
    fn default_names_are_unique() {
        let defs = default_templates();
        let mut names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), defs.len());
    }

    #[test]
    fn equipment_failure_routes_to_maintenance() {
        let defs = default_templates();
        let def = defs
            .iter()
            .find(|d| d.name == TEMPLATE_EQUIPMENT_FAILURE)
            .unwrap();
        assert_eq!(def.assigned_departments, vec![DEPT_MAINTENANCE.to_string()]);
        assert_eq!(def.workflow_rules[0].action, RuleAction::CreateWorkOrder);
    }
}
