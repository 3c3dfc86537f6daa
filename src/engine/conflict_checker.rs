// ==========================================
// CRM 元数据部署系统 - 拓扑冲突检查
// ==========================================
// 职责: 部署计划 × 远程拓扑快照 → 红/黄/绿冲突发现
// 红线: 纯函数, 不访问远程; 仅提示, 不阻断部署
// ==========================================

use serde_json::Value;

use crate::domain::conflict::{ConflictFinding, ConflictReport};
use crate::domain::plan::{DeploymentPlan, FieldSpec};
use crate::domain::topology::{FieldDescriptor, ObjectDescriptor, TopologySnapshot};
use crate::domain::types::Severity;

/// 冲突检查: 对计划内每个对象/字段与快照逐项比对
pub fn check(plan: &DeploymentPlan, snapshot: &TopologySnapshot) -> ConflictReport {
    let mut findings: Vec<ConflictFinding> = Vec::new();

    for custom_object in &plan.custom_objects {
        let object_name = custom_object.api_name.as_str();
        if object_name.is_empty() {
            continue;
        }

        let Some(existing) = snapshot.object(object_name) else {
            findings.push(ConflictFinding::new(
                Severity::Green,
                "object_name",
                format!("{object_name} does not exist - safe to create"),
            ));
            for plan_field in &custom_object.fields {
                if plan_field.api_name.is_empty() {
                    continue;
                }
                findings.push(ConflictFinding::new(
                    Severity::Green,
                    "field_name",
                    format!(
                        "{object_name}.{} does not exist - safe to create",
                        plan_field.api_name
                    ),
                ));
            }
            continue;
        };

        // 待创建对象已存在: 红, 并继续逐字段比对给出细节
        findings.push(ConflictFinding::new(
            Severity::Red,
            "object_name",
            format!("{object_name} already exists in topology snapshot"),
        ));

        let field_map = existing.field_map();
        for plan_field in &custom_object.fields {
            compare_field(&mut findings, object_name, plan_field, &field_map);
        }
    }

    for standard_object in &plan.standard_object_fields {
        let object_name = standard_object.object.as_str();
        if object_name.is_empty() {
            continue;
        }

        let Some(existing) = snapshot.object(object_name) else {
            // 标准对象必须已存在, 缺失说明连接的租户形态不符
            findings.push(ConflictFinding::new(
                Severity::Red,
                "standard_object",
                format!("{object_name} not found in topology snapshot"),
            ));
            continue;
        };

        findings.push(ConflictFinding::new(
            Severity::Green,
            "standard_object",
            format!("{object_name} exists in topology snapshot"),
        ));

        let field_map = existing.field_map();
        for plan_field in &standard_object.fields {
            compare_field(&mut findings, object_name, plan_field, &field_map);
        }

        let planned_names: Vec<&str> = standard_object
            .fields
            .iter()
            .map(|field| field.api_name.as_str())
            .collect();
        for field in &existing.fields {
            if field.name.is_empty() || planned_names.contains(&field.name.as_str()) {
                continue;
            }
            if field.is_required() {
                findings.push(ConflictFinding::new(
                    Severity::Yellow,
                    "required_field",
                    format!(
                        "{object_name} has required field '{}' not in deployment plan",
                        field.name
                    ),
                ));
            }
        }

        if has_active_validation_rules(existing) {
            findings.push(ConflictFinding::new(
                Severity::Yellow,
                "validation_rule",
                format!("{object_name} has active validation rules"),
            ));
        }
    }

    ConflictReport::aggregate(findings)
}

/// 单字段比对: 不存在绿, 同类型黄, 异类型红
fn compare_field(
    findings: &mut Vec<ConflictFinding>,
    object_name: &str,
    plan_field: &FieldSpec,
    field_map: &std::collections::BTreeMap<&str, &FieldDescriptor>,
) {
    let field_name = plan_field.api_name.as_str();
    if field_name.is_empty() {
        return;
    }

    let Some(existing_field) = field_map.get(field_name) else {
        findings.push(ConflictFinding::new(
            Severity::Green,
            "field_name",
            format!("{object_name}.{field_name} does not exist - safe to create"),
        ));
        return;
    };

    // 比较前统一归一化到平台原生类型词汇, 大小写不敏感
    let existing_type = existing_field.field_type.to_lowercase();
    let plan_type = plan_field.field_type.native_type();

    if existing_type == plan_type {
        findings.push(ConflictFinding::new(
            Severity::Yellow,
            "field_name",
            format!("{object_name}.{field_name} already exists with same type ({existing_type})"),
        ));
    } else {
        findings.push(ConflictFinding::new(
            Severity::Red,
            "field_name",
            format!(
                "{object_name}.{field_name} already exists with different type (existing={existing_type}, requested={plan_type})"
            ),
        ));
    }
}

/// 校验规则探测, 容忍快照的三种形态:
/// 列表形态 / 带 rules|records|items 键的字典形态 / 无规则数组时扫描字段键名
fn has_active_validation_rules(object_payload: &ObjectDescriptor) -> bool {
    match &object_payload.validation_rules {
        Some(Value::Array(rules)) => {
            if rules.iter().any(rule_is_active) {
                return true;
            }
        }
        Some(Value::Object(payload)) => {
            for key in ["rules", "records", "items"] {
                if let Some(Value::Array(rules)) = payload.get(key) {
                    if rules.iter().any(rule_is_active) {
                        return true;
                    }
                }
            }
        }
        _ => {}
    }

    object_payload.fields.iter().any(|field| {
        field
            .extra
            .iter()
            .any(|(key, value)| key.to_lowercase().contains("validation") && is_truthy(value))
    })
}

fn rule_is_active(rule: &Value) -> bool {
    match rule {
        Value::Object(payload) => {
            payload.get("active") == Some(&Value::Bool(true))
                || payload.get("isActive") == Some(&Value::Bool(true))
        }
        other => is_truthy(other),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64() != Some(0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(payload) => !payload.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{CustomObjectSpec, FieldType, StandardObjectFields};
    use serde_json::json;

    fn snapshot(objects: Value) -> TopologySnapshot {
        serde_json::from_value(json!({ "objects": objects })).unwrap()
    }

    fn field(api_name: &str, field_type: FieldType) -> FieldSpec {
        FieldSpec {
            api_name: api_name.to_string(),
            label: api_name.to_string(),
            field_type,
            required: None,
            length: None,
            precision: None,
            scale: None,
            picklist_values: vec![],
            restricted: None,
            related_to: None,
            relationship_name: None,
            delete_constraint: None,
            default_checked: None,
            visible_lines: None,
        }
    }

    fn plan_with_objects(objects: Vec<CustomObjectSpec>) -> DeploymentPlan {
        DeploymentPlan {
            custom_objects: objects,
            ..DeploymentPlan::default()
        }
    }

    #[test]
    fn test_new_object_is_green() {
        let plan = plan_with_objects(vec![CustomObjectSpec {
            api_name: "Foo__c".to_string(),
            label: "Foo".to_string(),
            plural_label: None,
            fields: vec![field("Bar__c", FieldType::Text)],
            relationships: vec![],
        }]);
        let report = check(&plan, &snapshot(json!({})));
        // 对象绿 + 计划字段逐个绿
        assert_eq!(report.overall_severity, Severity::Green);
        assert_eq!(report.green_count, 2);
        assert_eq!(report.findings[0].category, "object_name");
        assert!(report.findings[1].message.contains("Foo__c.Bar__c does not exist"));
    }

    #[test]
    fn test_check_is_idempotent() {
        let plan = plan_with_objects(vec![CustomObjectSpec {
            api_name: "Foo__c".to_string(),
            label: "Foo".to_string(),
            plural_label: None,
            fields: vec![field("Bar__c", FieldType::Text)],
            relationships: vec![],
        }]);
        let topology = snapshot(json!({
            "Foo__c": {"fields": [{"name": "Bar__c", "type": "string"}]}
        }));
        let first = check(&plan, &topology);
        let second = check(&plan, &topology);
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_object_is_red_with_field_detail() {
        let plan = plan_with_objects(vec![CustomObjectSpec {
            api_name: "Foo__c".to_string(),
            label: "Foo".to_string(),
            plural_label: None,
            fields: vec![
                field("Bar__c", FieldType::Text),
                field("Baz__c", FieldType::Currency),
            ],
            relationships: vec![],
        }]);
        let topology = snapshot(json!({
            "Foo__c": {
                "fields": [
                    {"name": "Bar__c", "type": "string"},
                    {"name": "Baz__c", "type": "double"}
                ]
            }
        }));
        let report = check(&plan, &topology);

        // 对象红 + 同类型字段黄 + 异类型字段红
        assert_eq!(report.overall_severity, Severity::Red);
        assert_eq!(report.red_count, 2);
        assert_eq!(report.yellow_count, 1);
        assert!(report.findings[1]
            .message
            .contains("already exists with same type (string)"));
        assert!(report.findings[2]
            .message
            .contains("existing=double, requested=currency"));
    }

    #[test]
    fn test_type_comparison_is_case_insensitive() {
        let plan = DeploymentPlan {
            standard_object_fields: vec![StandardObjectFields {
                object: "Account".to_string(),
                fields: vec![field("Tier__c", FieldType::Text)],
            }],
            ..DeploymentPlan::default()
        };
        let topology = snapshot(json!({
            "Account": {"fields": [{"name": "Tier__c", "type": "STRING"}]}
        }));
        let report = check(&plan, &topology);
        assert_eq!(report.overall_severity, Severity::Yellow);
    }

    #[test]
    fn test_missing_standard_object_is_red() {
        let plan = DeploymentPlan {
            standard_object_fields: vec![StandardObjectFields {
                object: "Account".to_string(),
                fields: vec![],
            }],
            ..DeploymentPlan::default()
        };
        let report = check(&plan, &snapshot(json!({})));
        assert_eq!(report.overall_severity, Severity::Red);
        assert_eq!(report.findings[0].category, "standard_object");
    }

    #[test]
    fn test_uncovered_required_field_is_yellow() {
        let plan = DeploymentPlan {
            standard_object_fields: vec![StandardObjectFields {
                object: "Account".to_string(),
                fields: vec![field("Tier__c", FieldType::Text)],
            }],
            ..DeploymentPlan::default()
        };
        let topology = snapshot(json!({
            "Account": {
                "fields": [
                    {"name": "Industry__c", "type": "string", "nillable": false, "defaultValue": null},
                    {"name": "Notes__c", "type": "string", "nillable": true}
                ]
            }
        }));
        let report = check(&plan, &topology);
        let required: Vec<_> = report
            .findings
            .iter()
            .filter(|finding| finding.category == "required_field")
            .collect();
        assert_eq!(required.len(), 1);
        assert!(required[0].message.contains("Industry__c"));
    }

    #[test]
    fn test_validation_rule_detection_three_shapes() {
        let list_shape = snapshot(json!({
            "Account": {
                "fields": [],
                "validationRules": [{"active": true}]
            }
        }));
        let dict_shape = snapshot(json!({
            "Account": {
                "fields": [],
                "validationRules": {"records": [{"isActive": true}]}
            }
        }));
        let field_shape = snapshot(json!({
            "Account": {
                "fields": [{"name": "X__c", "type": "string", "validationRuleCount": 2}]
            }
        }));
        let inactive = snapshot(json!({
            "Account": {
                "fields": [],
                "validationRules": [{"active": false}]
            }
        }));

        let plan = DeploymentPlan {
            standard_object_fields: vec![StandardObjectFields {
                object: "Account".to_string(),
                fields: vec![],
            }],
            ..DeploymentPlan::default()
        };

        for topology in [&list_shape, &dict_shape, &field_shape] {
            let report = check(&plan, topology);
            assert!(
                report
                    .findings
                    .iter()
                    .any(|finding| finding.category == "validation_rule"),
                "expected validation_rule finding"
            );
        }
        let report = check(&plan, &inactive);
        assert!(!report
            .findings
            .iter()
            .any(|finding| finding.category == "validation_rule"));
    }

    #[test]
    fn test_severity_aggregation_order() {
        // 同时有红黄绿 ⇒ 红
        let plan = plan_with_objects(vec![CustomObjectSpec {
            api_name: "Foo__c".to_string(),
            label: "Foo".to_string(),
            plural_label: None,
            fields: vec![field("Bar__c", FieldType::Text)],
            relationships: vec![],
        }]);
        let topology = snapshot(json!({
            "Foo__c": {"fields": [{"name": "Bar__c", "type": "double"}]}
        }));
        let report = check(&plan, &topology);
        assert_eq!(report.overall_severity, Severity::Red);
        assert_eq!(
            report.red_count + report.yellow_count + report.green_count,
            report.findings.len()
        );
    }
}
