// ==========================================
// CRM 元数据部署系统 - 计划校验器
// ==========================================
// 职责: 对不可信计划文档做结构/语义校验, 产出强类型计划
// 红线: 纯函数, 无 I/O, 畸形输入一律转为带路径的校验错误, 绝不 panic
// ==========================================

use serde_json::{Map, Value};

use crate::domain::plan::{
    AnalyticsPlan, AssignmentRuleSpec, ChartSummary, CustomObjectSpec, DashboardComponent,
    DashboardSpec, DeploymentPlan, FieldSpec, FieldType, FilterCriteria, FlowSpec, FolderShare,
    FolderSpec, PicklistValue, ReportChart, ReportFilter, ReportGrouping, ReportSpec,
    StandardObjectFields, ALL_FIELD_TYPES, RELATIONSHIP_FIELD_TYPES,
};

// ==========================================
// 枚举约束集合 (错误消息按字典序枚举)
// ==========================================

const CUSTOM_FIELD_TYPE_NAMES: &[&str] = &[
    "Checkbox",
    "Currency",
    "Date",
    "DateTime",
    "Email",
    "LongTextArea",
    "Lookup",
    "MasterDetail",
    "Number",
    "Percent",
    "Phone",
    "Picklist",
    "Text",
    "TextArea",
    "Url",
];
const RELATIONSHIP_FIELD_TYPE_NAMES: &[&str] = &["Lookup", "MasterDetail"];

const FOLDER_ACCESS_TYPES: &[&str] = &["Hidden", "Public", "PublicInternal", "Shared"];
const REPORT_FORMATS: &[&str] = &["Matrix", "MultiBlock", "Summary", "Tabular"];
const REPORT_SCOPES: &[&str] = &["everything", "mine", "organization", "team", "user"];
const REPORT_CHART_TYPES: &[&str] = &[
    "Bar",
    "BarStacked",
    "BarStacked100",
    "Column",
    "ColumnStacked",
    "ColumnStacked100",
    "Donut",
    "Funnel",
    "HorizontalBar",
    "Line",
    "LineCumulative",
    "LineGrouped",
    "Pie",
    "Scatter",
    "ScatterGrouped",
    "VerticalColumn",
];
const CHART_AGGREGATES: &[&str] = &["Average", "Maximum", "Minimum", "RowCount", "Sum"];
const GROUPING_SORT_ORDERS: &[&str] = &["Asc", "Desc"];
const GROUPING_DATE_GRANULARITIES: &[&str] = &[
    "Day",
    "FiscalQuarter",
    "FiscalYear",
    "Month",
    "None",
    "Quarter",
    "Week",
    "Year",
];
const DASHBOARD_TYPES: &[&str] = &["LoggedInUser", "MyTeamUser", "SpecifiedUser"];
const DASHBOARD_COMPONENT_TYPES: &[&str] = &[
    "Bar",
    "BarStacked",
    "BarStacked100",
    "Column",
    "ColumnStacked",
    "ColumnStacked100",
    "Donut",
    "FlexTable",
    "Funnel",
    "Gauge",
    "Line",
    "LineCumulative",
    "LineGrouped",
    "Metric",
    "Pie",
    "Scatter",
    "ScatterGrouped",
    "Table",
];

/// 自定义对象后缀
pub const CUSTOM_SUFFIX: &str = "__c";

// ==========================================
// ValidationError
// ==========================================

/// 校验错误: 点路径 + 人类可读消息
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ==========================================
// 对外入口
// ==========================================

/// 校验计划文档, 空列表 ⇒ 计划可继续
pub fn validate(plan: &Value) -> Vec<ValidationError> {
    match parse(plan) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

/// 校验并构建强类型计划
///
/// 任何校验错误都会使整个计划被拒绝; 下游引擎只消费 Ok 分支的类型。
pub fn parse(plan: &Value) -> Result<DeploymentPlan, Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = Vec::new();

    let Some(plan_map) = plan.as_object() else {
        return Err(vec![ValidationError::new("plan", "Plan must be an object")]);
    };

    let custom_objects = parse_custom_objects(plan_map, &mut errors);
    let flows = parse_flows(plan_map, &mut errors);
    let assignment_rules = parse_assignment_rules(plan_map, &mut errors);
    let analytics = parse_analytics(plan_map, &mut errors);
    let standard_object_fields = parse_standard_object_fields(plan_map, &mut errors);

    if errors.is_empty() {
        Ok(DeploymentPlan {
            custom_objects,
            flows,
            assignment_rules,
            analytics,
            standard_object_fields,
        })
    } else {
        Err(errors)
    }
}

// ==========================================
// 基础工具
// ==========================================

fn add_error(errors: &mut Vec<ValidationError>, field: impl Into<String>, message: impl Into<String>) {
    errors.push(ValidationError::new(field, message));
}

fn non_empty_str(value: &Value) -> Option<&str> {
    let text = value.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 必填非空字符串, 缺失/非法时记录错误并返回空串
fn required_string(
    payload: &Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> String {
    if let Some(text) = payload.get(key).and_then(non_empty_str) {
        return text.to_string();
    }
    add_error(
        errors,
        format!("{path}.{key}"),
        format!("{key} must be a non-empty string"),
    );
    String::new()
}

/// 多个候选键名中取第一个非空字符串
fn optional_string(payload: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| payload.get(*key).and_then(non_empty_str))
        .map(str::to_string)
}

/// 如提供则必须为正整数
fn positive_int_if_present(
    payload: &Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<u32> {
    let value = payload.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_u64() {
        Some(v) if v > 0 && v <= u32::MAX as u64 => Some(v as u32),
        _ => {
            add_error(
                errors,
                format!("{path}.{key}"),
                format!("{key} must be a positive integer"),
            );
            None
        }
    }
}

/// 如提供则必须为布尔
fn bool_if_present(
    payload: &Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<bool> {
    let value = payload.get(key)?;
    if value.is_null() {
        return None;
    }
    match value.as_bool() {
        Some(v) => Some(v),
        None => {
            add_error(
                errors,
                format!("{path}.{key}"),
                format!("{key} must be a boolean when provided"),
            );
            None
        }
    }
}

/// 如提供则必须属于固定枚举集 (消息中枚举允许值)
fn enum_if_present(
    payload: &Map<String, Value>,
    key: &str,
    path: &str,
    allowed: &[&str],
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    let value = payload.get(key)?;
    match non_empty_str(value) {
        Some(text) if allowed.contains(&text) => Some(text.to_string()),
        _ => {
            add_error(
                errors,
                format!("{path}.{key}"),
                format!(
                    "Invalid {key} '{}'. Must be one of: {}",
                    display_value(value),
                    allowed.join(", ")
                ),
            );
            None
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// pre_existing 标志: 如提供则必须为布尔
fn pre_existing_flag(
    payload: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> bool {
    match payload.get("pre_existing") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            add_error(
                errors,
                format!("{path}.pre_existing"),
                "pre_existing must be a boolean when provided",
            );
            false
        }
    }
}

/// 取可选列表字段: 缺失 → 空, 非列表 → 错误
fn list_if_present<'a>(
    payload: &'a Map<String, Value>,
    key: &str,
    path_prefix: &str,
    errors: &mut Vec<ValidationError>,
) -> Vec<&'a Value> {
    match payload.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(_) => {
            let field = if path_prefix.is_empty() {
                key.to_string()
            } else {
                format!("{path_prefix}.{key}")
            };
            add_error(errors, field, format!("{key} must be a list when provided"));
            Vec::new()
        }
    }
}

// ==========================================
// 字段规格
// ==========================================

/// 校验并构建单个字段规格 (fields 与 relationships 共用)
fn parse_field_spec(
    payload: &Map<String, Value>,
    path: &str,
    relationship_only: bool,
    errors: &mut Vec<ValidationError>,
) -> Option<FieldSpec> {
    let api_name = required_string(payload, "api_name", path, errors);
    let label = required_string(payload, "label", path, errors);
    let type_text = required_string(payload, "type", path, errors);
    if type_text.is_empty() {
        return None;
    }

    let allowed_names = if relationship_only {
        RELATIONSHIP_FIELD_TYPE_NAMES
    } else {
        CUSTOM_FIELD_TYPE_NAMES
    };
    let parsed_type = FieldType::parse(&type_text);
    let allowed_types: &[FieldType] = if relationship_only {
        RELATIONSHIP_FIELD_TYPES
    } else {
        ALL_FIELD_TYPES
    };
    let field_type = match parsed_type {
        Some(field_type) if allowed_types.contains(&field_type) => field_type,
        _ => {
            add_error(
                errors,
                format!("{path}.type"),
                format!(
                    "Invalid field type '{type_text}'. Must be one of: {}",
                    allowed_names.join(", ")
                ),
            );
            return None;
        }
    };

    let required = bool_if_present(payload, "required", path, errors);
    let mut spec = FieldSpec {
        api_name,
        label,
        field_type,
        required,
        length: None,
        precision: None,
        scale: None,
        picklist_values: Vec::new(),
        restricted: None,
        related_to: None,
        relationship_name: None,
        delete_constraint: None,
        default_checked: None,
        visible_lines: None,
    };

    match field_type {
        FieldType::Text => {
            spec.length = positive_int_if_present(payload, "length", path, errors);
        }
        FieldType::Number | FieldType::Currency | FieldType::Percent => {
            let precision = positive_int_if_present(payload, "precision", path, errors);
            let scale = positive_int_if_present(payload, "scale", path, errors);
            if let (Some(precision), Some(scale)) = (precision, scale) {
                if precision < scale {
                    add_error(
                        errors,
                        format!("{path}.precision"),
                        format!(
                            "precision ({precision}) must be greater than or equal to scale ({scale})"
                        ),
                    );
                }
            }
            spec.precision = precision;
            spec.scale = scale;
        }
        FieldType::Picklist => {
            if let Some(values) = payload.get("values") {
                match values.as_array() {
                    Some(items) if !items.is_empty() => {
                        spec.picklist_values = items
                            .iter()
                            .enumerate()
                            .map(|(index, item)| parse_picklist_value(item, index))
                            .collect();
                    }
                    _ => {
                        add_error(
                            errors,
                            format!("{path}.values"),
                            "Picklist values must be a non-empty list when provided",
                        );
                    }
                }
            }
            spec.restricted = bool_if_present(payload, "restricted", path, errors);
        }
        FieldType::Lookup | FieldType::MasterDetail => {
            let related_to = optional_string(payload, &["related_to", "referenceTo"]);
            if related_to.is_none() {
                add_error(
                    errors,
                    format!("{path}.related_to"),
                    "Lookup/MasterDetail fields must include a non-empty related_to or referenceTo",
                );
            }
            spec.related_to = related_to;
            spec.relationship_name =
                optional_string(payload, &["relationship_name", "relationshipName"]);
            if field_type == FieldType::Lookup {
                spec.delete_constraint =
                    optional_string(payload, &["delete_constraint", "deleteConstraint"]);
            }
        }
        FieldType::Checkbox => {
            let default = bool_if_present(payload, "default", path, errors);
            let default_value = bool_if_present(payload, "default_value", path, errors);
            spec.default_checked = default.or(default_value);
        }
        FieldType::TextArea => {
            spec.length = positive_int_if_present(payload, "length", path, errors);
            spec.visible_lines = positive_int_if_present(payload, "visible_lines", path, errors);
        }
        FieldType::LongTextArea => {
            spec.length = positive_int_if_present(payload, "length", path, errors);
            spec.visible_lines = positive_int_if_present(payload, "visible_lines", path, errors)
                .or_else(|| positive_int_if_present(payload, "visibleLines", path, errors));
        }
        FieldType::Date | FieldType::DateTime | FieldType::Phone | FieldType::Email | FieldType::Url => {}
    }

    Some(spec)
}

/// 选项值: 接受裸字符串或结构化对象, 其余形态回落为占位名
fn parse_picklist_value(value: &Value, index: usize) -> PicklistValue {
    match value {
        Value::String(text) => PicklistValue {
            full_name: text.clone(),
            label: text.clone(),
            default: None,
            is_active: true,
        },
        Value::Object(payload) => {
            let full_name = optional_string(payload, &["fullName", "value", "label"])
                .unwrap_or_else(|| format!("Value_{}", index + 1));
            let label = optional_string(payload, &["label"]).unwrap_or_else(|| full_name.clone());
            PicklistValue {
                full_name,
                label,
                default: payload.get("default").and_then(Value::as_bool),
                is_active: payload
                    .get("isActive")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
            }
        }
        _ => {
            let full_name = format!("Value_{}", index + 1);
            PicklistValue {
                label: full_name.clone(),
                full_name,
                default: None,
                is_active: true,
            }
        }
    }
}

// ==========================================
// Schema 子计划
// ==========================================

fn parse_custom_objects(
    plan: &Map<String, Value>,
    errors: &mut Vec<ValidationError>,
) -> Vec<CustomObjectSpec> {
    let mut specs = Vec::new();
    for (index, entry) in list_if_present(plan, "custom_objects", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("custom_objects[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "custom_object entry must be an object");
            continue;
        };

        let api_name = required_string(payload, "api_name", &path, errors);
        if !api_name.is_empty() && !api_name.ends_with(CUSTOM_SUFFIX) {
            add_error(
                errors,
                format!("{path}.api_name"),
                format!("Custom object api_name must end with '{CUSTOM_SUFFIX}'"),
            );
        }
        let label = required_string(payload, "label", &path, errors);
        let plural_label = optional_string(payload, &["plural_label", "pluralLabel"]);

        let mut fields = Vec::new();
        for (field_index, field_entry) in list_if_present(payload, "fields", &path, errors)
            .into_iter()
            .enumerate()
        {
            let field_path = format!("{path}.fields[{field_index}]");
            let Some(field_payload) = field_entry.as_object() else {
                add_error(errors, field_path, "field entry must be an object");
                continue;
            };
            if let Some(spec) = parse_field_spec(field_payload, &field_path, false, errors) {
                fields.push(spec);
            }
        }

        let mut relationships = Vec::new();
        for (rel_index, rel_entry) in list_if_present(payload, "relationships", &path, errors)
            .into_iter()
            .enumerate()
        {
            let rel_path = format!("{path}.relationships[{rel_index}]");
            let Some(rel_payload) = rel_entry.as_object() else {
                add_error(errors, rel_path, "relationship entry must be an object");
                continue;
            };
            if let Some(spec) = parse_field_spec(rel_payload, &rel_path, true, errors) {
                relationships.push(spec);
            }
        }

        specs.push(CustomObjectSpec {
            api_name,
            label,
            plural_label,
            fields,
            relationships,
        });
    }
    specs
}

fn parse_standard_object_fields(
    plan: &Map<String, Value>,
    errors: &mut Vec<ValidationError>,
) -> Vec<StandardObjectFields> {
    let mut entries = Vec::new();
    for (index, entry) in list_if_present(plan, "standard_object_fields", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("standard_object_fields[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "standard_object_fields entry must be an object");
            continue;
        };

        let object = required_string(payload, "object", &path, errors);

        let mut fields = Vec::new();
        for (field_index, field_entry) in list_if_present(payload, "fields", &path, errors)
            .into_iter()
            .enumerate()
        {
            let field_path = format!("{path}.fields[{field_index}]");
            let Some(field_payload) = field_entry.as_object() else {
                add_error(errors, field_path, "field entry must be an object");
                continue;
            };
            if let Some(spec) = parse_field_spec(field_payload, &field_path, false, errors) {
                fields.push(spec);
            }
        }

        entries.push(StandardObjectFields { object, fields });
    }
    entries
}

// ==========================================
// 自动化子计划
// ==========================================

/// 原始 XML 或结构化 metadata 二选一
fn parse_metadata_pair(
    payload: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> (Option<String>, Option<Value>) {
    let xml_content = optional_string(payload, &["xml_content", "metadata_xml", "xml"]);
    let metadata = match payload.get("metadata") {
        Some(Value::Object(_)) => payload.get("metadata").cloned(),
        _ => None,
    };
    if xml_content.is_none() && metadata.is_none() {
        add_error(
            errors,
            format!("{path}.xml_content"),
            "entry must include a non-empty xml_content or a metadata object",
        );
    }
    (xml_content, metadata)
}

fn parse_flows(plan: &Map<String, Value>, errors: &mut Vec<ValidationError>) -> Vec<FlowSpec> {
    let mut specs = Vec::new();
    for (index, entry) in list_if_present(plan, "flows", "", errors).into_iter().enumerate() {
        let path = format!("flows[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "flow entry must be an object");
            continue;
        };
        let api_name = required_string(payload, "api_name", &path, errors);
        let (xml_content, metadata) = parse_metadata_pair(payload, &path, errors);
        specs.push(FlowSpec {
            api_name,
            xml_content,
            metadata,
        });
    }
    specs
}

fn parse_assignment_rules(
    plan: &Map<String, Value>,
    errors: &mut Vec<ValidationError>,
) -> Vec<AssignmentRuleSpec> {
    let mut specs = Vec::new();
    for (index, entry) in list_if_present(plan, "assignment_rules", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("assignment_rules[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "assignment_rule entry must be an object");
            continue;
        };
        let object = match optional_string(payload, &["object", "object_api_name", "api_name"]) {
            Some(object) => object,
            None => {
                add_error(
                    errors,
                    format!("{path}.object"),
                    "object must be a non-empty string",
                );
                String::new()
            }
        };
        let (xml_content, metadata) = parse_metadata_pair(payload, &path, errors);
        specs.push(AssignmentRuleSpec {
            object,
            xml_content,
            metadata,
        });
    }
    specs
}

// ==========================================
// 分析件子计划
// ==========================================

fn parse_folder(
    payload: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> FolderSpec {
    let api_name = required_string(payload, "api_name", path, errors);
    let name = required_string(payload, "name", path, errors);
    let access_type = enum_if_present(payload, "accessType", path, FOLDER_ACCESS_TYPES, errors);

    let mut folder_shares = Vec::new();
    if let Some(Value::Array(shares)) = payload.get("folderShares") {
        for share in shares {
            if let Some(share_payload) = share.as_object() {
                folder_shares.push(FolderShare {
                    access_level: optional_string(share_payload, &["accessLevel"]),
                    shared_to: optional_string(share_payload, &["sharedTo"]),
                    shared_to_type: optional_string(share_payload, &["sharedToType"]),
                });
            }
        }
    }

    FolderSpec {
        api_name,
        name,
        access_type,
        folder_shares,
    }
}

fn parse_report(
    payload: &Map<String, Value>,
    path: &str,
    report_folders_in_plan: &[String],
    errors: &mut Vec<ValidationError>,
) -> ReportSpec {
    let api_name = required_string(payload, "api_name", path, errors);
    let folder = required_string(payload, "folder", path, errors);
    let name = required_string(payload, "name", path, errors);
    let report_type = required_string(payload, "reportType", path, errors);
    let format = enum_if_present(payload, "format", path, REPORT_FORMATS, errors);
    let scope = enum_if_present(payload, "scope", path, REPORT_SCOPES, errors);
    let description = optional_string(payload, &["description"]);
    let show_details = bool_if_present(payload, "showDetails", path, errors);
    let show_grand_total = bool_if_present(payload, "showGrandTotal", path, errors);

    let columns = match payload.get("columns") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(non_empty_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let chart = match payload.get("chart") {
        None | Some(Value::Null) => None,
        Some(Value::Object(chart_payload)) => {
            Some(parse_chart(chart_payload, &format!("{path}.chart"), errors))
        }
        Some(_) => {
            add_error(
                errors,
                format!("{path}.chart"),
                "chart must be an object when provided",
            );
            None
        }
    };

    let groupings_down = parse_groupings(payload, "groupingsDown", path, errors);
    let groupings_across = parse_groupings(payload, "groupingsAcross", path, errors);
    let filter = parse_filter(payload, path, errors);
    let pre_existing = pre_existing_flag(payload, path, errors);

    if !folder.is_empty()
        && !pre_existing
        && !report_folders_in_plan.iter().any(|name| name == &folder)
    {
        add_error(
            errors,
            format!("{path}.folder"),
            format!(
                "Report folder '{folder}' not found in plan report_folders and not marked as pre_existing"
            ),
        );
    }

    ReportSpec {
        api_name,
        folder,
        name,
        report_type,
        description,
        format,
        scope,
        show_details,
        show_grand_total,
        columns,
        filter,
        groupings_down,
        groupings_across,
        chart,
        pre_existing,
    }
}

fn parse_chart(
    payload: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> ReportChart {
    let chart_type = enum_if_present(payload, "chartType", path, REPORT_CHART_TYPES, errors)
        .unwrap_or_default();
    let grouping_column = optional_string(payload, &["groupingColumn"]);

    let mut summaries = Vec::new();
    match payload.get("chartSummaries") {
        Some(Value::Array(items)) if !items.is_empty() => {
            for (index, summary) in items.iter().enumerate() {
                let summary_path = format!("{path}.chartSummaries[{index}]");
                let Some(summary_payload) = summary.as_object() else {
                    add_error(errors, summary_path, "chart summary must be an object");
                    continue;
                };
                let aggregate = required_string(summary_payload, "aggregate", &summary_path, errors);
                if !aggregate.is_empty() && !CHART_AGGREGATES.contains(&aggregate.as_str()) {
                    add_error(
                        errors,
                        format!("{summary_path}.aggregate"),
                        format!(
                            "Invalid aggregate '{aggregate}'. Must be one of: {}",
                            CHART_AGGREGATES.join(", ")
                        ),
                    );
                }
                let column = required_string(summary_payload, "column", &summary_path, errors);
                summaries.push(ChartSummary { aggregate, column });
            }
        }
        _ => {
            add_error(
                errors,
                format!("{path}.chartSummaries"),
                "chartSummaries must be a non-empty list when chart is provided",
            );
        }
    }

    ReportChart {
        chart_type,
        grouping_column,
        summaries,
    }
}

fn parse_groupings(
    payload: &Map<String, Value>,
    key: &str,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Vec<ReportGrouping> {
    let mut groupings = Vec::new();
    for (index, entry) in list_if_present(payload, key, path, errors).into_iter().enumerate() {
        let grouping_path = format!("{path}.{key}[{index}]");
        let Some(grouping_payload) = entry.as_object() else {
            add_error(errors, grouping_path, "grouping entry must be an object");
            continue;
        };
        let field = required_string(grouping_payload, "field", &grouping_path, errors);
        let sort_order = enum_if_present(
            grouping_payload,
            "sortOrder",
            &grouping_path,
            GROUPING_SORT_ORDERS,
            errors,
        );
        let date_granularity = enum_if_present(
            grouping_payload,
            "dateGranularity",
            &grouping_path,
            GROUPING_DATE_GRANULARITIES,
            errors,
        );
        groupings.push(ReportGrouping {
            field,
            sort_order,
            date_granularity,
        });
    }
    groupings
}

fn parse_filter(
    payload: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<ReportFilter> {
    let filter_value = match payload.get("filter") {
        None | Some(Value::Null) => return None,
        Some(Value::Object(filter_payload)) => filter_payload,
        Some(_) => {
            add_error(
                errors,
                format!("{path}.filter"),
                "filter must be an object when provided",
            );
            return None;
        }
    };

    let boolean_filter = optional_string(filter_value, &["booleanFilter"]);
    let mut criteria_items = Vec::new();
    match filter_value.get("criteriaItems") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for (index, criteria) in items.iter().enumerate() {
                let criteria_path = format!("{path}.filter.criteriaItems[{index}]");
                let Some(criteria_payload) = criteria.as_object() else {
                    add_error(errors, criteria_path, "criteria item must be an object");
                    continue;
                };
                criteria_items.push(FilterCriteria {
                    column: required_string(criteria_payload, "column", &criteria_path, errors),
                    operator: required_string(criteria_payload, "operator", &criteria_path, errors),
                    value: required_string(criteria_payload, "value", &criteria_path, errors),
                });
            }
        }
        Some(_) => {
            add_error(
                errors,
                format!("{path}.filter.criteriaItems"),
                "criteriaItems must be a list when provided",
            );
        }
    }

    Some(ReportFilter {
        boolean_filter,
        criteria_items,
    })
}

fn parse_dashboard(
    payload: &Map<String, Value>,
    path: &str,
    dashboard_folders_in_plan: &[String],
    reports_in_plan: &[String],
    errors: &mut Vec<ValidationError>,
) -> DashboardSpec {
    let api_name = required_string(payload, "api_name", path, errors);
    let folder = required_string(payload, "folder", path, errors);
    let title = required_string(payload, "title", path, errors);

    let dashboard_type = match payload.get("dashboardType") {
        None | Some(Value::Null) => "SpecifiedUser".to_string(),
        Some(_) => enum_if_present(payload, "dashboardType", path, DASHBOARD_TYPES, errors)
            .unwrap_or_else(|| "SpecifiedUser".to_string()),
    };

    let running_user = optional_string(payload, &["runningUser"]);
    if dashboard_type == "SpecifiedUser" && running_user.is_none() {
        add_error(
            errors,
            format!("{path}.runningUser"),
            "runningUser is required when dashboardType is SpecifiedUser",
        );
    }

    let pre_existing = pre_existing_flag(payload, path, errors);
    if !folder.is_empty()
        && !pre_existing
        && !dashboard_folders_in_plan.iter().any(|name| name == &folder)
    {
        add_error(
            errors,
            format!("{path}.folder"),
            format!(
                "Dashboard folder '{folder}' not found in plan dashboard_folders and not marked as pre_existing"
            ),
        );
    }

    let mut sections: [Vec<DashboardComponent>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for (section_index, section_name) in ["leftSection", "middleSection", "rightSection"]
        .iter()
        .enumerate()
    {
        for (component_index, component) in list_if_present(payload, section_name, path, errors)
            .into_iter()
            .enumerate()
        {
            let component_path = format!("{path}.{section_name}[{component_index}]");
            let Some(component_payload) = component.as_object() else {
                add_error(errors, component_path, "dashboard component must be an object");
                continue;
            };

            let component_type = match component_payload.get("componentType") {
                None | Some(Value::Null) => None,
                Some(_) => enum_if_present(
                    component_payload,
                    "componentType",
                    &component_path,
                    DASHBOARD_COMPONENT_TYPES,
                    errors,
                ),
            };

            let report = match component_payload.get("report") {
                None | Some(Value::Null) => None,
                Some(value) => match non_empty_str(value) {
                    Some(report) => Some(report.to_string()),
                    None => {
                        add_error(
                            errors,
                            format!("{component_path}.report"),
                            "report must be a non-empty string when provided",
                        );
                        None
                    }
                },
            };

            let component_pre_existing = pre_existing_flag(component_payload, &component_path, errors);
            if let Some(report_name) = &report {
                if !component_pre_existing && !reports_in_plan.iter().any(|name| name == report_name)
                {
                    add_error(
                        errors,
                        format!("{component_path}.report"),
                        format!(
                            "Dashboard component report '{report_name}' not found in plan reports and not marked as pre_existing"
                        ),
                    );
                }
            }

            sections[section_index].push(DashboardComponent {
                title: optional_string(component_payload, &["title"]),
                header: optional_string(component_payload, &["header"]),
                component_type,
                report,
                pre_existing: component_pre_existing,
            });
        }
    }

    let [left_section, middle_section, right_section] = sections;
    DashboardSpec {
        api_name,
        folder,
        title,
        dashboard_type,
        running_user,
        left_section,
        middle_section,
        right_section,
        pre_existing,
    }
}

fn parse_analytics(plan: &Map<String, Value>, errors: &mut Vec<ValidationError>) -> AnalyticsPlan {
    let mut report_folders = Vec::new();
    for (index, entry) in list_if_present(plan, "report_folders", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("report_folders[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "report_folder entry must be an object");
            continue;
        };
        report_folders.push(parse_folder(payload, &path, errors));
    }

    let mut dashboard_folders = Vec::new();
    for (index, entry) in list_if_present(plan, "dashboard_folders", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("dashboard_folders[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "dashboard_folder entry must be an object");
            continue;
        };
        dashboard_folders.push(parse_folder(payload, &path, errors));
    }

    let report_folder_names: Vec<String> = report_folders
        .iter()
        .filter(|folder| !folder.api_name.is_empty())
        .map(|folder| folder.api_name.clone())
        .collect();
    let dashboard_folder_names: Vec<String> = dashboard_folders
        .iter()
        .filter(|folder| !folder.api_name.is_empty())
        .map(|folder| folder.api_name.clone())
        .collect();

    let mut reports = Vec::new();
    for (index, entry) in list_if_present(plan, "reports", "", errors).into_iter().enumerate() {
        let path = format!("reports[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "report entry must be an object");
            continue;
        };
        reports.push(parse_report(payload, &path, &report_folder_names, errors));
    }

    let report_full_names: Vec<String> = reports
        .iter()
        .filter(|report| !report.api_name.is_empty() && !report.folder.is_empty())
        .map(ReportSpec::full_name)
        .collect();

    let mut dashboards = Vec::new();
    for (index, entry) in list_if_present(plan, "dashboards", "", errors)
        .into_iter()
        .enumerate()
    {
        let path = format!("dashboards[{index}]");
        let Some(payload) = entry.as_object() else {
            add_error(errors, path, "dashboard entry must be an object");
            continue;
        };
        dashboards.push(parse_dashboard(
            payload,
            &path,
            &dashboard_folder_names,
            &report_full_names,
            errors,
        ));
    }

    AnalyticsPlan {
        report_folders,
        dashboard_folders,
        reports,
        dashboards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_plan_must_be_object() {
        let errors = validate(&json!([1, 2]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "plan");
    }

    #[test]
    fn test_empty_plan_is_valid() {
        assert!(validate(&json!({})).is_empty());
    }

    #[test]
    fn test_custom_object_suffix_enforced() {
        let errors = validate(&json!({
            "custom_objects": [{"api_name": "Invoice", "label": "Invoice"}]
        }));
        assert_eq!(
            error_fields(&errors),
            vec!["custom_objects[0].api_name"]
        );
        assert!(errors[0].message.contains("__c"));
    }

    #[test]
    fn test_missing_api_name_is_error_not_skip() {
        let errors = validate(&json!({
            "custom_objects": [{"label": "Invoice"}]
        }));
        assert!(error_fields(&errors).contains(&"custom_objects[0].api_name"));
    }

    #[test]
    fn test_invalid_field_type_lists_allowed_set() {
        let errors = validate(&json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [{"api_name": "Amount__c", "label": "Amount", "type": "Geolocation"}]
            }]
        }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "custom_objects[0].fields[0].type");
        assert!(errors[0].message.contains("Checkbox, Currency"));
    }

    #[test]
    fn test_relationship_entries_restricted_to_reference_types() {
        let errors = validate(&json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "relationships": [{"api_name": "Account_Id__c", "label": "Account", "type": "Text"}]
            }]
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Lookup, MasterDetail"));
    }

    #[test]
    fn test_precision_must_cover_scale() {
        let errors = validate(&json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [{
                    "api_name": "Amount__c", "label": "Amount", "type": "Currency",
                    "precision": 2, "scale": 4
                }]
            }]
        }));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "custom_objects[0].fields[0].precision");
    }

    #[test]
    fn test_lookup_requires_target_object() {
        let plan = json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [{"api_name": "Account_Id__c", "label": "Account", "type": "Lookup"}]
            }]
        });
        let errors = validate(&plan);
        assert_eq!(error_fields(&errors), vec!["custom_objects[0].fields[0].related_to"]);

        // referenceTo 键名同样被接受
        let plan = json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [{
                    "api_name": "Account_Id__c", "label": "Account", "type": "Lookup",
                    "referenceTo": "Account"
                }]
            }]
        });
        assert!(validate(&plan).is_empty());
    }

    #[test]
    fn test_flow_accepts_raw_xml_or_structured_metadata() {
        let errors = validate(&json!({"flows": [{"api_name": "Score_Lead"}]}));
        assert_eq!(error_fields(&errors), vec!["flows[0].xml_content"]);

        assert!(validate(&json!({
            "flows": [{"api_name": "Score_Lead", "xml_content": "<Flow/>"}]
        }))
        .is_empty());

        assert!(validate(&json!({
            "flows": [{"api_name": "Score_Lead", "metadata": {"label": "Score Lead"}}]
        }))
        .is_empty());
    }

    #[test]
    fn test_report_folder_reference_round_trip() {
        let orphan = json!({
            "reports": [{
                "api_name": "Pipeline", "folder": "Sales", "name": "Pipeline",
                "reportType": "Opportunity"
            }]
        });
        let baseline = validate(&orphan).len();
        assert!(baseline >= 1);

        // 加上匹配的文件夹后, 错误数恰好减一
        let with_folder = json!({
            "report_folders": [{"api_name": "Sales", "name": "Sales"}],
            "reports": [{
                "api_name": "Pipeline", "folder": "Sales", "name": "Pipeline",
                "reportType": "Opportunity"
            }]
        });
        assert_eq!(validate(&with_folder).len(), baseline - 1);

        // 或者显式声明 pre_existing
        let pre_existing = json!({
            "reports": [{
                "api_name": "Pipeline", "folder": "Sales", "name": "Pipeline",
                "reportType": "Opportunity", "pre_existing": true
            }]
        });
        assert_eq!(validate(&pre_existing).len(), baseline - 1);
    }

    #[test]
    fn test_dashboard_component_report_reference() {
        let plan = json!({
            "dashboard_folders": [{"api_name": "Exec", "name": "Exec"}],
            "dashboards": [{
                "api_name": "Overview", "folder": "Exec", "title": "Overview",
                "runningUser": "admin@example.com",
                "leftSection": [{"componentType": "Metric", "report": "Sales/Pipeline"}]
            }]
        });
        let errors = validate(&plan);
        assert_eq!(
            error_fields(&errors),
            vec!["dashboards[0].leftSection[0].report"]
        );
    }

    #[test]
    fn test_dashboard_running_user_required_for_specified_user() {
        let errors = validate(&json!({
            "dashboard_folders": [{"api_name": "Exec", "name": "Exec"}],
            "dashboards": [{"api_name": "Overview", "folder": "Exec", "title": "Overview"}]
        }));
        assert_eq!(error_fields(&errors), vec!["dashboards[0].runningUser"]);

        // LoggedInUser 不需要 runningUser
        assert!(validate(&json!({
            "dashboard_folders": [{"api_name": "Exec", "name": "Exec"}],
            "dashboards": [{
                "api_name": "Overview", "folder": "Exec", "title": "Overview",
                "dashboardType": "LoggedInUser"
            }]
        }))
        .is_empty());
    }

    #[test]
    fn test_invalid_enum_values_enumerate_allowed_set() {
        let errors = validate(&json!({
            "report_folders": [{"api_name": "Sales", "name": "Sales", "accessType": "Everyone"}]
        }));
        assert_eq!(errors.len(), 1);
        assert!(errors[0]
            .message
            .contains("Hidden, Public, PublicInternal, Shared"));
    }

    #[test]
    fn test_standard_object_fields_validated() {
        let errors = validate(&json!({
            "standard_object_fields": [{
                "object": "Account",
                "fields": [{"api_name": "Tier__c", "label": "Tier", "type": "Bogus"}]
            }]
        }));
        assert_eq!(
            error_fields(&errors),
            vec!["standard_object_fields[0].fields[0].type"]
        );
    }

    #[test]
    fn test_parse_builds_typed_plan() {
        let plan = parse(&json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [
                    {"api_name": "Amount__c", "label": "Amount", "type": "Currency"},
                    {"api_name": "Stage__c", "label": "Stage", "type": "Picklist",
                     "values": ["Draft", {"fullName": "Sent", "default": true}]}
                ],
                "relationships": [{
                    "api_name": "Account_Id__c", "label": "Account", "type": "Lookup",
                    "related_to": "Account"
                }]
            }],
            "standard_object_fields": [{
                "object": "Account",
                "fields": [{"api_name": "Tier__c", "label": "Tier", "type": "Text"}]
            }]
        }))
        .unwrap();

        assert_eq!(plan.custom_objects.len(), 1);
        let object = &plan.custom_objects[0];
        assert_eq!(object.fields.len(), 2);
        assert_eq!(object.relationships.len(), 1);
        assert_eq!(object.fields[1].picklist_values.len(), 2);
        assert_eq!(object.fields[1].picklist_values[1].default, Some(true));
        assert_eq!(plan.standard_object_fields[0].object, "Account");
        assert!(plan.has_bulk_components());
    }
}
