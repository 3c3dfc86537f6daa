// ==========================================
// CRM 元数据部署系统 - 元数据包编译器
// ==========================================
// 职责: 强类型计划 → 元数据包 (清单 + 组件文档), 六种编译模式
// 依据: 平台元数据部署的包格式约定
// 红线: 纯函数式编译, 无 I/O; 破坏式包 = 空清单 + destructiveChanges.xml
// ==========================================

use std::collections::BTreeMap;
use std::io::Write;

use serde_json::{json, Value};

use crate::domain::plan::{
    AnalyticsPlan, AssignmentRuleSpec, CustomObjectSpec, DashboardSpec, FieldSpec, FieldType,
    FlowSpec, FolderSpec, ReportSpec,
};
use crate::engine::xml::{value_to_elements, XmlElement};

// ===== 缺省值 =====

const DEFAULT_TEXT_LENGTH: u32 = 255;
const DEFAULT_PRECISION: u32 = 18;
const DEFAULT_SCALE: u32 = 2;
const DEFAULT_LONG_TEXT_LENGTH: u32 = 32768;
const DEFAULT_VISIBLE_LINES: u32 = 3;
const DEFAULT_DELETE_CONSTRAINT: &str = "SetNull";

// ==========================================
// MetadataPackage
// ==========================================

/// 编译产物: 路径 → 文档内容
#[derive(Debug, Clone, Default)]
pub struct MetadataPackage {
    pub files: BTreeMap<String, String>,
}

impl MetadataPackage {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn manifest(&self) -> Option<&str> {
        self.file("package.xml")
    }

    /// 打包为 deflate 压缩的 zip 字节流
    pub fn to_zip_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut archive = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for (path, content) in &self.files {
                archive.start_file(path, options)?;
                archive.write_all(content.as_bytes())?;
            }
            archive.finish()?;
        }
        Ok(buffer.into_inner())
    }

    fn insert(&mut self, path: impl Into<String>, content: String) {
        self.files.insert(path.into(), content);
    }
}

// ==========================================
// PackageCompiler
// ==========================================

/// 元数据包编译器, 按 API 版本号出包
#[derive(Debug, Clone)]
pub struct PackageCompiler {
    api_version: String,
}

impl PackageCompiler {
    /// api_version 为纯数字版本号, 如 "60.0"
    pub fn new(api_version: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
        }
    }

    // ===== 清单 =====

    /// package.xml / destructiveChanges.xml 通用结构:
    /// 每组 (类型名, 成员列表) 一个 types 块, 空成员组跳过
    fn manifest_xml(&self, groups: &[(&str, &[String])]) -> String {
        let mut root = XmlElement::root("Package");
        for (type_name, members) in groups {
            if members.is_empty() {
                continue;
            }
            let mut types = XmlElement::new("types");
            for member in members.iter() {
                types.child(XmlElement::leaf("members", member.clone()));
            }
            types.child(XmlElement::leaf("name", *type_name));
            root.child(types);
        }
        root.child(XmlElement::leaf("version", self.api_version.clone()));
        root.to_document()
    }

    fn empty_manifest_xml(&self) -> String {
        self.manifest_xml(&[])
    }

    /// 破坏式包骨架: 空清单 + destructiveChanges.xml
    fn destructive_package(&self, groups: &[(&str, &[String])]) -> MetadataPackage {
        let mut package = MetadataPackage::default();
        package.insert("package.xml", self.empty_manifest_xml());
        package.insert("destructiveChanges.xml", self.manifest_xml(groups));
        package
    }

    // ===== Schema =====

    /// 自定义对象创建包: 对象文档内联全部字段与关系
    pub fn compile_schema(&self, objects: &[CustomObjectSpec]) -> MetadataPackage {
        let object_names: Vec<String> = objects
            .iter()
            .map(|object| object.api_name.clone())
            .collect();

        let mut package = MetadataPackage::default();
        package.insert(
            "package.xml",
            self.manifest_xml(&[("CustomObject", &object_names)]),
        );
        for object in objects {
            package.insert(
                format!("objects/{}.object", object.api_name),
                object_document(object),
            );
        }
        package
    }

    /// 自定义对象删除包 (成员去重, 保序)
    pub fn compile_schema_destructive(&self, object_names: &[String]) -> MetadataPackage {
        let names = dedupe(object_names);
        self.destructive_package(&[("CustomObject", &names)])
    }

    // ===== 自动化 =====

    /// 流程 + 分配规则创建包; 原始 XML 优先于结构化 metadata
    pub fn compile_automation(
        &self,
        flows: &[FlowSpec],
        assignment_rules: &[AssignmentRuleSpec],
    ) -> MetadataPackage {
        let flow_names: Vec<String> = flows.iter().map(|flow| flow.api_name.clone()).collect();
        let rule_objects: Vec<String> = assignment_rules
            .iter()
            .map(|rule| rule.object.clone())
            .collect();

        let mut package = MetadataPackage::default();
        package.insert(
            "package.xml",
            self.manifest_xml(&[("Flow", &flow_names), ("AssignmentRules", &rule_objects)]),
        );
        for flow in flows {
            package.insert(
                format!("flows/{}.flow-meta.xml", flow.api_name),
                automation_document("Flow", &flow.xml_content, &flow.metadata),
            );
        }
        for rule in assignment_rules {
            package.insert(
                format!("assignmentRules/{}.assignmentRules-meta.xml", rule.object),
                automation_document("AssignmentRules", &rule.xml_content, &rule.metadata),
            );
        }
        package
    }

    pub fn compile_automation_destructive(
        &self,
        flow_names: &[String],
        assignment_rule_objects: &[String],
    ) -> MetadataPackage {
        let flows = dedupe(flow_names);
        let rules = dedupe(assignment_rule_objects);
        self.destructive_package(&[("Flow", &flows), ("AssignmentRules", &rules)])
    }

    // ===== 分析件 =====

    /// 报表/仪表板及文件夹创建包
    pub fn compile_analytics(&self, plan: &AnalyticsPlan) -> MetadataPackage {
        let report_folder_members = dedupe(
            &plan
                .report_folders
                .iter()
                .map(|folder| folder.api_name.clone())
                .collect::<Vec<_>>(),
        );
        let dashboard_folder_members = dedupe(
            &plan
                .dashboard_folders
                .iter()
                .map(|folder| folder.api_name.clone())
                .collect::<Vec<_>>(),
        );
        let report_members = dedupe(
            &plan
                .reports
                .iter()
                .map(ReportSpec::full_name)
                .collect::<Vec<_>>(),
        );
        let dashboard_members = dedupe(
            &plan
                .dashboards
                .iter()
                .map(DashboardSpec::full_name)
                .collect::<Vec<_>>(),
        );

        let mut package = MetadataPackage::default();
        package.insert(
            "package.xml",
            self.manifest_xml(&[
                ("ReportFolder", &report_folder_members),
                ("Report", &report_members),
                ("DashboardFolder", &dashboard_folder_members),
                ("Dashboard", &dashboard_members),
            ]),
        );

        for folder in &plan.report_folders {
            package.insert(
                format!("reports/{}.reportFolder-meta.xml", folder.api_name),
                folder_document("ReportFolder", folder),
            );
        }
        // 仪表板文件夹元数据根标签为 Folder, 不是 DashboardFolder
        for folder in &plan.dashboard_folders {
            package.insert(
                format!("dashboards/{}-meta.xml", folder.api_name),
                folder_document("Folder", folder),
            );
        }
        for report in &plan.reports {
            package.insert(
                format!("reports/{}/{}.report", report.folder, report.api_name),
                report_document(report),
            );
        }
        for dashboard in &plan.dashboards {
            package.insert(
                format!(
                    "dashboards/{}/{}.dashboard",
                    dashboard.folder, dashboard.api_name
                ),
                dashboard_document(dashboard),
            );
        }
        package
    }

    /// 分析件删除包: 成员按 仪表板 → 报表 → 文件夹 的依赖逆序列出
    pub fn compile_analytics_destructive(
        &self,
        report_folders: &[String],
        dashboard_folders: &[String],
        reports: &[String],
        dashboards: &[String],
    ) -> MetadataPackage {
        let dashboards = dedupe(dashboards);
        let reports = dedupe(reports);
        let dashboard_folders = dedupe(dashboard_folders);
        let report_folders = dedupe(report_folders);
        self.destructive_package(&[
            ("Dashboard", &dashboards),
            ("Report", &reports),
            ("DashboardFolder", &dashboard_folders),
            ("ReportFolder", &report_folders),
        ])
    }
}

fn dedupe(names: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .filter(|name| !name.trim().is_empty())
        .filter(|name| seen.insert(name.as_str()))
        .cloned()
        .collect()
}

// ==========================================
// 组件文档
// ==========================================

fn object_document(object: &CustomObjectSpec) -> String {
    let plural_label = object
        .plural_label
        .clone()
        .unwrap_or_else(|| format!("{}s", object.label));

    let mut root = XmlElement::root("CustomObject")
        .with_child(XmlElement::leaf("label", object.label.clone()))
        .with_child(XmlElement::leaf("pluralLabel", plural_label))
        .with_child(
            XmlElement::new("nameField")
                .with_child(XmlElement::leaf("label", format!("{} Name", object.label)))
                .with_child(XmlElement::leaf("type", "Text")),
        )
        .with_child(XmlElement::leaf("deploymentStatus", "Deployed"))
        .with_child(XmlElement::leaf("sharingModel", "ReadWrite"));

    for field in object.fields.iter().chain(object.relationships.iter()) {
        root.child(field_element(field));
    }
    root.to_document()
}

/// 单个字段的 fields 元素 (对象文档内联用)
pub fn field_element(field: &FieldSpec) -> XmlElement {
    let mut element = XmlElement::new("fields")
        .with_child(XmlElement::leaf("fullName", field.api_name.clone()))
        .with_child(XmlElement::leaf("label", field.label.clone()))
        .with_child(XmlElement::leaf("type", field.field_type.as_str()));

    if let Some(required) = field.required {
        element.child(XmlElement::leaf_bool("required", required));
    }

    match field.field_type {
        FieldType::Text => {
            element.child(XmlElement::leaf(
                "length",
                field.length.unwrap_or(DEFAULT_TEXT_LENGTH).to_string(),
            ));
        }
        FieldType::Number | FieldType::Currency | FieldType::Percent => {
            element.child(XmlElement::leaf(
                "precision",
                field.precision.unwrap_or(DEFAULT_PRECISION).to_string(),
            ));
            element.child(XmlElement::leaf(
                "scale",
                field.scale.unwrap_or(DEFAULT_SCALE).to_string(),
            ));
        }
        FieldType::Picklist => {
            element.child(picklist_value_set(field));
        }
        FieldType::Lookup | FieldType::MasterDetail => {
            if let Some(related_to) = &field.related_to {
                element.child(XmlElement::leaf("referenceTo", related_to.clone()));
            }
            let relationship_name = field
                .relationship_name
                .clone()
                .unwrap_or_else(|| field.derived_relationship_name());
            if !relationship_name.is_empty() {
                element.child(XmlElement::leaf("relationshipName", relationship_name.clone()));
                element.child(XmlElement::leaf("relationshipLabel", relationship_name));
            }
            if field.field_type == FieldType::Lookup {
                element.child(XmlElement::leaf(
                    "deleteConstraint",
                    field
                        .delete_constraint
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DELETE_CONSTRAINT.to_string()),
                ));
            }
        }
        FieldType::Checkbox => {
            element.child(XmlElement::leaf_bool(
                "defaultValue",
                field.default_checked.unwrap_or(false),
            ));
        }
        FieldType::TextArea => {
            element.child(XmlElement::leaf(
                "length",
                field.length.unwrap_or(DEFAULT_TEXT_LENGTH).to_string(),
            ));
            element.child(XmlElement::leaf(
                "visibleLines",
                field
                    .visible_lines
                    .unwrap_or(DEFAULT_VISIBLE_LINES)
                    .to_string(),
            ));
        }
        FieldType::LongTextArea => {
            element.child(XmlElement::leaf(
                "length",
                field
                    .length
                    .unwrap_or(DEFAULT_LONG_TEXT_LENGTH)
                    .to_string(),
            ));
            element.child(XmlElement::leaf(
                "visibleLines",
                field
                    .visible_lines
                    .unwrap_or(DEFAULT_VISIBLE_LINES)
                    .to_string(),
            ));
        }
        FieldType::Date | FieldType::DateTime | FieldType::Phone | FieldType::Email | FieldType::Url => {}
    }
    element
}

fn picklist_value_set(field: &FieldSpec) -> XmlElement {
    let mut definition =
        XmlElement::new("valueSetDefinition").with_child(XmlElement::leaf_bool("sorted", false));
    for (index, value) in field.picklist_values.iter().enumerate() {
        // 未显式指定 default 时, 首个值为默认
        let default = value.default.unwrap_or(index == 0);
        definition.child(
            XmlElement::new("value")
                .with_child(XmlElement::leaf("fullName", value.full_name.clone()))
                .with_child(XmlElement::leaf_bool("default", default))
                .with_child(XmlElement::leaf("label", value.label.clone())),
        );
    }
    XmlElement::new("valueSet")
        .with_child(XmlElement::leaf_bool(
            "restricted",
            field.restricted.unwrap_or(true),
        ))
        .with_child(definition)
}

/// 自动化组件文档: 原始 XML 原样透传, 否则由结构化 metadata 生成
fn automation_document(root_tag: &str, xml_content: &Option<String>, metadata: &Option<Value>) -> String {
    if let Some(raw_xml) = xml_content {
        if !raw_xml.trim().is_empty() {
            return raw_xml.clone();
        }
    }
    let mut root = XmlElement::root(root_tag);
    if let Some(Value::Object(payload)) = metadata {
        for (key, value) in payload {
            for child in value_to_elements(key, value) {
                root.child(child);
            }
        }
    }
    root.to_document()
}

fn folder_shares_into(root: &mut XmlElement, folder: &FolderSpec) {
    for share in &folder.folder_shares {
        let mut share_el = XmlElement::new("folderShares");
        if let Some(access_level) = &share.access_level {
            share_el.child(XmlElement::leaf("accessLevel", access_level.clone()));
        }
        if let Some(shared_to) = &share.shared_to {
            share_el.child(XmlElement::leaf("sharedTo", shared_to.clone()));
        }
        if let Some(shared_to_type) = &share.shared_to_type {
            share_el.child(XmlElement::leaf("sharedToType", shared_to_type.clone()));
        }
        root.child(share_el);
    }
}

fn folder_document(root_tag: &str, folder: &FolderSpec) -> String {
    let mut root = XmlElement::root(root_tag).with_child(XmlElement::leaf(
        "accessType",
        folder
            .access_type
            .clone()
            .unwrap_or_else(|| "Public".to_string()),
    ));
    folder_shares_into(&mut root, folder);
    root.child(XmlElement::leaf("name", folder.name.clone()));
    root.to_document()
}

fn report_document(report: &ReportSpec) -> String {
    let mut root =
        XmlElement::root("Report").with_child(XmlElement::leaf("name", report.name.clone()));

    if let Some(description) = &report.description {
        root.child(XmlElement::leaf("description", description.clone()));
    }
    root.child(XmlElement::leaf(
        "format",
        report.format.clone().unwrap_or_else(|| "Summary".to_string()),
    ));
    root.child(XmlElement::leaf("reportType", report.report_type.clone()));
    root.child(XmlElement::leaf(
        "scope",
        report
            .scope
            .clone()
            .unwrap_or_else(|| "organization".to_string()),
    ));
    root.child(XmlElement::leaf_bool(
        "showDetails",
        report.show_details.unwrap_or(true),
    ));
    root.child(XmlElement::leaf_bool(
        "showGrandTotal",
        report.show_grand_total.unwrap_or(true),
    ));

    for column in &report.columns {
        root.child(XmlElement::leaf("columns", column.clone()));
    }

    if let Some(filter) = &report.filter {
        let mut filter_el = XmlElement::new("filter");
        if let Some(boolean_filter) = &filter.boolean_filter {
            filter_el.child(XmlElement::leaf("booleanFilter", boolean_filter.clone()));
        }
        for criteria in &filter.criteria_items {
            filter_el.child(
                XmlElement::new("criteriaItems")
                    .with_child(XmlElement::leaf("column", criteria.column.clone()))
                    .with_child(XmlElement::leaf("operator", criteria.operator.clone()))
                    .with_child(XmlElement::leaf("value", criteria.value.clone())),
            );
        }
        root.child(filter_el);
    }

    for (tag, groupings) in [
        ("groupingsDown", &report.groupings_down),
        ("groupingsAcross", &report.groupings_across),
    ] {
        for grouping in groupings {
            let mut grouping_el = XmlElement::new(tag);
            if let Some(date_granularity) = &grouping.date_granularity {
                grouping_el.child(XmlElement::leaf("dateGranularity", date_granularity.clone()));
            }
            grouping_el.child(XmlElement::leaf("field", grouping.field.clone()));
            if let Some(sort_order) = &grouping.sort_order {
                grouping_el.child(XmlElement::leaf("sortOrder", sort_order.clone()));
            }
            root.child(grouping_el);
        }
    }

    if let Some(chart) = &report.chart {
        let mut chart_el =
            XmlElement::new("chart").with_child(XmlElement::leaf("chartType", chart.chart_type.clone()));
        if let Some(grouping_column) = &chart.grouping_column {
            chart_el.child(XmlElement::leaf("groupingColumn", grouping_column.clone()));
        }
        for summary in &chart.summaries {
            chart_el.child(
                XmlElement::new("chartSummaries")
                    .with_child(XmlElement::leaf("aggregate", summary.aggregate.clone()))
                    .with_child(XmlElement::leaf("column", summary.column.clone())),
            );
        }
        root.child(chart_el);
    }

    root.to_document()
}

fn dashboard_document(dashboard: &DashboardSpec) -> String {
    let mut root = XmlElement::root("Dashboard")
        .with_child(XmlElement::leaf("title", dashboard.title.clone()))
        .with_child(XmlElement::leaf(
            "dashboardType",
            dashboard.dashboard_type.clone(),
        ));

    if dashboard.dashboard_type == "SpecifiedUser" {
        if let Some(running_user) = &dashboard.running_user {
            root.child(XmlElement::leaf("runningUser", running_user.clone()));
        }
    }

    for (tag, components) in [
        ("leftSection", &dashboard.left_section),
        ("middleSection", &dashboard.middle_section),
        ("rightSection", &dashboard.right_section),
    ] {
        if components.is_empty() {
            continue;
        }
        let mut section_el = XmlElement::new(tag);
        for component in components {
            let mut component_el = XmlElement::new("components");
            if let Some(title) = &component.title {
                component_el.child(XmlElement::leaf("title", title.clone()));
            }
            if let Some(header) = &component.header {
                component_el.child(XmlElement::leaf("header", header.clone()));
            }
            if let Some(component_type) = &component.component_type {
                component_el.child(XmlElement::leaf("componentType", component_type.clone()));
            }
            if let Some(report) = &component.report {
                component_el.child(XmlElement::leaf("report", report.clone()));
            }
            section_el.child(component_el);
        }
        root.child(section_el);
    }

    root.to_document()
}

// ==========================================
// Tooling 字段元数据 (单字段同步创建回落通道)
// ==========================================

/// 字段规格 → Tooling 创建请求的 Metadata 对象
pub fn field_tooling_metadata(field: &FieldSpec) -> Value {
    let mut metadata = serde_json::Map::new();
    metadata.insert("type".to_string(), json!(field.field_type.as_str()));
    metadata.insert("label".to_string(), json!(field.label));
    if let Some(required) = field.required {
        metadata.insert("required".to_string(), json!(required));
    }

    match field.field_type {
        FieldType::Text => {
            metadata.insert(
                "length".to_string(),
                json!(field.length.unwrap_or(DEFAULT_TEXT_LENGTH)),
            );
        }
        FieldType::Number | FieldType::Currency | FieldType::Percent => {
            metadata.insert(
                "precision".to_string(),
                json!(field.precision.unwrap_or(DEFAULT_PRECISION)),
            );
            metadata.insert(
                "scale".to_string(),
                json!(field.scale.unwrap_or(DEFAULT_SCALE)),
            );
        }
        FieldType::Picklist => {
            let values: Vec<Value> = field
                .picklist_values
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    json!({
                        "fullName": value.full_name,
                        "default": value.default.unwrap_or(index == 0),
                        "label": value.label,
                    })
                })
                .collect();
            metadata.insert(
                "valueSet".to_string(),
                json!({
                    "restricted": field.restricted.unwrap_or(true),
                    "valueSetDefinition": {"sorted": false, "value": values},
                }),
            );
        }
        FieldType::Lookup | FieldType::MasterDetail => {
            if let Some(related_to) = &field.related_to {
                metadata.insert("referenceTo".to_string(), json!(related_to));
            }
            let relationship_name = field
                .relationship_name
                .clone()
                .unwrap_or_else(|| field.derived_relationship_name());
            if !relationship_name.is_empty() {
                metadata.insert("relationshipName".to_string(), json!(relationship_name));
                metadata.insert("relationshipLabel".to_string(), json!(relationship_name));
            }
            if field.field_type == FieldType::Lookup {
                metadata.insert(
                    "deleteConstraint".to_string(),
                    json!(field
                        .delete_constraint
                        .clone()
                        .unwrap_or_else(|| DEFAULT_DELETE_CONSTRAINT.to_string())),
                );
            }
        }
        FieldType::Checkbox => {
            metadata.insert(
                "defaultValue".to_string(),
                json!(field.default_checked.unwrap_or(false)),
            );
        }
        FieldType::TextArea | FieldType::LongTextArea => {
            let default_length = if field.field_type == FieldType::LongTextArea {
                DEFAULT_LONG_TEXT_LENGTH
            } else {
                DEFAULT_TEXT_LENGTH
            };
            metadata.insert(
                "length".to_string(),
                json!(field.length.unwrap_or(default_length)),
            );
            metadata.insert(
                "visibleLines".to_string(),
                json!(field.visible_lines.unwrap_or(DEFAULT_VISIBLE_LINES)),
            );
        }
        FieldType::Date | FieldType::DateTime | FieldType::Phone | FieldType::Email | FieldType::Url => {}
    }

    Value::Object(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::PicklistValue;

    fn compiler() -> PackageCompiler {
        PackageCompiler::new("60.0")
    }

    fn text_field(api_name: &str) -> FieldSpec {
        FieldSpec {
            api_name: api_name.to_string(),
            label: api_name.trim_end_matches("__c").to_string(),
            field_type: FieldType::Text,
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

    fn invoice_object() -> CustomObjectSpec {
        CustomObjectSpec {
            api_name: "Invoice__c".to_string(),
            label: "Invoice".to_string(),
            plural_label: None,
            fields: vec![text_field("Number__c")],
            relationships: vec![FieldSpec {
                field_type: FieldType::Lookup,
                related_to: Some("Account".to_string()),
                ..text_field("Account_Id__c")
            }],
        }
    }

    #[test]
    fn test_schema_manifest_lists_every_object() {
        let mut second = invoice_object();
        second.api_name = "Payment__c".to_string();
        let package = compiler().compile_schema(&[invoice_object(), second]);

        let manifest = package.manifest().unwrap();
        assert!(manifest.contains("<members>Invoice__c</members>"));
        assert!(manifest.contains("<members>Payment__c</members>"));
        assert!(manifest.contains("<name>CustomObject</name>"));
        assert!(manifest.contains("<version>60.0</version>"));
        assert!(package.file("objects/Invoice__c.object").is_some());
        assert!(package.file("objects/Payment__c.object").is_some());
    }

    #[test]
    fn test_object_document_defaults() {
        let package = compiler().compile_schema(&[invoice_object()]);
        let doc = package.file("objects/Invoice__c.object").unwrap();
        // plural_label 缺省为 label + "s"
        assert!(doc.contains("<pluralLabel>Invoices</pluralLabel>"));
        assert!(doc.contains("<deploymentStatus>Deployed</deploymentStatus>"));
        assert!(doc.contains("<sharingModel>ReadWrite</sharingModel>"));
        // Text 长度缺省 255
        assert!(doc.contains("<length>255</length>"));
        // 关系名推导: 去 __c 再去 _Id
        assert!(doc.contains("<relationshipName>Account</relationshipName>"));
        assert!(doc.contains("<deleteConstraint>SetNull</deleteConstraint>"));
    }

    #[test]
    fn test_number_precision_scale_defaults() {
        let field = FieldSpec {
            field_type: FieldType::Currency,
            ..text_field("Amount__c")
        };
        let doc = field_element(&field).to_document();
        assert!(doc.contains("<precision>18</precision>"));
        assert!(doc.contains("<scale>2</scale>"));
    }

    #[test]
    fn test_picklist_first_value_default() {
        let field = FieldSpec {
            field_type: FieldType::Picklist,
            picklist_values: vec![
                PicklistValue {
                    full_name: "Draft".to_string(),
                    label: "Draft".to_string(),
                    default: None,
                    is_active: true,
                },
                PicklistValue {
                    full_name: "Sent".to_string(),
                    label: "Sent".to_string(),
                    default: None,
                    is_active: true,
                },
            ],
            ..text_field("Stage__c")
        };
        let doc = field_element(&field).to_document();
        let draft_pos = doc.find("<fullName>Draft</fullName>").unwrap();
        let sent_pos = doc.find("<fullName>Sent</fullName>").unwrap();
        let defaults: Vec<_> = doc.match_indices("<default>true</default>").collect();
        assert_eq!(defaults.len(), 1);
        assert!(defaults[0].0 > draft_pos && defaults[0].0 < sent_pos);
        assert!(doc.contains("<restricted>true</restricted>"));
    }

    #[test]
    fn test_long_text_area_defaults() {
        let field = FieldSpec {
            field_type: FieldType::LongTextArea,
            ..text_field("Notes__c")
        };
        let doc = field_element(&field).to_document();
        assert!(doc.contains("<length>32768</length>"));
        assert!(doc.contains("<visibleLines>3</visibleLines>"));
    }

    #[test]
    fn test_destructive_package_shape() {
        let package = compiler().compile_schema_destructive(&[
            "Invoice__c".to_string(),
            "Invoice__c".to_string(),
            "Payment__c".to_string(),
        ]);
        // 空清单 + destructiveChanges.xml, 成员去重
        let manifest = package.manifest().unwrap();
        assert!(!manifest.contains("<members>"));
        let destructive = package.file("destructiveChanges.xml").unwrap();
        assert_eq!(destructive.matches("<members>Invoice__c</members>").count(), 1);
        assert!(destructive.contains("<members>Payment__c</members>"));
    }

    #[test]
    fn test_flow_raw_xml_takes_precedence() {
        let flow = FlowSpec {
            api_name: "Score_Lead".to_string(),
            xml_content: Some("<Flow><label>Raw</label></Flow>".to_string()),
            metadata: Some(serde_json::json!({"label": "Structured"})),
        };
        let package = compiler().compile_automation(&[flow], &[]);
        let doc = package.file("flows/Score_Lead.flow-meta.xml").unwrap();
        assert_eq!(doc, "<Flow><label>Raw</label></Flow>");
    }

    #[test]
    fn test_flow_structured_metadata_rendered() {
        let flow = FlowSpec {
            api_name: "Score_Lead".to_string(),
            xml_content: None,
            metadata: Some(serde_json::json!({"label": "Score Lead", "status": "Active"})),
        };
        let package = compiler().compile_automation(&[flow], &[]);
        let doc = package.file("flows/Score_Lead.flow-meta.xml").unwrap();
        assert!(doc.contains("<label>Score Lead</label>"));
        assert!(doc.contains("<status>Active</status>"));
        assert!(doc.starts_with("<?xml"));

        let manifest = package.manifest().unwrap();
        assert!(manifest.contains("<members>Score_Lead</members>"));
        assert!(manifest.contains("<name>Flow</name>"));
        assert!(!manifest.contains("AssignmentRules"));
    }

    #[test]
    fn test_assignment_rules_filed_by_object() {
        let rule = AssignmentRuleSpec {
            object: "Lead".to_string(),
            xml_content: Some("<AssignmentRules/>".to_string()),
            metadata: None,
        };
        let package = compiler().compile_automation(&[], &[rule]);
        assert!(package
            .file("assignmentRules/Lead.assignmentRules-meta.xml")
            .is_some());
        assert!(package.manifest().unwrap().contains("<name>AssignmentRules</name>"));
    }

    #[test]
    fn test_analytics_package_layout() {
        let plan = AnalyticsPlan {
            report_folders: vec![FolderSpec {
                api_name: "Sales".to_string(),
                name: "Sales".to_string(),
                access_type: None,
                folder_shares: vec![],
            }],
            dashboard_folders: vec![FolderSpec {
                api_name: "Exec".to_string(),
                name: "Exec".to_string(),
                access_type: None,
                folder_shares: vec![],
            }],
            reports: vec![ReportSpec {
                api_name: "Pipeline".to_string(),
                folder: "Sales".to_string(),
                name: "Pipeline".to_string(),
                report_type: "Opportunity".to_string(),
                description: None,
                format: None,
                scope: None,
                show_details: None,
                show_grand_total: None,
                columns: vec!["AMOUNT".to_string()],
                filter: None,
                groupings_down: vec![],
                groupings_across: vec![],
                chart: None,
                pre_existing: false,
            }],
            dashboards: vec![DashboardSpec {
                api_name: "Overview".to_string(),
                folder: "Exec".to_string(),
                title: "Overview".to_string(),
                dashboard_type: "SpecifiedUser".to_string(),
                running_user: Some("admin@example.com".to_string()),
                left_section: vec![],
                middle_section: vec![],
                right_section: vec![],
                pre_existing: false,
            }],
        };
        let package = compiler().compile_analytics(&plan);

        let manifest = package.manifest().unwrap();
        assert!(manifest.contains("<members>Sales</members>"));
        assert!(manifest.contains("<members>Sales/Pipeline</members>"));
        assert!(manifest.contains("<members>Exec/Overview</members>"));

        // 仪表板文件夹根标签为 Folder
        let dashboard_folder = package.file("dashboards/Exec-meta.xml").unwrap();
        assert!(dashboard_folder.contains("<Folder"));
        assert!(!dashboard_folder.contains("DashboardFolder"));
        let report_folder = package.file("reports/Sales.reportFolder-meta.xml").unwrap();
        assert!(report_folder.contains("<ReportFolder"));
        assert!(report_folder.contains("<accessType>Public</accessType>"));

        let report = package.file("reports/Sales/Pipeline.report").unwrap();
        assert!(report.contains("<format>Summary</format>"));
        assert!(report.contains("<scope>organization</scope>"));
        assert!(report.contains("<columns>AMOUNT</columns>"));
        let dashboard = package.file("dashboards/Exec/Overview.dashboard").unwrap();
        assert!(dashboard.contains("<runningUser>admin@example.com</runningUser>"));
    }

    #[test]
    fn test_analytics_destructive_reverse_dependency_order() {
        let package = compiler().compile_analytics_destructive(
            &["Sales".to_string()],
            &["Exec".to_string()],
            &["Sales/Pipeline".to_string()],
            &["Exec/Overview".to_string()],
        );
        let destructive = package.file("destructiveChanges.xml").unwrap();
        let dashboard_pos = destructive.find("<name>Dashboard</name>").unwrap();
        let report_pos = destructive.find("<name>Report</name>").unwrap();
        let report_folder_pos = destructive.find("<name>ReportFolder</name>").unwrap();
        assert!(dashboard_pos < report_pos);
        assert!(report_pos < report_folder_pos);
    }

    #[test]
    fn test_tooling_field_metadata() {
        let field = FieldSpec {
            field_type: FieldType::Lookup,
            related_to: Some("Account".to_string()),
            ..text_field("Account_Id__c")
        };
        let metadata = field_tooling_metadata(&field);
        assert_eq!(metadata["type"], "Lookup");
        assert_eq!(metadata["referenceTo"], "Account");
        assert_eq!(metadata["relationshipName"], "Account");
        assert_eq!(metadata["deleteConstraint"], "SetNull");
    }

    #[test]
    fn test_zip_contains_all_files() {
        let package = compiler().compile_schema(&[invoice_object()]);
        let bytes = package.to_zip_bytes().unwrap();
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"package.xml".to_string()));
        assert!(names.contains(&"objects/Invoice__c.object".to_string()));
    }
}
