// ==========================================
// CRM 元数据部署系统 - 部署计划领域模型
// ==========================================
// 职责: 经过校验的强类型部署计划
// 红线: 下游引擎只消费本模块类型, 不再接触原始 JSON
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ==========================================
// FieldType - 字段类型全集
// ==========================================

/// 自定义字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
    Currency,
    Percent,
    Picklist,
    Lookup,
    MasterDetail,
    Checkbox,
    TextArea,
    LongTextArea,
    Date,
    DateTime,
    Phone,
    Email,
    Url,
}

/// 全部字段类型 (错误消息中按固定顺序枚举)
pub const ALL_FIELD_TYPES: &[FieldType] = &[
    FieldType::Text,
    FieldType::Number,
    FieldType::Currency,
    FieldType::Percent,
    FieldType::Picklist,
    FieldType::Lookup,
    FieldType::MasterDetail,
    FieldType::Checkbox,
    FieldType::TextArea,
    FieldType::LongTextArea,
    FieldType::Date,
    FieldType::DateTime,
    FieldType::Phone,
    FieldType::Email,
    FieldType::Url,
];

/// 引用类字段类型 (relationships 列表仅允许这两种)
pub const RELATIONSHIP_FIELD_TYPES: &[FieldType] = &[FieldType::Lookup, FieldType::MasterDetail];

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::Currency => "Currency",
            FieldType::Percent => "Percent",
            FieldType::Picklist => "Picklist",
            FieldType::Lookup => "Lookup",
            FieldType::MasterDetail => "MasterDetail",
            FieldType::Checkbox => "Checkbox",
            FieldType::TextArea => "TextArea",
            FieldType::LongTextArea => "LongTextArea",
            FieldType::Date => "Date",
            FieldType::DateTime => "DateTime",
            FieldType::Phone => "Phone",
            FieldType::Email => "Email",
            FieldType::Url => "Url",
        }
    }

    pub fn parse(value: &str) -> Option<FieldType> {
        ALL_FIELD_TYPES
            .iter()
            .copied()
            .find(|field_type| field_type.as_str() == value)
    }

    /// 是否为引用类字段 (Lookup / MasterDetail)
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Lookup | FieldType::MasterDetail)
    }

    /// 计划类型 → 平台原生类型 (冲突检查在比较前做此归一化)
    pub fn native_type(&self) -> &'static str {
        match self {
            FieldType::Text => "string",
            FieldType::Number => "double",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Picklist => "picklist",
            FieldType::Lookup | FieldType::MasterDetail => "reference",
            FieldType::Checkbox => "boolean",
            FieldType::TextArea | FieldType::LongTextArea => "textarea",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Phone => "phone",
            FieldType::Email => "email",
            FieldType::Url => "url",
        }
    }
}

// ==========================================
// 字段与对象规格
// ==========================================

/// 选项列表值 (接受裸字符串或结构化对象两种形态)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PicklistValue {
    pub full_name: String,
    pub label: String,
    /// None 表示未显式指定, 编译时回落到 "首个值为默认" 规则
    pub default: Option<bool>,
    pub is_active: bool,
}

/// 字段规格 (fields 与 relationships 共用, 后者仅允许引用类型)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub api_name: String,
    pub label: String,
    pub field_type: FieldType,
    pub required: Option<bool>,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub picklist_values: Vec<PicklistValue>,
    pub restricted: Option<bool>,
    /// 引用目标对象 (related_to 或 referenceTo 两种键名均接受)
    pub related_to: Option<String>,
    pub relationship_name: Option<String>,
    pub delete_constraint: Option<String>,
    pub default_checked: Option<bool>,
    pub visible_lines: Option<u32>,
}

impl FieldSpec {
    /// 未显式给出 relationship_name 时的推导规则:
    /// 去掉自定义后缀 `__c`, 再去掉尾部 `_Id`
    pub fn derived_relationship_name(&self) -> String {
        derive_relationship_name(&self.api_name)
    }
}

/// 去掉自定义后缀 `__c`
pub fn strip_custom_suffix(api_name: &str) -> &str {
    api_name.strip_suffix("__c").unwrap_or(api_name)
}

/// 由字段 api_name 推导关系名
pub fn derive_relationship_name(field_api_name: &str) -> String {
    let base = strip_custom_suffix(field_api_name);
    base.strip_suffix("_Id").unwrap_or(base).to_string()
}

/// 自定义对象规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomObjectSpec {
    pub api_name: String,
    pub label: String,
    pub plural_label: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub relationships: Vec<FieldSpec>,
}

/// 标准对象追加字段 (平台仅支持逐字段同步创建)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardObjectFields {
    pub object: String,
    pub fields: Vec<FieldSpec>,
}

// ==========================================
// 自动化规格
// ==========================================

/// Flow 规格: 原始 XML 与结构化 metadata 二选一, 同时给出时原始 XML 优先
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub api_name: String,
    pub xml_content: Option<String>,
    pub metadata: Option<Value>,
}

/// 分配规则规格 (按目标对象落档)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRuleSpec {
    pub object: String,
    pub xml_content: Option<String>,
    pub metadata: Option<Value>,
}

// ==========================================
// 分析件规格
// ==========================================

/// 文件夹共享条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderShare {
    pub access_level: Option<String>,
    pub shared_to: Option<String>,
    pub shared_to_type: Option<String>,
}

/// 报表/仪表板文件夹规格
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSpec {
    pub api_name: String,
    pub name: String,
    pub access_type: Option<String>,
    pub folder_shares: Vec<FolderShare>,
}

/// 报表过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub column: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub boolean_filter: Option<String>,
    pub criteria_items: Vec<FilterCriteria>,
}

/// 报表分组 (行向/列向共用)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportGrouping {
    pub field: String,
    pub sort_order: Option<String>,
    pub date_granularity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSummary {
    pub aggregate: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportChart {
    pub chart_type: String,
    pub grouping_column: Option<String>,
    pub summaries: Vec<ChartSummary>,
}

/// 报表规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSpec {
    pub api_name: String,
    /// 所属文件夹 api_name, 全限定名为 "Folder/Report"
    pub folder: String,
    pub name: String,
    pub report_type: String,
    pub description: Option<String>,
    pub format: Option<String>,
    pub scope: Option<String>,
    pub show_details: Option<bool>,
    pub show_grand_total: Option<bool>,
    pub columns: Vec<String>,
    pub filter: Option<ReportFilter>,
    pub groupings_down: Vec<ReportGrouping>,
    pub groupings_across: Vec<ReportGrouping>,
    pub chart: Option<ReportChart>,
    /// 显式声明文件夹已在远程存在, 免除计划内引用完整性检查
    pub pre_existing: bool,
}

impl ReportSpec {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.folder, self.api_name)
    }
}

/// 仪表板组件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardComponent {
    pub title: Option<String>,
    pub header: Option<String>,
    pub component_type: Option<String>,
    /// 引用的报表全限定名 "Folder/Report"
    pub report: Option<String>,
    pub pre_existing: bool,
}

/// 仪表板规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub api_name: String,
    pub folder: String,
    pub title: String,
    pub dashboard_type: String,
    pub running_user: Option<String>,
    pub left_section: Vec<DashboardComponent>,
    pub middle_section: Vec<DashboardComponent>,
    pub right_section: Vec<DashboardComponent>,
    pub pre_existing: bool,
}

impl DashboardSpec {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.folder, self.api_name)
    }

    pub fn sections(&self) -> impl Iterator<Item = &DashboardComponent> {
        self.left_section
            .iter()
            .chain(self.middle_section.iter())
            .chain(self.right_section.iter())
    }
}

/// 分析件子计划
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalyticsPlan {
    pub report_folders: Vec<FolderSpec>,
    pub dashboard_folders: Vec<FolderSpec>,
    pub reports: Vec<ReportSpec>,
    pub dashboards: Vec<DashboardSpec>,
}

impl AnalyticsPlan {
    pub fn is_empty(&self) -> bool {
        self.report_folders.is_empty()
            && self.dashboard_folders.is_empty()
            && self.reports.is_empty()
            && self.dashboards.is_empty()
    }
}

// ==========================================
// DeploymentPlan - 完整部署计划
// ==========================================

/// 完整部署计划: 四个相互独立的子计划, 均可为空
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub custom_objects: Vec<CustomObjectSpec>,
    pub flows: Vec<FlowSpec>,
    pub assignment_rules: Vec<AssignmentRuleSpec>,
    pub analytics: AnalyticsPlan,
    pub standard_object_fields: Vec<StandardObjectFields>,
}

impl DeploymentPlan {
    pub fn is_empty(&self) -> bool {
        self.custom_objects.is_empty()
            && self.flows.is_empty()
            && self.assignment_rules.is_empty()
            && self.analytics.is_empty()
            && self.standard_object_fields.is_empty()
    }

    /// 是否存在可打包批量部署的组件 (schema / 自动化 / 分析件)
    pub fn has_bulk_components(&self) -> bool {
        !self.custom_objects.is_empty()
            || !self.flows.is_empty()
            || !self.assignment_rules.is_empty()
            || !self.analytics.is_empty()
    }
}
