// ==========================================
// CRM 元数据部署系统 - 领域层
// ==========================================
// 职责: 强类型领域模型 (计划/组件/结果/拓扑/冲突)
// 红线: 领域层不做 I/O, 不依赖引擎与仓储
// ==========================================

pub mod component;
pub mod conflict;
pub mod plan;
pub mod topology;
pub mod types;

// 重导出核心类型
pub use component::{
    ComponentOutcome, DeploymentCounters, DeploymentResult, PlannedComponent, PushResult,
    RecordError, RecordResult, RemoteError,
};
pub use conflict::{ConflictFinding, ConflictReport};
pub use plan::{
    AnalyticsPlan, AssignmentRuleSpec, CustomObjectSpec, DashboardComponent, DashboardSpec,
    DeploymentPlan, FieldSpec, FieldType, FlowSpec, FolderSpec, PicklistValue, ReportSpec,
    StandardObjectFields,
};
pub use topology::{FieldDescriptor, ObjectDescriptor, TopologySnapshot};
pub use types::{ComponentType, DeploymentStatus, Severity};
