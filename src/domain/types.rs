// ==========================================
// CRM 元数据部署系统 - 领域基础类型
// ==========================================
// 职责: 部署状态/组件类型/冲突等级等核心枚举
// 红线: 纯数据类型, 不含业务规则
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// DeploymentStatus - 部署聚合状态
// ==========================================

/// 部署聚合状态
///
/// # 聚合规则
/// - 0 个组件或 0 个成功 → Failed
/// - 全部成功 → Succeeded
/// - 其余 → Partial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Succeeded,
    Partial,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            DeploymentStatus::Succeeded => "succeeded",
            DeploymentStatus::Partial => "partial",
            DeploymentStatus::Failed => "failed",
        }
    }

    /// 根据组件总数/成功数推导聚合状态
    pub fn resolve(total: usize, succeeded: usize) -> Self {
        if total == 0 || succeeded == 0 {
            DeploymentStatus::Failed
        } else if succeeded == total {
            DeploymentStatus::Succeeded
        } else {
            DeploymentStatus::Partial
        }
    }
}

// ==========================================
// ComponentType - 受控组件类型
// ==========================================

/// 受控组件类型
///
/// 部署/回滚过程中逐个追踪的远程变更单元。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    CustomObject,
    CustomField,
    Relationship,
    Flow,
    AssignmentRule,
    ReportFolder,
    Report,
    DashboardFolder,
    Dashboard,
}

impl ComponentType {
    pub fn as_str(&self) -> &str {
        match self {
            ComponentType::CustomObject => "custom_object",
            ComponentType::CustomField => "custom_field",
            ComponentType::Relationship => "relationship",
            ComponentType::Flow => "flow",
            ComponentType::AssignmentRule => "assignment_rule",
            ComponentType::ReportFolder => "report_folder",
            ComponentType::Report => "report",
            ComponentType::DashboardFolder => "dashboard_folder",
            ComponentType::Dashboard => "dashboard",
        }
    }

    /// 字段类组件 (全限定名形如 Object.Field, 可通过 Tooling API 单独创建/删除)
    pub fn is_field_like(&self) -> bool {
        matches!(self, ComponentType::CustomField | ComponentType::Relationship)
    }
}

// ==========================================
// Severity - 冲突等级
// ==========================================

/// 冲突等级
///
/// 排序: Green < Yellow < Red, 整体等级取最大值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Green,
    Yellow,
    Red,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Green => "green",
            Severity::Yellow => "yellow",
            Severity::Red => "red",
        }
    }
}
