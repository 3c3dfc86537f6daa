// ==========================================
// CRM 元数据部署系统 - 组件结果领域模型
// ==========================================
// 职责: 部署/回滚/推送的逐组件结果与聚合结果
// 红线: 单个组件失败只体现为结果变体, 绝不中断其余组件的收集
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::{ComponentType, DeploymentStatus};

// ==========================================
// RemoteError - 远程错误
// ==========================================

/// 归一化的远程错误 (code + message)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ==========================================
// PlannedComponent / ComponentOutcome
// ==========================================

/// 计划内组件: 协调器的对账单元 (类型 + 全限定名)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedComponent {
    pub component_type: ComponentType,
    pub api_name: String,
}

impl PlannedComponent {
    pub fn new(component_type: ComponentType, api_name: impl Into<String>) -> Self {
        Self {
            component_type,
            api_name: api_name.into(),
        }
    }
}

/// 单组件部署结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    pub api_name: String,
    pub success: bool,
    /// 远程对象 ID (成功且可解析时)
    pub remote_id: Option<String>,
    pub error: Option<RemoteError>,
    /// 回滚时随父对象级联删除而跳过
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ComponentOutcome {
    pub fn success(
        component_type: ComponentType,
        api_name: impl Into<String>,
        remote_id: Option<String>,
    ) -> Self {
        Self {
            component_type,
            api_name: api_name.into(),
            success: true,
            remote_id,
            error: None,
            skipped: false,
            reason: None,
        }
    }

    pub fn failure(
        component_type: ComponentType,
        api_name: impl Into<String>,
        error: RemoteError,
    ) -> Self {
        Self {
            component_type,
            api_name: api_name.into(),
            success: false,
            remote_id: None,
            error: Some(error),
            skipped: false,
            reason: None,
        }
    }

    pub fn skipped(
        component_type: ComponentType,
        api_name: impl Into<String>,
        remote_id: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            component_type,
            api_name: api_name.into(),
            success: true,
            remote_id,
            error: None,
            skipped: true,
            reason: Some(reason.into()),
        }
    }
}

// ==========================================
// DeploymentCounters / DeploymentResult
// ==========================================

/// 分类型创建计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentCounters {
    pub objects: u32,
    pub fields: u32,
    pub relationships: u32,
    pub flows: u32,
    pub assignment_rules: u32,
    pub report_folders: u32,
    pub reports: u32,
    pub dashboard_folders: u32,
    pub dashboards: u32,
}

impl DeploymentCounters {
    pub fn bump(&mut self, component_type: ComponentType) {
        match component_type {
            ComponentType::CustomObject => self.objects += 1,
            ComponentType::CustomField => self.fields += 1,
            ComponentType::Relationship => self.relationships += 1,
            ComponentType::Flow => self.flows += 1,
            ComponentType::AssignmentRule => self.assignment_rules += 1,
            ComponentType::ReportFolder => self.report_folders += 1,
            ComponentType::Report => self.reports += 1,
            ComponentType::DashboardFolder => self.dashboard_folders += 1,
            ComponentType::Dashboard => self.dashboards += 1,
        }
    }
}

/// 部署聚合结果 (正向部署与回滚共用同一形态)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub status: DeploymentStatus,
    pub counters: DeploymentCounters,
    /// 按计划顺序排列的逐组件结果
    pub components: Vec<ComponentOutcome>,
}

impl DeploymentResult {
    /// 由组件列表聚合出最终结果
    pub fn aggregate(counters: DeploymentCounters, components: Vec<ComponentOutcome>) -> Self {
        let total = components.len();
        let succeeded = components.iter().filter(|c| c.success).count();
        Self {
            status: DeploymentStatus::resolve(total, succeeded),
            counters,
            components,
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.components.iter().filter(|c| c.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.components.len() - self.succeeded_count()
    }
}

// ==========================================
// Push - 记录推送结果
// ==========================================

/// 单条记录的推送错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    #[serde(rename = "statusCode")]
    pub status_code: String,
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// 单条记录的推送结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub errors: Vec<RecordError>,
}

/// 批量推送聚合结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushResult {
    pub status: DeploymentStatus,
    pub records_total: usize,
    pub records_succeeded: usize,
    pub records_failed: usize,
    pub results: Vec<RecordResult>,
}

impl PushResult {
    /// 由逐记录结果聚合: 全成 → succeeded, 全败 → failed, 其余 → partial
    pub fn aggregate(records_total: usize, results: Vec<RecordResult>) -> Self {
        let records_succeeded = results.iter().filter(|r| r.success).count();
        let records_failed = results.len() - records_succeeded;
        let status = if records_succeeded == results.len() && !results.is_empty() {
            DeploymentStatus::Succeeded
        } else if records_failed == results.len() {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Partial
        };
        Self {
            status,
            records_total,
            records_succeeded,
            records_failed,
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecordResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool) -> ComponentOutcome {
        if success {
            ComponentOutcome::success(ComponentType::CustomField, "A__c.B__c", None)
        } else {
            ComponentOutcome::failure(
                ComponentType::CustomField,
                "A__c.B__c",
                RemoteError::new("boom", "boom"),
            )
        }
    }

    #[test]
    fn test_aggregate_empty_is_failed() {
        let result = DeploymentResult::aggregate(DeploymentCounters::default(), vec![]);
        assert_eq!(result.status, DeploymentStatus::Failed);
    }

    #[test]
    fn test_aggregate_mixed_is_partial() {
        let result = DeploymentResult::aggregate(
            DeploymentCounters::default(),
            vec![outcome(true), outcome(false)],
        );
        assert_eq!(result.status, DeploymentStatus::Partial);
        assert_eq!(result.succeeded_count(), 1);
        assert_eq!(result.failed_count(), 1);
    }

    #[test]
    fn test_push_aggregate_empty_is_failed() {
        let result = PushResult::aggregate(0, vec![]);
        assert_eq!(result.status, DeploymentStatus::Failed);
    }

    #[test]
    fn test_counters_bump() {
        let mut counters = DeploymentCounters::default();
        counters.bump(ComponentType::CustomObject);
        counters.bump(ComponentType::CustomField);
        counters.bump(ComponentType::CustomField);
        assert_eq!(counters.objects, 1);
        assert_eq!(counters.fields, 2);
    }
}
