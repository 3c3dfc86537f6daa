// ==========================================
// CRM 元数据部署系统 - 冲突报告领域模型
// ==========================================
// 职责: 拓扑冲突检查的发现项与聚合报告
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::Severity;

/// 单条冲突发现
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

impl ConflictFinding {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
        }
    }
}

/// 冲突检查聚合报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub findings: Vec<ConflictFinding>,
    pub overall_severity: Severity,
    pub green_count: usize,
    pub yellow_count: usize,
    pub red_count: usize,
}

impl ConflictReport {
    /// 由发现项聚合: 整体等级取最大值, 无发现 ⇒ green
    pub fn aggregate(findings: Vec<ConflictFinding>) -> Self {
        let green_count = findings.iter().filter(|f| f.severity == Severity::Green).count();
        let yellow_count = findings.iter().filter(|f| f.severity == Severity::Yellow).count();
        let red_count = findings.iter().filter(|f| f.severity == Severity::Red).count();

        let overall_severity = if red_count > 0 {
            Severity::Red
        } else if yellow_count > 0 {
            Severity::Yellow
        } else {
            Severity::Green
        };

        Self {
            findings,
            overall_severity,
            green_count,
            yellow_count,
            red_count,
        }
    }
}
