// ==========================================
// CRM 元数据部署系统 - 调用方接口错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

use crate::engine::plan_validator::ValidationError;
use crate::repository::RepositoryError;

/// 调用方接口错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ===== 输入错误 =====
    #[error("部署计划校验失败: {} 项错误", .0.len())]
    InvalidPlan(Vec<ValidationError>),

    #[error("部署档案未找到: {deployment_id}")]
    DeploymentNotFound { deployment_id: String },

    // ===== 状态错误 =====
    #[error("部署 {deployment_id} 当前状态 {status} 不允许回滚")]
    RollbackNotAllowed {
        deployment_id: String,
        status: String,
    },

    #[error("部署 {deployment_id} 没有可回滚的结果快照")]
    MissingPriorResult { deployment_id: String },

    // ===== 下层错误 =====
    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("载荷序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
