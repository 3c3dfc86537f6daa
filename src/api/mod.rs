// ==========================================
// CRM 元数据部署系统 - 调用方接口层
// ==========================================
// 职责: 面向调用方的窄接口, 串联引擎与仓储
// 红线: 本层只做编排与持久化, 业务裁决全部在引擎
// ==========================================

pub mod conflict_api;
pub mod deploy_api;
pub mod error;
pub mod push_api;

pub use conflict_api::ConflictApi;
pub use deploy_api::{DeployApi, DeployResponse, PlanPreview};
pub use error::{ApiError, ApiResult};
pub use push_api::PushApi;
