// ==========================================
// CRM 元数据部署系统 - 引擎层
// ==========================================
// 职责: 计划校验 → 冲突体检 → 包编译 → 部署协调 → 记录推送
// 红线: 引擎只依赖网关 trait 与仓储, 不感知 HTTP 细节
// ==========================================

pub mod conflict_checker;
pub mod orchestrator;
pub mod package_compiler;
pub mod plan_validator;
pub mod record_batcher;
pub mod xml;

pub use conflict_checker::check as check_conflicts;
pub use orchestrator::DeploymentOrchestrator;
pub use package_compiler::{MetadataPackage, PackageCompiler};
pub use plan_validator::{parse as parse_plan, validate as validate_plan, ValidationError};
pub use record_batcher::RecordBatcher;
