// ==========================================
// CRM 元数据部署系统 - 仓储层
// ==========================================
// 职责:
// - SQLite 持久化: 部署档案 + 字段映射
// - 所有仓储共用 db::configure_sqlite_connection 的 PRAGMA 约定
// ==========================================

pub mod deployment_repo;
pub mod error;
pub mod field_mapping_repo;

pub use deployment_repo::{DeploymentRecordEntity, DeploymentRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use field_mapping_repo::FieldMappingRepository;
