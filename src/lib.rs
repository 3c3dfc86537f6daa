// ==========================================
// CRM 元数据部署系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + 平台 REST/Tooling/Metadata 接口
// 系统定位: 声明式部署管线 (计划 → 校验 → 编译 → 部署 → 回滚)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 计划/组件/拓扑/冲突模型
pub mod domain;

// 数据仓储层 - 部署档案与字段映射
pub mod repository;

// 引擎层 - 校验/编译/协调/体检/推送
pub mod engine;

// 网关层 - 远程平台与凭证代理
pub mod gateway;

// 配置层 - 部署参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 调用方接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ComponentType, DeploymentStatus, Severity};

// 领域实体
pub use domain::{
    ComponentOutcome, ConflictFinding, ConflictReport, DeploymentPlan, DeploymentResult,
    PushResult, RemoteError, TopologySnapshot,
};

// 引擎
pub use engine::{
    check_conflicts, parse_plan, validate_plan, DeploymentOrchestrator, MetadataPackage,
    PackageCompiler, RecordBatcher, ValidationError,
};

// 网关
pub use gateway::{
    CredentialProvider, Credentials, GatewayError, HttpPlatformGateway, PlatformGateway,
};

// 仓储
pub use repository::{DeploymentRepository, FieldMappingRepository, RepositoryError};

// API
pub use api::{ApiError, ConflictApi, DeployApi, PushApi};

// 配置
pub use config::DeployConfig;

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "CRM 元数据部署系统";
