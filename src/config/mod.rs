// ==========================================
// CRM 元数据部署系统 - 配置层
// ==========================================
// 职责: 部署引擎运行参数 (API 版本 / 轮询 / 批量大小)
// ==========================================

pub mod deploy_config;

pub use deploy_config::DeployConfig;
