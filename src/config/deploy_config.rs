// ==========================================
// CRM 元数据部署系统 - 部署配置
// ==========================================
// 职责: 集中部署引擎的可调参数, 支持环境变量覆写
// ==========================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 默认平台 API 版本
pub const DEFAULT_API_VERSION: &str = "v60.0";

/// 默认元数据部署轮询间隔 (秒)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// 默认元数据部署轮询超时 (秒)
///
/// 超时视为该批次全部计划组件失败, 不取消远程操作
/// (远程平台自行管理部署生命周期)。
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 300;

/// 批量 upsert 单块记录数上限 (平台 composite 接口限制)
pub const DEFAULT_COMPOSITE_BATCH_SIZE: usize = 200;

/// 部署引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// 平台 API 版本, 形如 "v60.0"
    pub api_version: String,
    /// 元数据部署状态轮询间隔 (秒)
    pub poll_interval_secs: u64,
    /// 元数据部署轮询硬超时 (秒)
    pub poll_timeout_secs: u64,
    /// 批量 upsert 单块记录数
    pub composite_batch_size: usize,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
            composite_batch_size: DEFAULT_COMPOSITE_BATCH_SIZE,
        }
    }
}

impl DeployConfig {
    /// 从环境变量加载, 未设置的项使用默认值
    ///
    /// # 环境变量
    /// - CRM_API_VERSION
    /// - CRM_DEPLOY_POLL_INTERVAL_SECS
    /// - CRM_DEPLOY_POLL_TIMEOUT_SECS
    /// - CRM_COMPOSITE_BATCH_SIZE
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("CRM_API_VERSION") {
            if !value.trim().is_empty() {
                config.api_version = value.trim().to_string();
            }
        }
        if let Some(value) = read_env_u64("CRM_DEPLOY_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = value;
        }
        if let Some(value) = read_env_u64("CRM_DEPLOY_POLL_TIMEOUT_SECS") {
            config.poll_timeout_secs = value;
        }
        if let Some(value) = read_env_u64("CRM_COMPOSITE_BATCH_SIZE") {
            config.composite_batch_size = value as usize;
        }
        config
    }

    /// 清单中使用的版本号 (去掉前缀 v)
    pub fn version_number(&self) -> &str {
        let version = self.api_version.trim();
        if version.len() > 1 && (version.starts_with('v') || version.starts_with('V')) {
            &version[1..]
        } else {
            version
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}
