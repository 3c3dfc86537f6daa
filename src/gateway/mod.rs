// ==========================================
// CRM 元数据部署系统 - 平台网关层
// ==========================================
// 职责: 远程 CRM 平台与凭证代理的窄接口 (协调器/推送只依赖 trait)
// 红线: 网关只做传输与载荷归一化, 不做业务裁决
// ==========================================

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::component::{RecordResult, RemoteError};

pub mod error;
pub mod http_gateway;

pub use error::GatewayError;
pub use http_gateway::HttpPlatformGateway;

// ==========================================
// 凭证代理
// ==========================================

/// 逻辑连接解析出的活动凭证
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    /// 租户实例地址, 不带尾部斜杠
    pub instance_url: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, instance_url: impl Into<String>) -> Self {
        let instance_url: String = instance_url.into();
        Self {
            access_token: access_token.into(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
        }
    }
}

/// 凭证代理: 逻辑连接 ID → 活动凭证
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// 凭证不可用时返回 GatewayError::ConnectionUnavailable
    async fn resolve(&self, connection_id: &str) -> Result<Credentials, GatewayError>;
}

// ==========================================
// 元数据部署状态
// ==========================================

/// 部署详情中的单组件条目 (成功与失败条目共用同一形态)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetail {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub problem: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ComponentDetail {
    /// 成功条目的远程 ID (id 优先, 缺失时回落 componentId)
    pub fn remote_id(&self) -> Option<String> {
        self.id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.component_id.clone().filter(|id| !id.is_empty()))
    }

    /// 失败条目 → 归一化远程错误
    pub fn to_error(&self) -> RemoteError {
        let code = self
            .problem_type
            .clone()
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| "metadata_deploy_failed".to_string());
        let message = self
            .problem
            .clone()
            .or_else(|| self.error_message.clone())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "Metadata deploy failed".to_string());
        RemoteError::new(code, message)
    }
}

/// 元数据包部署的轮询快照
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetadataDeployStatus {
    pub status: String,
    pub done: bool,
    pub component_successes: Vec<ComponentDetail>,
    pub component_failures: Vec<ComponentDetail>,
}

impl MetadataDeployStatus {
    pub fn is_terminal(&self) -> bool {
        self.done
            || matches!(
                self.status.as_str(),
                "Succeeded" | "SucceededPartial" | "Failed" | "Canceled"
            )
    }

    pub fn success_map(&self) -> HashMap<&str, &ComponentDetail> {
        Self::component_map(&self.component_successes)
    }

    pub fn failure_map(&self) -> HashMap<&str, &ComponentDetail> {
        Self::component_map(&self.component_failures)
    }

    fn component_map(components: &[ComponentDetail]) -> HashMap<&str, &ComponentDetail> {
        components
            .iter()
            .filter(|component| !component.full_name.trim().is_empty())
            .map(|component| (component.full_name.trim(), component))
            .collect()
    }
}

/// Tooling 单组件创建/删除结果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolingResult {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub errors: Vec<RemoteError>,
}

impl ToolingResult {
    /// 首条错误, 无错误载荷时给出兜底
    pub fn first_error(&self) -> RemoteError {
        self.errors
            .first()
            .cloned()
            .unwrap_or_else(|| RemoteError::new("platform_request_failed", "Platform request failed"))
    }
}

// ==========================================
// 平台网关
// ==========================================

/// 远程平台网关: 协调器与推送消费的全部远程操作
#[async_trait]
pub trait PlatformGateway: Send + Sync {
    /// 对象 describe, 对象不存在时返回 None
    async fn describe_object(
        &self,
        connection_id: &str,
        object_name: &str,
    ) -> Result<Option<Value>, GatewayError>;

    /// 按外部 ID 批量 upsert, 返回逐记录结果
    async fn bulk_upsert(
        &self,
        connection_id: &str,
        object_type: &str,
        external_id_field: &str,
        records: &[Value],
    ) -> Result<Vec<RecordResult>, GatewayError>;

    /// 提交元数据包, 返回部署 ID
    async fn submit_metadata_package(
        &self,
        connection_id: &str,
        zip_bytes: &[u8],
    ) -> Result<String, GatewayError>;

    /// 查询元数据包部署状态
    async fn poll_metadata_package(
        &self,
        connection_id: &str,
        deploy_id: &str,
    ) -> Result<MetadataDeployStatus, GatewayError>;

    /// Tooling 同步创建单个自定义字段
    async fn create_custom_field(
        &self,
        connection_id: &str,
        object_name: &str,
        field_api_name: &str,
        metadata: Value,
    ) -> Result<ToolingResult, GatewayError>;

    /// Tooling SOQL 查询, 返回记录列表
    async fn tooling_query(
        &self,
        connection_id: &str,
        soql: &str,
    ) -> Result<Vec<Value>, GatewayError>;

    /// Tooling 删除单条记录
    async fn tooling_delete(
        &self,
        connection_id: &str,
        sobject_type: &str,
        record_id: &str,
    ) -> Result<ToolingResult, GatewayError>;
}
