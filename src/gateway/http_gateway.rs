// ==========================================
// CRM 元数据部署系统 - HTTP 平台网关
// ==========================================
// 职责: PlatformGateway 的 reqwest 实现 (REST + Tooling + 元数据部署接口)
// 红线: 错误载荷统一走 parse_error_body 归一化, 不向上抛原始响应
// ==========================================

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::DeployConfig;
use crate::domain::component::{RecordResult, RemoteError};
use crate::gateway::{
    ComponentDetail, CredentialProvider, Credentials, GatewayError, MetadataDeployStatus,
    PlatformGateway, ToolingResult,
};

const FALLBACK_ERROR_CODE: &str = "platform_request_failed";
const FALLBACK_ERROR_MESSAGE: &str = "Platform API request failed";

/// reqwest 实现的平台网关
pub struct HttpPlatformGateway {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    config: DeployConfig,
}

impl HttpPlatformGateway {
    pub fn new(credentials: Arc<dyn CredentialProvider>, config: DeployConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            config,
        }
    }

    async fn resolve(&self, connection_id: &str) -> Result<Credentials, GatewayError> {
        self.credentials.resolve(connection_id).await
    }

    fn data_url(&self, credentials: &Credentials, path: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            credentials.instance_url, self.config.api_version, path
        )
    }

    fn bearer(credentials: &Credentials) -> String {
        format!("Bearer {}", credentials.access_token)
    }

    /// 非成功响应 → 归一化网关错误
    async fn error_from_response(response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(&body);
        debug!(status = %status, code = %code, "平台请求失败");
        GatewayError::request_failed(code, message)
    }
}

/// 解析平台错误载荷, 容忍三种形态:
/// 错误对象数组 / 单个错误对象 / 非 JSON 文本
fn parse_error_body(body: &str) -> (String, String) {
    let fallback = || {
        let text = body.trim();
        (
            FALLBACK_ERROR_CODE.to_string(),
            if text.is_empty() {
                FALLBACK_ERROR_MESSAGE.to_string()
            } else {
                text.to_string()
            },
        )
    };

    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        return fallback();
    };

    let entry = match &payload {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(&payload),
        _ => None,
    };
    let Some(Value::Object(error)) = entry else {
        return fallback();
    };

    let code = error
        .get("errorCode")
        .or_else(|| error.get("code"))
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())
        .unwrap_or(FALLBACK_ERROR_CODE)
        .to_string();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(FALLBACK_ERROR_MESSAGE)
        .to_string();
    (code, message)
}

/// 部署状态载荷 → MetadataDeployStatus
/// (status/details 均藏在 deployResult 下, 顶层形态兼容)
fn parse_deploy_status(payload: &Value) -> MetadataDeployStatus {
    let deploy_result = payload.get("deployResult").unwrap_or(payload);

    let status = deploy_result
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    let done = deploy_result
        .get("done")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let details = deploy_result.get("details");
    let component_successes = parse_component_details(details, "componentSuccesses");
    let component_failures = parse_component_details(details, "componentFailures");

    MetadataDeployStatus {
        status,
        done,
        component_successes,
        component_failures,
    }
}

/// 单条目与数组两种形态都归一化为数组
fn parse_component_details(details: Option<&Value>, key: &str) -> Vec<ComponentDetail> {
    let Some(value) = details.and_then(|details| details.get(key)) else {
        return Vec::new();
    };
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect()
}

#[async_trait]
impl PlatformGateway for HttpPlatformGateway {
    async fn describe_object(
        &self,
        connection_id: &str,
        object_name: &str,
    ) -> Result<Option<Value>, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(&credentials, &format!("sobjects/{object_name}/describe/"));
        let response = self
            .client
            .get(&url)
            .header("Authorization", Self::bearer(&credentials))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(Some(response.json().await?))
    }

    async fn bulk_upsert(
        &self,
        connection_id: &str,
        object_type: &str,
        external_id_field: &str,
        records: &[Value],
    ) -> Result<Vec<RecordResult>, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(
            &credentials,
            &format!("composite/sobjects/{object_type}/{external_id_field}"),
        );
        let response = self
            .client
            .patch(&url)
            .header("Authorization", Self::bearer(&credentials))
            .json(&json!({"allOrNone": false, "records": records}))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: Value = response.json().await?;
        let Value::Array(items) = payload else {
            return Err(GatewayError::InvalidResponse(
                "composite upsert response is not a list".to_string(),
            ));
        };
        Ok(items
            .into_iter()
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect())
    }

    async fn submit_metadata_package(
        &self,
        connection_id: &str,
        zip_bytes: &[u8],
    ) -> Result<String, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(&credentials, "metadata/deployRequest");
        let encoded = base64::engine::general_purpose::STANDARD.encode(zip_bytes);
        let body = json!({
            "deployOptions": {
                "singlePackage": true,
                "rollbackOnError": false,
                "checkOnly": false,
            },
            "zipFile": encoded,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(&credentials))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: Value = response.json().await?;
        payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::InvalidResponse(
                    "metadata deploy response missing deploy id".to_string(),
                )
            })
    }

    async fn poll_metadata_package(
        &self,
        connection_id: &str,
        deploy_id: &str,
    ) -> Result<MetadataDeployStatus, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(
            &credentials,
            &format!("metadata/deployRequest/{deploy_id}?includeDetails=true"),
        );
        let response = self
            .client
            .get(&url)
            .header("Authorization", Self::bearer(&credentials))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: Value = response.json().await?;
        Ok(parse_deploy_status(&payload))
    }

    async fn create_custom_field(
        &self,
        connection_id: &str,
        object_name: &str,
        field_api_name: &str,
        metadata: Value,
    ) -> Result<ToolingResult, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(&credentials, "tooling/sobjects/CustomField");
        let body = json!({
            "FullName": format!("{object_name}.{field_api_name}"),
            "Metadata": metadata,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", Self::bearer(&credentials))
            .json(&body)
            .send()
            .await?;

        // Tooling 创建失败时错误同样在响应体中, 归一化为 ToolingResult
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            return Ok(ToolingResult {
                success: payload
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true),
                id: payload
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                errors: parse_tooling_errors(&payload),
            });
        }
        let (code, message) = parse_error_body(&payload.to_string());
        Ok(ToolingResult {
            success: false,
            id: None,
            errors: vec![RemoteError::new(code, message)],
        })
    }

    async fn tooling_query(
        &self,
        connection_id: &str,
        soql: &str,
    ) -> Result<Vec<Value>, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(&credentials, "tooling/query");
        let response = self
            .client
            .get(&url)
            .query(&[("q", soql)])
            .header("Authorization", Self::bearer(&credentials))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        let payload: Value = response.json().await?;
        match payload.get("records") {
            Some(Value::Array(records)) => Ok(records.clone()),
            _ => Err(GatewayError::InvalidResponse(
                "tooling query response missing records".to_string(),
            )),
        }
    }

    async fn tooling_delete(
        &self,
        connection_id: &str,
        sobject_type: &str,
        record_id: &str,
    ) -> Result<ToolingResult, GatewayError> {
        let credentials = self.resolve(connection_id).await?;
        let url = self.data_url(
            &credentials,
            &format!("tooling/sobjects/{sobject_type}/{record_id}"),
        );
        let response = self
            .client
            .delete(&url)
            .header("Authorization", Self::bearer(&credentials))
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(ToolingResult {
                success: true,
                id: Some(record_id.to_string()),
                errors: vec![],
            });
        }
        let body = response.text().await.unwrap_or_default();
        let (code, message) = parse_error_body(&body);
        Ok(ToolingResult {
            success: false,
            id: None,
            errors: vec![RemoteError::new(code, message)],
        })
    }
}

fn parse_tooling_errors(payload: &Value) -> Vec<RemoteError> {
    let Some(Value::Array(errors)) = payload.get("errors") else {
        return Vec::new();
    };
    errors
        .iter()
        .filter_map(|error| {
            let error = error.as_object()?;
            let code = error
                .get("errorCode")
                .or_else(|| error.get("code"))
                .or_else(|| error.get("statusCode"))
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown platform error");
            Some(RemoteError::new(code, message))
        })
        .collect()
}
