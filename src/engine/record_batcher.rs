// ==========================================
// CRM 元数据部署系统 - 记录批量推送
// ==========================================
// 职责: 字段名重映射 → 固定大小分块 → 逐块 upsert → 聚合逐记录结果
// 红线: 单块调用失败转为该块全体记录的合成失败, 绝不丢弃其他块已获得的结果
// ==========================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::DeployConfig;
use crate::domain::component::{PushResult, RecordError, RecordResult};
use crate::gateway::{GatewayError, PlatformGateway};

/// 记录批量推送器
pub struct RecordBatcher {
    gateway: Arc<dyn PlatformGateway>,
    chunk_size: usize,
}

impl RecordBatcher {
    pub fn new(gateway: Arc<dyn PlatformGateway>, config: &DeployConfig) -> Self {
        Self {
            gateway,
            chunk_size: config.composite_batch_size.max(1),
        }
    }

    /// 批量推送
    ///
    /// # 参数
    /// - field_mapping: 源字段名 → 目标字段名, 缺失键保持原名
    ///
    /// # 规则
    /// - 每条记录附加 attributes.type 供批量端点识别目标对象
    /// - 按块提交, 块级失败合成该块逐记录失败
    /// - 全成 → succeeded, 全败 → failed, 其余 → partial
    pub async fn push(
        &self,
        connection_id: &str,
        object_type: &str,
        external_id_field: &str,
        records: &[Value],
        field_mapping: Option<&BTreeMap<String, String>>,
    ) -> PushResult {
        let transformed: Vec<Value> = records
            .iter()
            .map(|record| transform_record(record, object_type, field_mapping))
            .collect();

        let mut all_results: Vec<RecordResult> = Vec::with_capacity(transformed.len());
        for (index, chunk) in transformed.chunks(self.chunk_size).enumerate() {
            match self
                .gateway
                .bulk_upsert(connection_id, object_type, external_id_field, chunk)
                .await
            {
                Ok(chunk_results) => {
                    debug!(chunk = index, records = chunk.len(), "upsert 块完成");
                    all_results.extend(chunk_results);
                }
                Err(error) => {
                    warn!(chunk = index, records = chunk.len(), %error, "upsert 块失败, 合成逐记录失败");
                    all_results.extend(synthetic_failures(&error, chunk.len()));
                }
            }
        }

        PushResult::aggregate(records.len(), all_results)
    }
}

/// 字段名重映射并附加对象类型标识
fn transform_record(
    record: &Value,
    object_type: &str,
    field_mapping: Option<&BTreeMap<String, String>>,
) -> Value {
    let mut transformed = serde_json::Map::new();
    if let Value::Object(payload) = record {
        for (key, value) in payload {
            let target_key = field_mapping
                .and_then(|mapping| mapping.get(key))
                .cloned()
                .unwrap_or_else(|| key.clone());
            transformed.insert(target_key, value.clone());
        }
    }
    transformed.insert("attributes".to_string(), json!({"type": object_type}));
    Value::Object(transformed)
}

/// 块级失败 → 该块每条记录一条合成失败
fn synthetic_failures(error: &GatewayError, chunk_len: usize) -> Vec<RecordResult> {
    let remote = error.to_remote_error();
    (0..chunk_len)
        .map(|_| RecordResult {
            id: None,
            success: false,
            created: false,
            errors: vec![RecordError {
                status_code: remote.code.clone(),
                message: remote.message.clone(),
                fields: vec![],
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DeploymentStatus;
    use crate::gateway::{MetadataDeployStatus, ToolingResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 记录每块大小并按脚本返回结果的假网关
    struct ScriptedGateway {
        chunk_sizes: Mutex<Vec<usize>>,
        /// None ⇒ 每块返回全部成功; Some(code) ⇒ 每块返回块级失败
        fail_code: Option<String>,
    }

    impl ScriptedGateway {
        fn succeeding() -> Self {
            Self {
                chunk_sizes: Mutex::new(vec![]),
                fail_code: None,
            }
        }

        fn failing(code: &str) -> Self {
            Self {
                chunk_sizes: Mutex::new(vec![]),
                fail_code: Some(code.to_string()),
            }
        }
    }

    #[async_trait]
    impl PlatformGateway for ScriptedGateway {
        async fn describe_object(
            &self,
            _connection_id: &str,
            _object_name: &str,
        ) -> Result<Option<Value>, GatewayError> {
            unreachable!()
        }

        async fn bulk_upsert(
            &self,
            _connection_id: &str,
            _object_type: &str,
            _external_id_field: &str,
            records: &[Value],
        ) -> Result<Vec<RecordResult>, GatewayError> {
            self.chunk_sizes.lock().unwrap().push(records.len());
            if let Some(code) = &self.fail_code {
                return Err(GatewayError::request_failed(code.clone(), "batch rejected"));
            }
            Ok(records
                .iter()
                .map(|_| RecordResult {
                    id: Some("001xx".to_string()),
                    success: true,
                    created: true,
                    errors: vec![],
                })
                .collect())
        }

        async fn submit_metadata_package(
            &self,
            _connection_id: &str,
            _zip_bytes: &[u8],
        ) -> Result<String, GatewayError> {
            unreachable!()
        }

        async fn poll_metadata_package(
            &self,
            _connection_id: &str,
            _deploy_id: &str,
        ) -> Result<MetadataDeployStatus, GatewayError> {
            unreachable!()
        }

        async fn create_custom_field(
            &self,
            _connection_id: &str,
            _object_name: &str,
            _field_api_name: &str,
            _metadata: Value,
        ) -> Result<ToolingResult, GatewayError> {
            unreachable!()
        }

        async fn tooling_query(
            &self,
            _connection_id: &str,
            _soql: &str,
        ) -> Result<Vec<Value>, GatewayError> {
            unreachable!()
        }

        async fn tooling_delete(
            &self,
            _connection_id: &str,
            _sobject_type: &str,
            _record_id: &str,
        ) -> Result<ToolingResult, GatewayError> {
            unreachable!()
        }
    }

    fn batcher(gateway: Arc<ScriptedGateway>) -> RecordBatcher {
        RecordBatcher::new(gateway, &DeployConfig::default())
    }

    fn records(count: usize) -> Vec<Value> {
        (0..count).map(|i| json!({"Name": format!("r{i}")})).collect()
    }

    #[tokio::test]
    async fn test_chunking_450_records_into_3_chunks() {
        let gateway = Arc::new(ScriptedGateway::succeeding());
        let result = batcher(gateway.clone())
            .push("conn-1", "Account", "External_Id__c", &records(450), None)
            .await;

        assert_eq!(*gateway.chunk_sizes.lock().unwrap(), vec![200, 200, 50]);
        assert_eq!(result.records_total, 450);
        assert_eq!(result.results.len(), 450);
        assert_eq!(result.status, DeploymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_synthetic_failure_per_record() {
        let gateway = Arc::new(ScriptedGateway::failing("platform_batch_failed"));
        let result = batcher(gateway)
            .push("conn-1", "Account", "External_Id__c", &records(450), None)
            .await;

        assert_eq!(result.status, DeploymentStatus::Failed);
        assert_eq!(result.results.len(), 450);
        assert_eq!(result.records_failed, 450);
        assert!(result
            .results
            .iter()
            .all(|r| !r.success && r.errors[0].status_code == "platform_batch_failed"));
    }

    #[tokio::test]
    async fn test_field_mapping_and_attributes() {
        let gateway = Arc::new(ScriptedGateway::succeeding());
        let mapping: BTreeMap<String, String> =
            [("name".to_string(), "Name".to_string())].into_iter().collect();

        let record = json!({"name": "Acme", "Tier__c": "Gold"});
        let transformed = transform_record(&record, "Account", Some(&mapping));
        assert_eq!(transformed["Name"], "Acme");
        // 未映射的键保持原名
        assert_eq!(transformed["Tier__c"], "Gold");
        assert_eq!(transformed["attributes"]["type"], "Account");
        assert!(transformed.get("name").is_none());

        let result = batcher(gateway)
            .push("conn-1", "Account", "External_Id__c", &[record], Some(&mapping))
            .await;
        assert_eq!(result.records_succeeded, 1);
    }

    #[tokio::test]
    async fn test_empty_push_is_failed() {
        let gateway = Arc::new(ScriptedGateway::succeeding());
        let result = batcher(gateway)
            .push("conn-1", "Account", "External_Id__c", &[], None)
            .await;
        assert_eq!(result.status, DeploymentStatus::Failed);
        assert_eq!(result.records_total, 0);
    }
}
