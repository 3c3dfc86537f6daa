// ==========================================
// CRM 元数据部署系统 - 记录推送接口
// ==========================================
// 职责: 读取对象的持久化字段映射, 交给分块推送器批量 upsert
// ==========================================

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::api::error::ApiResult;
use crate::config::DeployConfig;
use crate::domain::component::PushResult;
use crate::engine::RecordBatcher;
use crate::gateway::PlatformGateway;
use crate::repository::FieldMappingRepository;

pub struct PushApi {
    batcher: RecordBatcher,
    mappings: Arc<FieldMappingRepository>,
}

impl PushApi {
    pub fn new(
        gateway: Arc<dyn PlatformGateway>,
        config: &DeployConfig,
        mappings: Arc<FieldMappingRepository>,
    ) -> Self {
        Self {
            batcher: RecordBatcher::new(gateway, config),
            mappings,
        }
    }

    /// 批量推送: 映射未配置时按原字段名透传
    pub async fn push_records(
        &self,
        connection_id: &str,
        object_type: &str,
        external_id_field: &str,
        records: &[Value],
    ) -> ApiResult<PushResult> {
        let mapping = self.mappings.get_mapping(object_type)?;
        let result = self
            .batcher
            .push(
                connection_id,
                object_type,
                external_id_field,
                records,
                mapping.as_ref(),
            )
            .await;
        info!(
            connection_id,
            object_type,
            status = result.status.as_str(),
            total = result.records_total,
            failed = result.records_failed,
            "记录推送完成"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::domain::component::RecordResult;
    use crate::domain::types::DeploymentStatus;
    use crate::gateway::{GatewayError, MetadataDeployStatus, ToolingResult};

    /// 回显收到记录的网关替身
    struct EchoGateway {
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl PlatformGateway for EchoGateway {
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
            self.seen.lock().unwrap().extend(records.iter().cloned());
            Ok(records
                .iter()
                .map(|_| RecordResult {
                    id: Some("001x".to_string()),
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

    fn mappings() -> Arc<FieldMappingRepository> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        Arc::new(FieldMappingRepository::from_connection(Arc::new(Mutex::new(conn))).unwrap())
    }

    #[tokio::test]
    async fn test_push_applies_stored_mapping() {
        let gateway = Arc::new(EchoGateway {
            seen: Mutex::new(vec![]),
        });
        let mappings = mappings();
        mappings
            .save_mapping(
                "Invoice__c",
                &[("amount".to_string(), "Amount__c".to_string())]
                    .into_iter()
                    .collect(),
            )
            .unwrap();

        let api = PushApi::new(
            Arc::clone(&gateway) as Arc<dyn PlatformGateway>,
            &DeployConfig::default(),
            mappings,
        );
        let result = api
            .push_records(
                "conn-1",
                "Invoice__c",
                "External_Id__c",
                &[json!({"amount": 120, "External_Id__c": "A-1"})],
            )
            .await
            .unwrap();

        assert_eq!(result.status, DeploymentStatus::Succeeded);
        let seen = gateway.seen.lock().unwrap();
        assert_eq!(seen[0]["Amount__c"], json!(120));
        assert!(seen[0].get("amount").is_none());
        assert_eq!(seen[0]["attributes"]["type"], json!("Invoice__c"));
    }

    #[tokio::test]
    async fn test_push_without_mapping_passes_names_through() {
        let gateway = Arc::new(EchoGateway {
            seen: Mutex::new(vec![]),
        });
        let api = PushApi::new(
            Arc::clone(&gateway) as Arc<dyn PlatformGateway>,
            &DeployConfig::default(),
            mappings(),
        );
        let result = api
            .push_records("conn-1", "Invoice__c", "External_Id__c", &[json!({"a": 1})])
            .await
            .unwrap();

        assert_eq!(result.records_succeeded, 1);
        assert_eq!(gateway.seen.lock().unwrap()[0]["a"], json!(1));
    }
}
