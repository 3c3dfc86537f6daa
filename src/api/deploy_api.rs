// ==========================================
// CRM 元数据部署系统 - 部署接口
// ==========================================
// 职责:
// - 串联 校验 → 落库 → 协调器 → 终态归档 的完整调用链
// - 回滚入口: 仅允许回滚 succeeded/partial 的历史部署
// 红线:
// - 持久化失败向上抛 ApiError; 建议映射写入失败绝不影响部署结果
// ==========================================

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::config::DeployConfig;
use crate::domain::component::DeploymentResult;
use crate::domain::plan::DeploymentPlan;
use crate::engine::package_compiler::{MetadataPackage, PackageCompiler};
use crate::engine::plan_validator;
use crate::engine::DeploymentOrchestrator;
use crate::gateway::PlatformGateway;
use crate::repository::{
    DeploymentRecordEntity, DeploymentRepository, FieldMappingRepository,
};

/// 校验通过后的编译预览 (不触达远程平台)
#[derive(Debug)]
pub struct PlanPreview {
    pub plan: DeploymentPlan,
    pub schema: Option<MetadataPackage>,
    pub automation: Option<MetadataPackage>,
    pub analytics: Option<MetadataPackage>,
}

/// 一次部署调用的返回: 档案 ID + 逐组件结果
#[derive(Debug)]
pub struct DeployResponse {
    pub deployment_id: String,
    pub result: DeploymentResult,
}

pub struct DeployApi {
    orchestrator: DeploymentOrchestrator,
    compiler: PackageCompiler,
    deployments: Arc<DeploymentRepository>,
}

impl DeployApi {
    pub fn new(
        gateway: Arc<dyn PlatformGateway>,
        config: DeployConfig,
        deployments: Arc<DeploymentRepository>,
        mappings: Arc<FieldMappingRepository>,
    ) -> Self {
        let compiler = PackageCompiler::new(config.version_number());
        let orchestrator =
            DeploymentOrchestrator::new(gateway, config).with_mapping_repo(mappings);
        Self {
            orchestrator,
            compiler,
            deployments,
        }
    }

    /// 校验计划并编译三个批次的包, 作为部署前预览
    pub fn validate_and_compile(&self, plan_json: &Value) -> ApiResult<PlanPreview> {
        let plan = plan_validator::parse(plan_json).map_err(ApiError::InvalidPlan)?;

        let schema = (!plan.custom_objects.is_empty())
            .then(|| self.compiler.compile_schema(&plan.custom_objects));
        let automation = (!plan.flows.is_empty() || !plan.assignment_rules.is_empty())
            .then(|| self.compiler.compile_automation(&plan.flows, &plan.assignment_rules));
        let analytics = (!plan.analytics.is_empty())
            .then(|| self.compiler.compile_analytics(&plan.analytics));

        Ok(PlanPreview {
            plan,
            schema,
            automation,
            analytics,
        })
    }

    /// 执行部署: 校验 → 档案落库 → 协调器执行 → 终态归档
    pub async fn deploy(
        &self,
        connection_id: &str,
        plan_json: &Value,
    ) -> ApiResult<DeployResponse> {
        let plan = plan_validator::parse(plan_json).map_err(ApiError::InvalidPlan)?;

        let deployment_id = self
            .deployments
            .insert_in_progress(connection_id, &serde_json::to_string(plan_json)?)?;
        info!(connection_id, deployment_id, "deployment started");

        let result = self.orchestrator.deploy(connection_id, &plan).await;

        let error_message = result
            .components
            .iter()
            .find(|component| !component.success)
            .and_then(|component| component.error.as_ref())
            .map(|error| error.message.clone());
        self.deployments.finalize(
            &deployment_id,
            result.status.as_str(),
            Some(&serde_json::to_string(&result)?),
            error_message.as_deref(),
        )?;

        Ok(DeployResponse {
            deployment_id,
            result,
        })
    }

    /// 回滚历史部署: 档案必须存在且终态为 succeeded/partial
    pub async fn rollback(
        &self,
        connection_id: &str,
        deployment_id: &str,
    ) -> ApiResult<DeploymentResult> {
        let entity = self
            .deployments
            .get(deployment_id)?
            .ok_or_else(|| ApiError::DeploymentNotFound {
                deployment_id: deployment_id.to_string(),
            })?;

        if entity.status != "succeeded" && entity.status != "partial" {
            return Err(ApiError::RollbackNotAllowed {
                deployment_id: deployment_id.to_string(),
                status: entity.status,
            });
        }

        let prior_json = entity
            .result_json
            .ok_or_else(|| ApiError::MissingPriorResult {
                deployment_id: deployment_id.to_string(),
            })?;
        let prior: Value = serde_json::from_str(&prior_json)?;

        let rollback_result = self.orchestrator.rollback(connection_id, &prior).await;

        let merged = json!({
            "deployment": prior,
            "rollback": rollback_result,
        });
        self.deployments
            .mark_rolled_back(deployment_id, &serde_json::to_string(&merged)?)?;
        info!(connection_id, deployment_id, "deployment rolled back");

        Ok(rollback_result)
    }

    /// 查询单条部署档案
    pub fn status(&self, deployment_id: &str) -> ApiResult<DeploymentRecordEntity> {
        self.deployments
            .get(deployment_id)?
            .ok_or_else(|| ApiError::DeploymentNotFound {
                deployment_id: deployment_id.to_string(),
            })
    }

    /// 连接维度的部署历史, 新部署在前
    pub fn history(&self, connection_id: &str) -> ApiResult<Vec<DeploymentRecordEntity>> {
        Ok(self.deployments.list_by_connection(connection_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::domain::component::RecordResult;
    use crate::domain::types::DeploymentStatus;
    use crate::gateway::{ComponentDetail, GatewayError, MetadataDeployStatus, ToolingResult};

    /// 每次轮询固定回放同一终态的网关替身
    struct ReplayGateway {
        statuses: Mutex<VecDeque<MetadataDeployStatus>>,
    }

    impl ReplayGateway {
        fn succeeding(details: Vec<ComponentDetail>) -> Self {
            Self {
                statuses: Mutex::new(VecDeque::from([MetadataDeployStatus {
                    status: "Succeeded".to_string(),
                    done: true,
                    component_successes: details,
                    component_failures: vec![],
                }])),
            }
        }
    }

    #[async_trait]
    impl PlatformGateway for ReplayGateway {
        async fn describe_object(
            &self,
            _connection_id: &str,
            _object_name: &str,
        ) -> Result<Option<Value>, GatewayError> {
            Ok(None)
        }

        async fn bulk_upsert(
            &self,
            _connection_id: &str,
            _object_type: &str,
            _external_id_field: &str,
            _records: &[Value],
        ) -> Result<Vec<RecordResult>, GatewayError> {
            Ok(vec![])
        }

        async fn submit_metadata_package(
            &self,
            _connection_id: &str,
            _zip_bytes: &[u8],
        ) -> Result<String, GatewayError> {
            Ok("deploy-1".to_string())
        }

        async fn poll_metadata_package(
            &self,
            _connection_id: &str,
            _deploy_id: &str,
        ) -> Result<MetadataDeployStatus, GatewayError> {
            let mut statuses = self.statuses.lock().unwrap();
            let status = statuses.pop_front().unwrap_or_else(|| MetadataDeployStatus {
                status: "Succeeded".to_string(),
                done: true,
                ..MetadataDeployStatus::default()
            });
            if statuses.is_empty() {
                statuses.push_back(status.clone());
            }
            Ok(status)
        }

        async fn create_custom_field(
            &self,
            _connection_id: &str,
            _object_name: &str,
            _field_api_name: &str,
            _metadata: Value,
        ) -> Result<ToolingResult, GatewayError> {
            Ok(ToolingResult {
                success: true,
                id: Some("00N1".to_string()),
                errors: vec![],
            })
        }

        async fn tooling_query(
            &self,
            _connection_id: &str,
            _soql: &str,
        ) -> Result<Vec<Value>, GatewayError> {
            Ok(vec![])
        }

        async fn tooling_delete(
            &self,
            _connection_id: &str,
            _sobject_type: &str,
            _record_id: &str,
        ) -> Result<ToolingResult, GatewayError> {
            Ok(ToolingResult {
                success: true,
                id: None,
                errors: vec![],
            })
        }
    }

    fn in_memory_api(gateway: ReplayGateway) -> (DeployApi, Arc<DeploymentRepository>) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let deployments =
            Arc::new(DeploymentRepository::from_connection(Arc::clone(&conn)).unwrap());
        let mappings = Arc::new(FieldMappingRepository::from_connection(conn).unwrap());
        let api = DeployApi::new(
            Arc::new(gateway),
            DeployConfig::default(),
            Arc::clone(&deployments),
            mappings,
        );
        (api, deployments)
    }

    fn object_plan() -> Value {
        serde_json::json!({
            "custom_objects": [{
                "api_name": "Invoice__c",
                "label": "Invoice",
                "fields": [{"api_name": "Amount__c", "label": "Amount", "type": "Number"}],
            }]
        })
    }

    fn success_details() -> Vec<ComponentDetail> {
        vec![
            ComponentDetail {
                full_name: "Invoice__c".to_string(),
                id: Some("01I1".to_string()),
                ..ComponentDetail::default()
            },
            ComponentDetail {
                full_name: "Invoice__c.Amount__c".to_string(),
                id: Some("00N1".to_string()),
                ..ComponentDetail::default()
            },
        ]
    }

    #[test]
    fn test_validate_and_compile_rejects_bad_plan() {
        let (api, _) = in_memory_api(ReplayGateway::succeeding(vec![]));
        let bad_plan = serde_json::json!({
            "custom_objects": [{"api_name": "Invoice", "label": "Invoice"}]
        });
        let error = api.validate_and_compile(&bad_plan).unwrap_err();
        assert!(matches!(error, ApiError::InvalidPlan(_)));
    }

    #[test]
    fn test_validate_and_compile_builds_only_needed_packages() {
        let (api, _) = in_memory_api(ReplayGateway::succeeding(vec![]));
        let preview = api.validate_and_compile(&object_plan()).unwrap();
        assert!(preview.schema.is_some());
        assert!(preview.automation.is_none());
        assert!(preview.analytics.is_none());
    }

    #[tokio::test]
    async fn test_deploy_persists_terminal_record() {
        let (api, deployments) = in_memory_api(ReplayGateway::succeeding(success_details()));

        let response = api.deploy("conn-1", &object_plan()).await.unwrap();
        assert_eq!(response.result.status, DeploymentStatus::Succeeded);

        let entity = deployments.get(&response.deployment_id).unwrap().unwrap();
        assert_eq!(entity.status, "succeeded");
        assert!(entity.result_json.is_some());
        assert!(entity.error_message.is_none());
    }

    #[tokio::test]
    async fn test_rollback_requires_prior_success() {
        let (api, deployments) = in_memory_api(ReplayGateway::succeeding(vec![]));
        let deployment_id = deployments.insert_in_progress("conn-1", "{}").unwrap();
        deployments
            .finalize(&deployment_id, "failed", Some("{}"), None)
            .unwrap();

        let error = api.rollback("conn-1", &deployment_id).await.unwrap_err();
        assert!(matches!(error, ApiError::RollbackNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_rollback_missing_deployment_is_not_found() {
        let (api, _) = in_memory_api(ReplayGateway::succeeding(vec![]));
        let error = api.rollback("conn-1", "missing").await.unwrap_err();
        assert!(matches!(error, ApiError::DeploymentNotFound { .. }));
    }

    #[tokio::test]
    async fn test_deploy_then_rollback_marks_record() {
        let (api, deployments) = in_memory_api(ReplayGateway::succeeding(success_details()));
        let response = api.deploy("conn-1", &object_plan()).await.unwrap();

        let rollback = api
            .rollback("conn-1", &response.deployment_id)
            .await
            .unwrap();
        assert_eq!(rollback.status, DeploymentStatus::Succeeded);

        let entity = deployments.get(&response.deployment_id).unwrap().unwrap();
        assert_eq!(entity.status, "rolled_back");
        assert!(entity.rolled_back_at.is_some());
        let merged: Value = serde_json::from_str(entity.result_json.as_deref().unwrap()).unwrap();
        assert!(merged.get("deployment").is_some());
        assert!(merged.get("rollback").is_some());
    }
}
