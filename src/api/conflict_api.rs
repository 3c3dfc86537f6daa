// ==========================================
// CRM 元数据部署系统 - 冲突体检接口
// ==========================================
// 职责:
// - 计划 JSON + 拓扑快照 → 冲突报告 (纯只读, 不改远程)
// - 远程模式: 按计划涉及的对象逐个 describe 拼装快照
// ==========================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::conflict::ConflictReport;
use crate::domain::plan::DeploymentPlan;
use crate::domain::topology::{ObjectDescriptor, TopologySnapshot};
use crate::engine::{check_conflicts, plan_validator};
use crate::gateway::PlatformGateway;

pub struct ConflictApi {
    gateway: Arc<dyn PlatformGateway>,
}

impl ConflictApi {
    pub fn new(gateway: Arc<dyn PlatformGateway>) -> Self {
        Self { gateway }
    }

    /// 用调用方提供的快照做体检
    pub fn check(&self, plan_json: &Value, snapshot: &TopologySnapshot) -> ApiResult<ConflictReport> {
        let plan = plan_validator::parse(plan_json).map_err(ApiError::InvalidPlan)?;
        Ok(check_conflicts(&plan, snapshot))
    }

    /// 拉取远程拓扑后体检: 只 describe 计划涉及的对象
    pub async fn check_remote(
        &self,
        connection_id: &str,
        plan_json: &Value,
    ) -> ApiResult<ConflictReport> {
        let plan = plan_validator::parse(plan_json).map_err(ApiError::InvalidPlan)?;
        let snapshot = self.fetch_snapshot(connection_id, &plan).await;
        Ok(check_conflicts(&plan, &snapshot))
    }

    /// describe 失败的对象不进快照 (体检按"远程不存在"处理)
    async fn fetch_snapshot(
        &self,
        connection_id: &str,
        plan: &DeploymentPlan,
    ) -> TopologySnapshot {
        let mut object_names: BTreeSet<&str> = BTreeSet::new();
        for object in &plan.custom_objects {
            object_names.insert(object.api_name.as_str());
        }
        for standard in &plan.standard_object_fields {
            object_names.insert(standard.object.as_str());
        }

        let mut snapshot = TopologySnapshot::default();
        for object_name in object_names {
            match self.gateway.describe_object(connection_id, object_name).await {
                Ok(Some(describe)) => {
                    match serde_json::from_value::<ObjectDescriptor>(describe) {
                        Ok(descriptor) => {
                            snapshot.objects.insert(object_name.to_string(), descriptor);
                        }
                        Err(error) => {
                            warn!(object_name, %error, "describe 载荷无法解析, 按不存在处理");
                        }
                    }
                }
                Ok(None) => {
                    debug!(object_name, "对象远程不存在");
                }
                Err(error) => {
                    warn!(object_name, %error, "describe 调用失败, 按不存在处理");
                }
            }
        }
        snapshot
    }
}
