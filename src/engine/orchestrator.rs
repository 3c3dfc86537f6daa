// ==========================================
// CRM 元数据部署系统 - 部署协调器
// ==========================================
// 职责:
// - 正向部署: 按 架构 → 自动化 → 分析件 三批次提交元数据包并轮询对账
// - 标准对象字段追加: Tooling 逐字段同步创建, 不因单字段失败中断
// - 回滚: 消费前次部署结果, 成功组件按依赖逆序删除
// 红线:
// - 单个组件失败只体现为结果条目, 绝不让整次部署短路
// - 超时不取消远程部署, 只把本批次计划组件全部判失败
// ==========================================

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::DeployConfig;
use crate::domain::component::{
    ComponentOutcome, DeploymentCounters, DeploymentResult, PlannedComponent, RemoteError,
};
use crate::domain::plan::{strip_custom_suffix, DeploymentPlan, FieldSpec};
use crate::domain::types::ComponentType;
use crate::engine::package_compiler::{
    field_tooling_metadata, MetadataPackage, PackageCompiler,
};
use crate::gateway::{MetadataDeployStatus, PlatformGateway};
use crate::repository::FieldMappingRepository;

// ===== 错误码 =====

const CODE_DEPLOY_TIMEOUT: &str = "metadata_deploy_timeout";
const CODE_DEPLOY_FAILED: &str = "metadata_deploy_failed";
const CODE_VERIFICATION_FAILED: &str = "field_verification_failed";
const CODE_UNSUPPORTED_COMPONENT: &str = "unsupported_component";
const CODE_NOT_FOUND: &str = "not_found";
const CODE_PACKAGE_ARCHIVE_FAILED: &str = "package_archive_failed";

/// 随父对象删除而跳过的回滚条目说明
const SKIP_REASON_PARENT_DELETED: &str = "Deleted with parent custom object";

// ==========================================
// 对账
// ==========================================

/// 计划组件与部署详情三路对账后的状态
enum Reconciled {
    /// 失败详情命中
    Failure(RemoteError),
    /// 成功详情命中 (含远程 ID)
    Success(Option<String>),
    /// 无详情但整体 Succeeded, 乐观视为成功
    Optimistic,
}

/// 三路对账: 失败表 → 成功表 → 整体乐观成功
fn reconcile(planned: &PlannedComponent, status: &MetadataDeployStatus) -> Reconciled {
    let name = planned.api_name.as_str();
    if let Some(detail) = status.failure_map().get(name) {
        return Reconciled::Failure(detail.to_error());
    }
    if let Some(detail) = status.success_map().get(name) {
        return Reconciled::Success(detail.remote_id());
    }
    if status.status == "Succeeded" {
        return Reconciled::Optimistic;
    }
    Reconciled::Failure(RemoteError::new(
        CODE_DEPLOY_FAILED,
        format!(
            "Component {} was not reported by deploy status {}",
            name, status.status
        ),
    ))
}

/// SOQL 字符串字面量转义 (先反斜杠后单引号)
fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ==========================================
// DeploymentOrchestrator
// ==========================================

pub struct DeploymentOrchestrator {
    gateway: Arc<dyn PlatformGateway>,
    compiler: PackageCompiler,
    config: DeployConfig,
    /// 字段映射仓储, 配置后部署成功会合并写入建议映射
    mapping_repo: Option<Arc<FieldMappingRepository>>,
}

impl DeploymentOrchestrator {
    pub fn new(gateway: Arc<dyn PlatformGateway>, config: DeployConfig) -> Self {
        let compiler = PackageCompiler::new(config.version_number());
        Self {
            gateway,
            compiler,
            config,
            mapping_repo: None,
        }
    }

    pub fn with_mapping_repo(mut self, repo: Arc<FieldMappingRepository>) -> Self {
        self.mapping_repo = Some(repo);
        self
    }

    // ==========================================
    // 正向部署
    // ==========================================

    /// 执行完整部署计划, 返回逐组件聚合结果
    pub async fn deploy(&self, connection_id: &str, plan: &DeploymentPlan) -> DeploymentResult {
        let mut outcomes: Vec<ComponentOutcome> = Vec::new();

        // ===== 架构批次 =====
        if !plan.custom_objects.is_empty() {
            let mut planned = Vec::new();
            let mut field_specs: HashMap<String, &FieldSpec> = HashMap::new();
            for object in &plan.custom_objects {
                planned.push(PlannedComponent::new(
                    ComponentType::CustomObject,
                    object.api_name.clone(),
                ));
                for field in &object.fields {
                    let full_name = format!("{}.{}", object.api_name, field.api_name);
                    field_specs.insert(full_name.clone(), field);
                    planned.push(PlannedComponent::new(ComponentType::CustomField, full_name));
                }
                for relationship in &object.relationships {
                    let full_name = format!("{}.{}", object.api_name, relationship.api_name);
                    field_specs.insert(full_name.clone(), relationship);
                    planned.push(PlannedComponent::new(ComponentType::Relationship, full_name));
                }
            }
            let package = self.compiler.compile_schema(&plan.custom_objects);
            let batch = self
                .deploy_batch(connection_id, &package, &planned, Some(&field_specs))
                .await;
            outcomes.extend(batch);
        }

        // ===== 自动化批次 =====
        if !plan.flows.is_empty() || !plan.assignment_rules.is_empty() {
            let mut planned = Vec::new();
            for flow in &plan.flows {
                planned.push(PlannedComponent::new(ComponentType::Flow, flow.api_name.clone()));
            }
            for rule in &plan.assignment_rules {
                planned.push(PlannedComponent::new(
                    ComponentType::AssignmentRule,
                    rule.object.clone(),
                ));
            }
            let package = self
                .compiler
                .compile_automation(&plan.flows, &plan.assignment_rules);
            let batch = self.deploy_batch(connection_id, &package, &planned, None).await;
            outcomes.extend(batch);
        }

        // ===== 分析件批次 =====
        if !plan.analytics.is_empty() {
            let mut planned = Vec::new();
            for folder in &plan.analytics.report_folders {
                planned.push(PlannedComponent::new(
                    ComponentType::ReportFolder,
                    folder.api_name.clone(),
                ));
            }
            for report in &plan.analytics.reports {
                planned.push(PlannedComponent::new(ComponentType::Report, report.full_name()));
            }
            for folder in &plan.analytics.dashboard_folders {
                planned.push(PlannedComponent::new(
                    ComponentType::DashboardFolder,
                    folder.api_name.clone(),
                ));
            }
            for dashboard in &plan.analytics.dashboards {
                planned.push(PlannedComponent::new(
                    ComponentType::Dashboard,
                    dashboard.full_name(),
                ));
            }
            let package = self.compiler.compile_analytics(&plan.analytics);
            let batch = self.deploy_batch(connection_id, &package, &planned, None).await;
            outcomes.extend(batch);
        }

        // ===== 标准对象字段追加 (逐字段, 不短路) =====
        for standard in &plan.standard_object_fields {
            for field in &standard.fields {
                let outcome = self
                    .append_standard_field(connection_id, &standard.object, field)
                    .await;
                outcomes.push(outcome);
            }
        }

        let mut counters = DeploymentCounters::default();
        for outcome in outcomes.iter().filter(|o| o.success) {
            counters.bump(outcome.component_type);
        }

        let result = DeploymentResult::aggregate(counters, outcomes);
        info!(
            connection_id,
            status = result.status.as_str(),
            succeeded = result.succeeded_count(),
            failed = result.failed_count(),
            "deployment finished"
        );

        self.suggest_field_mappings(plan, &result);
        result
    }

    /// 单批次: 打包 → 提交 → 轮询 → 三路对账 (+字段核验回落)
    async fn deploy_batch(
        &self,
        connection_id: &str,
        package: &MetadataPackage,
        planned: &[PlannedComponent],
        field_specs: Option<&HashMap<String, &FieldSpec>>,
    ) -> Vec<ComponentOutcome> {
        let status = match self.submit_and_poll(connection_id, package).await {
            Ok(status) => status,
            Err(error) => {
                // 提交/轮询级失败: 本批次计划组件全部判失败
                return planned
                    .iter()
                    .map(|component| {
                        ComponentOutcome::failure(
                            component.component_type,
                            component.api_name.clone(),
                            error.clone(),
                        )
                    })
                    .collect();
            }
        };

        let mut outcomes = Vec::with_capacity(planned.len());
        for component in planned {
            let outcome = match reconcile(component, &status) {
                Reconciled::Failure(error) => ComponentOutcome::failure(
                    component.component_type,
                    component.api_name.clone(),
                    error,
                ),
                Reconciled::Success(remote_id) => ComponentOutcome::success(
                    component.component_type,
                    component.api_name.clone(),
                    remote_id,
                ),
                Reconciled::Optimistic => {
                    if component.component_type.is_field_like() {
                        // 乐观成功的字段类组件需要远程核验
                        let spec = field_specs
                            .and_then(|specs| specs.get(component.api_name.as_str()))
                            .copied();
                        self.verify_field(connection_id, component, spec).await
                    } else {
                        ComponentOutcome::success(
                            component.component_type,
                            component.api_name.clone(),
                            None,
                        )
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// 提交元数据包并轮询至终态; 超时/传输失败返回批次级错误
    async fn submit_and_poll(
        &self,
        connection_id: &str,
        package: &MetadataPackage,
    ) -> Result<MetadataDeployStatus, RemoteError> {
        let zip_bytes = package
            .to_zip_bytes()
            .map_err(|e| RemoteError::new(CODE_PACKAGE_ARCHIVE_FAILED, e.to_string()))?;

        let deploy_id = self
            .gateway
            .submit_metadata_package(connection_id, &zip_bytes)
            .await
            .map_err(|e| e.to_remote_error())?;
        debug!(connection_id, deploy_id, "metadata package submitted");

        let deadline = Instant::now() + self.config.poll_timeout();
        loop {
            let status = self
                .gateway
                .poll_metadata_package(connection_id, &deploy_id)
                .await
                .map_err(|e| e.to_remote_error())?;
            if status.is_terminal() {
                debug!(deploy_id, status = status.status, "metadata deploy terminal");
                return Ok(status);
            }
            if Instant::now() >= deadline {
                warn!(deploy_id, "metadata deploy polling timed out");
                return Err(RemoteError::new(
                    CODE_DEPLOY_TIMEOUT,
                    format!(
                        "Metadata deploy {} did not reach a terminal state within {}s",
                        deploy_id, self.config.poll_timeout_secs
                    ),
                ));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    // ==========================================
    // 字段核验与追加
    // ==========================================

    /// 乐观成功字段的核验回落: Tooling 查询确认 → 缺失则同步创建 → 仍失败判错
    async fn verify_field(
        &self,
        connection_id: &str,
        component: &PlannedComponent,
        spec: Option<&FieldSpec>,
    ) -> ComponentOutcome {
        let Some((object_name, field_api_name)) = component.api_name.split_once('.') else {
            return ComponentOutcome::failure(
                component.component_type,
                component.api_name.clone(),
                RemoteError::new(
                    CODE_VERIFICATION_FAILED,
                    format!("Malformed field full name: {}", component.api_name),
                ),
            );
        };

        match self
            .resolve_field_id(connection_id, object_name, field_api_name)
            .await
        {
            Ok(Some(field_id)) => {
                return ComponentOutcome::success(
                    component.component_type,
                    component.api_name.clone(),
                    Some(field_id),
                );
            }
            Ok(None) => {}
            Err(error) => {
                warn!(
                    full_name = component.api_name,
                    code = error.code,
                    "field verification query failed"
                );
            }
        }

        // 远程查不到: 有字段规格就走 Tooling 同步创建兜底
        if let Some(spec) = spec {
            match self
                .gateway
                .create_custom_field(
                    connection_id,
                    object_name,
                    field_api_name,
                    field_tooling_metadata(spec),
                )
                .await
            {
                Ok(result) if result.success => {
                    return ComponentOutcome::success(
                        component.component_type,
                        component.api_name.clone(),
                        result.id,
                    );
                }
                Ok(result) => {
                    return ComponentOutcome::failure(
                        component.component_type,
                        component.api_name.clone(),
                        result.first_error(),
                    );
                }
                Err(error) => {
                    return ComponentOutcome::failure(
                        component.component_type,
                        component.api_name.clone(),
                        error.to_remote_error(),
                    );
                }
            }
        }

        ComponentOutcome::failure(
            component.component_type,
            component.api_name.clone(),
            RemoteError::new(
                CODE_VERIFICATION_FAILED,
                format!(
                    "Field {} could not be confirmed on the platform",
                    component.api_name
                ),
            ),
        )
    }

    /// Tooling 查询字段 ID; 自定义对象先解析对象 ID 作为 TableEnumOrId
    async fn resolve_field_id(
        &self,
        connection_id: &str,
        object_name: &str,
        field_api_name: &str,
    ) -> Result<Option<String>, RemoteError> {
        let table = if object_name.ends_with("__c") {
            let soql = format!(
                "SELECT Id FROM CustomObject WHERE DeveloperName = '{}'",
                escape_soql(strip_custom_suffix(object_name))
            );
            match self.query_first_id(connection_id, &soql).await? {
                Some(object_id) => object_id,
                None => object_name.to_string(),
            }
        } else {
            object_name.to_string()
        };

        let soql = format!(
            "SELECT Id FROM CustomField WHERE DeveloperName = '{}' AND TableEnumOrId = '{}' \
             ORDER BY CreatedDate DESC LIMIT 1",
            escape_soql(strip_custom_suffix(field_api_name)),
            escape_soql(&table)
        );
        self.query_first_id(connection_id, &soql).await
    }

    async fn query_first_id(
        &self,
        connection_id: &str,
        soql: &str,
    ) -> Result<Option<String>, RemoteError> {
        let records = self
            .gateway
            .tooling_query(connection_id, soql)
            .await
            .map_err(|e| e.to_remote_error())?;
        Ok(records
            .first()
            .and_then(|record| record.get("Id"))
            .and_then(Value::as_str)
            .map(String::from))
    }

    /// 标准对象上的单字段追加 (Tooling 同步创建)
    async fn append_standard_field(
        &self,
        connection_id: &str,
        object_name: &str,
        field: &FieldSpec,
    ) -> ComponentOutcome {
        let full_name = format!("{}.{}", object_name, field.api_name);
        let component_type = if field.field_type.is_reference() {
            ComponentType::Relationship
        } else {
            ComponentType::CustomField
        };
        match self
            .gateway
            .create_custom_field(
                connection_id,
                object_name,
                &field.api_name,
                field_tooling_metadata(field),
            )
            .await
        {
            Ok(result) if result.success => {
                ComponentOutcome::success(component_type, full_name, result.id)
            }
            Ok(result) => {
                ComponentOutcome::failure(component_type, full_name, result.first_error())
            }
            Err(error) => {
                ComponentOutcome::failure(component_type, full_name, error.to_remote_error())
            }
        }
    }

    // ==========================================
    // 建议字段映射
    // ==========================================

    /// 部署成功的字段写入建议映射 (已有人工配置不覆盖, 失败只告警)
    fn suggest_field_mappings(&self, plan: &DeploymentPlan, result: &DeploymentResult) {
        let Some(repo) = &self.mapping_repo else {
            return;
        };

        let succeeded: std::collections::HashSet<&str> = result
            .components
            .iter()
            .filter(|outcome| outcome.success)
            .map(|outcome| outcome.api_name.as_str())
            .collect();

        for object in &plan.custom_objects {
            let mut additions: BTreeMap<String, String> = BTreeMap::new();
            for field in object.fields.iter().chain(object.relationships.iter()) {
                let full_name = format!("{}.{}", object.api_name, field.api_name);
                if succeeded.contains(full_name.as_str()) {
                    additions.insert(
                        strip_custom_suffix(&field.api_name).to_string(),
                        field.api_name.clone(),
                    );
                }
            }
            if additions.is_empty() {
                continue;
            }
            match repo.merge_mapping(&object.api_name, &additions) {
                Ok(added) if added > 0 => {
                    debug!(object = object.api_name, added, "field mapping suggestions merged");
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        object = object.api_name,
                        error = %error,
                        "failed to persist field mapping suggestions"
                    );
                }
            }
        }
    }

    // ==========================================
    // 回滚
    // ==========================================

    /// 回滚一次历史部署: 只处理成功组件, 字段先于对象, 依赖逆序
    pub async fn rollback(&self, connection_id: &str, prior_result: &Value) -> DeploymentResult {
        let components = parse_prior_components(prior_result);

        let mut object_names: Vec<String> = Vec::new();
        let mut field_components: Vec<PriorComponent> = Vec::new();
        let mut flow_names: Vec<String> = Vec::new();
        let mut rule_objects: Vec<String> = Vec::new();
        let mut report_folders: Vec<String> = Vec::new();
        let mut dashboard_folders: Vec<String> = Vec::new();
        let mut reports: Vec<String> = Vec::new();
        let mut dashboards: Vec<String> = Vec::new();
        let mut unsupported: Vec<ComponentOutcome> = Vec::new();

        for component in components {
            match component.component_type {
                Some(ComponentType::CustomObject) => object_names.push(component.api_name),
                Some(ComponentType::CustomField) | Some(ComponentType::Relationship) => {
                    field_components.push(component);
                }
                Some(ComponentType::Flow) => flow_names.push(component.api_name),
                Some(ComponentType::AssignmentRule) => rule_objects.push(component.api_name),
                Some(ComponentType::ReportFolder) => report_folders.push(component.api_name),
                Some(ComponentType::DashboardFolder) => dashboard_folders.push(component.api_name),
                Some(ComponentType::Report) => reports.push(component.api_name),
                Some(ComponentType::Dashboard) => dashboards.push(component.api_name),
                None => unsupported.push(ComponentOutcome::failure(
                    ComponentType::CustomField,
                    component.api_name.clone(),
                    RemoteError::new(
                        CODE_UNSUPPORTED_COMPONENT,
                        format!(
                            "Component type {} cannot be rolled back",
                            component.raw_type
                        ),
                    ),
                )),
            }
        }

        let mut outcomes: Vec<ComponentOutcome> = Vec::new();

        // ===== 字段先删 (创建逆序); 父对象同批删除时跳过 =====
        field_components.reverse();
        for component in &field_components {
            let parent_deleted = component
                .api_name
                .split_once('.')
                .map(|(object, _)| object_names.iter().any(|name| name == object))
                .unwrap_or(false);
            if parent_deleted {
                outcomes.push(ComponentOutcome::skipped(
                    component.component_type.unwrap_or(ComponentType::CustomField),
                    component.api_name.clone(),
                    component.remote_id.clone(),
                    SKIP_REASON_PARENT_DELETED,
                ));
                continue;
            }
            outcomes.push(self.rollback_field(connection_id, component).await);
        }

        // ===== 对象破坏式删除 (创建逆序) =====
        if !object_names.is_empty() {
            object_names.reverse();
            let planned: Vec<PlannedComponent> = object_names
                .iter()
                .map(|name| PlannedComponent::new(ComponentType::CustomObject, name.clone()))
                .collect();
            let package = self.compiler.compile_schema_destructive(&object_names);
            outcomes.extend(self.deploy_batch(connection_id, &package, &planned, None).await);
        }

        // ===== 自动化破坏式删除 =====
        if !flow_names.is_empty() || !rule_objects.is_empty() {
            let mut planned: Vec<PlannedComponent> = flow_names
                .iter()
                .map(|name| PlannedComponent::new(ComponentType::Flow, name.clone()))
                .collect();
            planned.extend(
                rule_objects
                    .iter()
                    .map(|name| PlannedComponent::new(ComponentType::AssignmentRule, name.clone())),
            );
            let package = self
                .compiler
                .compile_automation_destructive(&flow_names, &rule_objects);
            outcomes.extend(self.deploy_batch(connection_id, &package, &planned, None).await);
        }

        // ===== 分析件破坏式删除 =====
        if !report_folders.is_empty()
            || !dashboard_folders.is_empty()
            || !reports.is_empty()
            || !dashboards.is_empty()
        {
            let mut planned: Vec<PlannedComponent> = Vec::new();
            planned.extend(
                dashboards
                    .iter()
                    .map(|name| PlannedComponent::new(ComponentType::Dashboard, name.clone())),
            );
            planned.extend(
                reports
                    .iter()
                    .map(|name| PlannedComponent::new(ComponentType::Report, name.clone())),
            );
            planned.extend(dashboard_folders.iter().map(|name| {
                PlannedComponent::new(ComponentType::DashboardFolder, name.clone())
            }));
            planned.extend(
                report_folders
                    .iter()
                    .map(|name| PlannedComponent::new(ComponentType::ReportFolder, name.clone())),
            );
            let package = self.compiler.compile_analytics_destructive(
                &report_folders,
                &dashboard_folders,
                &reports,
                &dashboards,
            );
            outcomes.extend(self.deploy_batch(connection_id, &package, &planned, None).await);
        }

        outcomes.extend(unsupported);

        let mut counters = DeploymentCounters::default();
        for outcome in outcomes.iter().filter(|o| o.success && !o.skipped) {
            counters.bump(outcome.component_type);
        }

        let result = DeploymentResult::aggregate(counters, outcomes);
        info!(
            connection_id,
            status = result.status.as_str(),
            succeeded = result.succeeded_count(),
            failed = result.failed_count(),
            "rollback finished"
        );
        result
    }

    /// 删除单个独立字段: 存档 ID 优先, 缺失时远程解析
    async fn rollback_field(
        &self,
        connection_id: &str,
        component: &PriorComponent,
    ) -> ComponentOutcome {
        let component_type = component.component_type.unwrap_or(ComponentType::CustomField);

        let field_id = match &component.remote_id {
            Some(id) if !id.is_empty() => Some(id.clone()),
            _ => {
                let Some((object_name, field_api_name)) = component.api_name.split_once('.')
                else {
                    return ComponentOutcome::failure(
                        component_type,
                        component.api_name.clone(),
                        RemoteError::new(
                            CODE_NOT_FOUND,
                            format!(
                                "Could not resolve {} field ID for rollback",
                                component.api_name
                            ),
                        ),
                    );
                };
                match self
                    .resolve_field_id(connection_id, object_name, field_api_name)
                    .await
                {
                    Ok(id) => id,
                    Err(_) => None,
                }
            }
        };

        let Some(field_id) = field_id else {
            return ComponentOutcome::failure(
                component_type,
                component.api_name.clone(),
                RemoteError::new(
                    CODE_NOT_FOUND,
                    format!(
                        "Could not resolve {} field ID for rollback",
                        component.api_name
                    ),
                ),
            );
        };

        match self
            .gateway
            .tooling_delete(connection_id, "CustomField", &field_id)
            .await
        {
            Ok(result) if result.success => {
                ComponentOutcome::success(component_type, component.api_name.clone(), Some(field_id))
            }
            Ok(result) => ComponentOutcome::failure(
                component_type,
                component.api_name.clone(),
                result.first_error(),
            ),
            Err(error) => ComponentOutcome::failure(
                component_type,
                component.api_name.clone(),
                error.to_remote_error(),
            ),
        }
    }
}

// ==========================================
// 历史结果解析
// ==========================================

/// 历史结果中的一条成功组件 (宽松解析, 类型未识别时保留原文)
struct PriorComponent {
    component_type: Option<ComponentType>,
    raw_type: String,
    api_name: String,
    remote_id: Option<String>,
}

/// 从前次部署结果 JSON 提取待回滚组件 (仅成功且未跳过的条目)
fn parse_prior_components(prior_result: &Value) -> Vec<PriorComponent> {
    let Some(components) = prior_result.get("components").and_then(Value::as_array) else {
        return Vec::new();
    };

    components
        .iter()
        .filter(|entry| entry.get("success").and_then(Value::as_bool).unwrap_or(false))
        .filter(|entry| !entry.get("skipped").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|entry| {
            let api_name = entry
                .get("api_name")
                .and_then(Value::as_str)?
                .trim()
                .to_string();
            if api_name.is_empty() {
                return None;
            }
            let raw_type = entry
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let component_type =
                serde_json::from_value::<ComponentType>(Value::String(raw_type.clone())).ok();
            let remote_id = entry
                .get("remote_id")
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
                .map(String::from);
            Some(PriorComponent {
                component_type,
                raw_type,
                api_name,
                remote_id,
            })
        })
        .collect()
}
