// ==========================================
// CRM 元数据部署系统 - 部署档案仓储
// ==========================================
// 职责:
// - 管理 crm_deployments 表: 每次部署一条档案
// - 记录计划/结果快照与状态流转 (in_progress → 终态 → rolled_back)
// 说明:
// - 计划与结果以 JSON 文本快照落库, 回滚直接消费结果快照
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::repository::error::{RepositoryError, RepositoryResult};

/// 进行中
pub const STATUS_IN_PROGRESS: &str = "in_progress";
/// 已回滚
pub const STATUS_ROLLED_BACK: &str = "rolled_back";

/// 部署档案实体
#[derive(Debug, Clone)]
pub struct DeploymentRecordEntity {
    pub deployment_id: String,
    pub connection_id: String,
    pub status: String,
    pub plan_json: String,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub deployed_at: String,
    pub rolled_back_at: Option<String>,
    pub created_at: String,
}

pub struct DeploymentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DeploymentRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        let repo = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        repo.ensure_tables()?;
        Ok(repo)
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        let repo = Self { conn };
        repo.ensure_tables()?;
        Ok(repo)
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn ensure_tables(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS crm_deployments (
              deployment_id TEXT PRIMARY KEY,
              connection_id TEXT NOT NULL,
              status TEXT NOT NULL,
              plan_json TEXT NOT NULL,
              result_json TEXT,
              error_message TEXT,
              deployed_at TEXT NOT NULL,
              rolled_back_at TEXT,
              created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_crm_deployment_connection
              ON crm_deployments(connection_id, deployed_at);
            "#,
        )?;
        Ok(())
    }

    /// 新建进行中档案, 返回生成的部署 ID
    pub fn insert_in_progress(
        &self,
        connection_id: &str,
        plan_json: &str,
    ) -> RepositoryResult<String> {
        let deployment_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO crm_deployments
              (deployment_id, connection_id, status, plan_json, deployed_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![deployment_id, connection_id, STATUS_IN_PROGRESS, plan_json, now],
        )?;
        Ok(deployment_id)
    }

    /// 落定终态 (succeeded / partial / failed) 与结果快照
    pub fn finalize(
        &self,
        deployment_id: &str,
        status: &str,
        result_json: Option<&str>,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE crm_deployments SET status = ?2, result_json = ?3, error_message = ?4 WHERE deployment_id = ?1",
            params![deployment_id, status, result_json, error_message],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "crm_deployments".to_string(),
                id: deployment_id.to_string(),
            });
        }
        Ok(())
    }

    /// 标记已回滚, 结果快照替换为合并后的回滚结果
    pub fn mark_rolled_back(
        &self,
        deployment_id: &str,
        merged_result_json: &str,
    ) -> RepositoryResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE crm_deployments
               SET status = ?2, result_json = ?3, rolled_back_at = ?4
             WHERE deployment_id = ?1
            "#,
            params![deployment_id, STATUS_ROLLED_BACK, merged_result_json, now],
        )?;
        if updated == 0 {
            return Err(RepositoryError::NotFound {
                entity: "crm_deployments".to_string(),
                id: deployment_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, deployment_id: &str) -> RepositoryResult<Option<DeploymentRecordEntity>> {
        let conn = self.get_conn()?;
        let entity = conn
            .query_row(
                r#"
                SELECT deployment_id, connection_id, status, plan_json, result_json,
                       error_message, deployed_at, rolled_back_at, created_at
                  FROM crm_deployments
                 WHERE deployment_id = ?1
                "#,
                params![deployment_id],
                Self::map_row,
            )
            .optional()?;
        Ok(entity)
    }

    /// 按连接列出档案, 新部署在前
    pub fn list_by_connection(
        &self,
        connection_id: &str,
    ) -> RepositoryResult<Vec<DeploymentRecordEntity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT deployment_id, connection_id, status, plan_json, result_json,
                   error_message, deployed_at, rolled_back_at, created_at
              FROM crm_deployments
             WHERE connection_id = ?1
             ORDER BY deployed_at DESC
            "#,
        )?;
        let entities = stmt
            .query_map(params![connection_id], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeploymentRecordEntity> {
        Ok(DeploymentRecordEntity {
            deployment_id: row.get(0)?,
            connection_id: row.get(1)?,
            status: row.get(2)?,
            plan_json: row.get(3)?,
            result_json: row.get(4)?,
            error_message: row.get(5)?,
            deployed_at: row.get(6)?,
            rolled_back_at: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}
