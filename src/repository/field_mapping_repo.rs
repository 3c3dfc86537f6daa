// ==========================================
// CRM 元数据部署系统 - 字段映射仓储
// ==========================================
// 职责:
// - 管理 crm_field_mappings 表: 每个对象一份 源字段 → 平台字段 映射
// - merge_mapping 只补充新键, 已有键以库中为准, 不被自动建议覆盖
// ==========================================

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct FieldMappingRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FieldMappingRepository {
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
            CREATE TABLE IF NOT EXISTS crm_field_mappings (
              object_name TEXT PRIMARY KEY,
              mapping_json TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// 读取对象的字段映射, 未配置时返回 None
    pub fn get_mapping(
        &self,
        object_name: &str,
    ) -> RepositoryResult<Option<BTreeMap<String, String>>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT mapping_json FROM crm_field_mappings WHERE object_name = ?1",
                params![object_name],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 全量覆盖对象的字段映射
    pub fn save_mapping(
        &self,
        object_name: &str,
        mapping: &BTreeMap<String, String>,
    ) -> RepositoryResult<()> {
        let json = serde_json::to_string(mapping)?;
        let now = Utc::now().to_rfc3339();
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO crm_field_mappings (object_name, mapping_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(object_name) DO UPDATE SET
              mapping_json = excluded.mapping_json,
              updated_at = excluded.updated_at
            "#,
            params![object_name, json, now],
        )?;
        Ok(())
    }

    /// 合并映射: 只写入库中尚不存在的键
    ///
    /// # 规则
    /// - 已有键保持原值, 自动建议不覆盖人工配置
    /// - 返回实际新增的键数量
    pub fn merge_mapping(
        &self,
        object_name: &str,
        additions: &BTreeMap<String, String>,
    ) -> RepositoryResult<usize> {
        let mut merged = self.get_mapping(object_name)?.unwrap_or_default();
        let mut added = 0;
        for (key, value) in additions {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.save_mapping(object_name, &merged)?;
        }
        Ok(added)
    }
}
