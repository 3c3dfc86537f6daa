// ==========================================
// CRM 元数据部署系统 - 拓扑快照领域模型
// ==========================================
// 职责: 远程 schema 的不可变时点快照 (冲突检查的基线)
// 说明: 快照由外部拓扑拉取协作方产出, 本核心只读消费
// ==========================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 快照中的字段描述
///
/// 平台 describe 返回的字段属性远多于此处建模的键;
/// 未建模的键保留在 `extra` 中供启发式扫描使用。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub nillable: Option<bool>,
    #[serde(default, rename = "defaultValue")]
    pub default_value: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl FieldDescriptor {
    /// 必填字段判定: 不可为空且无默认值
    pub fn is_required(&self) -> bool {
        self.nillable == Some(false)
            && self
                .default_value
                .as_ref()
                .map(Value::is_null)
                .unwrap_or(true)
    }
}

/// 快照中的对象描述
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// 校验规则载荷形态不稳定 (列表 / 包装对象 / 缺失), 保留原始值
    #[serde(default, rename = "validationRules")]
    pub validation_rules: Option<Value>,
}

impl ObjectDescriptor {
    /// 按字段名建索引
    pub fn field_map(&self) -> BTreeMap<&str, &FieldDescriptor> {
        self.fields
            .iter()
            .filter(|field| !field.name.is_empty())
            .map(|field| (field.name.as_str(), field))
            .collect()
    }
}

/// 拓扑快照: 对象名 → 对象描述
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopologySnapshot {
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectDescriptor>,
}

impl TopologySnapshot {
    pub fn object(&self, name: &str) -> Option<&ObjectDescriptor> {
        self.objects.get(name)
    }
}
