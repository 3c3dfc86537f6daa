// ==========================================
// CRM 元数据部署系统 - 元数据 XML 构建
// ==========================================
// 职责: 元数据文档的元素树构建与序列化
// 红线: 所有文本值必须转义, 输出带 XML 声明的完整文档
// ==========================================

use serde_json::Value;
use std::fmt::Write;

/// 元数据 API 命名空间
pub const METADATA_NAMESPACE: &str = "http://soap.sforce.com/2006/04/metadata";

/// XML 文本转义
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone)]
enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// 元素树节点
#[derive(Debug, Clone)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// 带元数据命名空间的根元素
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name).attr("xmlns", METADATA_NAMESPACE)
    }

    /// 叶子文本元素
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.children.push(XmlNode::Text(text.into()));
        element
    }

    /// 布尔叶子元素 ("true"/"false")
    pub fn leaf_bool(name: impl Into<String>, value: bool) -> Self {
        Self::leaf(name, if value { "true" } else { "false" })
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn child(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    pub fn with_child(mut self, element: XmlElement) -> Self {
        self.child(element);
        self
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// 序列化为带声明的完整文档
    pub fn to_document(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        self.render(&mut out, 0);
        out.push('\n');
        out
    }

    fn render(&self, out: &mut String, depth: usize) {
        let indent = "    ".repeat(depth);
        let _ = write!(out, "{indent}<{}", self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, " {name}=\"{}\"", escape(value));
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }

        // 仅含文本的元素保持单行
        let text_only = self
            .children
            .iter()
            .all(|child| matches!(child, XmlNode::Text(_)));
        out.push('>');
        if text_only {
            for child in &self.children {
                if let XmlNode::Text(text) = child {
                    out.push_str(&escape(text));
                }
            }
        } else {
            for child in &self.children {
                out.push('\n');
                match child {
                    XmlNode::Element(element) => element.render(out, depth + 1),
                    XmlNode::Text(text) => {
                        let _ = write!(out, "{}{}", "    ".repeat(depth + 1), escape(text));
                    }
                }
            }
            let _ = write!(out, "\n{indent}");
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

/// 结构化 metadata (JSON) → 元素树
///
/// 对象按键展开为子元素, 数组按元素名重复, 标量转文本, null 跳过。
pub fn value_to_elements(name: &str, value: &Value) -> Vec<XmlElement> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| value_to_elements(name, item))
            .collect(),
        Value::Object(payload) => {
            let mut element = XmlElement::new(name);
            for (key, child_value) in payload {
                for child in value_to_elements(key, child_value) {
                    element.child(child);
                }
            }
            vec![element]
        }
        Value::Bool(flag) => vec![XmlElement::leaf_bool(name, *flag)],
        Value::Number(number) => vec![XmlElement::leaf(name, number.to_string())],
        Value::String(text) => vec![XmlElement::leaf(name, text.clone())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_text_only_element_single_line() {
        let doc = XmlElement::root("CustomField")
            .with_child(XmlElement::leaf("fullName", "Amount__c"))
            .to_document();
        assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
        assert!(doc.contains("<fullName>Amount__c</fullName>"));
        assert!(doc.contains(METADATA_NAMESPACE));
    }

    #[test]
    fn test_empty_element_self_closes() {
        let doc = XmlElement::new("sorted").to_document();
        assert!(doc.contains("<sorted/>"));
    }

    #[test]
    fn test_value_to_elements_expands_arrays_and_objects() {
        let metadata = json!({
            "label": "Score Lead",
            "rules": [
                {"fullName": "Rule_1", "active": true},
                {"fullName": "Rule_2", "active": false}
            ],
            "dropped": null
        });
        let elements = value_to_elements("AssignmentRules", &metadata);
        assert_eq!(elements.len(), 1);
        let doc = elements[0].clone().to_document();
        assert!(doc.contains("<label>Score Lead</label>"));
        assert_eq!(doc.matches("<rules>").count(), 2);
        assert!(doc.contains("<active>true</active>"));
        assert!(doc.contains("<active>false</active>"));
        assert!(!doc.contains("dropped"));
    }
}
