// ==========================================
// CRM 元数据部署系统 - 网关错误
// ==========================================
// 职责: 远程平台/凭证代理的错误分类
// ==========================================

use thiserror::Error;

use crate::domain::component::RemoteError;

/// 平台网关错误
#[derive(Debug, Error)]
pub enum GatewayError {
    // ===== 凭证 =====
    /// 连接代理无法给出有效且未过期的凭证
    #[error("连接凭证不可用: {0}")]
    ConnectionUnavailable(String),

    // ===== 远程请求 =====
    /// 平台返回非成功状态码 (code/message 取自平台错误载荷)
    #[error("平台请求失败 [{code}]: {message}")]
    RequestFailed { code: String, message: String },

    /// 平台响应形态与预期不符
    #[error("平台响应无法解析: {0}")]
    InvalidResponse(String),

    /// 网络层失败
    #[error("网络传输失败: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    pub fn request_failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::RequestFailed {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 归一化为逐组件结果中携带的远程错误
    pub fn to_remote_error(&self) -> RemoteError {
        match self {
            GatewayError::ConnectionUnavailable(message) => {
                RemoteError::new("connection_unavailable", message.clone())
            }
            GatewayError::RequestFailed { code, message } => {
                RemoteError::new(code.clone(), message.clone())
            }
            GatewayError::InvalidResponse(message) => {
                RemoteError::new("platform_invalid_response", message.clone())
            }
            GatewayError::Transport(error) => {
                RemoteError::new("platform_request_failed", error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_failed_carries_platform_code() {
        let error = GatewayError::request_failed("DUPLICATE_DEVELOPER_NAME", "name in use");
        let remote = error.to_remote_error();
        assert_eq!(remote.code, "DUPLICATE_DEVELOPER_NAME");
        assert_eq!(remote.message, "name in use");
    }

    #[test]
    fn test_invalid_response_code() {
        let error = GatewayError::InvalidResponse("missing sobjects".to_string());
        assert_eq!(error.to_remote_error().code, "platform_invalid_response");
    }
}
