//! 加密子系统的静态配置

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 默认的字段加密用途（purpose）
pub const FIELD_ENCRYPTION_PURPOSE: &str = "field-encryption";

/// 本子系统消费（而非拥有）的静态配置
///
/// 回退密钥/IV 用于解密无版本前缀的遗留密文，以及在没有托管存储时的
/// 静态运行模式。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CipherConfig {
    /// 静态回退密钥（Base64，解码后须为 32 字节）
    pub fallback_key: Option<String>,
    /// 静态回退 IV（Base64，解码后须为 16 字节）
    pub fallback_iv: Option<String>,
    /// 轮换间隔（天）
    pub rotation_days: u32,
    /// 新密钥的默认有效期（天）
    pub key_lifetime_days: u32,
    /// 签名密钥环的确定性种子（Base64）；缺省时从回退密钥派生
    pub signing_seed: Option<String>,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            fallback_key: None,
            fallback_iv: None,
            rotation_days: 30,
            key_lifetime_days: 90,
            signing_seed: None,
        }
    }
}

impl CipherConfig {
    /// 从 JSON 文本加载配置
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid config: {}", e)))
    }
}
