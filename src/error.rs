use thiserror::Error;

/// 密钥生命周期与字段加密操作可能遇到的错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误（例如静态回退密钥缺失或长度非法），首次使用即暴露
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 请求的 (purpose, version) 密钥不存在
    ///
    /// 调用方可恢复（视为数据不可用），但绝不静默替换为其他密钥。
    #[error("Key not found: purpose={purpose}, version={version}")]
    KeyNotFound { purpose: String, version: u32 },

    /// 填充或密码学层面的解密失败，可能意味着密文被篡改或损坏
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// 数据格式错误（例如版本化信封的载荷不是合法的 Base64）
    ///
    /// 与 [`Error::Decryption`] 区分开，便于诊断。
    #[error("Malformed data: {0}")]
    Format(String),

    /// 密钥存储层错误
    #[error("Key store error: {0}")]
    Storage(String),

    /// 轮换、激活等管理操作失败；不致命，可在下个调度周期重试
    #[error("Operation failed: {0}")]
    Operation(String),

    /// 随机数生成失败
    #[error("Random generation failed: {0}")]
    Rng(#[from] rand_core::OsError),
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Format(format!("Base64 decoding failed: {}", err))
    }
}
