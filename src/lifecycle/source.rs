//! 密钥来源：托管存储或仅静态配置
//!
//! 两种运行模式在构造时一次性选定，取代散落在各方法里的空值判断：
//! 托管模式下密钥由 [`KeyStore`] 管理；静态模式只有配置注入的回退
//! 密钥对，密钥管理操作不可用。

use std::sync::Arc;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::FieldCipher;
use crate::config::CipherConfig;
use crate::error::Error;
use crate::store::KeyStore;

/// 构造时选定的密钥来源
#[derive(Clone)]
pub enum KeySource {
    /// 托管密钥存储
    Managed(Arc<dyn KeyStore>),
    /// 仅静态回退密钥对
    Static,
}

impl KeySource {
    pub fn is_managed(&self) -> bool {
        matches!(self, KeySource::Managed(_))
    }

    /// 托管存储；静态模式下是配置错误
    pub(crate) fn store(&self) -> Result<&Arc<dyn KeyStore>, Error> {
        match self {
            KeySource::Managed(store) => Ok(store),
            KeySource::Static => Err(Error::Configuration(
                "no managed key store is configured".to_string(),
            )),
        }
    }
}

/// 解码后的静态回退密钥对，离开作用域时擦除
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct StaticKeyPair {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl StaticKeyPair {
    /// 从配置解码回退密钥对；材料缺失或长度非法立即报配置错误
    pub fn from_config(config: &CipherConfig) -> Result<Self, Error> {
        let key_b64 = config.fallback_key.as_deref().ok_or_else(|| {
            Error::Configuration("fallback key is not configured".to_string())
        })?;
        let iv_b64 = config.fallback_iv.as_deref().ok_or_else(|| {
            Error::Configuration("fallback IV is not configured".to_string())
        })?;
        Ok(Self {
            key: FieldCipher::import_key(key_b64)?,
            iv: FieldCipher::import_iv(iv_b64)?,
        })
    }
}
