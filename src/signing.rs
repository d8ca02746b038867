//! 进程内轮换的令牌签名密钥环
//!
//! 与字段加密密钥完全独立：仅驻留内存，不进任何存储，进程重启后由静态
//! 配置派生的确定性密钥重新播种。轮换后旧密钥在 48 小时宽限窗口内仍然
//! 参与验签——这正是旧密钥不立即丢弃的全部理由。

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use base64::{Engine, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand_core::{OsRng, TryRngCore};
use sha2::{Digest, Sha256};

use crate::config::CipherConfig;
use crate::error::Error;

/// 播种密钥的固定哨兵 id
pub const SEED_KEY_ID: &str = "key-static";
const SIGNING_KEY_SIZE: usize = 32;
const GRACE_WINDOW_HOURS: i64 = 48;

/// 签名密钥环中的一项
#[derive(Debug, Clone)]
pub struct SigningKeyEntry {
    /// 单调 id：`"key-{unix 秒}"`；播种密钥使用固定哨兵
    pub key_id: String,
    pub key_bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// 内存驻留的轮换签名密钥环
///
/// 读取（当前密钥、全部验签密钥）无锁；轮换与修剪在互斥区内进行，
/// 读者永远不会看到空环。
pub struct SigningKeyManager {
    keys: DashMap<String, SigningKeyEntry>,
    current_id: ArcSwap<String>,
    rotation_lock: Mutex<()>,
}

impl SigningKeyManager {
    /// 从静态配置播种一把确定性密钥
    ///
    /// 种子优先取 `signing_seed`，缺省退回 `fallback_key`；两者都没有
    /// 是配置错误。
    pub fn new(config: &CipherConfig) -> Result<Self, Error> {
        let seed_b64 = config
            .signing_seed
            .as_deref()
            .or(config.fallback_key.as_deref())
            .ok_or_else(|| {
                Error::Configuration(
                    "no signing seed or fallback key configured".to_string(),
                )
            })?;
        let seed = general_purpose::STANDARD.decode(seed_b64)?;

        let mut hasher = Sha256::new();
        hasher.update(b"field-seal/signing-seed/v1");
        hasher.update(&seed);
        let key_bytes = hasher.finalize().to_vec();

        let keys = DashMap::new();
        keys.insert(
            SEED_KEY_ID.to_string(),
            SigningKeyEntry {
                key_id: SEED_KEY_ID.to_string(),
                key_bytes,
                created_at: Utc::now(),
            },
        );
        Ok(Self {
            keys,
            current_id: ArcSwap::from_pointee(SEED_KEY_ID.to_string()),
            rotation_lock: Mutex::new(()),
        })
    }

    /// 当前用于签发的密钥及其 id
    pub fn current_signing_key(&self) -> (Vec<u8>, String) {
        loop {
            let id = self.current_id.load_full();
            if let Some(entry) = self.keys.get(id.as_str()) {
                return (entry.key_bytes.clone(), (*id).clone());
            }
            // current 指针刚被切换且旧 id 恰好被修剪，重读即可
        }
    }

    /// 环内全部仍可用于验签的密钥（宽限窗口的实现）
    pub fn all_verification_keys(&self) -> Vec<Vec<u8>> {
        self.keys.iter().map(|e| e.value().key_bytes.clone()).collect()
    }

    /// 当前环的大小
    pub fn ring_size(&self) -> usize {
        self.keys.len()
    }

    /// 轮换：生成新密钥、切换 current、修剪超出宽限窗口的旧密钥
    ///
    /// 同一时间只有一次轮换在进行（互斥区）；插入先于指针切换，修剪只
    /// 移除非当前密钥，因此读者任何时刻都能解析出当前密钥。
    pub fn rotate(&self) -> Result<bool, Error> {
        self.rotate_at(Utc::now())
    }

    fn rotate_at(&self, now: DateTime<Utc>) -> Result<bool, Error> {
        let _guard = self
            .rotation_lock
            .lock()
            .map_err(|_| Error::Operation("rotation lock poisoned".to_string()))?;

        let mut key_bytes = vec![0u8; SIGNING_KEY_SIZE];
        OsRng.try_fill_bytes(&mut key_bytes)?;
        let key_id = format!("key-{}", now.timestamp());

        self.keys.insert(
            key_id.clone(),
            SigningKeyEntry {
                key_id: key_id.clone(),
                key_bytes,
                created_at: now,
            },
        );
        self.current_id.store(Arc::new(key_id.clone()));
        self.prune(now, &key_id);

        tracing::info!(key_id = %key_id, ring_size = self.keys.len(), "rotated signing key");
        Ok(true)
    }

    /// 修剪宽限窗口之外的非当前密钥
    ///
    /// 年龄以 id 内编码的时间戳为准；无法解析的 id（哨兵播种密钥）退回
    /// `created_at`。
    fn prune(&self, now: DateTime<Utc>, current_id: &str) {
        let cutoff = now - Duration::hours(GRACE_WINDOW_HOURS);
        self.keys.retain(|id, entry| {
            if id == current_id {
                return true;
            }
            let born = Self::id_timestamp(id).unwrap_or(entry.created_at);
            born > cutoff
        });
    }

    fn id_timestamp(id: &str) -> Option<DateTime<Utc>> {
        let secs = id.strip_prefix("key-")?.parse::<i64>().ok()?;
        DateTime::<Utc>::from_timestamp(secs, 0)
    }
}
