//! 密钥生命周期管理器：字段加解密、密钥生成与激活、读穿缓存、调度轮换

use std::sync::{Arc, Mutex};

use base64::{Engine, engine::general_purpose};
use chrono::{Duration, Utc};
use dashmap::DashMap;

use crate::cipher::{Envelope, FieldCipher};
use crate::config::{CipherConfig, FIELD_ENCRYPTION_PURPOSE};
use crate::error::Error;
use crate::lifecycle::source::{KeySource, StaticKeyPair};
use crate::observer::OperationObserver;
use crate::store::{KeyRecord, KeyStore};

/// 激活密钥剩余有效期低于轮换间隔的该比例时，提前生成后继密钥
///
/// 0.2/0.8 沿用原有策略的启发值；两阶段"先生成、后提升"的结构才是
/// 不变的语义，比例本身可调。
pub const GENERATE_AHEAD_FRACTION: f64 = 0.2;
/// 激活密钥年龄超过轮换间隔的该比例后，提升待命的后继密钥
pub const PROMOTE_AFTER_FRACTION: f64 = 0.8;

/// 延迟激活的传播窗口（天）：给下游缓存预热留出时间
const ACTIVATION_GRACE_DAYS: i64 = 1;

/// 密钥生命周期管理器
///
/// 加密：解析（必要时创建）激活密钥 → AES-CBC → 包上版本信封。
/// 解密：从信封解出版本 → 按 (purpose, version) 解析密钥（缓存未命中则
/// 读存储）→ 解密。缓存只在激活变更时按用途整体失效，从不按时间失效。
pub struct KeyLifecycleManager {
    source: KeySource,
    config: CipherConfig,
    /// 用途 → 版本 → 记录；读穿填充，后写者胜
    cache: DashMap<String, DashMap<u32, KeyRecord>>,
    /// 激活序列化：每个用途一把锁
    activation_locks: DashMap<String, Arc<Mutex<()>>>,
    observer: OperationObserver,
}

impl KeyLifecycleManager {
    pub fn new(source: KeySource, config: CipherConfig) -> Self {
        Self::with_observer(source, config, OperationObserver::tracing())
    }

    pub fn with_observer(
        source: KeySource,
        config: CipherConfig,
        observer: OperationObserver,
    ) -> Self {
        Self {
            source,
            config,
            cache: DashMap::new(),
            activation_locks: DashMap::new(),
            observer,
        }
    }

    /// 托管模式：密钥由存储层管理
    pub fn managed(store: Arc<dyn KeyStore>, config: CipherConfig) -> Self {
        Self::new(KeySource::Managed(store), config)
    }

    /// 静态模式：只有配置注入的回退密钥对
    pub fn static_only(config: CipherConfig) -> Self {
        Self::new(KeySource::Static, config)
    }

    /// 使用默认用途加密
    pub fn encrypt_field(&self, plaintext: &str) -> Result<String, Error> {
        self.encrypt(plaintext, FIELD_ENCRYPTION_PURPOSE)
    }

    /// 使用默认用途解密
    pub fn decrypt_field(&self, envelope: &str) -> Result<String, Error> {
        self.decrypt(envelope, FIELD_ENCRYPTION_PURPOSE)
    }

    /// 加密明文并打包为 `"{version}:{Base64 密文}"` 信封
    ///
    /// 托管模式下若该用途还没有激活密钥，自动生成并立即激活版本 1。
    /// 静态模式下用回退密钥对加密，输出无版本前缀的遗留格式。
    pub fn encrypt(&self, plaintext: &str, purpose: &str) -> Result<String, Error> {
        let record = match self.get_active_key(purpose)? {
            Some(record) => record,
            None if self.source.is_managed() => self.generate_new_key(purpose, true, None)?,
            None => {
                return self.observer.observe("encrypt", purpose, None, || {
                    let pair = StaticKeyPair::from_config(&self.config)?;
                    let ciphertext =
                        FieldCipher::encrypt_raw(plaintext.as_bytes(), &pair.key, &pair.iv)?;
                    Ok(general_purpose::STANDARD.encode(ciphertext))
                });
            }
        };

        self.observer
            .observe("encrypt", purpose, Some(record.version), || {
                let key = FieldCipher::import_key(&record.key_material)?;
                let iv = FieldCipher::import_iv(&record.iv)?;
                let ciphertext = FieldCipher::encrypt_raw(plaintext.as_bytes(), &key, &iv)?;
                Ok(Envelope::seal(
                    record.version,
                    &general_purpose::STANDARD.encode(ciphertext),
                ))
            })
    }

    /// 解密信封文本
    ///
    /// 版本化信封按 (purpose, version) 解析密钥，缺失即 [`Error::KeyNotFound`]，
    /// 绝不跨版本或跨用途替换；无版本前缀的文本走静态回退密钥（遗留兼容）。
    pub fn decrypt(&self, envelope: &str, purpose: &str) -> Result<String, Error> {
        match Envelope::parse(envelope) {
            Envelope::Versioned { version, data } => {
                self.observer
                    .observe("decrypt", purpose, Some(version), || {
                        let record = self.get_key_by_version(version, purpose)?.ok_or_else(|| {
                            Error::KeyNotFound {
                                purpose: purpose.to_string(),
                                version,
                            }
                        })?;
                        let key = FieldCipher::import_key(&record.key_material)?;
                        let iv = FieldCipher::import_iv(&record.iv)?;
                        self.decrypt_with(&data, &key, &iv, purpose, Some(version))
                    })
            }
            Envelope::Legacy { data } => self.observer.observe("decrypt_legacy", purpose, None, || {
                let pair = StaticKeyPair::from_config(&self.config)?;
                self.decrypt_with(&data, &pair.key, &pair.iv, purpose, None)
            }),
        }
    }

    fn decrypt_with(
        &self,
        data_b64: &str,
        key: &[u8],
        iv: &[u8],
        purpose: &str,
        version: Option<u32>,
    ) -> Result<String, Error> {
        // Base64 解码失败是格式错误；密码学失败是安全事件
        let ciphertext = general_purpose::STANDARD.decode(data_b64)?;
        let plaintext = FieldCipher::decrypt_raw(&ciphertext, key, iv).inspect_err(|e| {
            if matches!(e, Error::Decryption(_)) {
                tracing::warn!(
                    purpose,
                    key_version = ?version,
                    error = %e,
                    "decryption failed; possible ciphertext tampering or corruption"
                );
            }
        })?;
        String::from_utf8(plaintext)
            .map_err(|e| Error::Format(format!("decrypted payload is not valid UTF-8: {}", e)))
    }

    /// 某用途当前的激活密钥（读穿缓存）
    pub fn get_active_key(&self, purpose: &str) -> Result<Option<KeyRecord>, Error> {
        if let Some(by_version) = self.cache.get(purpose) {
            if let Some(record) = by_version.iter().find(|r| r.value().is_active) {
                return Ok(Some(record.value().clone()));
            }
        }
        let store = match &self.source {
            KeySource::Managed(store) => store,
            KeySource::Static => return Ok(None),
        };
        let record = store.get_active(purpose)?;
        if let Some(record) = &record {
            self.cache_insert(record.clone());
        }
        Ok(record)
    }

    /// 按 (purpose, version) 读取密钥（读穿缓存）
    pub fn get_key_by_version(
        &self,
        version: u32,
        purpose: &str,
    ) -> Result<Option<KeyRecord>, Error> {
        if let Some(by_version) = self.cache.get(purpose) {
            if let Some(record) = by_version.get(&version) {
                return Ok(Some(record.clone()));
            }
        }
        let store = match &self.source {
            KeySource::Managed(store) => store,
            KeySource::Static => return Ok(None),
        };
        let record = store.get_by_version(purpose, version)?;
        if let Some(record) = &record {
            self.cache_insert(record.clone());
        }
        Ok(record)
    }

    /// 列出某用途的密钥
    pub fn get_keys(&self, purpose: &str, include_expired: bool) -> Result<Vec<KeyRecord>, Error> {
        self.source.store()?.list_by_purpose(purpose, include_expired)
    }

    /// 生成一把新密钥，版本 = 该用途最高版本 + 1
    ///
    /// `expires_in_days` 缺省取配置的默认有效期。不立即激活时
    /// `activated_at` 设为一天之后，给下游缓存预热留出传播窗口。
    pub fn generate_new_key(
        &self,
        purpose: &str,
        activate_immediately: bool,
        expires_in_days: Option<u32>,
    ) -> Result<KeyRecord, Error> {
        let store = self.source.store()?;
        let lock = self.purpose_lock(purpose);
        let _guard = lock
            .lock()
            .map_err(|_| Error::Operation("purpose lock poisoned".to_string()))?;

        self.observer.observe("generate_new_key", purpose, None, || {
            let version = store.highest_version(purpose)? + 1;
            let key = FieldCipher::generate_key()?;
            let iv = FieldCipher::generate_iv()?;
            let now = Utc::now();
            let lifetime_days = expires_in_days.unwrap_or(self.config.key_lifetime_days);

            let record = KeyRecord {
                id: String::new(), // 由存储层分配
                purpose: purpose.to_string(),
                version,
                key_material: FieldCipher::export_material(&key),
                iv: FieldCipher::export_material(&iv),
                created_at: now,
                activated_at: if activate_immediately {
                    now
                } else {
                    now + Duration::days(ACTIVATION_GRACE_DAYS)
                },
                expires_at: now + Duration::days(lifetime_days as i64),
                is_active: false,
                description: format!("generated for purpose '{}'", purpose),
            };
            let mut record = store.add(record)?;

            if activate_immediately {
                if !store.activate(&record.id, purpose)? {
                    return Err(Error::Operation(format!(
                        "newly created key {} could not be activated",
                        record.id
                    )));
                }
                record.is_active = true;
                self.invalidate(purpose);
                tracing::info!(purpose, version, "generated and activated new key");
            } else {
                tracing::info!(purpose, version, "generated new key, activation pending");
            }
            Ok(record)
        })
    }

    /// 激活指定版本；版本不存在时返回 `Ok(false)`
    ///
    /// 激活对每个用途串行化：同用途的并发激活不会留下两条激活记录。
    pub fn activate_key_version(&self, version: u32, purpose: &str) -> Result<bool, Error> {
        let store = self.source.store()?;
        let lock = self.purpose_lock(purpose);
        let _guard = lock
            .lock()
            .map_err(|_| Error::Operation("purpose lock poisoned".to_string()))?;

        self.observer
            .observe("activate_key_version", purpose, Some(version), || {
                let Some(record) = store.get_by_version(purpose, version)? else {
                    return Ok(false);
                };
                let activated = store.activate(&record.id, purpose)?;
                if activated {
                    self.invalidate(purpose);
                    tracing::info!(purpose, version, "activated key version");
                }
                Ok(activated)
            })
    }

    /// 两阶段调度轮换，返回是否发生过任何轮换动作
    ///
    /// 每个用途独立评估：(1) 没有激活密钥、或激活密钥临近过期且还没有
    /// 待命后继时，提前生成一把未激活的后继密钥；(2) 激活密钥已届龄时，
    /// 提升版本号最低的待命后继。先生成、后提升的间隔保证后继密钥在
    /// 生效前已有传播时间。单个用途的失败只记日志，下个调度周期重试。
    pub fn perform_scheduled_rotation(&self) -> Result<bool, Error> {
        let store = self.source.store()?;
        let mut rotated = false;
        for purpose in store.purposes()? {
            match self.rotate_purpose(&purpose) {
                Ok(changed) => rotated |= changed,
                Err(e) => {
                    tracing::warn!(purpose = %purpose, error = %e, "scheduled rotation failed");
                }
            }
        }
        Ok(rotated)
    }

    fn rotate_purpose(&self, purpose: &str) -> Result<bool, Error> {
        let store = self.source.store()?;
        self.observer.observe("scheduled_rotation", purpose, None, || {
            let now = Utc::now();
            let rotation = Duration::days(self.config.rotation_days as i64);
            let active = store.get_active(purpose)?;
            let mut changed = false;

            // 阶段一：保证始终存在一把待命的后继密钥
            let needs_successor = match &active {
                None => true,
                Some(active) => active.expires_at - now <= fraction_of(rotation, GENERATE_AHEAD_FRACTION),
            };
            if needs_successor {
                let highest = store.highest_version(purpose)?;
                let active_version = active.as_ref().map(|a| a.version).unwrap_or(0);
                if highest <= active_version {
                    self.generate_new_key(purpose, false, None)?;
                    changed = true;
                }
            }

            // 阶段二：激活密钥届龄后，提升最低版本的待命后继
            if let Some(active) = &active {
                if now - active.created_at >= fraction_of(rotation, PROMOTE_AFTER_FRACTION) {
                    let successor = store
                        .list_by_purpose(purpose, true)?
                        .into_iter()
                        .filter(|r| !r.is_active && r.version > active.version)
                        .min_by_key(|r| r.version);
                    if let Some(successor) = successor {
                        changed |= self.activate_key_version(successor.version, purpose)?;
                    }
                }
            }
            Ok(changed)
        })
    }

    /// 预热某用途的密钥缓存，返回载入的记录数
    pub async fn warm_cache(&self, purpose: &str) -> Result<usize, Error> {
        let store = match &self.source {
            KeySource::Managed(store) => Arc::clone(store),
            KeySource::Static => return Ok(0),
        };
        let purpose_owned = purpose.to_string();
        self.observer
            .observe_async("warm_cache", purpose, None, async move {
                let records = store.list_by_purpose(&purpose_owned, true)?;
                let count = records.len();
                for record in records {
                    self.cache_insert(record);
                }
                Ok(count)
            })
            .await
    }

    fn cache_insert(&self, record: KeyRecord) {
        self.cache
            .entry(record.purpose.clone())
            .or_default()
            .insert(record.version, record);
    }

    fn invalidate(&self, purpose: &str) {
        self.cache.remove(purpose);
    }

    fn purpose_lock(&self, purpose: &str) -> Arc<Mutex<()>> {
        self.activation_locks
            .entry(purpose.to_string())
            .or_default()
            .clone()
    }
}

fn fraction_of(duration: Duration, fraction: f64) -> Duration {
    Duration::seconds((duration.num_seconds() as f64 * fraction) as i64)
}
