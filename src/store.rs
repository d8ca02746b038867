//! 密钥记录与密钥存储抽象

pub mod memory;

pub use memory::InMemoryKeyStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 按用途（purpose）分区的版本化密钥记录
///
/// 记录只会被创建与（去）激活，永不物理删除：历史密钥必须能按版本查到，
/// 旧密文才解得开。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    /// 存储层在写入时分配的不透明标识
    pub id: String,
    /// 用途标签；不同用途的密钥空间互不相通
    pub purpose: String,
    /// 用途内单调递增的版本号；0 保留表示"尚无密钥"
    pub version: u32,
    /// 密钥材料（Base64；原始字节不跨越存储边界）
    pub key_material: String,
    /// 初始化向量（Base64）
    pub iv: String,
    pub created_at: DateTime<Utc>,
    /// 可以是未来时间（延迟激活的传播窗口）
    pub activated_at: DateTime<Utc>,
    /// 只决定轮换资格；过期密钥仍可用于解密
    pub expires_at: DateTime<Utc>,
    /// 同一用途同一时刻至多一条激活记录
    pub is_active: bool,
    /// 自由格式备注，无语义
    pub description: String,
}

impl KeyRecord {
    /// 是否已过期（仅影响轮换资格，不影响解密）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// 密钥存储抽象
///
/// 读操作在未命中时返回 `Ok(None)` 或空集合，从不把"没有"当作错误。
pub trait KeyStore: Send + Sync {
    /// 某用途当前的激活密钥
    fn get_active(&self, purpose: &str) -> Result<Option<KeyRecord>, Error>;

    /// 按 (purpose, version) 查询
    fn get_by_version(&self, purpose: &str, version: u32) -> Result<Option<KeyRecord>, Error>;

    /// 列出某用途的密钥，按版本升序
    fn list_by_purpose(
        &self,
        purpose: &str,
        include_expired: bool,
    ) -> Result<Vec<KeyRecord>, Error>;

    /// 某用途的最高版本号；没有任何密钥时为 0
    fn highest_version(&self, purpose: &str) -> Result<u32, Error>;

    /// 写入新记录并返回带 id 的记录
    fn add(&self, record: KeyRecord) -> Result<KeyRecord, Error>;

    /// 激活目标记录
    ///
    /// 对同一用途必须是原子操作：先将同用途其他记录全部去激活，再激活
    /// 目标；外部读者任何时刻最多只能看到一条激活记录。id 不存在时返回
    /// `Ok(false)`。
    fn activate(&self, id: &str, purpose: &str) -> Result<bool, Error>;

    /// 存储中出现过的全部用途
    fn purposes(&self) -> Result<Vec<String>, Error>;
}
