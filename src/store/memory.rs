//! 基于 DashMap 的内存密钥存储

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{KeyRecord, KeyStore};
use crate::error::Error;

/// 内存密钥存储
///
/// 每个用途对应一个记录向量；DashMap 的条目锁同时充当该用途的激活锁，
/// 使"先全部去激活、再激活目标"对外部读者表现为单个原子步骤。
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    records: DashMap<String, Vec<KeyRecord>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get_active(&self, purpose: &str) -> Result<Option<KeyRecord>, Error> {
        Ok(self
            .records
            .get(purpose)
            .and_then(|records| records.iter().find(|r| r.is_active).cloned()))
    }

    fn get_by_version(&self, purpose: &str, version: u32) -> Result<Option<KeyRecord>, Error> {
        Ok(self
            .records
            .get(purpose)
            .and_then(|records| records.iter().find(|r| r.version == version).cloned()))
    }

    fn list_by_purpose(
        &self,
        purpose: &str,
        include_expired: bool,
    ) -> Result<Vec<KeyRecord>, Error> {
        let now = Utc::now();
        let mut records: Vec<KeyRecord> = match self.records.get(purpose) {
            Some(records) => records
                .iter()
                .filter(|r| include_expired || !r.is_expired(now))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    fn highest_version(&self, purpose: &str) -> Result<u32, Error> {
        Ok(self
            .records
            .get(purpose)
            .map(|records| records.iter().map(|r| r.version).max().unwrap_or(0))
            .unwrap_or(0))
    }

    fn add(&self, mut record: KeyRecord) -> Result<KeyRecord, Error> {
        let mut records = self.records.entry(record.purpose.clone()).or_default();
        // 版本在用途内唯一，重复写入说明调用方的版本计算出了问题
        if records.iter().any(|r| r.version == record.version) {
            return Err(Error::Storage(format!(
                "version {} already exists for purpose '{}'",
                record.version, record.purpose
            )));
        }
        record.id = Uuid::new_v4().to_string();
        records.push(record.clone());
        Ok(record)
    }

    fn activate(&self, id: &str, purpose: &str) -> Result<bool, Error> {
        let Some(mut records) = self.records.get_mut(purpose) else {
            return Ok(false);
        };
        if !records.iter().any(|r| r.id == id) {
            return Ok(false);
        }
        for record in records.iter_mut() {
            record.is_active = record.id == id;
        }
        Ok(true)
    }

    fn purposes(&self) -> Result<Vec<String>, Error> {
        Ok(self.records.iter().map(|e| e.key().clone()).collect())
    }
}
