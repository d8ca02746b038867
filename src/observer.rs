//! 操作观测：包裹加解密与生命周期操作，记录耗时与结果
//!
//! 纯旁路通道：被包裹操作的返回值与错误原样透传，失败先记录再抛给调用方。
//! 缓存预热等路径可能是同步或异步的，因此两种包裹方式都提供。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::Error;

/// 一次操作的观测结果
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation: String,
    pub purpose: String,
    pub key_version: Option<u32>,
    pub success: bool,
    pub duration: Duration,
    /// 失败时的错误描述
    pub error: Option<String>,
}

/// 观测结果的接收端
///
/// 实现必须不可失败：记录观测结果绝不能影响被包裹的操作。
pub trait ObservationSink: Send + Sync {
    fn record(&self, outcome: OperationOutcome);
}

/// 通过 tracing 输出观测结果的默认接收端
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservationSink for TracingSink {
    fn record(&self, outcome: OperationOutcome) {
        if outcome.success {
            tracing::debug!(
                operation = %outcome.operation,
                purpose = %outcome.purpose,
                key_version = ?outcome.key_version,
                duration_us = outcome.duration.as_micros() as u64,
                "operation completed"
            );
        } else {
            tracing::warn!(
                operation = %outcome.operation,
                purpose = %outcome.purpose,
                key_version = ?outcome.key_version,
                duration_us = outcome.duration.as_micros() as u64,
                error = ?outcome.error,
                "operation failed"
            );
        }
    }
}

/// 把观测结果累积在内存里的接收端（测试用）
#[derive(Debug, Default)]
pub struct MemorySink {
    outcomes: Mutex<Vec<OperationOutcome>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 目前累积的全部观测结果
    pub fn outcomes(&self) -> Vec<OperationOutcome> {
        self.outcomes
            .lock()
            .map(|outcomes| outcomes.clone())
            .unwrap_or_default()
    }
}

impl ObservationSink for MemorySink {
    fn record(&self, outcome: OperationOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome);
        }
    }
}

/// 包裹任意操作并向接收端上报（操作名、用途、密钥版本、结果、耗时）
#[derive(Clone)]
pub struct OperationObserver {
    sink: Arc<dyn ObservationSink>,
}

impl OperationObserver {
    pub fn new(sink: Arc<dyn ObservationSink>) -> Self {
        Self { sink }
    }

    /// 使用 [`TracingSink`] 的默认观察者
    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingSink))
    }

    /// 包裹一次同步操作
    pub fn observe<T, F>(
        &self,
        operation: &str,
        purpose: &str,
        key_version: Option<u32>,
        f: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        let start = Instant::now();
        let result = f();
        self.finish(operation, purpose, key_version, start.elapsed(), &result);
        result
    }

    /// 包裹一次异步操作
    pub async fn observe_async<T, F>(
        &self,
        operation: &str,
        purpose: &str,
        key_version: Option<u32>,
        fut: F,
    ) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let start = Instant::now();
        let result = fut.await;
        self.finish(operation, purpose, key_version, start.elapsed(), &result);
        result
    }

    fn finish<T>(
        &self,
        operation: &str,
        purpose: &str,
        key_version: Option<u32>,
        duration: Duration,
        result: &Result<T, Error>,
    ) {
        self.sink.record(OperationOutcome {
            operation: operation.to_string(),
            purpose: purpose.to_string(),
            key_version,
            success: result.is_ok(),
            duration,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }
}

impl Default for OperationObserver {
    fn default() -> Self {
        Self::tracing()
    }
}
