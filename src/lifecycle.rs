//! 密钥生命周期编排：密钥来源、生成、激活、缓存与调度轮换

pub mod manager;
pub mod source;

pub use manager::KeyLifecycleManager;
pub use source::KeySource;
