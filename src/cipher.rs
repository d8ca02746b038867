//! 字段加密核心模块：AES-256-CBC 原语与版本化信封编解码

pub mod aes_cbc;
pub mod envelope;

pub use aes_cbc::FieldCipher;
pub use envelope::Envelope;
