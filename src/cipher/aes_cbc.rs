//! AES-256-CBC 字段加密原语
use aes::Aes256;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose};
use rand_core::{OsRng, TryRngCore};

use crate::error::Error;

/// 密钥长度（256 位）
pub const KEY_SIZE: usize = 32;
/// IV 长度（一个 AES 块）
pub const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// 无状态的 AES-256-CBC 加解密原语（PKCS#7 填充）
///
/// 纯字节进出，无副作用。密钥与 IV 的长度在每次调用时校验。
#[derive(Debug)]
pub struct FieldCipher;

impl FieldCipher {
    /// 生成一把新的 256 位密钥
    pub fn generate_key() -> Result<Vec<u8>, Error> {
        let mut key = vec![0u8; KEY_SIZE];
        OsRng.try_fill_bytes(&mut key)?;
        Ok(key)
    }

    /// 生成一个新的 128 位 IV
    pub fn generate_iv() -> Result<Vec<u8>, Error> {
        let mut iv = vec![0u8; IV_SIZE];
        OsRng.try_fill_bytes(&mut iv)?;
        Ok(iv)
    }

    /// 加密原始字节
    pub fn encrypt_raw(plaintext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, Error> {
        Self::check_material(key, iv)?;
        let cipher = Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| Error::Configuration(format!("invalid key material: {}", e)))?;
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// 解密原始字节
    ///
    /// 块长不对或填充非法都视为解密失败（可能被篡改），而非格式错误。
    pub fn decrypt_raw(ciphertext: &[u8], key: &[u8], iv: &[u8]) -> Result<Vec<u8>, Error> {
        Self::check_material(key, iv)?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(Error::Decryption(
                "ciphertext length is not a multiple of the block size".to_string(),
            ));
        }
        let cipher = Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| Error::Configuration(format!("invalid key material: {}", e)))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| Error::Decryption("invalid PKCS#7 padding".to_string()))
    }

    /// 以 Base64 导出密钥材料（密钥或 IV）
    pub fn export_material(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    /// 从 Base64 导入密钥并校验长度
    pub fn import_key(encoded: &str) -> Result<Vec<u8>, Error> {
        let bytes = general_purpose::STANDARD.decode(encoded)?;
        if bytes.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "invalid key size: expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// 从 Base64 导入 IV 并校验长度
    pub fn import_iv(encoded: &str) -> Result<Vec<u8>, Error> {
        let bytes = general_purpose::STANDARD.decode(encoded)?;
        if bytes.len() != IV_SIZE {
            return Err(Error::Configuration(format!(
                "invalid IV size: expected {}, got {}",
                IV_SIZE,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn check_material(key: &[u8], iv: &[u8]) -> Result<(), Error> {
        if key.len() != KEY_SIZE {
            return Err(Error::Configuration(format!(
                "invalid key size: expected {}, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        if iv.len() != IV_SIZE {
            return Err(Error::Configuration(format!(
                "invalid IV size: expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        Ok(())
    }
}
