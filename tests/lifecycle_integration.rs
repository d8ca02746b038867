use std::sync::Arc;

use base64::{Engine, engine::general_purpose};
use field_seal::cipher::aes_cbc::{IV_SIZE, KEY_SIZE};
use field_seal::prelude::*;

fn config_with_fallback() -> CipherConfig {
    CipherConfig {
        fallback_key: Some(FieldCipher::export_material(&[3u8; KEY_SIZE])),
        fallback_iv: Some(FieldCipher::export_material(&[4u8; IV_SIZE])),
        ..CipherConfig::default()
    }
}

#[test]
fn test_first_encrypt_provisions_version_one() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    // 没有任何密钥时，首次加密自动生成并激活版本 1
    let sealed = manager.encrypt("secret@example.com", FIELD_ENCRYPTION_PURPOSE).unwrap();
    assert!(sealed.starts_with("1:"));

    let active = store.get_active(FIELD_ENCRYPTION_PURPOSE).unwrap().unwrap();
    assert_eq!(active.version, 1);
    assert!(active.is_active);

    let plaintext = manager.decrypt(&sealed, FIELD_ENCRYPTION_PURPOSE).unwrap();
    assert_eq!(plaintext, "secret@example.com");
}

#[test]
fn test_roundtrip_across_purposes_and_payloads() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    for purpose in ["field-encryption", "api-path"] {
        for plaintext in ["", "a", "带中文的敏感字段", "user@example.com"] {
            let sealed = manager.encrypt(plaintext, purpose).unwrap();
            assert_eq!(manager.decrypt(&sealed, purpose).unwrap(), plaintext);
        }
    }
}

#[test]
fn test_version_pinning_survives_rotation() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    let sealed_v1 = manager.encrypt("pinned value", "p").unwrap();
    assert!(sealed_v1.starts_with("1:"));

    // 轮换到版本 2
    manager.generate_new_key("p", false, None).unwrap();
    assert!(manager.activate_key_version(2, "p").unwrap());

    // 新加密用版本 2，旧密文仍按版本 1 解密
    let sealed_v2 = manager.encrypt("new value", "p").unwrap();
    assert!(sealed_v2.starts_with("2:"));
    assert_eq!(manager.decrypt(&sealed_v1, "p").unwrap(), "pinned value");
    assert_eq!(manager.decrypt(&sealed_v2, "p").unwrap(), "new value");
}

#[test]
fn test_versions_are_monotonic_and_never_reused() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    let v1 = manager.generate_new_key("p", true, None).unwrap();
    let v2 = manager.generate_new_key("p", false, None).unwrap();
    // 激活旧版本后再生成，版本也只会向前走
    assert!(manager.activate_key_version(1, "p").unwrap());
    let v3 = manager.generate_new_key("p", false, None).unwrap();

    assert_eq!((v1.version, v2.version, v3.version), (1, 2, 3));
    assert_eq!(store.highest_version("p").unwrap(), 3);
}

#[test]
fn test_single_active_invariant() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    manager.generate_new_key("p", true, None).unwrap();
    manager.generate_new_key("p", true, None).unwrap();
    manager.generate_new_key("p", false, None).unwrap();
    assert!(manager.activate_key_version(3, "p").unwrap());
    assert!(!manager.activate_key_version(99, "p").unwrap());

    let records = store.list_by_purpose("p", true).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|r| r.is_active).count(), 1);
    assert_eq!(store.get_active("p").unwrap().unwrap().version, 3);
}

#[test]
fn test_concurrent_activation_leaves_one_active() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = Arc::new(KeyLifecycleManager::managed(store.clone(), CipherConfig::default()));

    manager.generate_new_key("p", true, None).unwrap();
    for _ in 0..3 {
        manager.generate_new_key("p", false, None).unwrap();
    }

    // 并发激活不同版本；激活对每个用途串行化
    let handles: Vec<_> = (1..=4u32)
        .flat_map(|version| {
            let manager = Arc::clone(&manager);
            std::iter::repeat_with(move || {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.activate_key_version(version, "p").unwrap())
            })
            .take(2)
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap());
    }

    let records = store.list_by_purpose("p", true).unwrap();
    assert_eq!(records.iter().filter(|r| r.is_active).count(), 1);
}

#[test]
fn test_tampered_envelope_never_decrypts_silently() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    let plaintext = "secret message, do not tamper";
    let sealed = manager.encrypt(plaintext, "p").unwrap();
    let (version_part, data_part) = sealed.split_once(':').unwrap();

    // 翻转密文最后一个字节再重新打包
    let mut ciphertext = general_purpose::STANDARD.decode(data_part).unwrap();
    let len = ciphertext.len();
    ciphertext[len - 1] ^= 0xff;
    let tampered = format!(
        "{}:{}",
        version_part,
        general_purpose::STANDARD.encode(&ciphertext)
    );

    // 篡改绝不能静默返回原文：要么解密/填充失败，要么产出的内容已不同
    match manager.decrypt(&tampered, "p") {
        Err(Error::Decryption(_)) | Err(Error::Format(_)) => {}
        Err(other) => panic!("unexpected error: {}", other),
        Ok(decrypted) => assert_ne!(decrypted, plaintext),
    }

    // 截断则是确定性的解密失败（块长不对齐）
    ciphertext.pop();
    let truncated = format!(
        "{}:{}",
        version_part,
        general_purpose::STANDARD.encode(&ciphertext)
    );
    assert!(matches!(
        manager.decrypt(&truncated, "p"),
        Err(Error::Decryption(_))
    ));
}

#[test]
fn test_key_not_found_is_never_substituted() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    let sealed = manager.encrypt("value", "a").unwrap();

    // 其他用途没有这个版本：绝不跨用途借用密钥
    let result = manager.decrypt(&sealed, "b");
    assert!(matches!(
        result,
        Err(Error::KeyNotFound { version: 1, ref purpose }) if purpose == "b"
    ));

    // 本用途里不存在的版本同样如此
    let result = manager.decrypt("42:aGVsbG8=", "a");
    assert!(matches!(result, Err(Error::KeyNotFound { version: 42, .. })));
}

#[test]
fn test_malformed_base64_is_format_error() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    manager.generate_new_key("p", true, None).unwrap();

    // 版本存在但载荷不是合法 Base64：格式错误而非解密失败
    let result = manager.decrypt("1:@@not-base64@@", "p");
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn test_legacy_unversioned_value_uses_fallback_key() {
    let config = config_with_fallback();
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, config.clone());

    // 用静态回退密钥对直接产出一个"遗留"密文（无版本前缀）
    let key = FieldCipher::import_key(config.fallback_key.as_deref().unwrap()).unwrap();
    let iv = FieldCipher::import_iv(config.fallback_iv.as_deref().unwrap()).unwrap();
    let ciphertext = FieldCipher::encrypt_raw("legacy value".as_bytes(), &key, &iv).unwrap();
    let legacy = general_purpose::STANDARD.encode(&ciphertext);

    assert_eq!(manager.decrypt(&legacy, "p").unwrap(), "legacy value");
}

#[test]
fn test_legacy_value_without_fallback_is_configuration_error() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store, CipherConfig::default());

    let result = manager.decrypt("aGVsbG8gd29ybGQ=", "p");
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_scheduled_rotation_generates_successor_ahead_of_expiry() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    // 激活密钥立即过期，触发阶段一：提前生成未激活的后继
    manager.generate_new_key("p", true, Some(0)).unwrap();
    assert!(manager.perform_scheduled_rotation().unwrap());

    let records = store.list_by_purpose("p", true).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(store.get_active("p").unwrap().unwrap().version, 1);
    assert!(!records.iter().find(|r| r.version == 2).unwrap().is_active);

    // 后继已就位时不会重复生成
    assert!(!manager.perform_scheduled_rotation().unwrap());
    assert_eq!(store.list_by_purpose("p", true).unwrap().len(), 2);
}

#[test]
fn test_scheduled_rotation_promotes_pending_successor() {
    let store = Arc::new(InMemoryKeyStore::new());
    let seeding = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());
    seeding.generate_new_key("p", true, Some(0)).unwrap();
    seeding.generate_new_key("p", false, None).unwrap();

    // rotation_days = 0 把两个阈值都压到零，阶段二立即提升待命后继
    let config = CipherConfig {
        rotation_days: 0,
        ..CipherConfig::default()
    };
    let manager = KeyLifecycleManager::managed(store.clone(), config);
    assert!(manager.perform_scheduled_rotation().unwrap());

    let active = store.get_active("p").unwrap().unwrap();
    assert_eq!(active.version, 2);

    // 被取代的版本 1 永远可查，历史密文仍解得开
    assert!(store.get_by_version("p", 1).unwrap().is_some());
}

#[test]
fn test_expired_key_still_decrypts() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    manager.generate_new_key("p", true, Some(0)).unwrap();
    let sealed = manager.encrypt("still readable", "p").unwrap();

    // 过期只影响轮换资格，不是使用截止线
    let record = store.get_by_version("p", 1).unwrap().unwrap();
    assert!(record.is_expired(chrono::Utc::now() + chrono::Duration::seconds(1)));
    assert_eq!(manager.decrypt(&sealed, "p").unwrap(), "still readable");
}

#[test]
fn test_default_purpose_wrappers() {
    let store = Arc::new(InMemoryKeyStore::new());
    let manager = KeyLifecycleManager::managed(store.clone(), CipherConfig::default());

    let sealed = manager.encrypt_field("hello").unwrap();
    assert_eq!(manager.decrypt_field(&sealed).unwrap(), "hello");
    assert!(
        store
            .get_active(FIELD_ENCRYPTION_PURPOSE)
            .unwrap()
            .is_some()
    );
}

#[test]
fn test_observer_audits_failures_before_caller_sees_them() {
    let store = Arc::new(InMemoryKeyStore::new());
    let sink = Arc::new(MemorySink::new());
    let manager = KeyLifecycleManager::with_observer(
        KeySource::Managed(store),
        CipherConfig::default(),
        OperationObserver::new(sink.clone()),
    );

    let result = manager.decrypt("7:aGVsbG8=", "p");
    assert!(matches!(result, Err(Error::KeyNotFound { .. })));

    let outcomes = sink.outcomes();
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].operation, "decrypt");
    assert_eq!(failed[0].key_version, Some(7));
    assert!(failed[0].error.as_deref().unwrap().contains("Key not found"));
}
