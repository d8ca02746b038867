//! 版本化密文信封编解码
//!
//! 信封是 `"{version}:{Base64 密文}"` 的 ASCII 文本。没有版本前缀的文本
//! 视为遗留的无版本密文，走静态回退密钥路径——这是刻意保留的兼容策略，
//! 不是错误。

/// 解析后的信封
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// `"{version}:{data}"` 形式的版本化密文
    Versioned { version: u32, data: String },
    /// 无版本前缀的遗留密文（原始 Base64）
    Legacy { data: String },
}

impl Envelope {
    /// 解析信封文本
    ///
    /// 匹配 `^(\d+):(.+)$` 语义；不匹配（包括版本号超出 u32 范围）一律
    /// 归入 [`Envelope::Legacy`]。
    pub fn parse(text: &str) -> Self {
        if let Some((head, rest)) = text.split_once(':') {
            if !head.is_empty() && !rest.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(version) = head.parse::<u32>() {
                    return Envelope::Versioned {
                        version,
                        data: rest.to_string(),
                    };
                }
            }
        }
        Envelope::Legacy {
            data: text.to_string(),
        }
    }

    /// 将版本号与 Base64 密文打包为信封文本
    pub fn seal(version: u32, ciphertext_b64: &str) -> String {
        format!("{}:{}", version, ciphertext_b64)
    }
}
