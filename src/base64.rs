use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

/// 錯誤類型，用於描述 Base64 URL 解碼過程中的各種錯誤情形。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// 當遇到無效字符時返回此錯誤，包含該無效字符的 ASCII 值。
    #[error("Invalid character: {0}")]
    InvalidCharacter(u8),

    /// 輸入中出現填充符號 `=`，JOSE 格式不允許填充。
    #[error("Invalid padding")]
    InvalidPadding,

    /// 字串長度不可能由任何位元組序列編碼而來（長度模 4 餘 1）。
    #[error("Invalid length")]
    InvalidLength,
}

/// 以 JOSE 規範（RFC 7515 §2）編碼的 Base64 URL 資料，不含 `=` 填充。
///
/// # 示例
///
/// ```
/// # use acme_dns_issuer::base64::Base64;
/// let b64 = Base64::new("Hello, World!");
/// assert_eq!(b64.as_str(), "SGVsbG8sIFdvcmxkIQ");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64 {
    encoded: String,
}

impl Base64 {
    /// 將任意位元組資料編碼為 Base64 URL 字串。
    pub fn new<T: AsRef<[u8]>>(input: T) -> Self {
        Self {
            encoded: URL_SAFE_NO_PAD.encode(input.as_ref()),
        }
    }

    /// 根據已編碼的 Base64 URL 字串建立實例，並檢查字元集與長度。
    ///
    /// # 錯誤
    ///
    /// 可能返回 [`DecodeError::InvalidLength`], [`DecodeError::InvalidCharacter`] 或
    /// [`DecodeError::InvalidPadding`] 之一。
    pub fn from_url(url_encoded: &str) -> Result<Self, DecodeError> {
        validate_base64_url(url_encoded)?;
        Ok(Self {
            encoded: url_encoded.to_owned(),
        })
    }

    /// 將資料解碼回原始位元組。
    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        URL_SAFE_NO_PAD
            .decode(&self.encoded)
            .map_err(|_| DecodeError::InvalidLength)
    }

    /// 返回編碼後的字串，用於 JWS 欄位與 ACME 載荷。
    pub fn base64_url(&self) -> String {
        self.encoded.clone()
    }

    /// 返回內部字串的引用。
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl std::fmt::Display for Base64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

/// 驗證字串是否為合法的無填充 Base64 URL 編碼。
fn validate_base64_url(s: &str) -> Result<(), DecodeError> {
    for &c in s.as_bytes() {
        if c == b'=' {
            return Err(DecodeError::InvalidPadding);
        }
        if !is_valid_base64_url_char(c) {
            return Err(DecodeError::InvalidCharacter(c));
        }
    }

    if s.len() % 4 == 1 {
        return Err(DecodeError::InvalidLength);
    }

    Ok(())
}

fn is_valid_base64_url_char(c: u8) -> bool {
    matches!(c, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_')
}
