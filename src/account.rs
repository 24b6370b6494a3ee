//! 模塊提供已註冊 ACME 帳戶的載入功能，包括帳戶金鑰與註冊資料（帳戶 URL）。

use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::account_key::{AccountKey, KeyError};

/// 錯誤類型，用於描述載入 ACME 帳戶時可能發生的各類錯誤。
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Failed to load account key")]
    KeyError(#[from] KeyError),
    #[error("Failed to read registration file {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid registration file {path}")]
    Registration {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Registration file {0} has an empty account uri")]
    EmptyUri(String),
}

/// 結果類型，當操作成功返回 `T`，失敗則返回 [`AccountError`].
pub type Result<T> = std::result::Result<T, AccountError>;

/// 註冊檔案的內容，只關心帳戶 URL。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Registration {
    pub uri: String,
}

impl Registration {
    /// 從 JSON 文字解析註冊資料。
    pub fn from_json(path: &str, json: &str) -> Result<Self> {
        let registration: Registration =
            serde_json::from_str(json).map_err(|source| AccountError::Registration {
                path: path.to_owned(),
                source,
            })?;
        if registration.uri.trim().is_empty() {
            return Err(AccountError::EmptyUri(path.to_owned()));
        }
        Ok(registration)
    }
}

/// 表示已註冊的 ACME 帳戶。
///
/// 帳戶建立不在此處理，必須事先完成註冊。
#[derive(Debug)]
pub struct Account {
    /// 帳戶使用的簽名金鑰。
    pub key: AccountKey,
    /// 帳戶 URL，作為 JWS 的 `kid`。
    pub kid: String,
}

impl Account {
    pub fn new(key: AccountKey, kid: impl Into<String>) -> Self {
        Account {
            key,
            kid: kid.into(),
        }
    }

    /// 從金鑰檔與註冊檔載入帳戶。
    ///
    /// # Arguments
    ///
    /// * `key_path` - 帳戶私鑰，JWK 或 PEM 格式。
    /// * `registration_path` - 含有 `uri` 欄位的 JSON 檔。
    ///
    /// # Errors
    ///
    /// 返回 [`AccountError`] 當檔案無法讀取或格式不符時。
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(key_path: P, registration_path: Q) -> Result<Self> {
        let key = AccountKey::from_file(key_path)?;

        let path = registration_path.as_ref().display().to_string();
        let json = fs::read_to_string(registration_path.as_ref()).map_err(|source| {
            AccountError::Io {
                path: path.clone(),
                source,
            }
        })?;
        let registration = Registration::from_json(&path, &json)?;
        debug!(kid = %registration.uri, alg = %key.alg, "account loaded");

        Ok(Account::new(key, registration.uri))
    }
}
