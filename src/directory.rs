use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transport::{Transport, TransportError};

/// ACME 目錄文件，將邏輯操作名稱對應到端點 URL。
///
/// 於工作階段開始時取得一次，之後不再變動。
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Directory {
    /// 用於取得新的 nonce 值的 API 路徑。
    #[serde(rename = "newNonce")]
    pub new_nonce: String,
    /// 用於建立訂單的 API 路徑。
    #[serde(rename = "newOrder")]
    pub new_order: String,
    /// 目錄附帶的中繼資料，可能不存在。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<DirectoryMeta>,
}

/// 目錄中的 `meta` 物件。
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DirectoryMeta {
    #[serde(rename = "termsOfService", default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl Directory {
    /// 從指定 URL 取得目錄資料。
    ///
    /// # 回傳
    ///
    /// 成功時回傳 `Directory` 實例；請求失敗或缺少必要端點時回傳 `TransportError`。
    pub fn fetch(transport: &Transport, url: &str) -> Result<Self, TransportError> {
        let directory: Directory = transport.request(url, None)?.json()?;
        debug!(
            new_nonce = %directory.new_nonce,
            new_order = %directory.new_order,
            "directory loaded"
        );
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::mock::{self, MockClient};

    #[test]
    fn test_fetch_directory() {
        let client = MockClient::new(|_| {
            mock::json(
                200,
                &[],
                json!({
                    "newNonce": "https://acme.test/new-nonce",
                    "newOrder": "https://acme.test/new-order",
                    "newAccount": "https://acme.test/new-acct",
                    "meta": { "termsOfService": "https://acme.test/tos" }
                }),
            )
        });
        let transport = Transport::new(Box::new(client));

        let directory = Directory::fetch(&transport, "https://acme.test/directory").unwrap();
        assert_eq!(directory.new_nonce, "https://acme.test/new-nonce");
        assert_eq!(directory.new_order, "https://acme.test/new-order");
        assert_eq!(
            directory.meta.unwrap().terms_of_service.as_deref(),
            Some("https://acme.test/tos")
        );
    }

    #[test]
    fn test_directory_missing_endpoint() {
        let client = MockClient::new(|_| {
            mock::json(200, &[], json!({ "newNonce": "https://acme.test/new-nonce" }))
        });
        let transport = Transport::new(Box::new(client));

        assert!(matches!(
            Directory::fetch(&transport, "https://acme.test/directory"),
            Err(TransportError::UnexpectedBody { .. })
        ));
    }
}
