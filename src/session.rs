//! 已驗證身分的 ACME 工作階段：簽名、送出並在 nonce 衝突時重試。

use tracing::{debug, warn};

use crate::{
    account::Account,
    directory::Directory,
    jws::Jws,
    nonce::Nonce,
    payload::{ChallengeValidationPayload, PayloadT},
    transport::{Classified, Response, Transport, TransportError},
};

/// 單一簽名請求最多送出的次數，包含第一次。
pub const MAX_NONCE_ATTEMPTS: usize = 100;

/// 綁定帳戶、目錄與 nonce 來源的工作階段。
#[derive(Debug)]
pub struct Session {
    transport: Transport,
    directory: Directory,
    account: Account,
    nonce: Nonce,
}

impl Session {
    pub fn new(transport: Transport, directory: Directory, account: Account) -> Self {
        let nonce = Nonce::new(directory.new_nonce.clone());
        Session {
            transport,
            directory,
            account,
            nonce,
        }
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// 送出簽名請求。
    ///
    /// 每次嘗試都使用新的 nonce 重新簽名。遇到 `badNonce` 時重試，
    /// 累計 [`MAX_NONCE_ATTEMPTS`] 次後放棄；其他錯誤立即回傳。
    pub fn send_signed<P: PayloadT>(
        &self,
        url: &str,
        payload: Option<&P>,
    ) -> Result<Response, TransportError> {
        let mut last_body = String::new();

        for attempt in 1..=MAX_NONCE_ATTEMPTS {
            let nonce = self.nonce.take(&self.transport)?;
            let jws = Jws::sign(url, payload, &self.account.kid, &nonce, &self.account.key)?;

            match self
                .transport
                .execute(url, Some(jws.to_json()?.into_bytes()))?
            {
                Classified::Success(response) => {
                    self.nonce.harvest(&response);
                    return Ok(response);
                }
                Classified::RetryableNonceConflict(response) => {
                    self.nonce.harvest(&response);
                    debug!(url, attempt, "server rejected nonce, retrying");
                    last_body = response.text();
                }
            }
        }

        warn!(url, attempts = MAX_NONCE_ATTEMPTS, "giving up on bad nonce responses");
        Err(TransportError::NonceRetriesExhausted {
            url: url.to_owned(),
            attempts: MAX_NONCE_ATTEMPTS,
            body: last_body,
        })
    }

    /// 以空載荷送出 POST-as-GET 請求。
    pub fn post_as_get(&self, url: &str) -> Result<Response, TransportError> {
        self.send_signed::<ChallengeValidationPayload>(url, None)
    }
}
