use std::cell::RefCell;

use tracing::trace;

use crate::transport::{Response, Transport, TransportError, REPLAY_NONCE};

/// 一次性 nonce 的來源。
///
/// 優先使用上一個回應附帶的 `Replay-Nonce`，沒有時才向 `newNonce` 端點索取。
/// 每個 nonce 只會被取出一次。
#[derive(Debug)]
pub struct Nonce {
    url: String,
    harvested: RefCell<Option<String>>,
}

impl Nonce {
    /// 建立一個新的 `Nonce` 實例。
    ///
    /// # 參數
    ///
    /// * `url` - 目錄中的 `newNonce` 端點。
    pub fn new(url: impl Into<String>) -> Self {
        Nonce {
            url: url.into(),
            harvested: RefCell::new(None),
        }
    }

    /// 取出一個尚未使用過的 nonce。
    pub fn take(&self, transport: &Transport) -> Result<String, TransportError> {
        if let Some(nonce) = self.harvested.borrow_mut().take() {
            trace!("reusing harvested nonce");
            return Ok(nonce);
        }

        let response = transport.request(&self.url, None)?;
        Ok(response.require_header(REPLAY_NONCE)?.to_owned())
    }

    /// 保存回應中的 `Replay-Nonce`，供下一個請求使用。
    pub fn harvest(&self, response: &Response) {
        if let Some(nonce) = response.header(REPLAY_NONCE) {
            *self.harvested.borrow_mut() = Some(nonce.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http::mock::{self, MockClient};

    #[test]
    fn test_fetches_fresh_nonce_each_time() {
        let counter = AtomicUsize::new(0);
        let client = MockClient::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst).to_string();
            mock::response(200, &[(REPLAY_NONCE, n.as_str())], b"")
        });
        let transport = Transport::new(Box::new(client.clone()));
        let nonce = Nonce::new("https://acme.test/new-nonce");

        assert_eq!(nonce.take(&transport).unwrap(), "0");
        assert_eq!(nonce.take(&transport).unwrap(), "1");
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn test_harvested_nonce_is_used_once() {
        let client = MockClient::new(|request| {
            if request.url.ends_with("/new-nonce") {
                mock::response(204, &[(REPLAY_NONCE, "fetched")], b"")
            } else {
                mock::response(200, &[(REPLAY_NONCE, "harvested")], b"")
            }
        });
        let transport = Transport::new(Box::new(client.clone()));
        let nonce = Nonce::new("https://acme.test/new-nonce");

        let previous = transport.request("https://acme.test/x", None).unwrap();
        nonce.harvest(&previous);

        assert_eq!(nonce.take(&transport).unwrap(), "harvested");
        assert_eq!(nonce.take(&transport).unwrap(), "fetched");
        assert_eq!(client.requests_to("https://acme.test/new-nonce").len(), 1);
    }

    #[test]
    fn test_response_without_nonce_keeps_cache_empty() {
        let client = MockClient::new(|request| {
            if request.url.ends_with("/new-nonce") {
                mock::response(204, &[(REPLAY_NONCE, "fetched")], b"")
            } else {
                mock::response(200, &[], b"")
            }
        });
        let transport = Transport::new(Box::new(client));
        let nonce = Nonce::new("https://acme.test/new-nonce");

        nonce.harvest(&transport.request("https://acme.test/x", None).unwrap());
        assert_eq!(nonce.take(&transport).unwrap(), "fetched");
    }

    #[test]
    fn test_debug_shows_cached_nonce() {
        let client = MockClient::new(|_| mock::response(200, &[(REPLAY_NONCE, "cached")], b""));
        let transport = Transport::new(Box::new(client));
        let nonce = Nonce::new("https://acme.test/new-nonce");

        nonce.harvest(&transport.request("https://acme.test/x", None).unwrap());
        let rendered = format!("{:?}", nonce);
        assert!(rendered.contains("https://acme.test/new-nonce"));
        assert!(rendered.contains("cached"));

        nonce.take(&transport).unwrap();
        assert!(format!("{:?}", nonce).contains("None"));
    }

    #[test]
    fn test_missing_nonce_header() {
        let client = MockClient::new(|_| mock::response(200, &[], b""));
        let transport = Transport::new(Box::new(client));
        let nonce = Nonce::new("https://acme.test/new-nonce");

        assert!(matches!(
            nonce.take(&transport),
            Err(TransportError::MissingHeader { header: REPLAY_NONCE, .. })
        ));
    }
}
