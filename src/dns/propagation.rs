//! 在通知 CA 驗證之前，等待 TXT 記錄在公開解析器上可見。

use std::{
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{get, record_fqdn, send, DnsProvider, Result};
use crate::http::HttpClient;

/// 預設使用的 DNS-over-HTTPS JSON API。
pub const RESOLVER_URL: &str = "https://dns.google/resolve";
/// 預設的等待上限。
pub const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);
/// 預設的查詢間隔。
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<ResolveAnswer>,
}

#[derive(Debug, Deserialize)]
struct ResolveAnswer {
    data: String,
}

/// 包裝另一個 [`DnsProvider`]，建立記錄後透過 DNS-over-HTTPS 確認記錄已傳播。
///
/// 逾時只會記錄警告，驗證仍會繼續進行。
#[derive(Debug)]
pub struct PropagationWaiter<P> {
    inner: P,
    client: Box<dyn HttpClient>,
    resolver_url: String,
    timeout: Duration,
    interval: Duration,
}

impl<P: DnsProvider> PropagationWaiter<P> {
    pub fn new(inner: P, client: Box<dyn HttpClient>) -> Self {
        PropagationWaiter {
            inner,
            client,
            resolver_url: RESOLVER_URL.to_owned(),
            timeout: DEFAULT_PROPAGATION_TIMEOUT,
            interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// 設置解析器的 JSON API URL，預設為 [`RESOLVER_URL`]。
    pub fn resolver_url(mut self, resolver_url: impl Into<String>) -> Self {
        self.resolver_url = resolver_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    /// 檢查解析器是否已回傳預期的 TXT 值。
    fn check_dns_record(&self, record_name: &str, expected: &str) -> Result<bool> {
        let url = format!("{}?name={}&type=TXT", self.resolver_url, record_name);
        let response: ResolveResponse = send(self.client.as_ref(), &get(&url))?.json()?;
        Ok(response
            .answer
            .iter()
            .any(|entry| entry.data.trim_matches('"') == expected))
    }

    fn wait_for(&self, record_name: &str, expected: &str) {
        let started = Instant::now();
        loop {
            match self.check_dns_record(record_name, expected) {
                Ok(true) => {
                    info!(record = record_name, "TXT record propagated");
                    return;
                }
                Ok(false) => debug!(record = record_name, "TXT record not visible yet"),
                Err(e) => debug!(
                    record = record_name,
                    error = &e as &dyn std::error::Error,
                    "resolver query failed"
                ),
            }

            if started.elapsed() >= self.timeout {
                warn!(
                    record = record_name,
                    timeout_secs = self.timeout.as_secs(),
                    "TXT record not visible before timeout, continuing"
                );
                return;
            }
            thread::sleep(self.interval);
        }
    }
}

impl<P: DnsProvider> DnsProvider for PropagationWaiter<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn provision(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        self.inner.provision(zone, domain, value)?;
        if !self.timeout.is_zero() {
            self.wait_for(&record_fqdn(domain), value);
        }
        Ok(())
    }

    fn remove(&self, zone: &str, domain: &str, value: &str) -> Result<()> {
        self.inner.remove(zone, domain, value)
    }
}
