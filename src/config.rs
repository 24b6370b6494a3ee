//! 簽發設定，包含輸入輸出路徑、DNS 服務與輪詢參數。

use std::{fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    dns::{
        propagation::DEFAULT_PROPAGATION_TIMEOUT, AzureCredentials, AzureDns, CloudflareDns,
        DnsProvider, PropagationWaiter,
    },
    http::{HttpClient, HttpError, ReqwestClient},
    issuer::DEFAULT_DIRECTORY_URL,
    poll::{Poller, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT},
};

pub const DEFAULT_ACCOUNT_KEY_PATH: &str = "private_key.json";
pub const DEFAULT_REGISTRATION_PATH: &str = "regr.json";
pub const DEFAULT_CSR_PATH: &str = "csr.der";
pub const DEFAULT_OUTPUT_PATH: &str = "certificate_chain.pem";

/// 設定錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DNS zone must not be empty")]
    EmptyZone,
    #[error("Directory URL must use HTTPS: {0}")]
    InsecureDirectoryUrl(String),
    #[error("Missing setting: {0}")]
    Missing(&'static str),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// 管理驗證記錄的 DNS 服務。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum DnsConfig {
    Azure(AzureCredentials),
    Cloudflare { api_token: String },
}

impl fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure(credentials) => f.debug_tuple("Azure").field(credentials).finish(),
            Self::Cloudflare { .. } => f
                .debug_struct("Cloudflare")
                .field("api_token", &"***")
                .finish(),
        }
    }
}

impl DnsConfig {
    /// 以指定的 HTTP 客戶端建立對應的 DNS 服務。
    pub fn provider(&self, client: Box<dyn HttpClient>) -> Box<dyn DnsProvider> {
        match self {
            Self::Azure(credentials) => Box::new(AzureDns::new(client, credentials.clone())),
            Self::Cloudflare { api_token } => Box::new(CloudflareDns::new(client, api_token)),
        }
    }
}

/// 一次簽發所需的完整設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueConfig {
    pub directory_url: String,
    pub account_key_path: PathBuf,
    pub registration_path: PathBuf,
    pub csr_path: PathBuf,
    pub output_path: PathBuf,
    /// 權威 DNS zone，所有域名都必須位於其下
    pub zone: String,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    /// 為零時不等待 DNS 傳播
    pub propagation_timeout: Duration,
    pub dns: DnsConfig,
}

impl IssueConfig {
    pub fn builder(zone: &str, dns: DnsConfig) -> IssueConfigBuilder {
        IssueConfigBuilder::new(zone, dns)
    }

    /// 檢查 zone 與目錄 URL。
    pub fn validate(&self) -> Result<()> {
        if self.zone.trim().trim_end_matches('.').is_empty() {
            return Err(ConfigError::EmptyZone);
        }
        if !self.directory_url.starts_with("https://") {
            return Err(ConfigError::InsecureDirectoryUrl(self.directory_url.clone()));
        }
        Ok(())
    }

    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_timeout, self.poll_interval)
    }

    /// 建立 DNS 服務；設定了傳播等待時，外層包上 [`PropagationWaiter`]。
    pub fn dns_provider(&self) -> std::result::Result<Box<dyn DnsProvider>, HttpError> {
        let provider = self.dns.provider(Box::new(ReqwestClient::new()?));
        if self.propagation_timeout.is_zero() {
            return Ok(provider);
        }
        Ok(Box::new(
            PropagationWaiter::new(provider, Box::new(ReqwestClient::new()?))
                .timeout(self.propagation_timeout),
        ))
    }
}

/// [`IssueConfig`] 的構造器，未設定的欄位使用預設值。
#[derive(Debug, Clone)]
pub struct IssueConfigBuilder {
    config: IssueConfig,
}

impl IssueConfigBuilder {
    /// 預設值：
    /// - 目錄 URL：Let's Encrypt 正式環境
    /// - 輸入檔案：`private_key.json`、`regr.json`、`csr.der`
    /// - 輸出檔案：`certificate_chain.pem`
    /// - 輪詢：逾時 3600 秒、間隔 2 秒
    /// - DNS 傳播等待：120 秒
    pub fn new(zone: &str, dns: DnsConfig) -> Self {
        IssueConfigBuilder {
            config: IssueConfig {
                directory_url: DEFAULT_DIRECTORY_URL.to_owned(),
                account_key_path: PathBuf::from(DEFAULT_ACCOUNT_KEY_PATH),
                registration_path: PathBuf::from(DEFAULT_REGISTRATION_PATH),
                csr_path: PathBuf::from(DEFAULT_CSR_PATH),
                output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
                zone: zone.to_owned(),
                poll_timeout: DEFAULT_POLL_TIMEOUT,
                poll_interval: DEFAULT_POLL_INTERVAL,
                propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
                dns,
            },
        }
    }

    pub fn directory_url(mut self, directory_url: &str) -> Self {
        self.config.directory_url = directory_url.to_owned();
        self
    }

    pub fn account_key_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.account_key_path = path.into();
        self
    }

    pub fn registration_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.registration_path = path.into();
        self
    }

    pub fn csr_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.csr_path = path.into();
        self
    }

    pub fn output_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn propagation_timeout(mut self, timeout: Duration) -> Self {
        self.config.propagation_timeout = timeout;
        self
    }

    /// 建立並檢查設定。
    ///
    /// # Errors
    ///
    /// 設定無效時返回 [`ConfigError`]。
    pub fn build(self) -> Result<IssueConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
