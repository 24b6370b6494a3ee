//! 訂單協調流程：從建立訂單、完成每個域名的 DNS-01 驗證，到下載並保存證書。
//!
//! 流程依序處理伺服器列出的授權，任何錯誤都會中止整個流程。已建立的 TXT 記錄
//! 一律會嘗試清除，清除失敗只記錄警告，不影響結果。

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    account::Account,
    certificate::{CertificateError, CertificateWriter},
    challenge::{key_authorization_digest, Authorization, AuthorizationStatus},
    csr::CertificateRequest,
    directory::Directory,
    dns::{DnsError, DnsProvider},
    order::{Order, OrderStatus},
    payload::{ChallengeValidationPayload, FinalizeOrderPayload, NewOrderPayload},
    poll::{PollTimeout, Poller},
    session::Session,
    transport::{Transport, TransportError},
};

/// 預設的 ACME 目錄 URL。
pub const DEFAULT_DIRECTORY_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";

const LOCATION: &str = "Location";

/// 協調流程的狀態。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceState {
    Init,
    DirectoryLoaded,
    OrderCreated,
    Authorizing(String),
    AllAuthorizationsValid,
    Finalized,
    OrderValid,
    CertificateDownloaded,
    Cleaned,
    Failed,
}

impl fmt::Display for IssuanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::DirectoryLoaded => f.write_str("directory loaded"),
            Self::OrderCreated => f.write_str("order created"),
            Self::Authorizing(domain) => write!(f, "authorizing {}", domain),
            Self::AllAuthorizationsValid => f.write_str("all authorizations valid"),
            Self::Finalized => f.write_str("finalized"),
            Self::OrderValid => f.write_str("order valid"),
            Self::CertificateDownloaded => f.write_str("certificate downloaded"),
            Self::Cleaned => f.write_str("cleaned"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// 發生錯誤時所在的步驟。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Directory,
    NewOrder,
    Authorization,
    Challenge,
    Finalize,
    OrderStatus,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directory => "getting directory",
            Self::NewOrder => "creating new order",
            Self::Authorization => "checking authorization",
            Self::Challenge => "submitting challenge",
            Self::Finalize => "finalizing order",
            Self::OrderStatus => "checking order status",
            Self::Download => "downloading certificate",
        })
    }
}

fn describe(stage: &Stage, domain: &Option<String>) -> String {
    match domain {
        Some(domain) => format!("{} for {}", stage, domain),
        None => stage.to_string(),
    }
}

/// 簽發流程的錯誤。
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Domains do not belong to {zone} DNS zone: {}", .domains.join(", "))]
    ZoneMismatch { zone: String, domains: Vec<String> },
    #[error("Error {}", describe(.stage, .domain))]
    Transport {
        stage: Stage,
        domain: Option<String>,
        #[source]
        source: TransportError,
    },
    #[error("Timed out {}", describe(.stage, .domain))]
    Timeout {
        stage: Stage,
        domain: Option<String>,
        #[source]
        source: PollTimeout,
    },
    #[error("No dns-01 challenge offered for {domain}")]
    NoSuitableChallenge { domain: String },
    #[error("DNS provider failed for {domain}")]
    Dns {
        domain: String,
        #[source]
        source: DnsError,
    },
    #[error("Challenge did not pass for {domain}: {details}")]
    ChallengeValidation { domain: String, details: String },
    #[error("Order failed with status {status}: {details}")]
    OrderFailed { status: OrderStatus, details: String },
    #[error("Order is valid but has no certificate URL")]
    MissingCertificateUrl,
    #[error("Failed to save certificate")]
    Certificate(#[from] CertificateError),
}

type Result<T> = std::result::Result<T, IssueError>;

/// 輪詢期間可能發生的錯誤，稍後再補上步驟資訊。
#[derive(Debug)]
enum PollError {
    Transport(TransportError),
    Timeout(PollTimeout),
}

impl From<TransportError> for PollError {
    fn from(e: TransportError) -> Self {
        PollError::Transport(e)
    }
}

impl From<PollTimeout> for PollError {
    fn from(e: PollTimeout) -> Self {
        PollError::Timeout(e)
    }
}

fn transport_at(stage: Stage, domain: Option<&str>) -> impl FnOnce(TransportError) -> IssueError {
    let domain = domain.map(str::to_owned);
    move |source| IssueError::Transport {
        stage,
        domain,
        source,
    }
}

fn poll_at(stage: Stage, domain: Option<&str>) -> impl FnOnce(PollError) -> IssueError {
    let domain = domain.map(str::to_owned);
    move |e| match e {
        PollError::Transport(source) => IssueError::Transport {
            stage,
            domain,
            source,
        },
        PollError::Timeout(source) => IssueError::Timeout {
            stage,
            domain,
            source,
        },
    }
}

/// 已建立的 TXT 記錄，清除時使用相同的值。
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProvisionedRecord {
    domain: String,
    value: String,
}

/// 一次成功簽發的摘要。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    /// 訂單 URL
    pub order_url: String,
    /// 證書涵蓋的域名
    pub domains: Vec<String>,
    /// 清除失敗的域名
    pub cleanup_failures: Vec<String>,
}

/// 執行一次簽發的協調器。
#[derive(Debug)]
pub struct Issuer<P, W> {
    transport: Transport,
    account: Account,
    directory_url: String,
    zone: String,
    provider: P,
    writer: W,
    poller: Poller,
}

impl<P: DnsProvider, W: CertificateWriter> Issuer<P, W> {
    pub fn new(
        transport: Transport,
        account: Account,
        zone: impl Into<String>,
        provider: P,
        writer: W,
    ) -> Self {
        Issuer {
            transport,
            account,
            directory_url: DEFAULT_DIRECTORY_URL.to_owned(),
            zone: zone.into(),
            provider,
            writer,
            poller: Poller::default(),
        }
    }

    /// 設置 ACME 目錄 URL。
    pub fn directory_url(mut self, directory_url: impl Into<String>) -> Self {
        self.directory_url = directory_url.into();
        self
    }

    /// 設置授權與訂單的輪詢參數。
    pub fn poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// 為 `csr` 簽發證書並交給證書寫入器。
    ///
    /// 任何域名不在 zone 之內時，在任何網路請求之前回傳 [`IssueError::ZoneMismatch`]。
    pub fn issue(self, csr: &CertificateRequest) -> Result<Issuance> {
        let outside = csr.domains_outside_zone(&self.zone);
        if !outside.is_empty() {
            return Err(IssueError::ZoneMismatch {
                zone: self.zone,
                domains: outside,
            });
        }
        info!(domains = %csr.domains().join(", "), zone = %self.zone, "domains to validate");

        let Issuer {
            transport,
            account,
            directory_url,
            zone,
            provider,
            writer,
            poller,
        } = self;
        let mut run = Run {
            zone: &zone,
            provider: &provider,
            writer: &writer,
            poller,
            state: IssuanceState::Init,
            provisioned: Vec::new(),
        };

        let result = run.execute(transport, account, &directory_url, csr);
        let cleanup_failures = run.cleanup();

        match result {
            Ok(order_url) => {
                run.transition(IssuanceState::Cleaned);
                Ok(Issuance {
                    order_url,
                    domains: csr.domains().to_vec(),
                    cleanup_failures,
                })
            }
            Err(e) => {
                error!(
                    state = %run.state,
                    error = &e as &dyn std::error::Error,
                    "issuance failed"
                );
                run.transition(IssuanceState::Failed);
                Err(e)
            }
        }
    }
}

/// 單次簽發的可變狀態。
struct Run<'a, P, W> {
    zone: &'a str,
    provider: &'a P,
    writer: &'a W,
    poller: Poller,
    state: IssuanceState,
    provisioned: Vec<ProvisionedRecord>,
}

impl<P: DnsProvider, W: CertificateWriter> Run<'_, P, W> {
    fn transition(&mut self, next: IssuanceState) {
        info!(from = %self.state, to = %next, "issuance state changed");
        self.state = next;
    }

    /// 主要流程，成功時回傳訂單 URL。
    fn execute(
        &mut self,
        transport: Transport,
        account: Account,
        directory_url: &str,
        csr: &CertificateRequest,
    ) -> Result<String> {
        let directory = Directory::fetch(&transport, directory_url)
            .map_err(transport_at(Stage::Directory, None))?;
        let session = Session::new(transport, directory, account);
        self.transition(IssuanceState::DirectoryLoaded);

        let response = session
            .send_signed(
                &session.directory().new_order,
                Some(&NewOrderPayload::new(csr.domains())),
            )
            .map_err(transport_at(Stage::NewOrder, None))?;
        let order_url = response
            .require_header(LOCATION)
            .map_err(transport_at(Stage::NewOrder, None))?
            .to_owned();
        let order: Order = response
            .json()
            .map_err(transport_at(Stage::NewOrder, None))?;
        info!(order = %order_url, authorizations = order.authorizations.len(), "order created");
        self.transition(IssuanceState::OrderCreated);

        for authorization_url in &order.authorizations {
            self.authorize(&session, authorization_url)?;
        }
        self.transition(IssuanceState::AllAuthorizationsValid);

        session
            .send_signed(&order.finalize, Some(&FinalizeOrderPayload::new(csr.der())))
            .map_err(transport_at(Stage::Finalize, None))?;
        self.transition(IssuanceState::Finalized);

        let order: Order = self
            .poller
            .poll_until(
                || -> std::result::Result<Order, PollError> {
                    Ok(session.post_as_get(&order_url)?.json()?)
                },
                &[OrderStatus::Pending, OrderStatus::Processing],
            )
            .map_err(poll_at(Stage::OrderStatus, None))?;
        if order.status != OrderStatus::Valid {
            return Err(IssueError::OrderFailed {
                status: order.status,
                details: order.failure_details(),
            });
        }
        self.transition(IssuanceState::OrderValid);

        let certificate_url = order
            .certificate
            .as_deref()
            .ok_or(IssueError::MissingCertificateUrl)?;
        let certificate = session
            .post_as_get(certificate_url)
            .map_err(transport_at(Stage::Download, None))?;
        info!("certificate signed");
        self.writer.write(&certificate.raw)?;
        self.transition(IssuanceState::CertificateDownloaded);

        Ok(order_url)
    }

    /// 完成單一授權的 DNS-01 驗證。
    fn authorize(&mut self, session: &Session, authorization_url: &str) -> Result<()> {
        let authorization: Authorization = session
            .post_as_get(authorization_url)
            .and_then(|response| response.json())
            .map_err(transport_at(Stage::Authorization, None))?;
        let domain = authorization.domain().to_owned();
        self.transition(IssuanceState::Authorizing(domain.clone()));

        if authorization.status == AuthorizationStatus::Valid {
            info!(domain = %domain, "authorization already valid");
            return Ok(());
        }

        let challenge = authorization
            .find_dns01()
            .ok_or_else(|| IssueError::NoSuitableChallenge {
                domain: domain.clone(),
            })?;
        let token = challenge.sanitized_token();
        let value = key_authorization_digest(&token, session.account().key.thumbprint());
        info!(domain = %domain, value = %value, "TXT record on _acme-challenge must be set");

        self.provider
            .provision(self.zone, &domain, &value)
            .map_err(|source| IssueError::Dns {
                domain: domain.clone(),
                source,
            })?;
        self.provisioned.push(ProvisionedRecord {
            domain: domain.clone(),
            value,
        });

        session
            .send_signed(&challenge.url, Some(&ChallengeValidationPayload::new()))
            .map_err(transport_at(Stage::Challenge, Some(&domain)))?;

        let authorization: Authorization = self
            .poller
            .poll_until(
                || -> std::result::Result<Authorization, PollError> {
                    Ok(session.post_as_get(authorization_url)?.json()?)
                },
                &[AuthorizationStatus::Pending],
            )
            .map_err(poll_at(Stage::Authorization, Some(&domain)))?;
        if authorization.status != AuthorizationStatus::Valid {
            return Err(IssueError::ChallengeValidation {
                details: authorization.failure_details(),
                domain,
            });
        }

        info!(domain = %domain, "domain verified");
        Ok(())
    }

    /// 移除所有已建立的記錄，回傳清除失敗的域名。
    fn cleanup(&mut self) -> Vec<String> {
        let mut failures = Vec::new();
        for record in self.provisioned.drain(..) {
            match self.provider.remove(self.zone, &record.domain, &record.value) {
                Ok(()) => debug!(domain = %record.domain, "TXT record removed"),
                Err(e) => {
                    warn!(
                        domain = %record.domain,
                        error = &e as &dyn std::error::Error,
                        "failed to clean up TXT record, skipping"
                    );
                    failures.push(record.domain);
                }
            }
        }
        failures
    }
}
