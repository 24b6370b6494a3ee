//! # ACME DNS-01 Certificate Issuer
//!
//! 本庫實作 ACME v2 協議中取得證書所需的部分：以既有帳戶簽署請求、建立訂單、
//! 透過 DNS-01 挑戰驗證每個域名、提交 CSR，最後下載 CA 簽署的證書鏈。
//!
//! ## 模組
//!
//! - **account_key** / **jwk** / **signature**: 載入帳戶私鑰（JWK 或 PEM），計算 RFC 7638 thumbprint，
//!   產生 RS256 或 ES256 簽章。
//! - **protection** / **payload** / **jws**: 組合 flattened JWS 請求。
//! - **transport** / **nonce** / **session**: HTTPS 傳輸、`Replay-Nonce` 管理，以及遇到
//!   `badNonce` 時有上限的重送。
//! - **issuer**: 訂單流程的狀態機與清除策略。
//! - **dns**: [`dns::DnsProvider`] 接口與 Azure DNS、Cloudflare 的實作。
//! - **csr** / **certificate** / **config**: 輸入、輸出與設定。
//!
//! ## 示例
//!
//! ```no_run
//! use acme_dns_issuer::{
//!     account::Account,
//!     certificate::FileCertificateWriter,
//!     csr::CertificateRequest,
//!     dns::CloudflareDns,
//!     http::ReqwestClient,
//!     issuer::Issuer,
//!     transport::Transport,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let account = Account::load("private_key.json", "regr.json")?;
//!     let csr = CertificateRequest::from_file("csr.der")?;
//!     let dns = CloudflareDns::new(Box::new(ReqwestClient::new()?), "api-token");
//!
//!     let issuance = Issuer::new(
//!         Transport::new(Box::new(ReqwestClient::new()?)),
//!         account,
//!         "example.com",
//!         dns,
//!         FileCertificateWriter::new("certificate_chain.pem"),
//!     )
//!     .issue(&csr)?;
//!
//!     println!("order: {}", issuance.order_url);
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod account_key;
pub mod base64;
pub mod certificate;
pub mod challenge;
pub mod config;
pub mod csr;
pub mod directory;
pub mod dns;
pub mod http;
pub mod issuer;
pub mod jwk;
pub mod jws;
pub mod nonce;
pub mod order;
pub mod payload;
pub mod poll;
pub mod protection;
pub mod session;
pub mod signature;
pub mod transport;
