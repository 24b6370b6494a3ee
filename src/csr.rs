use std::{fs, io, path::Path, result};

use thiserror::Error;
use x509_parser::{
    certification_request::X509CertificationRequest,
    extensions::{GeneralName, ParsedExtension},
    prelude::FromDer,
};

/// 讀取 CSR（證書簽名請求）過程中可能發生的錯誤。
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("Failed to read CSR file")]
    Io(#[from] io::Error),
    #[error("Unable to parse CSR: {0}")]
    Parse(String),
    #[error("CSR does not name any domain")]
    NoDomains,
}

/// 為簡化錯誤處理定義 Result 類型
type Result<T> = result::Result<T, CsrError>;

/// DER 編碼的 CSR 與其中請求的域名。
///
/// 域名為 Subject Common Name 與 SAN DNS 名稱的聯集，先 CN 後 SAN，去除重複。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    der: Vec<u8>,
    domains: Vec<String>,
}

impl CertificateRequest {
    /// 從檔案讀取 DER 格式的 CSR。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_der(fs::read(path)?)
    }

    /// 解析 DER 格式的 CSR。
    ///
    /// # 錯誤
    ///
    /// 無法解析時回傳 `CsrError::Parse`；沒有任何域名時回傳 `CsrError::NoDomains`。
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let domains = {
            let (_, csr) = X509CertificationRequest::from_der(&der)
                .map_err(|e| CsrError::Parse(e.to_string()))?;
            requested_domains(&csr)?
        };
        if domains.is_empty() {
            return Err(CsrError::NoDomains);
        }

        Ok(CertificateRequest { der, domains })
    }

    /// 原始 DER 位元組，提交訂單時使用。
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// CSR 要求的域名，皆為小寫：CN 在前，其後依序為 SAN，重複者只保留一次。
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// 返回不屬於 `zone` 的域名，保持原有順序。
    pub fn domains_outside_zone(&self, zone: &str) -> Vec<String> {
        self.domains
            .iter()
            .filter(|domain| !is_within_zone(domain, zone))
            .cloned()
            .collect()
    }
}

fn requested_domains(csr: &X509CertificationRequest<'_>) -> Result<Vec<String>> {
    let mut domains: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let name = name.trim().to_ascii_lowercase();
        if !name.is_empty() && !domains.contains(&name) {
            domains.push(name);
        }
    };

    for cn in csr.certification_request_info.subject.iter_common_name() {
        let value = cn.as_str().map_err(|e| CsrError::Parse(e.to_string()))?;
        push(value);
    }

    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        push(dns);
                    }
                }
            }
        }
    }

    Ok(domains)
}

/// 判斷域名是否位於 `zone` 之下（等於 zone 或為其子域名）。
///
/// 比較時不分大小寫並忽略結尾的點。萬用字元名稱以去除 `*.` 後的名稱判斷。
pub fn is_within_zone(domain: &str, zone: &str) -> bool {
    let domain = normalize(domain);
    let domain = domain.strip_prefix("*.").unwrap_or(domain.as_str());
    let zone = normalize(zone);
    if zone.is_empty() {
        return false;
    }

    domain == zone || domain.ends_with(&format!(".{}", zone))
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
