use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Duration, Utc};
use openssl::{asn1::Asn1Time, x509::X509};
use thiserror::Error;
use tracing::info;

/// 證書相關操作可能出現的錯誤類型
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Failed to parse certificate")]
    ParseError(#[from] openssl::error::ErrorStack),
    #[error("Failed to access {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Invalid expiration timestamp")]
    InvalidTimestamp,
}

/// 自定義結果型別，錯誤類型為 `CertificateError`
type Result<T> = std::result::Result<T, CertificateError>;

/// 保存下載完成的證書鏈。
pub trait CertificateWriter {
    /// 寫入伺服器回傳的 PEM 文字，不做任何轉換。
    fn write(&self, pem_chain: &[u8]) -> Result<()>;
}

impl<T: CertificateWriter + ?Sized> CertificateWriter for &T {
    fn write(&self, pem_chain: &[u8]) -> Result<()> {
        (**self).write(pem_chain)
    }
}

/// 將證書鏈寫入檔案的 [`CertificateWriter`]。
#[derive(Debug, Clone)]
pub struct FileCertificateWriter {
    path: PathBuf,
}

impl FileCertificateWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        FileCertificateWriter { path: path.into() }
    }
}

impl CertificateWriter for FileCertificateWriter {
    fn write(&self, pem_chain: &[u8]) -> Result<()> {
        fs::write(&self.path, pem_chain).map_err(|source| CertificateError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        info!(path = %self.path.display(), "certificate chain saved");
        Ok(())
    }
}

/// X.509 證書封裝結構，提供基本的證書解析與到期檢查功能
pub struct Certificate {
    /// 內部使用的 X509 證書對象
    pub cert: X509,
}

impl Certificate {
    /// 根據 PEM 格式字串建立 `Certificate` 實例，鏈中只取第一張證書。
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let cert = X509::from_pem(pem)?;
        Ok(Certificate { cert })
    }

    /// 從 PEM 檔案讀取證書。
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pem = fs::read(path.as_ref()).map_err(|source| CertificateError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::from_pem(&pem)
    }

    /// 證書剩餘的有效時間，已過期時為負值。
    pub fn remaining(&self) -> Result<Duration> {
        let now = Asn1Time::from_unix(Utc::now().timestamp())?;
        let diff = now.diff(self.cert.not_after())?;
        let seconds = diff.days as i64 * 86400 + diff.secs as i64;
        Ok(Duration::seconds(seconds))
    }

    /// 證書的 `notAfter` 時間。
    pub fn not_after(&self) -> Result<DateTime<Utc>> {
        Utc::now()
            .checked_add_signed(self.remaining()?)
            .ok_or(CertificateError::InvalidTimestamp)
    }

    /// 判斷證書是否會在 `delta` 之內到期。
    ///
    /// 當 `now + delta` 晚於 `notAfter` 時回傳 `true`。
    pub fn expires_within(&self, delta: Duration) -> Result<bool> {
        Ok(self.remaining()? < delta)
    }
}
