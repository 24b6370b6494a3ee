//! 檢查證書是否即將到期：未到期時結束碼為 0，即將到期或無法讀取時為 1。

use std::{path::PathBuf, process::ExitCode};

use acme_dns_issuer::certificate::Certificate;
use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// check-cert-expiry command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// PEM certificate to inspect
    #[arg(long, default_value = "certificate_chain.pem")]
    certificate: PathBuf,

    /// Report the certificate as expiring if it expires within this many seconds
    #[arg(long, default_value_t = 720)]
    delta: i64,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

/// 將 `--delta` 秒數轉為 [`Duration`]，超出範圍時回傳錯誤而非 panic。
fn delta(seconds: i64) -> Result<Duration> {
    Duration::try_seconds(seconds).with_context(|| format!("--delta {} is out of range", seconds))
}

fn expiring(args: &Args) -> Result<bool> {
    let window = delta(args.delta)?;
    let certificate = Certificate::from_file(&args.certificate)
        .with_context(|| format!("Failed to read {}", args.certificate.display()))?;
    let not_after = certificate.not_after()?;
    let expiring = certificate.expires_within(window)?;
    info!(
        certificate = %args.certificate.display(),
        not_after = %not_after.to_rfc3339(),
        expiring,
        "certificate checked"
    );
    Ok(expiring)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default = if args.quiet { "error" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match expiring(&args) {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
