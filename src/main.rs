//! 以 DNS-01 驗證為 CSR 取得 CA 簽署的證書。

use std::{path::PathBuf, process::ExitCode, time::Duration};

use acme_dns_issuer::{
    account::Account,
    certificate::FileCertificateWriter,
    config::{ConfigError, DnsConfig, IssueConfig},
    csr::CertificateRequest,
    dns::AzureCredentials,
    http::ReqwestClient,
    issuer::{Issuer, DEFAULT_DIRECTORY_URL},
    transport::Transport,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Provider {
    Azure,
    Cloudflare,
}

/// acme-dns-issuer command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Account private key (JWK JSON or PEM)
    #[arg(long, default_value = "private_key.json")]
    private_key: PathBuf,

    /// Account registration record containing the account URL
    #[arg(long, default_value = "regr.json")]
    regr: PathBuf,

    /// DER-encoded certificate signing request
    #[arg(long, default_value = "csr.der")]
    csr: PathBuf,

    /// Where to write the PEM certificate chain
    #[arg(long, default_value = "certificate_chain.pem")]
    out: PathBuf,

    /// ACME directory URL
    #[arg(long, env = "ACME_DIRECTORY_URL", default_value = DEFAULT_DIRECTORY_URL)]
    directory_url: String,

    /// DNS zone that holds the challenge records
    #[arg(long, env = "AZURE_DNS_ZONE")]
    zone: String,

    /// DNS service managing the zone
    #[arg(long, value_enum, default_value = "azure")]
    dns_provider: Provider,

    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: Option<String>,

    #[arg(long, env = "AZURE_DNS_ZONE_RESOURCE_GROUP")]
    resource_group: Option<String>,

    #[arg(long, env = "AZURE_TENANT_ID")]
    tenant_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    cloudflare_api_token: Option<String>,

    /// Seconds to wait for challenge and order status changes
    #[arg(long, default_value_t = 3600)]
    poll_timeout: u64,

    /// Seconds to wait for TXT records to become visible (0 disables the check)
    #[arg(long, default_value_t = 120)]
    propagation_timeout: u64,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn dns_config(&self) -> Result<DnsConfig, ConfigError> {
        fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
            value.clone().ok_or(ConfigError::Missing(name))
        }

        Ok(match self.dns_provider {
            Provider::Azure => DnsConfig::Azure(AzureCredentials {
                subscription_id: required(&self.subscription_id, "AZURE_SUBSCRIPTION_ID")?,
                resource_group: required(&self.resource_group, "AZURE_DNS_ZONE_RESOURCE_GROUP")?,
                tenant_id: required(&self.tenant_id, "AZURE_TENANT_ID")?,
                client_id: required(&self.client_id, "AZURE_CLIENT_ID")?,
                client_secret: required(&self.client_secret, "AZURE_CLIENT_SECRET")?,
            }),
            Provider::Cloudflare => DnsConfig::Cloudflare {
                api_token: required(&self.cloudflare_api_token, "CLOUDFLARE_API_TOKEN")?,
            },
        })
    }

    fn config(&self) -> Result<IssueConfig, ConfigError> {
        IssueConfig::builder(&self.zone, self.dns_config()?)
            .directory_url(&self.directory_url)
            .account_key_path(&self.private_key)
            .registration_path(&self.regr)
            .csr_path(&self.csr)
            .output_path(&self.out)
            .poll_timeout(Duration::from_secs(self.poll_timeout))
            .propagation_timeout(Duration::from_secs(self.propagation_timeout))
            .build()
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(args: &Args) -> Result<()> {
    let config = args.config().context("Invalid configuration")?;

    let account = Account::load(&config.account_key_path, &config.registration_path)
        .context("Failed to load account")?;
    let csr = CertificateRequest::from_file(&config.csr_path).context("Failed to read CSR")?;
    let provider = config
        .dns_provider()
        .context("Failed to set up DNS provider")?;
    let transport = Transport::new(Box::new(
        ReqwestClient::new().context("Failed to create HTTP client")?,
    ));

    let issuance = Issuer::new(
        transport,
        account,
        config.zone.as_str(),
        provider,
        FileCertificateWriter::new(&config.output_path),
    )
    .directory_url(config.directory_url.as_str())
    .poller(config.poller())
    .issue(&csr)
    .context("Certificate issuance failed")?;

    info!(
        order = %issuance.order_url,
        out = %config.output_path.display(),
        "certificate written"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
