//! Record lookup shell
//!
//! Looks up each identifier given on the command line, or read line by line
//! from stdin, and prints what the host renders.
//!
//! ```bash
//! RECORD_LOOKUP_BASE_URL=http://localhost:8080/records record-lookup 7 150 abc
//! ```

use anyhow::Context;
use clap::Parser;
use record_lookup::{submit, FailureBoundary, HttpRecordSupplier, LookupConfig, OperationHost};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(
    name = "record-lookup",
    version,
    about = "Look up item records by identifier",
    long_about = None
)]
struct Args {
    /// Identifiers to look up; read from stdin, one per line, when omitted
    identifiers: Vec<String>,

    /// Endpoint records are fetched from (overrides RECORD_LOOKUP_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "record_lookup=info,async_lifecycle_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = LookupConfig::from_env().context("invalid configuration")?;
    if let Some(base_url) = args.base_url {
        config = config.with_base_url(base_url);
    }
    tracing::info!(
        base_url = %config.base_url,
        policy = ?config.settlement_policy,
        "Starting record lookup"
    );

    let supplier = HttpRecordSupplier::new(&config).context("failed to build HTTP client")?;
    let mut boundary = FailureBoundary::new(OperationHost::with_config(
        supplier,
        config.runner_config(),
    ));

    if args.identifiers.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
            println!("{}", submit(&mut boundary, &line).await?);
        }
    } else {
        for raw in &args.identifiers {
            println!("{}", submit(&mut boundary, raw).await?);
        }
    }

    boundary
        .host()
        .shutdown()
        .await
        .context("lookup did not settle before shutdown")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_identifiers() {
        let args = Args::try_parse_from(["record-lookup", "7", "150", "abc"]);

        assert!(matches!(
            args,
            Ok(Args { ref identifiers, base_url: None }) if identifiers == &["7", "150", "abc"]
        ));
    }

    #[test]
    fn test_no_identifiers_means_stdin() {
        let args = Args::try_parse_from(["record-lookup", "--base-url", "http://localhost:9000"]);

        assert!(matches!(
            args,
            Ok(Args { ref identifiers, base_url: Some(ref url) })
                if identifiers.is_empty() && url == "http://localhost:9000"
        ));
    }
}
