use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use loratail_core::Config;
use loratail_output::{CollectorClient, TransportBuilder, TransportCredentials};
use loratail_pipeline::Pipeline;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// loratail - Ingests received messages from a file, posting results to a collector
#[derive(Parser, Debug)]
#[command(name = "loratail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Starts the ingestor client with the given options
    Client(ClientArgs),
}

#[derive(Args, Debug)]
struct ClientArgs {
    /// File to ingest from
    #[arg(long)]
    file: Option<PathBuf>,

    /// Collector to send ingested messages to, as host:port
    #[arg(long)]
    endpoint: Option<String>,

    /// Path to client certificate
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Path to client key
    #[arg(long)]
    key: Option<PathBuf>,

    /// Path to a trusted CA bundle or a directory of trusted CAs
    #[arg(long)]
    trusted_cas: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frame output format: pretty or json (overrides config)
    #[arg(short, long)]
    format: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl ClientArgs {
    /// Load the config file, if any, and apply command-line overrides
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(ref file) = self.file {
            config.ingestion.file = Some(file.clone());
        }
        if let Some(ref endpoint) = self.endpoint {
            config.collector.endpoint = endpoint.clone();
        }
        if let Some(ref cert) = self.cert {
            config.collector.tls.cert = Some(cert.clone());
        }
        if let Some(ref key) = self.key {
            config.collector.tls.key = Some(key.clone());
        }
        if let Some(ref cas) = self.trusted_cas {
            config.collector.tls.trusted_cas = Some(cas.clone());
        }
        if let Some(ref format) = self.format {
            config.output.stdout.format = format.clone();
        }
        if self.verbose {
            config.general.log_level = "debug".to_string();
        }

        Ok(config)
    }
}

fn init_tracing(config: &Config) {
    let level = config
        .general
        .log_level
        .parse::<Level>()
        .unwrap_or(Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_client(config: Config) -> Result<()> {
    let file = config
        .ingestion
        .file
        .clone()
        .ok_or_else(|| anyhow!("no file to ingest: pass --file or set ingestion.file"))?;

    info!(
        instance = %config.general.instance_name,
        file = %file.display(),
        endpoint = %config.collector.endpoint,
        "Starting loratail"
    );

    let credentials = TransportCredentials::from_config(&config.collector.tls);
    let tls = &config.collector.tls;
    if credentials.is_none() && (tls.cert.is_some() || tls.key.is_some() || tls.trusted_cas.is_some()) {
        warn!("Incomplete TLS configuration (need cert, key and trusted CAs), starting insecure client");
    }

    let transport = TransportBuilder::new(&file, config.collector.endpoint.clone())
        .timeout(Duration::from_secs(config.collector.timeout_seconds))
        .credentials(credentials)
        .build()
        .context("failed to create ingestor client")?;
    info!(secure = transport.is_secure(), "Transport ready");

    let collector = CollectorClient::new(transport.client().clone(), transport.endpoint());

    collector
        .ping()
        .await
        .context("failed to ping api server")?;
    collector
        .register_node()
        .await
        .context("failed to create new node entry in api server")?;

    let poll_interval = Duration::from_millis(config.ingestion.poll_interval_ms);
    let report = Pipeline::from_config(&config, collector)
        .run_file(file, poll_interval)
        .await
        .context("client failed")?;

    info!(
        frames = report.frames,
        faults = report.faults,
        delivery_failures = report.delivery_failures,
        "Ingestion finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Client(args) => {
            let config = args.resolve_config()?;

            // Handle --print-config
            if args.print_config {
                println!("{}", config.to_toml()?);
                return Ok(());
            }

            init_tracing(&config);
            run_client(config).await
        }
    }
}
