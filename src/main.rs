use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use r2p::checkpoint::FileCheckpointStore;
use r2p::config::{Cli, Config, default_config_path};
use r2p::filter::ArticleFilter;
use r2p::http::{HttpTransport, ReqwestTransport};
use r2p::metrics::WebhookReporter;
use r2p::pinboard::PinboardClient;
use r2p::reader::ReaderClient;
use r2p::sync::Syncer;
use tracing_subscriber::EnvFilter;

const EXIT_ABORTED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.pretty {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }

    let config_path = args
        .config_path
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(default_config_path);
    tracing::info!(config = %config_path.display(), "r2p starting");

    let cfg = match Config::new(&config_path.to_string_lossy()) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, path = ?config_path, "failed to load config file");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let transport: Arc<dyn HttpTransport> =
        match ReqwestTransport::with_timeout(cfg.sync.request_timeout()) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                tracing::error!(error = %e, "failed to build http client");
                return ExitCode::from(EXIT_CONFIG);
            }
        };

    let syncer = Syncer::new(
        Arc::new(ReaderClient::new(
            transport.clone(),
            &cfg.reader.base_url,
            &cfg.reader.token,
            cfg.sync.max_pages,
        )),
        Arc::new(PinboardClient::new(
            transport.clone(),
            &cfg.pinboard.base_url,
            &cfg.pinboard.auth_token,
        )),
        Arc::new(WebhookReporter::new(
            transport,
            &cfg.metrics.webhook_url,
            &cfg.metrics.field,
        )),
        Arc::new(FileCheckpointStore::new(cfg.state.get_path())),
        ArticleFilter::new(cfg.sync.no_archive_tag.as_str()),
        cfg.sync.options(args.dry_run),
    );

    match syncer.run().await {
        Ok(report) => {
            for (title, reason) in &report.skipped {
                println!("skipped  {title:?}: {reason}");
            }
            for (title, message) in &report.rejected {
                println!("rejected {title:?}: {message}");
            }
            println!(
                "read {} documents, archived {}",
                report.read_count, report.archived_count
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(phase = %e.phase(), error = %e, "sync run aborted");
            eprintln!("aborted: {e}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}
