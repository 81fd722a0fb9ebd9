//! relay-server CLI — standalone transcription relay front-end.
//!
//! ```text
//! relay-server serve [--port 7800] [--host 0.0.0.0] [--target-langs fr-CA,es-MX]
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use relay_engine::metrics::NoopMetrics;
use relay_engine::store::NoopStore;
use relay_engine::synthesizer::{HttpSynthesizer, NoopSynthesizer, Synthesizer};
use relay_engine::translator::{HttpTranslator, NoopTranslator, Translator};
use relay_server::metadata::InMemoryMetadataSource;
use relay_server::registry::{RoomDepsFactory, RoomRegistry};
use relay_server::AppState;

/// relay-server — real-time transcription-and-translation relay
#[derive(Parser)]
#[command(name = "relay-server", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay server
    Serve {
        #[arg(long, default_value = "7800")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Default listener target languages for newly created rooms, comma-separated.
        #[arg(long, value_delimiter = ',', default_value = "")]
        target_langs: Vec<String>,
        /// Primary translator backend URL. Omit to run with the identity passthrough.
        #[arg(long)]
        translator_url: Option<String>,
        #[arg(long)]
        translator_fallback_url: Option<String>,
        /// Synthesizer backend URL. Omit to run with the silent passthrough.
        #[arg(long)]
        synthesizer_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            host,
            target_langs,
            translator_url,
            translator_fallback_url,
            synthesizer_url,
        } => {
            let config = relay_engine::config::Config::from_env();
            let metrics = Arc::new(NoopMetrics);

            let translator: Arc<dyn Translator> = match translator_url {
                Some(url) => Arc::new(HttpTranslator::new(
                    url,
                    translator_fallback_url,
                    config.translator_primary_timeout,
                    config.translator_fallback_timeout,
                    metrics.clone(),
                )),
                None => Arc::new(NoopTranslator),
            };

            let synthesizer: Arc<dyn Synthesizer> = match synthesizer_url {
                Some(url) => Arc::new(HttpSynthesizer::new(url, Duration::from_secs(20))),
                None => Arc::new(NoopSynthesizer),
            };

            let deps = RoomDepsFactory {
                config,
                translator,
                synthesizer,
                store: Arc::new(NoopStore),
                metrics,
            };

            let target_langs: Vec<String> = target_langs.into_iter().filter(|l| !l.is_empty()).collect();
            let registry = Arc::new(RoomRegistry::new(target_langs, deps));
            let metadata = Arc::new(InMemoryMetadataSource::new());

            let state = AppState { registry, metadata };
            let app = relay_server::router(state);

            let addr = format!("{host}:{port}");
            eprintln!("relay-server listening on {addr}");

            let listener = tokio::net::TcpListener::bind(&addr).await.expect("failed to bind");
            axum::serve(listener, app).await.expect("server error");
        }
    }
}
