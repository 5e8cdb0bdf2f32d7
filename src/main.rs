use std::io::Read;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::{Args, Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use psp_dashboard::config::Config;
use psp_dashboard::filter::{DateRange, InvoiceFilter, filter_invoices};
use psp_dashboard::handlers;
use psp_dashboard::invoice_state::{self, Badge};
use psp_dashboard::pagination::PaginationQuery;
use psp_dashboard::poller::{InvoicePoller, PollState};
use psp_dashboard::psp::PspClient;
use psp_dashboard::signature;
use psp_dashboard::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "psp-dashboard")]
#[command(about = "Webhook intake and invoice tracking for PSP operators")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Poll one invoice and print each state change until it settles
    Watch {
        invoice_id: String,

        /// Poll interval in milliseconds (defaults to POLL_INTERVAL_MS)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Fetch a page of invoices from the PSP core and filter it
    Invoices(InvoicesArgs),

    /// Print a psp-signature header for a body, for testing webhook intake
    Sign {
        /// Body file; reads stdin when omitted or "-"
        #[arg(long)]
        file: Option<String>,

        /// Unix timestamp to sign with (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Secret to sign with (defaults to PSP_WEBHOOK_SECRET)
        #[arg(long)]
        secret: Option<String>,
    },
}

#[derive(Args, Debug)]
struct InvoicesArgs {
    /// Substring of the invoice id
    #[arg(long, short)]
    query: Option<String>,

    /// waiting, confirmed, expired, rejected or all
    #[arg(long)]
    status: Option<String>,

    /// clean, warning, risky, blocked, none or all
    #[arg(long)]
    aml: Option<String>,

    #[arg(long)]
    min_amount: Option<String>,

    #[arg(long)]
    max_amount: Option<String>,

    /// today, 7d, 30d or all
    #[arg(long, default_value = "all")]
    range: DateRange,

    #[arg(long)]
    tx_hash: Option<String>,

    #[arg(long)]
    wallet: Option<String>,

    #[arg(long)]
    merchant_id: Option<String>,

    #[arg(long)]
    limit: Option<i64>,

    #[arg(long)]
    offset: Option<i64>,
}

impl InvoicesArgs {
    fn filter(&self) -> InvoiceFilter {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        InvoiceFilter {
            query: text(&self.query),
            status: text(&self.status),
            aml: text(&self.aml),
            min_amount: text(&self.min_amount),
            max_amount: text(&self.max_amount),
            range: self.range,
            tx_hash: text(&self.tx_hash),
            wallet: text(&self.wallet),
            merchant_id: text(&self.merchant_id),
        }
    }

    fn page(&self) -> PaginationQuery {
        PaginationQuery {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "psp_dashboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Watch {
            invoice_id,
            interval_ms,
        } => watch(config, &invoice_id, interval_ms).await,
        Command::Invoices(args) => list_invoices(config, &args).await,
        Command::Sign {
            file,
            timestamp,
            secret,
        } => sign(config, file.as_deref(), timestamp, secret),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> Result<(), String> {
    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.webhook_secret.is_none() {
        tracing::warn!("PSP_WEBHOOK_SECRET is not set; webhook intake will answer 500");
    }
    if config.inbox_read_token.is_none() && !config.dev_mode {
        tracing::warn!("INBOX_READ_TOKEN is not set; the inbox viewer is closed");
    }

    let state = AppState::from_config(&config).map_err(|e| e.to_string())?;
    tracing::info!("Fetching invoices from PSP core at {}", state.psp.base_url());

    let app: Router = handlers::router(config.rate_limit)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    tracing::info!("PSP dashboard listening on {}", addr);

    // Use into_make_service_with_connect_info to enable IP-based rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| format!("Server error: {}", e))
}

async fn watch(config: Config, invoice_id: &str, interval_ms: Option<u64>) -> Result<(), String> {
    let client = PspClient::new(&config.psp_core).map_err(|e| e.to_string())?;
    let interval = interval_ms
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(config.poll_interval);

    let poller = InvoicePoller::new(Arc::new(client), interval);
    let mut subscription = poller.start(invoice_id);

    loop {
        tokio::select! {
            state = subscription.next() => match state {
                Some(state) => print_poll_state(&state),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                subscription.cancel();
                tracing::info!("Watch cancelled");
                break;
            }
        }
    }

    Ok(())
}

fn badge(b: &Badge) -> String {
    format!("{} ({:?})", b.label, b.tone)
}

fn print_poll_state(state: &PollState) {
    match state {
        PollState::Idle => println!("idle: no invoice id"),
        PollState::Loading => tracing::debug!("Fetching invoice"),
        PollState::Done(invoice) => {
            let derived = invoice_state::derive(invoice);
            println!(
                "{}  invoice: {}  tx: {}  decision: {}  aml: {}",
                invoice.id,
                badge(&derived.invoice),
                badge(&derived.tx),
                badge(&derived.decision),
                invoice_state::aml_display_label(invoice),
            );
        }
        PollState::Error { message, last } => {
            println!("error: {}", message);
            if let Some(last) = last {
                println!("last known status: {}", last.status.as_ref());
            }
        }
    }
}

async fn list_invoices(config: Config, args: &InvoicesArgs) -> Result<(), String> {
    let client = PspClient::new(&config.psp_core).map_err(|e| e.to_string())?;
    let invoices = client
        .list_invoices(args.page().page())
        .await
        .map_err(|e| e.to_string())?;

    let filter = args.filter();
    let matches = filter_invoices(&invoices, &filter);

    for invoice in &matches {
        let amount = match (invoice.fiat_amount, invoice.fiat_currency.as_deref()) {
            (Some(amount), Some(currency)) => format!("{:.2} {}", amount, currency),
            (Some(amount), None) => format!("{:.2}", amount),
            _ => "-".to_string(),
        };
        println!(
            "{:<36} {:<10} {:>16} {}",
            invoice.id,
            invoice.status.as_ref(),
            amount,
            invoice_state::aml_display_label(invoice),
        );
    }
    println!("{} of {} invoices match", matches.len(), invoices.len());

    Ok(())
}

fn sign(
    config: Config,
    file: Option<&str>,
    timestamp: Option<i64>,
    secret: Option<String>,
) -> Result<(), String> {
    let secret = secret
        .or(config.webhook_secret)
        .ok_or("No secret: pass --secret or set PSP_WEBHOOK_SECRET")?;

    let body = match file {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Failed to read stdin: {}", e))?;
            buf
        }
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path, e))?,
    };

    let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    println!("{}", signature::sign(&body, &secret, timestamp));
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
}
