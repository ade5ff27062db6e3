mod command;
mod config;
mod dispatcher;
mod event;
mod locks;
mod notify;
mod reward;
mod signature;

use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use clap::{Parser, Subcommand};
use common::{db::PgWalletStore, onebot::OneBotClient};
use evm_token::EvmTokenClient;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use dispatcher::{BotSettings, WalletBot};
use event::{IncomingMessage, OneBotEvent};
use notify::{ConsoleNotifier, Notifier};

struct AppState {
    bot: WalletBot<PgWalletStore, EvmTokenClient, OneBotClient>,
    secret: Option<String>,
}

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive OneBot events over HTTP
    Serve,
    /// Type commands on stdin as the given QQ user
    Console {
        #[clap(long)]
        user: i64,
    },
}

#[actix_web::post("/onebot")]
async fn onebot_event(
    req: HttpRequest,
    body: web::Bytes,
    app_state: web::Data<AppState>,
) -> impl Responder {
    if let Err(e) = signature::verify_request(&req, &body, app_state.secret.as_deref()) {
        warn!(peer = ?req.peer_addr(), "Rejected event post: {}", e);
        return e.error_response();
    }

    let event: OneBotEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Malformed event post: {}", e);
            return HttpResponse::BadRequest().finish();
        }
    };
    let Some(message) = event.into_incoming() else {
        debug!("Ignoring non-message event");
        return HttpResponse::NoContent().finish();
    };

    if app_state.bot.notifier().is_connected() {
        // Chain calls can outlast the host's webhook timeout.
        actix_web::rt::spawn(async move {
            let bot = &app_state.bot;
            if let Some(reply) = bot.handle(&message).await {
                bot.notifier().notify(&message, &reply).await;
            }
        });
        return HttpResponse::NoContent().finish();
    }

    match app_state.bot.handle(&message).await {
        Some(reply) => HttpResponse::Ok().json(json!({ "reply": reply })),
        None => HttpResponse::NoContent().finish(),
    }
}

#[actix_web::get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

async fn build_bot<N: Notifier>(
    config: &Config,
    notifier: N,
) -> anyhow::Result<WalletBot<PgWalletStore, EvmTokenClient, N>> {
    let store = PgWalletStore::connect(&config.database_url).await?;
    let ledger = EvmTokenClient::connect(
        &config.rpc_node_url,
        config.contract_address,
        config.owner_private_key.as_deref(),
        config.receipt_timeout,
    )
    .await
    .context("Failed to connect to the token contract")?;

    let settings = BotSettings {
        command_prefix: config.command_prefix.clone(),
        admin_ids: config.admin_ids.clone(),
        registration_gas_fee: config.registration_gas_fee,
        leaderboard_size: config.leaderboard_size,
    };
    Ok(WalletBot::new(
        store,
        ledger,
        notifier,
        config.reward_table.clone(),
        settings,
    ))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let notifier = OneBotClient::new(
        config.onebot_api_url.clone(),
        config.onebot_access_token.clone(),
    );
    if config.onebot_secret.is_none() {
        warn!("ONEBOT_SECRET is not set; event posts are not authenticated");
    }
    let app_state = web::Data::new(AppState {
        bot: build_bot(&config, notifier).await?,
        secret: config.onebot_secret.clone(),
    });

    let address = config.server_address();
    info!("Starting HTTP server on {}", address);
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(Logger::default())
            .service(onebot_event)
            .service(health_check)
    })
    .bind(&address)
    .with_context(|| format!("Failed to bind {}", address))?
    .run()
    .await?;
    Ok(())
}

async fn console(config: Config, user: i64) -> anyhow::Result<()> {
    let bot = build_bot(&config, ConsoleNotifier).await?;
    info!(user, "Console ready, one command per line");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = IncomingMessage::console(user, line.trim());
        if let Some(reply) = bot.handle(&message).await {
            println!("{}", reply);
        }
    }
    Ok(())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Console { user } => console(config, user).await,
    }
}
