use std::{error::Error, process, sync::Arc};

use dotenvy::dotenv;
use quizcast::{
    commands::Command,
    config::Config,
    database::{connection::Connection, memory::MemoryStore, Storage},
    schema::schema,
    state::PanelState,
};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    update_listeners::webhooks::{self, Options},
    utils::command::BotCommands,
};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.log_level) {
        eprintln!("Failed to initialise logging: {e}");
        process::exit(1);
    }

    let storage = match open_storage(config.database_url.as_deref()).await {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            log::error!("Failed to open storage: {}", e);
            process::exit(1);
        }
    };

    let bot = Bot::new(config.token.clone());
    log::info!("Starting bot...");

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::error!("Failed to publish the command menu: {}", e);
    }

    if config.drain.anonymous {
        log::warn!("QUIZ_ANONYMOUS is on; Telegram sends no answers for anonymous quizzes, so scoring is off");
    }

    let webhook = config.webhook.clone();
    let config = Arc::new(config);

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![InMemStorage::<PanelState>::new(), storage, config])
        .default_handler(|update| async move {
            log::trace!("Unhandled update: {:?}", update.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "An error has occurred in the dispatcher",
        ))
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(webhook) => {
            let listener = match webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await {
                Ok(listener) => listener,
                Err(e) => {
                    log::error!("Failed to build a webhook listener: {}", e);
                    process::exit(1);
                }
            };
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        }
        None => dispatcher.dispatch().await,
    }
}

fn init_tracing(level: &str) -> Result<(), Box<dyn Error>> {
    LogTracer::init()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level)?)
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

async fn open_storage(database_url: Option<&str>) -> Result<Storage, Box<dyn Error + Send + Sync>> {
    match database_url {
        Some(url) => {
            let connection = Connection::connect(url).await?;
            connection.run_migrations().await?;
            log::info!("Using PostgreSQL storage");
            Ok(Storage::Postgres(connection))
        }
        None => {
            log::warn!("DATABASE_URL is not set; the queue lives in memory and is lost on restart");
            Ok(Storage::Memory(MemoryStore::new()))
        }
    }
}
