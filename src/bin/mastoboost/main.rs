use log::{error, info};
use mastoboost::mastodon::MastodonClient;
use mastoboost::poller::{self, Poller, PollerOptions, SystemClock};
use mastoboost::state::StateStore;
use mastoboost::{logging, BotError, Config, Result};
use std::process::ExitCode;

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_fallback();
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&config) {
        logging::init_fallback();
        error!("Failed to set up logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match &e {
                BotError::Unauthorized(..) => {
                    error!("Access token is invalid or expired, exiting: {}", e)
                }
                _ => error!("Fatal error, exiting: {}", e),
            }
            log::logger().flush();
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let api = MastodonClient::new(&config)?;

    let bot = poller::authenticate(&api, config.poll_interval).await?;
    info!("Authenticated as {} on {}", bot.acct, config.base_url);

    let poller = Poller::new(
        api,
        SystemClock,
        StateStore::new(&config.state_file),
        bot,
        PollerOptions::from(&config),
    )
    .await?;

    poller.run(shutdown_signal()).await?;
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C!"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C!"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
