use anyhow::Result;
use tokio::signal;

mod landing_logic;
use landing_logic::{config, logger, routes, state};

use lib_aggregator::core::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real deployments use the environment
    let _ = dotenvy::dotenv();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    logger::setup_logging(&log_dir, &log_level)?;

    let settings = config.refresh_settings();
    log::info!("Refresh settings:\n{}", settings);

    let app_state = state::AppState::from_config(&config, &settings)?;
    let scheduler = Scheduler::new();
    app_state.start(&scheduler)?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let port = config.port.unwrap_or(8080);
    let mut server_handle = tokio::spawn(routes::run(port, app_state, shutdown_tx.subscribe()));

    // Wait for shutdown signal, or for the server to stop on its own
    let early_exit = tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
            None
        }
        _ = wait_for_terminate() => None,
        joined = &mut server_handle => Some(joined),
    };

    let _ = shutdown_tx.send(());
    scheduler.shutdown().await;

    let outcome = match early_exit {
        Some(joined) => server_outcome(joined, true),
        None => server_outcome(server_handle.await, false),
    };

    log::info!("Shutdown complete.");
    outcome
}

/// Turns the server task's result into `main`'s. Stopping before a shutdown
/// signal is an error even when the server itself reported none.
fn server_outcome(joined: Result<Result<()>, tokio::task::JoinError>, early: bool) -> Result<()> {
    match joined {
        Ok(Err(e)) => {
            log::error!("HTTP server stopped with an error: {}", e);
            Err(e)
        }
        Err(e) => {
            log::error!("HTTP server task failed: {}", e);
            Err(e.into())
        }
        Ok(Ok(())) if early => anyhow::bail!("HTTP server stopped before a shutdown signal"),
        Ok(Ok(())) => Ok(()),
    }
}

async fn wait_for_terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
                log::info!("SIGTERM received, initiating shutdown.");
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_stopping_on_its_own_fails_main() {
        assert!(server_outcome(Ok(Ok(())), true).is_err());
        assert!(server_outcome(Ok(Ok(())), false).is_ok());

        let bind_error = server_outcome(Ok(Err(anyhow::anyhow!("address in use"))), true);
        assert_eq!(bind_error.unwrap_err().to_string(), "address in use");
    }
}
