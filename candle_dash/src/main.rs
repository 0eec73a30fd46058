use anyhow::{Context, Result};
use candle_dash::app::{commands, AppEvent, Dashboard};
use candle_dash::feed::HttpDataSource;
use candle_dash::persist::Persistence;
use candle_dash::sink::LogSink;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    init_crypto_provider();

    let persistence = Persistence::new()?;
    let mut saved = persistence.load();
    let mut cfg = saved.clone();
    cfg.apply_env_overrides();
    tracing::info!(
        "config {:?}; backend {} ({})",
        persistence.config_path(),
        cfg.base_url,
        cfg.data_source
    );

    let source = HttpDataSource::new(&cfg.base_url, cfg.request_timeout())
        .with_context(|| format!("build http client for {}", cfg.base_url))?;

    let mut dash = Dashboard::new(&cfg, Arc::new(source), Box::new(LogSink::default()));

    commands::spawn_stdin_reader(dash.sender());
    {
        let tx = dash.sender();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(AppEvent::Shutdown);
            }
        });
    }
    tracing::info!("{}", commands::HELP);

    dash.start();
    dash.run().await;

    // remember the last selection, not the env overrides
    let state = dash.state_snapshot();
    saved.symbol = state.symbol;
    saved.timeframe = state.timeframe;
    if std::env::var(candle_dash::persist::SOURCE_ENV).is_err() {
        saved.data_source = state.data_source;
    }
    persistence.save_now(&saved).context("save config")?;
    Ok(())
}
