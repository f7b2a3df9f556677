use std::{error::Error, future::Future, net::SocketAddr, path::PathBuf, sync::Arc};

use tracing_subscriber::EnvFilter;

mod compat;
mod config;
mod model;
mod page;
mod registry;
mod render;
mod richtext;
mod server;
mod store;

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("invalid public url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Api(#[from] model::ApiError),

    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server stopped: {0}")]
    Serve(std::io::Error),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

/// Resolves once `signal` fires. If the signal handler cannot be installed the
/// server keeps running until killed.
async fn shutdown_on(signal: impl Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => tracing::info!("shutting down"),
        Err(err) => {
            tracing::error!(error = %err, "could not listen for ctrl-c");
            std::future::pending::<()>().await
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| String::from("treeblog"));
    let path = args
        .next()
        .map(PathBuf::from)
        .ok_or(config::ConfigError::Usage(program))?;
    let config = config::Config::load(&path)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log.filter)?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::debug!(?config, "loaded config");

    let store = store::Store::open(&config.db.sqlite_file).await?;
    store.migrate().await?;

    let registry = registry::Registry::blog();
    let renderer = render::Renderer::new(config.site.templates.as_deref())?;
    let site = server::Site {
        name: config.site_name().to_string(),
        base_url: Some(config.public_url("/")?),
        base_path: config.base_path(),
        media: config.site.media.as_deref().map(|dir| dir.to_path_buf()),
    };

    let app = server::router(server::AppState {
        store,
        registry: Arc::new(registry),
        renderer: Arc::new(renderer),
        site: Arc::new(site),
    });

    let addr = config.net.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!(%addr, public = %config.public_url("/")?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on(tokio::signal::ctrl_c()))
        .await
        .map_err(StartupError::Serve)
}
