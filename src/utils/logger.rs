use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// RUST_LOG 优先；否则 verbose 时输出 debug 级别
pub fn init_logger(verbose: bool) {
    let default_level = if verbose { "pilmine=debug" } else { "pilmine=info" };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
