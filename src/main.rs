/// Entry point for Lestrade.
///
/// Connects to the docker daemon, starts an introspection server for every running container
/// and keeps the set of servers in sync with the docker event stream.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the docker daemon is unreachable, or the
/// docker event stream closes.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=debug LESTRADE_SOCKET_DIR=/tmp/lestrade cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = lestrade::config::Config::from_env()?;
    lestrade::run(config).await?;
    Ok(())
}
