use clap::Parser;
use log::info;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use camview_signaling_server::config::ServerConfig;
use camview_signaling_server::router::{self, ServerState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    TermLogger::init(
        config.log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let state = ServerState::new(config.ice_server_list());
    info!("listening on {}", config.address);
    axum::Server::bind(&config.address)
        .serve(router::create(state).into_make_service())
        .await?;
    Ok(())
}
