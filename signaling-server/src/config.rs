use std::net::SocketAddr;

use camview_protocol::{IceServer, IceServerList};
use clap::Parser;
use log::LevelFilter;

/// Command line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "CAMVIEW_ADDRESS", default_value = "127.0.0.1:9001")]
    pub address: SocketAddr,

    /// STUN/TURN server handed to every viewer, may be repeated
    #[arg(
        long = "ice-server",
        env = "CAMVIEW_ICE_SERVERS",
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    pub ice_servers: Vec<String>,

    /// User name for the `turn:` servers
    #[arg(long, env = "CAMVIEW_TURN_USERNAME")]
    pub turn_username: Option<String>,

    /// Password for the `turn:` servers
    #[arg(long, env = "CAMVIEW_TURN_CREDENTIAL", hide_env_values = true)]
    pub turn_credential: Option<String>,

    #[arg(long, env = "CAMVIEW_LOG_LEVEL", default_value = "info")]
    pub log_level: LevelFilter,
}

impl ServerConfig {
    /// The list sent as the first frame to each viewer. TURN credentials are
    /// attached to `turn:` and `turns:` servers only.
    #[must_use]
    pub fn ice_server_list(&self) -> IceServerList {
        self.ice_servers
            .iter()
            .map(|url| {
                let url = url.trim();
                let server = IceServer::new(url);
                let is_turn = url.starts_with("turn:") || url.starts_with("turns:");
                match (&self.turn_username, &self.turn_credential) {
                    (Some(username), Some(credential)) if is_turn => {
                        server.with_credentials(username.as_str(), credential.as_str())
                    }
                    _ => server,
                }
            })
            .collect::<Vec<_>>()
            .into()
    }
}
