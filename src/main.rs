use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use xmppc::config::Config;
use xmppc::error::BoxError;
use xmppc::packet::Packet;
use xmppc::telemetry::init_tracing;
use xmppc::Connection;

#[derive(Parser, Debug)]
#[command(name = "xmppc")]
#[command(author, version, about = "XMPP client connection engine")]
struct Args {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting xmppc"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    let connection = Connection::new(config.connection.clone());

    // Tail every inbound stanza into the log.
    connection.add_receive_listener(
        Arc::new(|packet: &Packet| -> Result<(), BoxError> {
            info!(
                id = packet.id(),
                kind = %packet.kind(),
                from = packet.from().unwrap_or(""),
                "received"
            );
            Ok(())
        }),
        None,
    );

    connection.connect().await?;

    match &config.login {
        Some(login) if login.anonymous => {
            connection.login_anonymously().await?;
        }
        Some(login) => {
            connection
                .login(
                    login.username.as_deref().unwrap_or_default(),
                    login.password.as_deref().unwrap_or_default(),
                    &login.resource,
                )
                .await?;
        }
        None => {}
    }

    info!(
        identity = %connection.identity(),
        user = connection.user().as_deref().unwrap_or(""),
        "session established, ctrl-c to exit"
    );

    tokio::signal::ctrl_c().await?;
    connection.disconnect().await;

    Ok(())
}
