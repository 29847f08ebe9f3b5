use chat_server::chat_server::{ChatServer, StartupError};
use chat_server::config::Args;
use chat_server::utils::{log_file_path, unix_timestamp};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::fs::{self, File};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sets up `env_logger` from the logging flags. `RUST_LOG` still overrides
/// the level.
fn init_logging(args: &Args) -> std::io::Result<()> {
    let level = if args.log_debug_statements {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    if args.log_to_console {
        builder.target(env_logger::Target::Stderr);
    } else {
        fs::create_dir_all(&args.log_dir)?;
        let file = File::create(log_file_path(&args.log_dir, unix_timestamp()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Parses arguments, starts the server and runs the tick loop until Ctrl+C,
/// a master shutdown request or loss of the master link.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args)?;

    let started = match args.validate() {
        Ok(config) => ChatServer::start(config).await,
        Err(e) => Err(StartupError::from(e)),
    };
    let server = match started {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start chat server: {}", e);
            log::logger().flush();
            return Err(e.into());
        }
    };
    info!("Chat server running on {}", server.local_addr());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    server.run(shutdown).await;
    Ok(())
}
