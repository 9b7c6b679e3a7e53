//! Live order book - keeps a local book in sync and prints the top 5 levels
//!
//! Usage:
//!   cargo run --example live_book -- BTCUSDT
//!
//! Without an argument the symbol is read from stdin.
//!
//! Optional:
//!   DEPTH_SYNC_ENV=testnet  # Use the spot testnet (default: production)
//!   RUST_LOG=depth_sync=debug

use std::io::{self, BufRead, Write};

use depth_sync::config::Environment;
use depth_sync::{Config, DepthSync};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for sync lifecycle output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("depth_sync=info".parse()?),
        )
        .init();

    let symbol = match std::env::args().nth(1) {
        Some(symbol) => symbol,
        None => {
            print!("Enter symbol (e.g. BTCUSDT): ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line
        }
    };

    let env = match std::env::var("DEPTH_SYNC_ENV")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "testnet" => Environment::Testnet,
        _ => Environment::Production,
    };

    let config = Config::new(symbol).with_environment(env);
    println!("=== Local order book for {} ===\n", config.symbol());

    let mut render = tokio::time::interval(config.render_interval());
    let handle = DepthSync::new(config).start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
            _ = render.tick() => {
                if handle.is_finished() {
                    break;
                }
                match handle.store().top_levels(5) {
                    Some(top) => println!("{}\n", top),
                    None => println!("Waiting for order book ({:?})...", *handle.state().borrow()),
                }
            }
        }
    }

    if handle.is_finished() {
        if let Err(e) = handle.join().await {
            eprintln!("Order book stopped: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    handle.shutdown().await?;
    println!("Done.");
    Ok(())
}
