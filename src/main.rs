//! Chat routing server binary
//!
//! Usage:
//!   cargo run -- server                    # Run on the default port
//!   cargo run -- server --port 1111       # Run on a specific port

use std::env;

use palaver::{ChatServer, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "server" => {
            run_server(&args).await?;
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Palaver - Line-Protocol Chat Routing Server");
    println!();
    println!("USAGE:");
    println!("    cargo run -- server [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    server              Start the chat server");
    println!("    help                Show this help message");
    println!();
    println!("OPTIONS:");
    println!("    --port <PORT>       Port to listen on (default: 1111)");
    println!("    --max-conn <NUM>    Maximum connections (default: 1000)");
    println!();
    println!("PROTOCOL:");
    println!("    Clients speak newline-delimited UTF-8 text. The first line is the");
    println!("    identity (optionally `identity|group`); afterwards:");
    println!("    - ALL||<text>            chat within the current scope");
    println!("    - ALL||[GLOBAL] <text>   broadcast to everyone");
    println!("    - GROUP|<group>|<text>   message a named group");
    println!("    - PRIVATE|<name>|<text>  message one identity");
    println!("    - JOIN|<group>| / LEAVE|<group>| / QUIT||");
    println!();
    println!("EXAMPLES:");
    println!("    cargo run -- server");
    println!("    cargo run -- server --port 5000");
    println!("    RUST_LOG=debug cargo run -- server");
}

fn parse_port(args: &[String]) -> u16 {
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            if let Ok(port) = args[i + 1].parse() {
                return port;
            }
        }
    }
    1111 // default port
}

fn parse_max_connections(args: &[String]) -> usize {
    for i in 0..args.len() {
        if args[i] == "--max-conn" && i + 1 < args.len() {
            if let Ok(max) = args[i + 1].parse() {
                return max;
            }
        }
    }
    1000 // default
}

async fn run_server(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{}", parse_port(args)).parse()?,
        max_connections: parse_max_connections(args),
        ..Default::default()
    };

    info!("Configuration:");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Max connections: {}", config.max_connections);
    info!("  - Outbound queue: {} lines", config.outbound_queue);

    let mut server = ChatServer::new(config);

    // Runs until process termination
    if let Err(e) = server.start().await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
