//! mqgate - MQTT v5 broker front end.

use std::sync::Arc;

use log::{error, info};

use mqgate_server::config::Config;
use mqgate_server::server::Server;

struct Args {
    config_path: String,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = "mqgate.toml".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 < args.len() {
                    config_path = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: -c requires a file path");
                    std::process::exit(1);
                }
            }
            "-h" | "--help" => {
                println!("mqgate - MQTT v5 broker front end");
                println!();
                println!("Usage: mqgate [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <FILE>     Config file path (default: mqgate.toml)");
                println!("  -h, --help              Show this help message");
                println!();
                println!("Configuration:");
                println!("  Config file uses TOML format. All settings can be overridden");
                println!("  with environment variables using MQGATE__ prefix:");
                println!();
                println!("  MQGATE__SERVER__BIND=0.0.0.0:1883");
                println!("  MQGATE__LIMITS__MAX_PACKET_SIZE=2097152");
                println!("  MQGATE__LOG__LEVEL=debug");
                std::process::exit(0);
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                eprintln!("Use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    Args { config_path }
}

fn main() {
    let args = parse_args();

    let config = match Config::load(&args.config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log.level))
        .init();

    info!(
        "starting mqgate on {} (max_packet_size={}KB, max_qos={})",
        config.server.bind,
        config.limits.max_packet_size / 1024,
        config.mqtt.max_qos
    );

    let server = match Server::bind(Arc::new(config)) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
