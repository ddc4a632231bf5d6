// CLI entry point for sheetkeeper.
//
// The first argument picks the mode:
//
//   sheetkeeper server [OPTIONS]
//     --port <PORT>        Listen port (default: 6666)
//     --host <HOST>        Listen address (default: 0.0.0.0)
//     --data-dir <PATH>    Directory holding Data/ and MetaData/ (default: .)
//     --campaign <NAME>    Campaign to serve (prompted for if omitted)
//
//   sheetkeeper client [OPTIONS]
//     --host <HOST>        Server address (default: 127.0.0.1)
//     --port <PORT>        Server port (default: 6666)
//
// The server serves one campaign until the process is killed. The client
// runs the interactive console on stdin/stdout. Log output goes to stderr
// and is filtered by `RUST_LOG`.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use sheetkeeper_server::client::CampaignClient;
use sheetkeeper_server::console::Console;
use sheetkeeper_server::server::{DEFAULT_PORT, ServerConfig, start_server};
use sheetkeeper_server::store::list_campaigns_in;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

struct ClientConfig {
    host: String,
    port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("server") => {
            init_tracing("info");
            run_server(parse_server_args(&args[1..]));
        }
        Some("client") => {
            init_tracing("warn");
            run_client(parse_client_args(&args[1..]));
        }
        Some("--help" | "-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown argument: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            eprintln!("No mode given.");
            print_usage();
            std::process::exit(1);
        }
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run_server(mut config: ServerConfig) {
    if config.campaign.is_empty() {
        config.campaign = match prompt_campaign(&config.data_root) {
            Some(campaign) => campaign,
            None => {
                eprintln!("No campaign given.");
                std::process::exit(1);
            }
        };
    }

    let (handle, addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!("Server listening on {addr}");
    println!("Press Ctrl+C to stop.");
    handle.join();
}

/// Show the campaigns that already exist and read a name from stdin.
/// Returns `None` if stdin ends first.
fn prompt_campaign(data_root: &std::path::Path) -> Option<String> {
    match list_campaigns_in(data_root) {
        Ok(campaigns) if !campaigns.is_empty() => {
            println!("Existing campaigns:");
            for campaign in campaigns {
                println!("  {campaign}");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not list campaigns"),
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        println!("Enter the name of the campaign (new or existing):");
        let line = lines.next()?.ok()?;
        let name = line.trim();
        if !name.is_empty() {
            return Some(name.to_owned());
        }
    }
}

fn run_client(config: ClientConfig) {
    let addr = (config.host.as_str(), config.port);
    let mut attempt = 1;
    let client = loop {
        match CampaignClient::connect(addr) {
            Ok(client) => break client,
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                eprintln!("Didn't manage to connect to host ({e}). Trying again...");
                attempt += 1;
                thread::sleep(CONNECT_RETRY_DELAY);
            }
            Err(e) => {
                eprintln!("Failed to connect to {}:{}: {e}", config.host, config.port);
                std::process::exit(1);
            }
        }
    };

    let console = Console::new(client, io::stdin().lock(), io::stdout().lock());
    if let Err(e) = console.run() {
        eprintln!("Connection lost: {e}");
        std::process::exit(1);
    }
}

/// Parse server options. Uses simple argument matching, no clap.
fn parse_server_args(args: &[String]) -> ServerConfig {
    let mut config = ServerConfig::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = parse_port(args.get(i));
            }
            "--host" => {
                i += 1;
                config.host = require_value(args.get(i), "--host");
            }
            "--data-dir" => {
                i += 1;
                config.data_root = PathBuf::from(require_value(args.get(i), "--data-dir"));
            }
            "--campaign" => {
                i += 1;
                config.campaign = require_value(args.get(i), "--campaign");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn parse_client_args(args: &[String]) -> ClientConfig {
    let mut config = ClientConfig::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = parse_port(args.get(i));
            }
            "--host" => {
                i += 1;
                config.host = require_value(args.get(i), "--host");
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn parse_port(value: Option<&String>) -> u16 {
    value.and_then(|s| s.parse().ok()).unwrap_or_else(|| {
        eprintln!("--port requires a valid port number");
        std::process::exit(1);
    })
}

fn require_value(value: Option<&String>, flag: &str) -> String {
    value.cloned().unwrap_or_else(|| {
        eprintln!("{flag} requires a value");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: sheetkeeper <server|client> [OPTIONS]");
    println!();
    println!("Server options:");
    println!("  --port <PORT>         Listen port (default: {DEFAULT_PORT})");
    println!("  --host <HOST>         Listen address (default: 0.0.0.0)");
    println!("  --data-dir <PATH>     Data root (default: .)");
    println!("  --campaign <NAME>     Campaign to serve (prompted for if omitted)");
    println!();
    println!("Client options:");
    println!("  --host <HOST>         Server address (default: 127.0.0.1)");
    println!("  --port <PORT>         Server port (default: {DEFAULT_PORT})");
    println!();
    println!("  --help, -h            Show this help");
}
