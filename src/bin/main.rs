use std::error::Error;
use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tinyhttp::config::{load_config, ClientConfig, Config, ServerConfig};
use tinyhttp::def::{ContentType, Method};
use tinyhttp::registry::MemoryUserStore;
use tinyhttp::{logging, Address, Client, Exchange, Request, Router, Server, SessionState};

#[derive(Parser)]
#[command(name = "tinyhttp")]
#[command(about = "Minimal HTTP/1.1 server and interactive client", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the fixed route set
    Serve {
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Send requests typed on stdin over one keep-alive connection
    Client {
        #[arg(short, long)]
        address: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    logging::init(&config.logging.level);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind { config.server.bind_address = bind; }
            serve(&config.server)
        }
        Commands::Client { address } => {
            if let Some(address) = address { config.client.address = address; }
            interact(&config.client)
        }
    }
}

fn serve(config: &ServerConfig) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = config.image_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let router = Router::new(Arc::new(MemoryUserStore::new()), &config.image_path)
        .with_conditional_get(config.conditional_get);
    let server = Server::bind(&config.bind_address, router, config.idle_timeout())?;
    server.run()?;
    Ok(())
}

fn interact(config: &ClientConfig) -> Result<(), Box<dyn Error>> {
    let address = Address::parse(&config.address).ok_or("client address must be host[:port]")?;
    let mut client = Client::connect(&address, config.idle_timeout())?
        .with_max_redirects(config.max_redirects)
        .with_user_agent(config.user_agent.as_str());
    if let Some(save_dir) = &config.save_dir {
        client = client.with_save_dir(save_dir);
    }

    println!("Request format: <METHOD> <PATH> [BODY|FILE]");
    println!("  GET /index.html");
    println!("  POST /register username=123&password=456");
    println!("  POST /image ./picture.png");

    for line in io::stdin().lock().lines() {
        let request = match build_request(&line?) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(error) => {
                warn!(%error, "could not read request body file");
                continue;
            }
        };

        match client.send(request) {
            Ok(exchange) => print_exchange(&exchange),
            Err(error) => warn!(%error, "request failed"),
        }

        if client.state() == SessionState::Closed {
            info!("connection closed");
            break;
        }
    }

    Ok(())
}

/// `POST /image <file>` uploads the file; any other third field is sent as the body.
fn build_request(line: &str) -> io::Result<Option<Request>> {
    let mut parts = line.trim().splitn(3, ' ');
    let method = match parts.next().filter(|m| !m.is_empty()) {
        Some(method) => Method::parse(method),
        None => return Ok(None),
    };
    let path = parts.next().unwrap_or("/");
    let mut request = Request::new(method, path);

    match parts.next() {
        Some(file) if request.method == Method::POST && path == "/image" =>
            request.message.set_content(ContentType::Png, fs::read(file.trim())?),
        Some(body) => request.message.set_body(body.as_bytes().to_vec()),
        None => {}
    }

    Ok(Some(request))
}

fn print_exchange(exchange: &Exchange) {
    let response = &exchange.response;
    println!("{}", response);
    print!("{}", response.message.headers);
    println!();
    println!("{}", response.message.text());

    if let Some(path) = &exchange.saved_path {
        println!("[saved to {}]", path.display());
    }
    if exchange.redirects > 0 {
        println!("[followed {} redirect(s), ended at {}]", exchange.redirects, exchange.target);
    }
    if exchange.too_many_redirects {
        println!("[too many redirects, stopped following]");
    }
    if exchange.cache_miss_on_304 {
        println!("[304 received but no cached copy exists]");
    }
}
