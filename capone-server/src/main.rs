//! The Capone server daemon.
//!
//! Loads the host identity and service list from a configuration file,
//! listens on one TCP port per service, and handles every accepted
//! connection on its own thread: handshake, one command, done.
//!
//! ```text
//! capone-server --config server.toml [--request-acl FILE] [--query-acl FILE] [-v...]
//! ```
//!
//! Without an ACL file the corresponding command is open to every
//! authenticated identity.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use capone_crypto::SignKeyPair;
use capone_proto::server::{self, ServerContext};
use capone_proto::{Acl, Config, Listener, Rights, Service, SessionStore};
use clap::Parser;

#[derive(Parser)]
#[command(name = "capone-server", about = "Expose services under capability-based access control")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// File with identities allowed to send REQUEST (default: everyone)
    #[arg(long)]
    request_acl: Option<PathBuf>,

    /// File with identities allowed to send QUERY (default: everyone)
    #[arg(long)]
    query_acl: Option<PathBuf>,

    /// Increase verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct Shared {
    keys:        SignKeyPair,
    config:      Config,
    sessions:    SessionStore,
    query_acl:   Acl,
    request_acl: Acl,
    services:    Vec<Service>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn load_acl(path: Option<&PathBuf>) -> Result<Acl, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Acl::from_file(path, Rights::EXEC)?),
        None => {
            let mut acl = Acl::new();
            acl.allow_all(Rights::EXEC);
            Ok(acl)
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_path(&args.config)?;
    let keys = config.sign_keys()?;

    let services = config
        .services
        .iter()
        .map(Service::from_config)
        .collect::<Result<Vec<_>, _>>()?;
    if services.is_empty() {
        return Err("no services configured".into());
    }

    let shared = Arc::new(Shared {
        query_acl:   load_acl(args.query_acl.as_ref())?,
        request_acl: load_acl(args.request_acl.as_ref())?,
        sessions:    SessionStore::new(),
        keys,
        config,
        services,
    });

    log::info!(
        "{} serving {} service(s) as {}",
        shared.config.core.name,
        shared.services.len(),
        shared.keys.public()
    );

    let mut listeners = Vec::new();
    for (index, service) in shared.services.iter().enumerate() {
        let listener = Listener::bind("0.0.0.0", service.port)?;
        log::info!("service '{}' listening on port {}", service.name, service.port);
        listeners.push((index, listener));
    }

    let mut workers = Vec::new();
    for (index, listener) in listeners {
        let shared = Arc::clone(&shared);
        workers.push(thread::spawn(move || accept_loop(listener, index, shared)));
    }

    for worker in workers {
        let _ = worker.join();
    }

    shared.sessions.clear();

    Ok(())
}

fn accept_loop(listener: Listener, service_index: usize, shared: Arc<Shared>) {
    loop {
        let channel = match listener.accept() {
            Ok(channel) => channel,
            Err(e) => {
                log::error!("could not accept connection: {e}");
                continue;
            }
        };

        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let ctx = ServerContext {
                sign_keys:   &shared.keys,
                service:     &shared.services[service_index],
                config:      &shared.config,
                sessions:    &shared.sessions,
                query_acl:   &shared.query_acl,
                request_acl: &shared.request_acl,
            };
            if let Err(e) = server::handle_connection(channel, &ctx) {
                log::error!("connection failed: {e}");
            }
        });
    }
}
