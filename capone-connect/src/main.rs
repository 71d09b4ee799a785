//! Capone client command line.
//!
//! ```text
//! capone-connect --config client.toml query     <KEY> <HOST> <PORT>
//! capone-connect --config client.toml request   <KEY> <HOST> <PORT> <TYPE> [ARGS...]
//! capone-connect --config client.toml connect   <KEY> <HOST> <PORT> <TYPE> <SESSION> <CAP>
//! capone-connect --config client.toml terminate <KEY> <HOST> <PORT> <SESSION> <CAP>
//! ```
//!
//! `KEY` is the server's hex identity, `CAP` a capability in its text form
//! as printed by `request`.

use std::path::PathBuf;
use std::process::ExitCode;

use capone_crypto::SignPublicKey;
use capone_proto::service::plugin_by_kind;
use capone_proto::{Capability, Command, Config, client};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "capone-connect", about = "Talk to a Capone server")]
struct Args {
    /// Path to the configuration file holding this client's identity
    #[arg(short, long)]
    config: PathBuf,

    /// Increase verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Ask a server to describe its service
    Query {
        /// Server identity (hex signing key)
        key:  String,
        host: String,
        port: u16,
    },
    /// Request a new session and print its identifier and capability
    Request {
        key:  String,
        host: String,
        port: u16,
        /// Service type, e.g. "exec"
        kind: String,
        /// Service-specific arguments
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Start a previously requested session
    Connect {
        key:  String,
        host: String,
        port: u16,
        /// Service type, e.g. "exec"
        kind: String,
        /// Session identifier from `request`
        session: u32,
        /// Capability in text form from `request`
        cap: String,
    },
    /// Kill a session without running it
    Terminate {
        key:  String,
        host: String,
        port: u16,
        /// Session identifier from `request`
        session: u32,
        /// Capability in text form from `request`
        cap: String,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
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

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_path(&args.config)?;
    let keys = config.sign_keys()?;

    match args.command {
        Cmd::Query { key, host, port } => {
            let server = SignPublicKey::from_hex(&key)?;
            let mut channel = client::connect_to(&host, port, &keys, &server, Command::Query)?;
            let description = client::query(&mut channel)?;

            println!(
                "{key}\n\
                 \tname:     {}\n\
                 \tcategory: {}\n\
                 \ttype:     {}\n\
                 \tversion:  {}\n\
                 \tlocation: {}\n\
                 \tport:     {}",
                description.name,
                description.category,
                description.kind,
                description.version,
                description.location,
                description.port,
            );
        }
        Cmd::Request { key, host, port, kind, args } => {
            let server = SignPublicKey::from_hex(&key)?;
            let plugin = plugin_by_kind(&kind)?;
            let parameters = plugin.parse_params(&args)?;

            let mut channel = client::connect_to(&host, port, &keys, &server, Command::Request)?;
            let (identifier, cap) = client::request(&mut channel, &parameters)?;

            println!("session:    {identifier}");
            println!("capability: {cap}");
        }
        Cmd::Connect { key, host, port, kind, session, cap } => {
            let server = SignPublicKey::from_hex(&key)?;
            let plugin = plugin_by_kind(&kind)?;
            let cap: Capability = cap.parse()?;

            let mut channel = client::connect_to(&host, port, &keys, &server, Command::Connect)?;
            client::start_session(&mut channel, session, &cap)?;
            plugin.invoke(channel, &[], &config)?;
        }
        Cmd::Terminate { key, host, port, session, cap } => {
            let server = SignPublicKey::from_hex(&key)?;
            let cap: Capability = cap.parse()?;

            let mut channel = client::connect_to(&host, port, &keys, &server, Command::Terminate)?;
            client::terminate(&mut channel, session, &cap)?;
        }
    }

    Ok(())
}
