use anyhow::{bail, Context};
use serde::Serialize;
use std::path::PathBuf;

use cellar_core::config::FILE_PASSWORD_ENV;
use cellar_core::{logging, Config};

mod node;

use node::Node;

const NODE_PROTOCOL_VERSION: u32 = 1;
const LEDGER_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
    ledger_format_version: u32,
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    json_logs: bool,
    list: bool,
    version_json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    if args.version_json {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
            ledger_format_version: LEDGER_FORMAT_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default_config(),
    };
    let passphrase = std::env::var(FILE_PASSWORD_ENV)
        .with_context(|| format!("{} must hold the file pass-phrase", FILE_PASSWORD_ENV))?;

    let node = Node::start(&config, &passphrase).context("server startup aborted")?;

    if args.list {
        print!("{}", node.trade.list_transactions()?);
        return Ok(());
    }

    tracing::info!(
        server_id = %config.server.server_id,
        users = node.certificates.users().len(),
        open_block = node.ledger.open_block_ordinal(),
        "Server ready"
    );
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => match iter.next() {
                Some(path) => parsed.config = Some(PathBuf::from(path)),
                None => bail!("--config was provided without a path"),
            },
            "--json-logs" => parsed.json_logs = true,
            "--list" => parsed.list = true,
            "--version-json" => parsed.version_json = true,
            other => bail!("unknown argument {}", other),
        }
    }
    Ok(parsed)
}
