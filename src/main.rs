use anyhow::{Context, bail};
use base64::Engine;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sia_ledger::{ExchangeOptions, Hash, SiaLedger, Transport};
use std::io::{BufWriter, Read, Write};
use tracing::debug;

/// Key index of the change output when the transaction has none
const NO_CHANGE_INDEX: u32 = u32::MAX;

#[derive(Parser)]
#[clap(version, about = "Sia wallet operations on a Ledger hardware wallet")]
struct Cli {
    /// Log every raw APDU exchange as hex
    #[clap(long, global = true, env = "SIALEDGER_APDU")]
    apdu: bool,
    /// Talk to an APDU server at host:port (e.g. Speculos) instead of USB
    #[clap(long, global = true, env = "SIALEDGER_TCP")]
    tcp: Option<String>,
    /// Defaults to `version`
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the CLI and Sia app versions
    Version(OutputArgs),
    /// Show and return the address for a key index
    Addr(IndexArgs),
    /// Show and return the public key for a key index
    Pubkey(IndexArgs),
    /// Sign a 32-byte hash with a key index
    Hash(HashArgs),
    /// Compute the signature hash of a transaction, or sign it
    Txn(TxnArgs),
    /// List Ledger devices on USB
    #[cfg(feature = "hid")]
    Devices(OutputArgs),
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(clap::Args, Debug)]
struct IndexArgs {
    index: u32,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(clap::Args, Debug)]
struct HashArgs {
    /// Hash to sign, 64 hex characters
    hash: String,
    key_index: u32,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(clap::Args, Debug)]
struct TxnArgs {
    /// Only compute the signature hash, don't sign
    #[clap(long)]
    sighash: bool,
    /// Key index of the change output
    #[clap(long, default_value_t = NO_CHANGE_INDEX)]
    change_index: u32,
    /// Binary-encoded transaction file (or - for stdin)
    input: String,
    /// Index of the signature being computed
    sig_index: u16,
    /// Key to sign with
    #[clap(required_unless_present = "sighash", conflicts_with = "sighash")]
    key_index: Option<u32>,
    #[clap(short, long)]
    output: Option<String>,
}

#[derive(Serialize)]
struct VersionOutput {
    cli_version: String,
    app_version: String,
}

#[derive(Serialize)]
struct AddressOutput {
    index: u32,
    address: String,
    pubkey: String,
}

#[derive(Serialize)]
struct PubkeyOutput {
    index: u32,
    pubkey: String,
}

#[derive(Serialize)]
struct HashSignatureOutput {
    hash: String,
    key_index: u32,
    signature: String,
}

#[derive(Serialize)]
struct TxnHashOutput {
    sig_index: u16,
    change_index: u32,
    hash: String,
}

#[derive(Serialize)]
struct TxnSignatureOutput {
    sig_index: u16,
    key_index: u32,
    change_index: u32,
    signature: String,
}

fn main() -> anyhow::Result<()> {
    let args: Cli = Cli::parse();
    init_tracing(args.apdu)?;

    let connection = Connection {
        transport: match &args.tcp {
            Some(addr) => Transport::Tcp(addr.clone()),
            None => Transport::Hid,
        },
        options: ExchangeOptions { trace: args.apdu },
    };

    let command = args
        .command
        .unwrap_or(Commands::Version(OutputArgs { output: None }));
    match command {
        Commands::Version(args) => version(&connection, args)?,
        Commands::Addr(args) => addr(&connection, args)?,
        Commands::Pubkey(args) => pubkey(&connection, args)?,
        Commands::Hash(args) => hash(&connection, args)?,
        Commands::Txn(args) => txn(&connection, args)?,
        #[cfg(feature = "hid")]
        Commands::Devices(args) => devices(args)?,
    }
    Ok(())
}

fn init_tracing(apdu: bool) -> anyhow::Result<()> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if apdu {
        filter = filter.add_directive("sia_ledger=info".parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

struct Connection {
    transport: Transport,
    options: ExchangeOptions,
}

impl Connection {
    fn open(&self) -> anyhow::Result<SiaLedger> {
        SiaLedger::open(&self.transport, self.options).with_context(|| {
            match &self.transport {
                Transport::Hid => "Couldn't open Ledger device".to_string(),
                Transport::Tcp(addr) => format!("Couldn't connect to APDU server at {addr}"),
            }
        })
    }
}

fn writer(output: Option<String>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(&path).with_context(|| format!("Failed to create {path}"))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    })
}

fn write_json<T: Serialize>(output: Option<String>, value: &T) -> anyhow::Result<()> {
    let mut writer = writer(output)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn version(connection: &Connection, args: OutputArgs) -> anyhow::Result<()> {
    let app_version = match connection.open() {
        Ok(mut ledger) => match ledger.get_version() {
            Ok(version) => version.to_string(),
            Err(e) => format!("(could not read version from device: {e})"),
        },
        Err(e) => format!("({e:#})"),
    };
    let output = VersionOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        app_version,
    };
    write_json(args.output, &output)
}

fn addr(connection: &Connection, args: IndexArgs) -> anyhow::Result<()> {
    let mut ledger = connection.open()?;
    let info = ledger
        .get_address(args.index)
        .context("Couldn't get address")?;
    let output = AddressOutput {
        index: args.index,
        address: info.address,
        pubkey: info.pubkey.to_string(),
    };
    write_json(args.output, &output)
}

fn pubkey(connection: &Connection, args: IndexArgs) -> anyhow::Result<()> {
    let mut ledger = connection.open()?;
    let key = ledger
        .get_public_key(args.index)
        .context("Couldn't get public key")?;
    let output = PubkeyOutput {
        index: args.index,
        pubkey: key.to_string(),
    };
    write_json(args.output, &output)
}

fn parse_hash(input: &str) -> anyhow::Result<Hash> {
    let bytes = hex::decode(input.trim()).context("Invalid hex hash")?;
    if bytes.len() != Hash::LEN {
        bail!("Wrong hash length ({}, wanted {})", bytes.len(), Hash::LEN);
    }
    Ok(Hash::from_slice(&bytes)?)
}

fn hash(connection: &Connection, args: HashArgs) -> anyhow::Result<()> {
    let hash = parse_hash(&args.hash)?;
    let mut ledger = connection.open()?;
    let signature = ledger
        .sign_hash(&hash, args.key_index)
        .context("Couldn't get signature")?;
    let output = HashSignatureOutput {
        hash: hash.to_string(),
        key_index: args.key_index,
        signature: base64::engine::general_purpose::STANDARD.encode(signature.as_bytes()),
    };
    write_json(args.output, &output)
}

fn read_input(input: &str) -> anyhow::Result<Vec<u8>> {
    if input == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        return Ok(buffer);
    }
    std::fs::read(input).with_context(|| format!("Couldn't read {input}"))
}

fn txn(connection: &Connection, args: TxnArgs) -> anyhow::Result<()> {
    let txn = read_input(&args.input)?;
    debug!("Read {} transaction bytes from {}", txn.len(), args.input);

    let mut ledger = connection.open()?;
    match (args.sighash, args.key_index) {
        (true, None) => {
            let hash = ledger
                .calc_txn_hash(&txn, args.sig_index, args.change_index)
                .context("Couldn't get hash")?;
            let output = TxnHashOutput {
                sig_index: args.sig_index,
                change_index: args.change_index,
                hash: hash.to_string(),
            };
            write_json(args.output, &output)
        }
        (false, Some(key_index)) => {
            let signature = ledger
                .sign_txn(&txn, args.sig_index, key_index, args.change_index)
                .context("Couldn't get signature")?;
            let output = TxnSignatureOutput {
                sig_index: args.sig_index,
                key_index,
                change_index: args.change_index,
                signature: base64::engine::general_purpose::STANDARD
                    .encode(signature.as_bytes()),
            };
            write_json(args.output, &output)
        }
        (true, Some(_)) => bail!("--sighash does not take a key index"),
        (false, None) => bail!("A key index is required to sign"),
    }
}

#[cfg(feature = "hid")]
fn devices(args: OutputArgs) -> anyhow::Result<()> {
    let devices = sia_ledger::device::list_devices().context("Couldn't enumerate USB devices")?;
    write_json(args.output, &devices)
}
