use std::fs::File;
use std::io::{BufWriter, Read, Write};

use anyhow::{Context, Result};
use tracing::info;

use loopback::{LoopbackChannel, LoopbackConfig, cli, pump};

fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let config = match &args.config_file {
        Some(path) => {
            LoopbackConfig::load(path).map_err(|e| anyhow::anyhow!("load config {}: {}", path, e))?
        }
        None => LoopbackConfig::default(),
    };
    let channel = LoopbackChannel::from_config(&config)?;
    info!(quota = channel.quota(), chunk = args.chunk_size, "loopback pump starting");

    let input: Box<dyn Read + Send> = match &args.input {
        Some(path) => Box::new(File::open(path).with_context(|| format!("open {}", path))?),
        None => Box::new(std::io::stdin()),
    };
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("create {}", path))?),
        None => Box::new(std::io::stdout().lock()),
    };

    let stats = pump::pump(&channel, input, BufWriter::new(output), args.chunk_size)?;
    info!(
        bytes = stats.bytes_read,
        stalls = stats.stalls,
        "loopback pump finished"
    );
    Ok(())
}
