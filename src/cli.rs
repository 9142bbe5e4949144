use anyhow::Result;
use clap::{builder::PossibleValuesParser, value_parser};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone)]
pub struct AppArgs {
    pub config_file: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub chunk_size: usize,
    pub log_level: String,
}

fn command() -> clap::Command {
    clap::Command::new("loopback-pump")
        .version(crate::VERSION)
        .about("Pump bytes through a bounded loopback channel")
        .arg(
            clap::Arg::new("config")
                .short('c')
                .long("config")
                .help("Channel config filename")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("log-level")
                .short('l')
                .long("log")
                .help("Set log level")
                .value_parser(PossibleValuesParser::new([
                    "erro", "warn", "info", "debug", "trace",
                ]))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("Read from file instead of stdin")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("Write to file instead of stdout")
                .value_parser(value_parser!(String))
                .num_args(1),
        )
        .arg(
            clap::Arg::new("chunk")
                .long("chunk")
                .help("Write chunk size in bytes")
                .default_value("8192")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
}

pub fn parse_args() -> Result<AppArgs> {
    let args = from_matches(&command().get_matches())?;
    init_logging(&args.log_level)?;
    Ok(args)
}

pub fn parse_from<I, T>(itr: I) -> Result<AppArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    from_matches(&command().try_get_matches_from(itr)?)
}

fn from_matches(args: &clap::ArgMatches) -> Result<AppArgs> {
    let chunk_size = args.get_one::<usize>("chunk").copied().unwrap_or(8192);
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be greater than zero");
    }
    let log_level = args
        .get_one("log-level")
        .map(String::as_str)
        .unwrap_or("info")
        .to_string();
    Ok(AppArgs {
        config_file: args.get_one::<String>("config").cloned(),
        input: args.get_one::<String>("input").cloned(),
        output: args.get_one::<String>("output").cloned(),
        chunk_size,
        log_level,
    })
}

pub fn init_logging(log_level: &str) -> Result<()> {
    // the command line spells "error" as "erro"
    let log_level = if log_level == "erro" { "error" } else { log_level };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.parse()?)
                .from_env()?,
        )
        .init();
    Ok(())
}
