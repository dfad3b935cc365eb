use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect and inflate PNG files and zlib streams")]
struct Args {
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log every decoding step (implies -vvv)
    #[arg(long, global = true)]
    trace_events: bool,

    /// Warn about CRC and ADLER-32 mismatches instead of failing
    #[arg(long, global = true)]
    lenient: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the chunks of a PNG file
    PngInfo { file: PathBuf },
    /// Write the inflated image data of a PNG file
    PngInflate {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the header of a zlib stream
    ZlibMetadata { file: PathBuf },
    /// Inflate a zlib stream
    ZlibInflate {
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.trace_events, args.verbose) {
        (true, _) | (false, 3..) => Level::TRACE,
        (false, 2) => Level::DEBUG,
        (false, 1) => Level::INFO,
        (false, 0) => Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let options = commands::Options {
        trace_events: args.trace_events,
        lenient: args.lenient,
    };
    match args.command {
        Command::PngInfo { file } => commands::png_info(&file, &options),
        Command::PngInflate { file, output } => {
            commands::png_inflate(&file, output.as_deref(), &options)
        }
        Command::ZlibMetadata { file } => commands::zlib_metadata(&file),
        Command::ZlibInflate { file, output } => {
            commands::zlib_inflate(&file, output.as_deref(), &options)
        }
    }
}
