//! krdump
//!
//! Command-line tool for files of concatenated Kafka record batches, such as
//! a broker's `.log` segment or a captured fetch response body.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write 10K records as lz4 batches of at most 64KB
//! krdump generate /tmp/sample.log --records 10000 --compression lz4 --batch-size 65536
//!
//! # Print batch headers and records
//! krdump dump /tmp/sample.log
//!
//! # Machine-readable output
//! krdump dump /tmp/sample.log --json
//!
//! # Only check framing and checksums
//! krdump dump /tmp/sample.log --verify-only
//! ```
//!
//! ## Configuration
//!
//! - `RUST_LOG`: log filter for the stderr log (default: info)
//! - `KRDUMP_COMPRESSION`: default compression for `generate`

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kafka_records_core::CompressionType;

mod dump;
mod generate;

#[derive(Parser)]
#[command(name = "krdump")]
#[command(about = "Inspect, verify and generate Kafka record batch files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the batches and records in a file
    Dump {
        /// File of concatenated record batches
        file: PathBuf,

        /// Emit one JSON object per batch instead of text
        #[arg(long)]
        json: bool,

        /// Check every batch and checksum, print only a summary
        #[arg(long, conflicts_with = "json")]
        verify_only: bool,
    },
    /// Write sample record batches to a file
    Generate {
        /// Output file (overwritten)
        file: PathBuf,

        /// Number of records to write
        #[arg(short = 'n', long, default_value = "1000")]
        records: u64,

        /// Format generation: 0, 1 or 2
        #[arg(long, default_value = "2")]
        magic: i8,

        /// Compression: none, gzip, snappy, lz4 or zstd
        #[arg(short, long, env = "KRDUMP_COMPRESSION", default_value = "none")]
        compression: CompressionType,

        /// Size of each record value in bytes
        #[arg(long, default_value = "100")]
        value_size: usize,

        /// Maximum uncompressed batch size in bytes
        #[arg(long, default_value = "16384")]
        batch_size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dump {
            file,
            json,
            verify_only,
        } => {
            if verify_only {
                dump::verify(&file)
            } else {
                dump::dump(&file, json)
            }
        }
        Commands::Generate {
            file,
            records,
            magic,
            compression,
            value_size,
            batch_size,
        } => generate::generate(
            &file,
            &generate::GenerateOptions {
                records,
                magic,
                compression,
                value_size,
                batch_size,
            },
        ),
    }
}
