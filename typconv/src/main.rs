use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use typconv::{binary_to_text, describe, text_to_binary, HeaderOverrides, TextOptions};

#[cfg(not(debug_assertions))]
const DEFAULT_DEBUG_LEVEL: u8 = 1;
#[cfg(debug_assertions)]
const DEFAULT_DEBUG_LEVEL: u8 = 3;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, default_value_t = DEFAULT_DEBUG_LEVEL, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts a binary TYP file to mkgmap text format
    #[command(name = "bin2txt")]
    BinaryToText {
        /// The binary TYP file
        input: PathBuf,

        /// The output file name
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave out XPM bitmap blocks
        #[arg(long)]
        no_xpm: bool,

        /// Leave out label strings
        #[arg(long)]
        no_labels: bool,
    },

    /// Converts a mkgmap text file to binary TYP format
    #[command(name = "txt2bin")]
    TextToBinary {
        /// The text TYP file
        input: PathBuf,

        /// The output file name
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the family ID
        #[arg(long)]
        fid: Option<u16>,

        /// Override the product ID
        #[arg(long)]
        pid: Option<u16>,

        /// Override the codepage
        #[arg(long)]
        codepage: Option<u16>,
    },

    /// Prints header fields and feature counts of a binary TYP file
    Info {
        /// The binary TYP file
        input: PathBuf,
    },

    /// Prints the tool version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::BinaryToText { input, output, no_xpm, no_labels } => {
            let output = resolve_output(output, &input, "txt")?;
            binary_to_text(
                &input,
                &output,
                TextOptions { strip_bitmaps: no_xpm, strip_labels: no_labels },
            )?;
        }
        Commands::TextToBinary { input, output, fid, pid, codepage } => {
            let output = resolve_output(output, &input, "typ")?;
            text_to_binary(&input, &output, HeaderOverrides { fid, pid, codepage })?;
        }
        Commands::Info { input } => {
            print!("{}", describe(&input)?);
        }
        Commands::Version => {
            println!("typconv {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

/// Output path next to the input, with the suffix swapped, unless one was
/// given explicitly.
fn resolve_output(output: Option<PathBuf>, input: &Path, suffix: &str) -> Result<PathBuf> {
    match output {
        Some(output) => Ok(output),
        None => {
            let mut output = PathBuf::new();
            let Some(dir) = input.parent() else {
                bail!("Invalid input file");
            };
            let Some(Some(filename)) = input.file_stem().map(|os| os.to_str()) else {
                bail!("Invalid input file");
            };
            output.push(dir);
            output.push(format!("{filename}.{suffix}"));
            info!("output name: {}", output.display());
            Ok(output)
        }
    }
}
