//! Command line front end for the flowkit helpers.
//!
//! Configuration comes from `--config`, or the first `flowkit.toml` found in
//! the current directory or `$HOME/.config/flowkit`.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use flowkit::core::coerce::TypeTag;

#[derive(Parser)]
#[command(name = "flowkit", version, about = "Record, identifier and validation helpers")]
struct Cli {
    /// Path to a flowkit.toml; searched for when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Short,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum CaseStyle {
    Camel,
    Dash,
    Underscore,
    Slug,
}

#[derive(Subcommand)]
enum Command {
    /// Hex digest of the concatenated parts.
    Hash {
        #[arg(value_enum)]
        algorithm: HashAlgorithm,
        parts: Vec<String>,
        /// Url-safe base64 instead of hex.
        #[arg(long)]
        base64: bool,
    },
    /// Convert an identifier between case styles.
    Case {
        #[arg(value_enum)]
        style: CaseStyle,
        identifier: String,
        /// Accept identifiers that do not start with a letter.
        #[arg(long)]
        nonstrict: bool,
    },
    /// Print the value at a `/`-separated path of a JSON or TOML file.
    Get { file: PathBuf, path: String },
    /// List files matching a name or regex in search directories.
    Find {
        pattern: String,
        /// Search directory; `$VAR` is expanded and a `//` suffix recurses.
        #[arg(long = "path", default_value = ".")]
        paths: Vec<String>,
        /// Treat the pattern as a regex over file names.
        #[arg(long)]
        regex: bool,
        /// Stop after this many results (0 = unlimited).
        #[arg(long, default_value_t = 0)]
        max: usize,
        /// Include dotfiles.
        #[arg(long)]
        all: bool,
    },
    /// Coerce a JSON value to the first preferred type that converts.
    Coerce {
        value: String,
        #[arg(long, value_delimiter = ',')]
        to: Vec<TypeTag>,
    },
    /// Validate a record file against a JSON shape.
    Check {
        file: PathBuf,
        #[arg(long)]
        shape: PathBuf,
        /// Treat every shape key as optional.
        #[arg(long)]
        optional: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = cli::load_settings(cli.config.as_deref())?;
    flowkit::logging::init(&config.logging);

    match cli.command {
        Command::Hash {
            algorithm,
            parts,
            base64,
        } => cli::hash(algorithm, &parts, base64),
        Command::Case {
            style,
            identifier,
            nonstrict,
        } => cli::case(style, &identifier, nonstrict),
        Command::Get { file, path } => cli::get(&file, &path),
        Command::Find {
            pattern,
            paths,
            regex,
            max,
            all,
        } => cli::find(&pattern, &paths, regex, max, all),
        Command::Coerce { value, to } => cli::coerce(&value, &to),
        Command::Check {
            file,
            shape,
            optional,
        } => cli::check(&file, &shape, !optional).await,
    }
}
