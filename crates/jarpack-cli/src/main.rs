//! Jarpack command-line tool
//!
//! Merges dependency archives and compiled classes into one executable jar.
//!
//! Exit codes: 0 success, 1 other failure, 2 invalid arguments, 3 no inputs,
//! 4 input/output error, 5 duplicate entry.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::{bundle, init, inspect};
use jarpack::{BundleError, DuplicatePolicy, ErrorKind, ReadError};
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jarpack")]
#[command(about = "Merge archives into a single executable jar", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, value_parser = ["auto", "always", "never"])]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge input archives into one executable jar
    Bundle {
        /// Input jars or class directories, in merge order (defaults to jarpack.toml)
        inputs: Vec<PathBuf>,
        /// Fully-qualified class to run (Main-Class)
        #[arg(short, long)]
        main_class: Option<String>,
        /// Output jar path
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Duplicate entry policy: first-wins, last-wins or error
        #[arg(short, long)]
        duplicates: Option<DuplicatePolicy>,
        /// Glob pattern of entries to drop (repeatable)
        #[arg(short = 'x', long)]
        exclude: Vec<String>,
        /// Keep signature files of signed jars
        #[arg(long)]
        no_default_excludes: bool,
        /// Extra manifest attribute as KEY=VALUE (repeatable)
        #[arg(short, long = "attribute", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        /// Number of inputs read in parallel (0 = one per CPU)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Path to jarpack.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the entries and main class of an archive
    Inspect {
        /// Archive to inspect
        archive: PathBuf,
    },

    /// Create a jarpack.toml
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Main class to launch
        #[arg(short, long)]
        main_class: Option<String>,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty attribute name in '{}'", raw));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(err) = err.downcast_ref::<BundleError>() {
        return match err.kind() {
            ErrorKind::InvalidArgument => 2,
            ErrorKind::EmptyInput => 3,
            ErrorKind::Io => 4,
            ErrorKind::DuplicateEntry => 5,
        };
    }
    if err.downcast_ref::<ReadError>().is_some() {
        return 4;
    }
    1
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    let result = match cli.command {
        Commands::Bundle {
            inputs,
            main_class,
            output,
            duplicates,
            exclude,
            no_default_excludes,
            attributes,
            jobs,
            config,
        } => bundle::execute(
            bundle::BundleCommand {
                inputs,
                main_class,
                output,
                duplicates,
                exclude,
                no_default_excludes,
                attributes,
                jobs,
                config,
            },
            &mut out,
        ),

        Commands::Inspect { archive } => inspect::execute(&archive, &mut out),

        Commands::Init { path, main_class } => init::execute(&path, main_class.as_deref(), &mut out),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            out.stderr_error(&format!("{:#}", err));
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_attribute() {
        assert_eq!(
            parse_attribute("Implementation-Version=1.0").unwrap(),
            ("Implementation-Version".to_string(), "1.0".to_string())
        );
        assert_eq!(
            parse_attribute("Class-Path=a.jar b.jar").unwrap().1,
            "a.jar b.jar"
        );
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=x").is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&BundleError::EmptyInput.into()), 3);
        assert_eq!(
            exit_code(
                &BundleError::DuplicateEntry {
                    name: "x".into(),
                    first: 0,
                    second: 1
                }
                .into()
            ),
            5
        );
        assert_eq!(
            exit_code(&BundleError::InvalidEntryPoint(String::new()).into()),
            2
        );
        assert_eq!(exit_code(&ReadError::Malformed("bad".into()).into()), 4);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }

    #[test]
    fn test_parse_bundle_args() {
        let cli = Cli::parse_from([
            "jarpack", "bundle", "a.jar", "b.jar", "-m", "App", "-o", "out.jar", "-d",
            "last-wins", "-a", "K=V", "-x", "*.txt",
        ]);
        match cli.command {
            Commands::Bundle {
                inputs,
                main_class,
                duplicates,
                attributes,
                exclude,
                ..
            } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(main_class.as_deref(), Some("App"));
                assert_eq!(duplicates, Some(DuplicatePolicy::LastWins));
                assert_eq!(attributes, vec![("K".to_string(), "V".to_string())]);
                assert_eq!(exclude, vec!["*.txt".to_string()]);
            }
            _ => panic!("expected bundle command"),
        }
    }
}
