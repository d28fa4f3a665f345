//! The trainer stage binary launched by the pipeline scheduler.
//!
//! Flag style matches the other stage binaries (single dash):
//! `data-trainer -verbose -epochs E -sequential -hash-method M`.

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use hasher_cli::commands::training::run_training;
use hasher_cli::config::AppPaths;
use hasher_cli::training::HashMethod;

#[derive(Debug, PartialEq)]
struct TrainerArgs {
    verbose: bool,
    epochs: u32,
    sequential: bool,
    hash_method: HashMethod,
}

impl Default for TrainerArgs {
    fn default() -> Self {
        Self {
            verbose: false,
            epochs: 1,
            sequential: false,
            hash_method: HashMethod::Optimized,
        }
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<TrainerArgs> {
    let mut parsed = TrainerArgs::default();
    let mut args = args.into_iter();
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "-verbose" => parsed.verbose = true,
            "-sequential" => parsed.sequential = true,
            "-epochs" => {
                let value = args.next().context("-epochs requires a value")?;
                parsed.epochs = value
                    .parse()
                    .with_context(|| format!("invalid epoch count '{value}'"))?;
            }
            "-hash-method" => {
                let value = args.next().context("-hash-method requires a value")?;
                parsed.hash_method = HashMethod::parse(&value)
                    .with_context(|| format!("unknown hash method '{value}'"))?;
            }
            other => bail!("unknown flag '{other}'"),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    // log to stdout; the pipeline scheduler streams these lines
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    let paths = AppPaths::resolve()?;
    paths.ensure()?;
    run_training(&paths, args.hash_method, args.epochs, args.verbose).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_flag_set() {
        let parsed = parse_args(args(&[
            "-verbose",
            "-epochs",
            "3",
            "-sequential",
            "-hash-method",
            "optimized",
        ]))
        .unwrap();
        assert_eq!(
            parsed,
            TrainerArgs {
                verbose: true,
                epochs: 3,
                sequential: true,
                hash_method: HashMethod::Optimized,
            }
        );
    }

    #[test]
    fn test_defaults() {
        let parsed = parse_args(args(&[])).unwrap();
        assert_eq!(parsed, TrainerArgs::default());
    }

    #[test]
    fn test_invalid_flags_rejected() {
        assert!(parse_args(args(&["-epochs"])).is_err());
        assert!(parse_args(args(&["-epochs", "many"])).is_err());
        assert!(parse_args(args(&["-hash-method", "quantum"])).is_err());
        assert!(parse_args(args(&["--epochs", "3"])).is_err());
    }
}
