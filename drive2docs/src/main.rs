use anyhow::Context;
use drive2docs::config::{Settings, settings_path};
use drive2docs::runner::{RunMode, run_all};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    UploadLocal,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    mode: CliMode,
    settings_file: Option<String>,
    instance: Option<String>,
}

fn parse_cli<I>(args: I) -> anyhow::Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions {
        mode: CliMode::Run,
        settings_file: None,
        instance: None,
    };
    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--upload-local" => options.mode = CliMode::UploadLocal,
            "--help" | "-h" => options.mode = CliMode::Help,
            "--instance" => {
                let name = args.next().context("--instance requires a name")?;
                options.instance = Some(name);
            }
            other if other.starts_with("--instance=") => {
                options.instance = Some(other["--instance=".len()..].to_string());
            }
            other if other.starts_with('-') => anyhow::bail!("unknown argument: {other}"),
            other => {
                if options.settings_file.is_some() {
                    anyhow::bail!("unexpected argument: {other}");
                }
                options.settings_file = Some(other.to_string());
            }
        }
    }
    Ok(options)
}

fn print_usage() {
    println!("Usage: drive2docs [SETTINGS_FILE] [--instance NAME] [--upload-local]");
    println!("  SETTINGS_FILE    YAML settings (default: $SETTINGS_FILE or settings.yaml)");
    println!("  --instance NAME  Run only the named source");
    println!("  --upload-local   Upload previously downloaded files instead of migrating");
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupted, finishing in-flight items");
            cancel.cancel();
        }
        Err(err) => warn!("failed to listen for Ctrl+C: {err}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let options = parse_cli(std::env::args())?;
    let mode = match options.mode {
        CliMode::Help => {
            print_usage();
            return Ok(());
        }
        CliMode::Run => RunMode::Migrate,
        CliMode::UploadLocal => RunMode::UploadLocal,
    };

    let path = settings_path(options.settings_file.as_deref());
    let settings = Settings::load(&path)?;
    info!(path = %path.display(), "loaded settings");

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let failures = run_all(&settings, options.instance.as_deref(), mode, &cancel).await?;
    if failures > 0 {
        anyhow::bail!("{failures} instance(s) failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<CliOptions> {
        parse_cli(
            std::iter::once("drive2docs")
                .chain(args.iter().copied())
                .map(str::to_string),
        )
    }

    #[test]
    fn parse_cli_defaults_to_run() {
        let options = parse(&[]).unwrap();
        assert_eq!(options.mode, CliMode::Run);
        assert_eq!(options.settings_file, None);
        assert_eq!(options.instance, None);
    }

    #[test]
    fn parse_cli_takes_settings_file_and_instance() {
        let options = parse(&["/etc/settings.yaml", "--instance", "work"]).unwrap();
        assert_eq!(options.settings_file.as_deref(), Some("/etc/settings.yaml"));
        assert_eq!(options.instance.as_deref(), Some("work"));

        let options = parse(&["--instance=other", "--upload-local"]).unwrap();
        assert_eq!(options.instance.as_deref(), Some("other"));
        assert_eq!(options.mode, CliMode::UploadLocal);
    }

    #[test]
    fn parse_cli_supports_help() {
        assert_eq!(parse(&["-h"]).unwrap().mode, CliMode::Help);
    }

    #[test]
    fn parse_cli_rejects_unknown_and_extra_arguments() {
        assert!(parse(&["--logout"]).is_err());
        assert!(parse(&["a.yaml", "b.yaml"]).is_err());
        assert!(parse(&["--instance"]).is_err());
    }
}
