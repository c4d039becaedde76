use crate::{
    app::App,
    config::{ConfigOverrides, SyncConfig},
    fetch::{self, FetchProgress, FetchTarget, GitCli},
    inventory,
    notice::Notice,
    remote::{self, GithubContents},
    ui,
};
use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    overrides: ConfigOverrides,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    Ui,
    List,
    Install { names: Vec<String>, all: bool },
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, global) = parse_args(&args)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("ModSync v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Ui => {
            let config = SyncConfig::load(&global.overrides)?;
            let mut app = App::initialize(config)?;
            ui::run(&mut app)
        }
        CliCommand::List => {
            let config = SyncConfig::load(&global.overrides)?;
            list_missing(&config, global.format)
        }
        CliCommand::Install { names, all } => {
            let config = SyncConfig::load(&global.overrides)?;
            install(&config, names, all)
        }
    }
}

fn parse_args(args: &[String]) -> Result<(CliCommand, GlobalOptions)> {
    let (global, tokens) = parse_global_options(args)?;
    let Some(head) = tokens.first() else {
        return Ok((CliCommand::Ui, global));
    };

    let command = match head.as_str() {
        "--help" | "-h" | "help" => CliCommand::Help,
        "--version" | "-V" | "version" => CliCommand::Version,
        "ui" => CliCommand::Ui,
        "list" => CliCommand::List,
        "install" => {
            let mut names = Vec::new();
            let mut all = false;
            for token in &tokens[1..] {
                match token.as_str() {
                    "--all" | "-a" => all = true,
                    value if value.starts_with('-') => bail!("Unknown install option: {value}"),
                    value => names.push(value.to_string()),
                }
            }
            if all && !names.is_empty() {
                bail!("install takes either --all or file names, not both");
            }
            if !all && names.is_empty() {
                bail!("install requires file names or --all");
            }
            CliCommand::Install { names, all }
        }
        other => bail!("Unknown command: {other} (see --help)"),
    };
    Ok((command, global))
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut overrides = ConfigOverrides::default();
    let mut tokens = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let (key, inline) = match arg.split_once('=') {
            Some((key, value)) if key.starts_with("--") => (key, Some(value.to_string())),
            _ => (arg.as_str(), None),
        };
        let takes_value = matches!(
            key,
            "--format"
                | "--dir"
                | "--owner"
                | "--repo"
                | "--branch"
                | "--remote"
                | "--api"
                | "--ext"
                | "--config"
                | "--log-file"
        );
        if !takes_value {
            tokens.push(arg.to_string());
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => match iter.next() {
                Some(value) => value.to_string(),
                None => bail!("{key} requires a value"),
            },
        };
        match key {
            "--format" => {
                format = OutputFormat::parse(&value)
                    .ok_or_else(|| anyhow::anyhow!("Unknown format: {value} (use text or json)"))?;
            }
            "--dir" => overrides.mods_dir = Some(PathBuf::from(value)),
            "--owner" => overrides.owner = Some(value),
            "--repo" => overrides.repo = Some(value),
            "--branch" => overrides.branch = Some(value),
            "--remote" => overrides.remote = Some(value),
            "--api" => overrides.api_base = Some(value),
            "--ext" => overrides.extension = Some(value),
            "--config" => overrides.config_path = Some(PathBuf::from(value)),
            "--log-file" => overrides.log_file = Some(PathBuf::from(value)),
            _ => {}
        }
    }

    Ok((GlobalOptions { format, overrides }, tokens))
}

#[derive(Serialize)]
struct ListReport {
    repository: String,
    mods_dir: PathBuf,
    local: Vec<String>,
    remote: Vec<String>,
    missing: Vec<String>,
    truncated: bool,
}

fn list_missing(config: &SyncConfig, format: OutputFormat) -> Result<()> {
    let local = inventory::local_mods(&config.mods_dir(), &config.extension)?;
    let listing = GithubContents::new(config.contents_url());
    let inventory = remote::remote_inventory(&listing, &config.extension);
    if let Some(notice) = inventory.notice() {
        return Err(notice_error(&notice));
    }
    if inventory.truncated {
        eprintln!(
            "warning: remote listing hit the {} entry limit; results may be incomplete",
            remote::LISTING_CAP
        );
    }
    let missing = inventory::missing_mods(&local, &inventory.mods);

    match format {
        OutputFormat::Json => {
            let report = ListReport {
                repository: config.repo_label(),
                mods_dir: config.mods_dir(),
                local: local.into_iter().collect(),
                remote: inventory.mods.into_iter().collect(),
                missing,
                truncated: inventory.truncated,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            if missing.is_empty() {
                println!("Your mods directory is up to date!");
            }
            for name in missing {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn install(config: &SyncConfig, names: Vec<String>, all: bool) -> Result<()> {
    let local = inventory::local_mods(&config.mods_dir(), &config.extension)?;
    let listing = GithubContents::new(config.contents_url());
    let inventory = remote::remote_inventory(&listing, &config.extension);
    if let Some(notice) = inventory.notice() {
        return Err(notice_error(&notice));
    }
    let missing = inventory::missing_mods(&local, &inventory.mods);
    let selected = resolve_selection(&missing, names, all)?;
    if selected.is_empty() {
        println!("Your mods directory is up to date!");
        return Ok(());
    }

    let target = FetchTarget::from_config(config);
    let outcome = fetch::selective_fetch(&GitCli::default(), &target, &selected, |step| {
        match step {
            FetchProgress::Fetching => println!("Fetching {}", target.remote),
            FetchProgress::CheckingOut { index, total, name } => {
                println!("[{}/{total}] {name}", index + 1)
            }
            FetchProgress::Installed { .. } => {}
        }
    });

    match outcome.notice() {
        Some(notice) if notice.is_error() => Err(notice_error(&notice)),
        Some(notice) => {
            println!("{}", notice.message);
            Ok(())
        }
        None => Ok(()),
    }
}

/// Named files must all be in the Missing Set; order follows the arguments.
fn resolve_selection(missing: &[String], names: Vec<String>, all: bool) -> Result<Vec<String>> {
    if all {
        return Ok(missing.to_vec());
    }
    let unknown: Vec<&str> = names
        .iter()
        .filter(|name| !missing.contains(*name))
        .map(|name| name.as_str())
        .collect();
    if !unknown.is_empty() {
        bail!("Not missing from the mods directory: {}", unknown.join(", "));
    }
    let mut selected: Vec<String> = Vec::new();
    for name in names {
        if !selected.contains(&name) {
            selected.push(name);
        }
    }
    Ok(selected)
}

fn notice_error(notice: &Notice) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", notice.title, notice.message)
}

fn print_help() {
    println!("ModSync v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  modsync                          Launch the install checklist");
    println!("  modsync list                     Print mods missing from the mods directory");
    println!("  modsync install <files...>       Install the named missing mods");
    println!("  modsync install --all            Install every missing mod");
    println!();
    println!("Options:");
    println!("  --dir <path>                     Mods directory (default: next to the binary)");
    println!("  --owner <name>                   Repository owner");
    println!("  --repo <name>                    Repository name");
    println!("  --branch <name>                  Branch to check out from");
    println!("  --remote <name>                  Git remote name (default: origin)");
    println!("  --api <url>                      API base URL");
    println!("  --ext <suffix>                   File suffix to compare (default: .jar)");
    println!("  --config <file>                  Read settings from a JSON file");
    println!("  --log-file <file>                Append log entries to a file");
    println!("  --format <json|text>             Output format for list");
    println!("  -h, --help                       Show help");
    println!("  -V, --version                    Show version");
}
