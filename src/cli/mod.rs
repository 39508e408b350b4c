mod generate;
mod resolve;

use anyhow::{Result, anyhow};
use console::style;

use crate::core::config::{self, AppConfig, DeployEnv};
use crate::core::context::AppContext;
use crate::core::terminal::{self, GuideSection};

fn print_help() {
    GuideSection::new("Dates")
        .command("resolve <day>", "Resolve a day index or timestamp to its release date")
        .command("ledger list", "Show every pinned or registered day")
        .command("ledger latest", "Show the newest known date")
        .command("ledger register <day> <date>", "Seed a content day with no appearances")
        .print();

    GuideSection::new("Generation")
        .command("generate", "Queue one image, wait for it, print queue stats")
        .command("live", "Interactive prompt loop; type 'exit' to drain and quit")
        .print();

    GuideSection::new("Flags")
        .text("resolve:  --latest <ts>  --rotate")
        .text("generate: --prompt <p> --filename <f> --theme <t> [--day <d>] [--real]")
        .text("          [--image <url|path>] [--strength <f>] [--steps <n>]")
        .text("          [--negative <n>] [--guidance <f>]")
        .print();

    println!(
        "\n {} {} <command> [subcommand]\n",
        style("Usage:").bold(),
        style("imaginate").green()
    );
}

/// Flags of the form `--name value` plus bare switches; everything else is positional.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ParsedArgs {
    pub positional: Vec<String>,
    pub values: Vec<(String, String)>,
    pub switches: Vec<String>,
}

impl ParsedArgs {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.switches.iter().any(|s| s == name)
    }

    pub fn parsed<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>> {
        match self.value(name) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| anyhow!("Invalid value for --{}: {}", name, raw)),
        }
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.value(name)
            .ok_or_else(|| anyhow!("--{} is required", name))
    }
}

const SWITCHES: &[&str] = &["rotate", "real"];

pub(crate) fn parse_args(args: &[String], start: usize) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut i = start;
    while i < args.len() {
        match args[i].strip_prefix("--") {
            Some(name) if SWITCHES.contains(&name) => {
                parsed.switches.push(name.to_string());
                i += 1;
            }
            Some(name) => {
                if i + 1 < args.len() {
                    parsed.values.push((name.to_string(), args[i + 1].clone()));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            None => {
                parsed.positional.push(args[i].clone());
                i += 1;
            }
        }
    }
    parsed
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let env = DeployEnv::from_env()?;
    let data_dir = config::data_dir();
    let app_config = AppConfig::load(&data_dir).await?;
    let log_file = app_config.log.file.as_ref().map(|f| data_dir.join(f));
    crate::logging::init(&app_config.log.level, log_file.as_deref())?;

    let ctx = AppContext::from_parts(env, data_dir, app_config).await?;
    let parsed = parse_args(&args, 2);

    match cmd {
        "resolve" => resolve::run_resolve(&ctx, &parsed).await,
        "ledger" => resolve::run_ledger(&ctx, &parsed).await,
        "generate" => generate::run_generate(&ctx, &parsed).await,
        "live" => generate::run_live(&ctx, &parsed).await,
        other => {
            terminal::print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}
