use anyhow::{Result, anyhow};

use super::ParsedArgs;
use crate::core::context::AppContext;
use crate::core::date::{DayInput, DayLedger};
use crate::core::terminal::{self, GuideSection};

pub(crate) async fn run_resolve(ctx: &AppContext, args: &ParsedArgs) -> Result<()> {
    let day = args
        .positional
        .first()
        .ok_or_else(|| anyhow!("Usage: imaginate resolve <day> [--latest <ts>] [--rotate]"))?;
    let latest: Option<i64> = args.parsed("latest")?;

    let date = ctx
        .resolve_date(Some(DayInput::from(day.as_str())), latest, args.has("rotate"))
        .await?;
    terminal::print_date(day, date);
    Ok(())
}

pub(crate) async fn run_ledger(ctx: &AppContext, args: &ParsedArgs) -> Result<()> {
    let sub_cmd = args.positional.first().map(|s| s.as_str()).unwrap_or("");
    match sub_cmd {
        "list" => {
            let records = ctx.ledger.list().await?;
            if records.is_empty() {
                terminal::print_info("Ledger is empty.");
                return Ok(());
            }
            let mut section = GuideSection::new("Day ledger");
            for record in records {
                let shown = record
                    .appearances
                    .iter()
                    .map(|ts| ts.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                section = section.status(
                    &format!("day {}", record.day_index),
                    &format!(
                        "{} (shown at: {})",
                        record.date,
                        if shown.is_empty() { "never" } else { shown.as_str() }
                    ),
                );
            }
            section.print();
        }
        "latest" => {
            let latest = ctx.resolver.latest_baseline(&*ctx.ledger).await?;
            terminal::print_status("Latest date", &latest.to_string());
        }
        "register" => {
            let (Some(day), Some(date)) = (args.positional.get(1), args.positional.get(2)) else {
                return Err(anyhow!("Usage: imaginate ledger register <day_index> <date>"));
            };
            let day_index: i64 = day
                .parse()
                .map_err(|_| anyhow!("Invalid day index: {}", day))?;
            let date = ctx
                .resolver
                .resolve_fixed(Some(&DayInput::from(date.as_str())))?
                .ok_or_else(|| anyhow!("Missing date"))?;

            if ctx.ledger.register_day(day_index, date).await? {
                terminal::print_success(&format!("Registered day {} at {}", day_index, date));
            } else {
                terminal::print_warn(&format!("Day {} is already in the ledger", day_index));
            }
        }
        _ => {
            terminal::print_error(
                "Unknown or missing ledger command. Expected: list, latest, register",
            );
        }
    }
    Ok(())
}
