use anyhow::{Result, anyhow};
use std::time::{SystemTime, UNIX_EPOCH};

use super::ParsedArgs;
use crate::core::context::AppContext;
use crate::core::date::DayInput;
use crate::core::generation::{
    ContentInfo, GenerationService, ImageEditParams, QueueStats, SourceImage, TextToImageParams,
};
use crate::core::terminal::{self, GuideSection};

const DEFAULT_EDIT_PROMPT: &str = "make photograph";

/// `--day` resolved without rotation, else the start of the current calendar day.
fn content_date(ctx: &AppContext, args: &ParsedArgs) -> Result<i64> {
    if let Some(day) = args.value("day") {
        return ctx
            .resolver
            .resolve_fixed(Some(&DayInput::from(day)))?
            .ok_or_else(|| anyhow!("Missing day"));
    }
    let calendar = ctx.resolver.calendar();
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64;
    let elapsed = (now - calendar.epoch).max(0);
    Ok(calendar.epoch + elapsed - elapsed % calendar.seconds_per_day)
}

fn print_stats(stats: &QueueStats) {
    GuideSection::new("Queue")
        .status("Submitted", &stats.submitted.to_string())
        .status("Published", &stats.published.to_string())
        .status("Synthesis failures", &stats.synthesis_failures.to_string())
        .status("Publish failures", &stats.publish_failures.to_string())
        .status("Panicked", &stats.panicked.to_string())
        .print();
}

async fn submit_from_args(
    service: &GenerationService,
    info: ContentInfo,
    args: &ParsedArgs,
) -> Result<uuid::Uuid> {
    let id = match args.value("image") {
        Some(image) => {
            let mut params =
                ImageEditParams::new(args.value("prompt").unwrap_or(DEFAULT_EDIT_PROMPT));
            if let Some(strength) = args.parsed("strength")? {
                params = params.edit_strength(strength);
            }
            if let Some(steps) = args.parsed("steps")? {
                params = params.inference_steps(steps);
            }
            service
                .submit_image_edit(info, SourceImage::from_arg(image), params)
                .await?
        }
        None => {
            let mut params = TextToImageParams::new(args.required("prompt")?);
            if let Some(negative) = args.value("negative") {
                params = params.negative_prompt(negative);
            }
            if let Some(steps) = args.parsed("steps")? {
                params = params.inference_steps(steps);
            }
            if let Some(guidance) = args.parsed("guidance")? {
                params = params.guidance_scale(guidance);
            }
            service.submit_text_to_image(info, params)?
        }
    };
    Ok(id)
}

pub(crate) async fn run_generate(ctx: &AppContext, args: &ParsedArgs) -> Result<()> {
    let info = ContentInfo::new(
        args.required("filename")?,
        content_date(ctx, args)?,
        args.required("theme")?,
        args.has("real"),
    );

    let service = ctx.start_generation();
    let submitted = submit_from_args(&service, info, args).await;
    // Drain even when the submission was rejected so the worker stops cleanly.
    let stats = service.shutdown().await;
    let id = submitted?;

    terminal::print_step(&format!("Task {} processed", id));
    print_stats(&stats);
    if stats.published == 1 {
        terminal::print_success("Image published.");
    } else {
        terminal::print_warn("Image was not published; see the log for details.");
    }
    Ok(())
}

pub(crate) async fn run_live(ctx: &AppContext, args: &ParsedArgs) -> Result<()> {
    let date = content_date(ctx, args)?;
    let service = ctx.start_generation();
    let mut count = 0usize;

    loop {
        let prompt = match inquire::Text::new("Enter prompt (exit to quit):").prompt() {
            Ok(p) => p,
            Err(e) => {
                terminal::print_warn(&format!("Input closed: {}", e));
                break;
            }
        };
        if prompt.trim() == "exit" {
            break;
        }

        count += 1;
        let info = ContentInfo::new(format!("live_{}.jpg", count), date, prompt.trim(), false);
        match service.submit_text_to_image(info, TextToImageParams::new(prompt.trim())) {
            Ok(id) => terminal::print_info(&format!(
                "Queued {} ({} waiting)",
                id,
                service.queue().pending()
            )),
            Err(e) => terminal::print_error(&e.to_string()),
        }
    }

    let stats = service.shutdown().await;
    print_stats(&stats);
    terminal::print_goodbye();
    Ok(())
}
