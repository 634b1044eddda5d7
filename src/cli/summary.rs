use std::{fmt::Write, io::IsTerminal, path::PathBuf};

use ansi_term::Style;
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use clap::Parser;

use crate::{
    daemon::{
        query::{ClickStats, InputStats},
        storage::{
            entities::AggregateState,
            state_storage::{StateFileStorage, StateStorage},
        },
    },
    utils::{
        dir::{create_application_default_path, STATE_FILE_NAME},
        percentage::count_percentage,
        time::format_duration,
    },
};

#[derive(Debug, Parser)]
pub struct SummaryCommand {
    #[arg(
        long = "state-file",
        help = "State file to read. Defaults to input-counts.json in the application directory"
    )]
    state_file: Option<PathBuf>,
    #[arg(long, default_value_t = 10, help = "Number of most pressed keys to show")]
    top: usize,
    #[arg(long, help = "Print the normalized state as json instead")]
    json: bool,
}

/// Command to process `summary`. Reads the state file with the same tolerant loader the daemon
/// uses, so a damaged file prints zeros instead of failing.
pub async fn process_summary_command(
    SummaryCommand {
        state_file,
        top,
        json,
    }: SummaryCommand,
    available: bool,
) -> Result<()> {
    let state_file = match state_file {
        Some(v) => v,
        None => create_application_default_path()?.join(STATE_FILE_NAME),
    };
    let state = StateFileStorage::new(state_file)
        .load(AggregateState::new(Utc::now()))
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let stats = InputStats::new(&state, available);
    print!(
        "{}",
        render_summary(&stats, top, Utc::now(), std::io::stdout().is_terminal())?
    );
    Ok(())
}

fn heading(text: &str, styled: bool) -> String {
    if styled {
        Style::new().bold().paint(text).to_string()
    } else {
        text.to_string()
    }
}

fn click_line(out: &mut String, name: &str, clicks: &ClickStats) -> std::fmt::Result {
    writeln!(
        out,
        "  {name:<12}{:>8}\tmouse {}\tpad {}",
        clicks.total, clicks.mouse, clicks.pad
    )
}

pub fn render_summary(
    stats: &InputStats,
    top: usize,
    now: DateTime<Utc>,
    styled: bool,
) -> Result<String> {
    let mut out = String::new();

    match stats.started_at {
        Some(started_at) => writeln!(
            out,
            "{} {} ({})",
            heading("Tracking since", styled),
            started_at.with_timezone(&Local).format("%x %H:%M"),
            stats
                .elapsed(now)
                .map(format_duration)
                .unwrap_or_else(|| "-".into())
        )?,
        None => writeln!(out, "{} unknown", heading("Tracking since", styled))?,
    }
    let status = if stats.available {
        "daemon running"
    } else {
        "daemon not running"
    };
    writeln!(out, "{} {} ({status})", heading("Day", styled), stats.date)?;
    writeln!(out)?;

    writeln!(out, "{}{:>8}", heading("Clicks        ", styled), stats.clicks())?;
    click_line(&mut out, "left", &stats.left)?;
    click_line(&mut out, "right", &stats.right)?;

    writeln!(out, "{}{:>8}", heading("Keys          ", styled), stats.keys)?;
    for (key, count) in stats.top_keys(top) {
        writeln!(
            out,
            "  {key:<12}{count:>8}\t{}",
            count_percentage(*count, stats.keys)
        )?;
    }

    writeln!(
        out,
        "{}up {:.1}\tdown {:.1}\tleft {:.1}\tright {:.1}",
        heading("Scroll        ", styled),
        stats.scroll.up,
        stats.scroll.down,
        stats.scroll.left,
        stats.scroll.right
    )?;
    writeln!(
        out,
        "{}{:.0} px ({:.2} m)",
        heading("Distance      ", styled),
        stats.distance_px,
        stats.distance_meters()
    )?;
    writeln!(
        out,
        "{}{}x{}",
        heading("Screen        ", styled),
        stats.screen_width,
        stats.screen_height
    )?;
    writeln!(
        out,
        "{}left {}\tright {}",
        heading("Heatmap peak  ", styled),
        stats.heatmap_left_max,
        stats.heatmap_right_max
    )?;

    Ok(out)
}
