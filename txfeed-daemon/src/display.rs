//! Prints feed updates as JSON lines and pages through the whole feed.

use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use txfeed_core::events::{FeedHandle, FeedUpdate, FeedUpdateReceiver, Projection, ProjectionChange};
use txfeed_sdk::objects::{FilterOption, ViewItem};

/// How long to keep printing late patches (rates resolving after the last
/// page) once the feed is fully loaded.
const SETTLE_PERIOD: Duration = Duration::from_millis(500);

/// Delay before retrying a failed page load.
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DisplayLine<'a> {
    Projection {
        change: ChangeLine<'a>,
        total: usize,
        loading: bool,
        all_shown: bool,
        /// Only the rows the change touched.
        rows: Vec<&'a ViewItem>,
    },
    FilterOptions {
        options: &'a [FilterOption],
    },
    OpenDetail {
        item: &'a ViewItem,
    },
    FetchFailed {
        reason: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ChangeLine<'a> {
    Reset,
    Loading,
    Appended { from: usize, count: usize },
    Patched { indexes: &'a [usize] },
    Rebuilt,
}

fn projection_line(projection: &Projection) -> DisplayLine<'_> {
    let items = &projection.items;
    let (change, rows) = match &projection.change {
        ProjectionChange::Reset => (ChangeLine::Reset, items.iter().collect()),
        ProjectionChange::Loading => (ChangeLine::Loading, Vec::new()),
        ProjectionChange::Appended { from, count } => (
            ChangeLine::Appended {
                from: *from,
                count: *count,
            },
            items.iter().skip(*from).take(*count).collect(),
        ),
        ProjectionChange::Patched { indexes } => (
            ChangeLine::Patched {
                indexes: indexes.as_slice(),
            },
            indexes.iter().filter_map(|index| items.get(*index)).collect(),
        ),
        ProjectionChange::Rebuilt => (ChangeLine::Rebuilt, items.iter().collect()),
    };
    DisplayLine::Projection {
        change,
        total: items.len(),
        loading: projection.loading,
        all_shown: projection.all_shown,
        rows,
    }
}

fn display_line(update: &FeedUpdate) -> DisplayLine<'_> {
    match update {
        FeedUpdate::Projection(projection) => projection_line(projection),
        FeedUpdate::FilterOptions(options) => DisplayLine::FilterOptions {
            options: options.as_slice(),
        },
        FeedUpdate::OpenDetail(item) => DisplayLine::OpenDetail { item },
        FeedUpdate::FetchFailed { reason } => DisplayLine::FetchFailed {
            reason: reason.as_str(),
        },
    }
}

/// Print updates to `out` until the feed is fully loaded and has settled.
///
/// Requests the next page whenever the loader is idle. With `follow` set
/// the display keeps running until the orchestrator stops.
pub async fn run_display(
    mut updates: FeedUpdateReceiver,
    handle: FeedHandle,
    follow: bool,
    mut out: impl Write,
) -> anyhow::Result<()> {
    let mut settled_after_all_shown = false;

    loop {
        let update = if settled_after_all_shown && !follow {
            match tokio::time::timeout(SETTLE_PERIOD, updates.recv()).await {
                Ok(update) => update,
                Err(_) => {
                    tracing::info!("Feed fully loaded");
                    return Ok(());
                }
            }
        } else {
            updates.recv().await
        };
        let Some(update) = update else {
            tracing::info!("Feed orchestrator stopped");
            return Ok(());
        };

        serde_json::to_writer(&mut out, &display_line(&update))?;
        writeln!(out)?;
        out.flush()?;

        match &update {
            FeedUpdate::Projection(projection) if projection.all_shown => {
                settled_after_all_shown = true;
            }
            FeedUpdate::Projection(projection) if !projection.loading => {
                handle.load_next().await?;
            }
            FeedUpdate::FetchFailed { reason } => {
                tracing::warn!(%reason, "Page load failed, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
                handle.load_next().await?;
            }
            _ => {}
        }
    }
}
