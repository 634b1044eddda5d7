//! Read-only views over the [AggregateState] for widgets, dashboards and the cli.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::utils::time::from_epoch_millis;

use super::storage::entities::AggregateState;

/// Pixels per metre at the 96 DPI reference density.
pub const PIXELS_PER_METER: f64 = 96. / 2.54 * 100.;

/// Live handle to the daemon state. Cloning is cheap and consumers can never mutate the state.
#[derive(Clone)]
pub struct StatsHandle {
    state: watch::Receiver<AggregateState>,
    available: bool,
}

impl StatsHandle {
    pub fn new(state: watch::Receiver<AggregateState>, available: bool) -> Self {
        Self { state, available }
    }

    pub fn snapshot(&self) -> AggregateState {
        self.state.borrow().clone()
    }

    /// False for the whole lifetime of the daemon when the event source failed to start.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn stats(&self) -> InputStats {
        InputStats::new(&self.state.borrow(), self.available)
    }

    /// Waits for the next change. Fails once the owning processor is gone.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.state.changed().await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickStats {
    pub total: u64,
    pub mouse: u64,
    pub pad: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollStats {
    pub up: f64,
    pub down: f64,
    pub left: f64,
    pub right: f64,
}

/// The read model handed to presentation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputStats {
    pub available: bool,
    pub date: String,
    pub started_at: Option<DateTime<Utc>>,
    pub left: ClickStats,
    pub right: ClickStats,
    pub keys: u64,
    pub key_counts: Vec<(String, u64)>,
    pub scroll: ScrollStats,
    pub distance_px: f64,
    pub screen_width: u32,
    pub screen_height: u32,
    pub heatmap_left_max: u64,
    pub heatmap_right_max: u64,
}

impl InputStats {
    pub fn new(state: &AggregateState, available: bool) -> Self {
        let mut key_counts = state
            .key_counts
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect::<Vec<_>>();
        // Stable, so equal counts keep alphabetical order.
        key_counts.sort_by_key(|(_, count)| Reverse(*count));

        Self {
            available,
            date: state.date.clone(),
            started_at: from_epoch_millis(state.started_at),
            left: ClickStats {
                total: state.left,
                mouse: state.left_mouse,
                pad: state.left_pad,
            },
            right: ClickStats {
                total: state.right,
                mouse: state.right_mouse,
                pad: state.right_pad,
            },
            keys: state.keys,
            key_counts,
            scroll: ScrollStats {
                up: state.scroll_up,
                down: state.scroll_down,
                left: state.scroll_left,
                right: state.scroll_right,
            },
            distance_px: state.distance_px,
            screen_width: state.screen_width,
            screen_height: state.screen_height,
            heatmap_left_max: state.click_heatmap_left.max(),
            heatmap_right_max: state.click_heatmap_right.max(),
        }
    }

    pub fn clicks(&self) -> u64 {
        self.left.total.saturating_add(self.right.total)
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_px / PIXELS_PER_METER
    }

    /// Keys ordered by count, most pressed first.
    pub fn top_keys(&self, limit: usize) -> &[(String, u64)] {
        &self.key_counts[..limit.min(self.key_counts.len())]
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at
            .map(|started_at| now - started_at)
            .filter(|v| *v >= Duration::zero())
    }
}
