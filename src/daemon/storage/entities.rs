use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{
    pointer_api::{PointerPosition, ScreenBounds},
    utils::time::day_key,
};

use super::activity_event::{ActivityEvent, ClickSource, Side};

pub const HEATMAP_COLS: usize = 96;
pub const HEATMAP_ROWS: usize = 54;
pub const HEATMAP_CELLS: usize = HEATMAP_COLS * HEATMAP_ROWS;

/// Row-major click counts over a [HEATMAP_COLS] x [HEATMAP_ROWS] grid laid over the combined
/// screen. Always holds exactly [HEATMAP_CELLS] cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Heatmap(Vec<u64>);

impl Default for Heatmap {
    fn default() -> Self {
        Self(vec![0; HEATMAP_CELLS])
    }
}

impl Heatmap {
    /// Accepts `cells` only if it has the exact grid length.
    pub fn from_cells(cells: Vec<u64>) -> Option<Self> {
        (cells.len() == HEATMAP_CELLS).then_some(Self(cells))
    }

    pub fn cells(&self) -> &[u64] {
        &self.0
    }

    pub fn get(&self, col: usize, row: usize) -> Option<u64> {
        if col >= HEATMAP_COLS || row >= HEATMAP_ROWS {
            return None;
        }
        self.0.get(row * HEATMAP_COLS + col).copied()
    }

    pub fn max(&self) -> u64 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    fn increment(&mut self, cell: usize) -> bool {
        match self.0.get_mut(cell) {
            Some(value) => {
                *value = value.saturating_add(1);
                true
            }
            None => false,
        }
    }
}

/// Maps an absolute pointer position into a heatmap cell index. Positions outside of `bounds`
/// are clamped onto the border cells. `None` only when the position can't be normalized.
pub fn heatmap_cell(position: PointerPosition, bounds: ScreenBounds) -> Option<usize> {
    let rel_x = (position.x - bounds.x as f64) / bounds.width.max(1) as f64;
    let rel_y = (position.y - bounds.y as f64) / bounds.height.max(1) as f64;
    if !rel_x.is_finite() || !rel_y.is_finite() {
        return None;
    }
    let col = (rel_x * HEATMAP_COLS as f64)
        .floor()
        .clamp(0., (HEATMAP_COLS - 1) as f64) as usize;
    let row = (rel_y * HEATMAP_ROWS as f64)
        .floor()
        .clamp(0., (HEATMAP_ROWS - 1) as f64) as usize;
    Some(row * HEATMAP_COLS + col)
}

/// The persisted running totals. Mutated only through the reducer methods below, every one of
/// which keeps `left == left_mouse + left_pad` and `right == right_mouse + right_pad`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    /// Day key (`YYYY-MM-DD`) of the first run. Stamped once, never rotated.
    pub date: String,
    /// Unix epoch in milliseconds.
    pub started_at: i64,
    pub screen_width: u32,
    pub screen_height: u32,
    pub left: u64,
    pub right: u64,
    pub keys: u64,
    pub left_mouse: u64,
    pub right_mouse: u64,
    pub left_pad: u64,
    pub right_pad: u64,
    pub scroll_up: f64,
    pub scroll_down: f64,
    pub scroll_left: f64,
    pub scroll_right: f64,
    pub distance_px: f64,
    pub click_heatmap_left: Heatmap,
    pub click_heatmap_right: Heatmap,
    /// Never contains a zero count.
    pub key_counts: BTreeMap<String, u64>,
}

impl AggregateState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            date: day_key(now),
            started_at: now.timestamp_millis(),
            screen_width: 0,
            screen_height: 0,
            left: 0,
            right: 0,
            keys: 0,
            left_mouse: 0,
            right_mouse: 0,
            left_pad: 0,
            right_pad: 0,
            scroll_up: 0.,
            scroll_down: 0.,
            scroll_left: 0.,
            scroll_right: 0.,
            distance_px: 0.,
            click_heatmap_left: Heatmap::default(),
            click_heatmap_right: Heatmap::default(),
            key_counts: BTreeMap::new(),
        }
    }

    /// Dispatches an event to its reducer. Returns whether persisted state changed.
    pub fn apply(&mut self, event: &ActivityEvent) -> bool {
        match event {
            ActivityEvent::Click { side, source } => {
                self.bump_click(*side, *source);
                true
            }
            ActivityEvent::Key { name } => {
                self.bump_key(name);
                true
            }
            ActivityEvent::Scroll {
                vertical,
                horizontal,
            } => self.bump_scroll(*vertical, *horizontal),
            ActivityEvent::ClickPosition {
                side,
                position,
                bounds,
            } => self.record_click_at_pointer(*side, *position, *bounds),
            ActivityEvent::Travel { distance_px } => self.add_distance(*distance_px),
            ActivityEvent::ScreenSize(bounds) => self.update_screen_size(*bounds),
        }
    }

    pub fn bump_click(&mut self, side: Side, source: ClickSource) {
        let (total, mouse, pad) = match side {
            Side::Left => (&mut self.left, &mut self.left_mouse, &mut self.left_pad),
            Side::Right => (&mut self.right, &mut self.right_mouse, &mut self.right_pad),
        };
        let split = match source {
            ClickSource::Mouse => mouse,
            ClickSource::Touchpad => pad,
        };
        *total = total.saturating_add(1);
        *split = split.saturating_add(1);
    }

    pub fn bump_key(&mut self, name: &str) {
        self.keys = self.keys.saturating_add(1);
        let count = self.key_counts.entry(name.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Positive vertical scrolls count as up, negative as down. Horizontal positive is right.
    pub fn bump_scroll(&mut self, vertical: Option<f64>, horizontal: Option<f64>) -> bool {
        let usable = |v: Option<f64>| v.filter(|v| v.is_finite() && *v != 0.);
        let mut changed = false;
        if let Some(v) = usable(vertical) {
            if v > 0. {
                self.scroll_up += v;
            } else {
                self.scroll_down += v.abs();
            }
            changed = true;
        }
        if let Some(h) = usable(horizontal) {
            if h > 0. {
                self.scroll_right += h;
            } else {
                self.scroll_left += h.abs();
            }
            changed = true;
        }
        changed
    }

    pub fn record_click_at_pointer(
        &mut self,
        side: Side,
        position: PointerPosition,
        bounds: ScreenBounds,
    ) -> bool {
        let Some(cell) = heatmap_cell(position, bounds) else {
            return false;
        };
        self.update_screen_size(bounds);
        match side {
            Side::Left => self.click_heatmap_left.increment(cell),
            Side::Right => self.click_heatmap_right.increment(cell),
        }
    }

    /// Returns false when the size is unchanged or degenerate.
    pub fn update_screen_size(&mut self, bounds: ScreenBounds) -> bool {
        if bounds.width == 0 || bounds.height == 0 {
            return false;
        }
        if self.screen_width == bounds.width && self.screen_height == bounds.height {
            return false;
        }
        self.screen_width = bounds.width;
        self.screen_height = bounds.height;
        true
    }

    pub fn add_distance(&mut self, distance_px: f64) -> bool {
        if !distance_px.is_finite() || distance_px <= 0. {
            return false;
        }
        self.distance_px += distance_px;
        true
    }

    /// Stamps the day marker if it is empty. An existing marker is never replaced.
    pub fn stamp_day(&mut self, today: &str) -> bool {
        if !self.date.is_empty() || today.is_empty() {
            return false;
        }
        self.date = today.to_string();
        true
    }

    /// Builds a state out of arbitrary JSON. Every field is validated on its own and replaced
    /// with the value from `fallback` (or zero) when absent or invalid. Unknown fields are
    /// ignored.
    pub fn from_json_value(value: &Value, fallback: AggregateState) -> AggregateState {
        let Some(raw) = value.as_object() else {
            return fallback;
        };

        let date = match raw.get("date") {
            Some(Value::String(date)) if !date.is_empty() => date.clone(),
            _ => fallback.date,
        };
        let started_at = raw
            .get("startedAt")
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v as i64)
            .filter(|v| *v > 0)
            .unwrap_or(fallback.started_at);

        let heatmap = |name: &str| {
            raw.get(name)
                .and_then(Value::as_array)
                .and_then(|cells| {
                    Heatmap::from_cells(cells.iter().map(|cell| to_count(Some(cell))).collect())
                })
                .unwrap_or_default()
        };

        let key_counts = raw
            .get("keyCounts")
            .and_then(Value::as_object)
            .map(|counts| {
                counts
                    .iter()
                    .map(|(key, count)| (key.clone(), to_count(Some(count))))
                    .filter(|(_, count)| *count > 0)
                    .collect()
            })
            .unwrap_or_default();

        let mut state = AggregateState {
            date,
            started_at,
            screen_width: to_count(raw.get("screenWidth")).min(u32::MAX as u64) as u32,
            screen_height: to_count(raw.get("screenHeight")).min(u32::MAX as u64) as u32,
            left: to_count(raw.get("left")),
            right: to_count(raw.get("right")),
            keys: to_count(raw.get("keys")),
            left_mouse: to_count(raw.get("leftMouse")),
            right_mouse: to_count(raw.get("rightMouse")),
            left_pad: to_count(raw.get("leftPad")),
            right_pad: to_count(raw.get("rightPad")),
            scroll_up: to_magnitude(raw.get("scrollUp")),
            scroll_down: to_magnitude(raw.get("scrollDown")),
            scroll_left: to_magnitude(raw.get("scrollLeft")),
            scroll_right: to_magnitude(raw.get("scrollRight")),
            distance_px: to_magnitude(raw.get("distancePx")),
            click_heatmap_left: heatmap("clickHeatmapLeft"),
            click_heatmap_right: heatmap("clickHeatmapRight"),
            key_counts,
        };
        state.reconcile_click_totals();
        state
    }

    /// Snapshots written by older producers may carry totals that disagree with their splits.
    /// Unattributed clicks go to the mouse counter, a total lower than its split is raised.
    fn reconcile_click_totals(&mut self) {
        let reconcile = |total: &mut u64, mouse: &mut u64, pad: u64| {
            let split = mouse.saturating_add(pad);
            if *total > split {
                *mouse = mouse.saturating_add(*total - split);
            } else {
                *total = split;
            }
        };
        reconcile(&mut self.left, &mut self.left_mouse, self.left_pad);
        reconcile(&mut self.right, &mut self.right_mouse, self.right_pad);
    }
}

/// Lenient numeric coercion: numbers pass, numeric strings are parsed, booleans are 0/1 and
/// everything else (including non-finite values) is 0.
fn to_number(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<f64>().unwrap_or(0.),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.,
    };
    if number.is_finite() {
        number
    } else {
        0.
    }
}

fn to_count(value: Option<&Value>) -> u64 {
    let number = to_number(value);
    if number <= 0. {
        0
    } else {
        number.floor() as u64
    }
}

fn to_magnitude(value: Option<&Value>) -> f64 {
    to_number(value).max(0.)
}
