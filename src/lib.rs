//! Daemon and cli for tallying clicks, key presses, scrolling and pointer travel.
//! The daemon reads a device event logger (`libinput debug-events` by default), keeps running
//! totals together with two click heatmaps and persists them into a single JSON file that other
//! tools, like status bar widgets or dashboards, can read.

pub mod cli;
pub mod daemon;
pub mod fs;
pub mod pointer_api;
pub mod utils;
