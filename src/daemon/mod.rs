use anyhow::Result;
use collection::{
    collector::InputCollectionModule,
    pointer::PointerTracker,
    source::{EventSource, LineStream},
};
use config::DaemonConfig;
use processing::{aggregator::StateAggregator, ProcessingModule};
use query::StatsHandle;
use storage::{
    activity_event::ActivityEvent,
    state_storage::{StateFileStorage, StateStorage},
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    pointer_api::{GenericPointerApi, PointerApi},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod collection;
pub mod config;
pub mod processing;
pub mod query;
pub mod shutdown;
pub mod storage;

const EVENT_BUFFER: usize = 64;
/// Click placements beyond this are dropped while the pointer tracker is busy.
const CLICK_REQUEST_BUFFER: usize = 8;

/// Represents the starting point for the daemon
pub async fn start_daemon(config: DaemonConfig) -> Result<()> {
    std::env::set_current_dir("/")?;

    let (source, lines) = match EventSource::spawn(&config.source_command) {
        Ok((source, lines)) => (Some(source), Some(lines)),
        Err(e) => {
            error!("Event source is unavailable, only pointer travel is tracked {e:?}");
            (None, None)
        }
    };

    let shutdown_token = CancellationToken::new();
    let storage = StateFileStorage::new(config.state_file.clone());
    let (modules, stats) = DaemonModules::assemble(
        &config,
        lines,
        storage,
        GenericPointerApi::new(),
        DefaultClock,
        &shutdown_token,
    )
    .await;

    let (_, result) = tokio::join!(shutdown::detect_shutdown(shutdown_token), modules.run());

    if let Some(source) = source {
        source.terminate().await;
    }

    let stats = stats.stats();
    info!(
        "Daemon stopped at {} clicks, {} keys and {:.1}m of travel",
        stats.clicks(),
        stats.keys,
        stats.distance_meters()
    );
    result
}

/// Every long running part of the daemon, wired together but not started yet.
pub struct DaemonModules<S: StateStorage> {
    collector: Option<InputCollectionModule>,
    tracker: PointerTracker,
    processor: ProcessingModule<StateAggregator<S>>,
}

impl<S: StateStorage> DaemonModules<S> {
    /// Loads the state and connects the modules. Without `lines` the daemon still tracks the
    /// pointer but reports itself as unavailable.
    pub async fn assemble(
        config: &DaemonConfig,
        lines: Option<LineStream>,
        storage: S,
        pointer_api: impl PointerApi + 'static,
        clock: impl Clock + Clone,
        shutdown_token: &CancellationToken,
    ) -> (Self, StatsHandle) {
        let (sender, receiver) = mpsc::channel::<ActivityEvent>(EVENT_BUFFER);
        let (locator, click_requests) = mpsc::channel(CLICK_REQUEST_BUFFER);

        let available = lines.is_some();
        let collector = lines.map(|lines| {
            InputCollectionModule::new(lines, sender.clone(), locator, shutdown_token.clone())
        });

        let tracker = PointerTracker::new(
            Box::new(pointer_api),
            sender,
            click_requests,
            shutdown_token.clone(),
            config.pointer_interval,
            Box::new(clock.clone()),
        );

        let aggregator =
            StateAggregator::load(storage, Box::new(clock.clone()), config.save_delay).await;
        let stats = StatsHandle::new(aggregator.subscribe(), available);
        let processor = ProcessingModule::new(
            receiver,
            aggregator,
            Box::new(clock),
            config.day_check_interval,
        );

        (
            Self {
                collector,
                tracker,
                processor,
            },
            stats,
        )
    }

    /// Runs until the shutdown token is cancelled and the processor has flushed its state.
    pub async fn run(self) -> Result<()> {
        let Self {
            collector,
            tracker,
            processor,
        } = self;

        let collection = async move {
            match collector {
                Some(collector) => collector.run().await,
                None => Ok(()),
            }
        };

        let (collection_result, tracking_result, processing_result) =
            tokio::join!(collection, tracker.run(), processor.run());

        if let Err(collection_result) = collection_result {
            error!("Collection module got an error {:?}", collection_result);
        }

        if let Err(tracking_result) = tracking_result {
            error!("Pointer tracker got an error {:?}", tracking_result);
        }

        if let Err(processing_result) = processing_result {
            error!("Processing module got an error {:?}", processing_result);
        }

        Ok(())
    }
}
