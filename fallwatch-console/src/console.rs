//! Wires the console workers together.

use crate::alerts::alert_channel;
use crate::ingest::{IngestRouter, IngestStats};
use crate::operator::OperatorCommand;
use crate::persistence::{PersistenceQueue, PersistenceStats, persistence_queue};
use crate::subscriptions::run_subscription_refresh;
use crate::sync::SyncLoop;
use crate::view::ConsoleView;
use fallwatch_bus::{BusClient, InboundReceiver, TopicCodec, run_dispatch};
use fallwatch_lib::config::{BrokerConfig, ConsoleConfig};
use fallwatch_lib::shutdown::ShutdownSignal;
use fallwatch_lib::storage::DatabaseManager;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Topic codec for the console's configuration.
pub fn console_codec(broker: &BrokerConfig, console: &ConsoleConfig) -> TopicCodec {
    if console.full_id_decode {
        TopicCodec::with_full_ids(broker.topic_prefix.clone())
    } else {
        TopicCodec::new(broker.topic_prefix.clone())
    }
}

/// Final counters reported after shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsoleSummary {
    pub ingest: IngestStats,
    pub persistence: PersistenceStats,
}

/// A running console: dispatch, persistence writer, synchronization loop
/// and subscription refresh, one task each.
pub struct Console {
    commands: mpsc::UnboundedSender<OperatorCommand>,
    view: watch::Receiver<ConsoleView>,
    persistence: PersistenceQueue,
    dispatch: JoinHandle<IngestRouter>,
    writer: JoinHandle<PersistenceStats>,
    sync: JoinHandle<()>,
    subscriptions: JoinHandle<BusClient>,
}

impl Console {
    /// Spawn every worker. They all stop when `shutdown` fires.
    pub fn start(
        client: BusClient,
        inbound: InboundReceiver,
        db: Arc<DatabaseManager>,
        config: &ConsoleConfig,
        shutdown: &ShutdownSignal,
    ) -> Self {
        let (persistence, writer) =
            persistence_queue(Arc::clone(&db), config.persistence_queue_capacity);
        let (alerts_tx, alerts_rx) = alert_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let router = IngestRouter::new(client.codec().clone(), persistence.clone(), alerts_tx);
        let (sync_loop, view) = SyncLoop::new(Arc::clone(&db), alerts_rx, commands_rx);

        let writer = tokio::spawn(writer.run(shutdown.clone()));
        let dispatch = tokio::spawn(run_dispatch(inbound, router, shutdown.clone()));
        let sync = tokio::spawn(sync_loop.run(config.sync_interval(), shutdown.clone()));
        let subscriptions = tokio::spawn(run_subscription_refresh(
            client,
            db,
            config.patient_refresh_interval(),
            shutdown.clone(),
        ));

        info!(
            sync_interval_ms = config.sync_interval_ms,
            queue_capacity = config.persistence_queue_capacity,
            "Console started"
        );

        Self {
            commands,
            view,
            persistence,
            dispatch,
            writer,
            sync,
            subscriptions,
        }
    }

    /// Hand an operator command to the synchronization loop.
    pub fn send(&self, command: OperatorCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Subscribe to view updates.
    pub fn view(&self) -> watch::Receiver<ConsoleView> {
        self.view.clone()
    }

    pub fn persistence_stats(&self) -> PersistenceStats {
        self.persistence.stats()
    }

    /// Wait for every worker to finish after shutdown has been triggered,
    /// then close the bus session.
    pub async fn join(self) -> ConsoleSummary {
        let mut summary = ConsoleSummary::default();

        match self.dispatch.await {
            Ok(router) => summary.ingest = router.stats(),
            Err(e) => warn!(error = %e, "Dispatch task failed"),
        }
        match self.writer.await {
            Ok(stats) => summary.persistence = stats,
            Err(e) => warn!(error = %e, "Persistence writer task failed"),
        }
        if let Err(e) = self.sync.await {
            warn!(error = %e, "Synchronization task failed");
        }
        match self.subscriptions.await {
            Ok(client) => {
                if let Err(e) = client.disconnect().await {
                    warn!(error = %e, "Bus disconnect failed");
                }
            }
            Err(e) => warn!(error = %e, "Subscription task failed"),
        }

        info!(
            received = summary.ingest.received,
            falls = summary.ingest.falls,
            applied = summary.persistence.applied,
            dropped = summary.persistence.dropped,
            "Console stopped"
        );
        summary
    }
}
