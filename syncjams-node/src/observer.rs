use syncjams_core::{Observer, Value};

/// Logs every protocol event at a level matching its noisiness: peer churn
/// and ticks at `info`/`debug`, individual state writes and messages at
/// `trace` since they fire far more often.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn on_node_joined(&mut self, node_id: u32) {
        log::info!("peer {node_id} joined");
    }

    fn on_node_left(&mut self, node_id: u32) {
        log::info!("peer {node_id} left");
    }

    fn on_tick(&mut self, tick: u64, _tick_start_time: syncjams_core::LocalTime) {
        log::debug!("tick {tick}");
    }

    fn on_state(&mut self, node_id: u32, address: &str, value: &[Value]) {
        log::trace!("state from {node_id}: {address} = {value:?}");
    }

    fn on_message(&mut self, node_id: u32, address: &str, value: &[Value]) {
        log::trace!("message from {node_id}: {address} = {value:?}");
    }
}
