use syncjams_common::LocalTime;
use syncjams_wire::Value;

/// Callbacks fired by the engine as protocol events occur.
///
/// The teacher's `fsm::Hooks` wires up a handful of `Arc<dyn Fn>` fields for
/// this purpose; here the same role is played by a trait with no-op
/// defaults, so a caller only overrides the events it cares about and the
/// engine stays generic over the observer type instead of boxing closures.
#[allow(unused_variables)]
pub trait Observer {
    /// A new peer was heard from for the first time.
    fn on_node_joined(&mut self, node_id: u32) {}

    /// A peer has not been heard from in [`crate::constants::NODE_TIMEOUT`]
    /// (or sent an explicit `/leave`) and was forgotten.
    fn on_node_left(&mut self, node_id: u32) {}

    /// The local tick counter advanced, whether by local elapsed time or by
    /// jumping to a peer's more advanced tick.
    fn on_tick(&mut self, tick: u64, tick_start_time: LocalTime) {}

    /// A state write was accepted into the local store.
    fn on_state(&mut self, node_id: u32, address: &str, value: &[Value]) {}

    /// An application message was accepted, in order, from a peer.
    fn on_message(&mut self, node_id: u32, address: &str, value: &[Value]) {}
}

/// An [`Observer`] that does nothing, for callers that only want the engine
/// itself (e.g. driving it purely through `get_state`/`get_node_list`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl Observer for NullObserver {}
