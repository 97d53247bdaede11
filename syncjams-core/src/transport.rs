/// Everything the engine needs from a network: broadcast out, poll inbound.
///
/// Binding a socket, choosing an interface, and the UDP/multicast specifics
/// are all out of scope for this crate (see `syncjams-node::transport` for a
/// real implementation) — the engine only ever asks for these two
/// operations.
pub trait Transport {
    /// Broadcast a single already-encoded datagram to all peers.
    fn send_all(&mut self, datagram: &[u8]);

    /// Return the next queued inbound datagram, if any, without blocking.
    fn try_recv(&mut self) -> Option<Vec<u8>>;
}
