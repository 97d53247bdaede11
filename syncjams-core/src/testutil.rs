//! An in-memory [`Transport`] for driving several [`crate::Engine`]s against
//! each other in a single thread, with the ability to simulate dropped
//! datagrams between a specific pair of nodes. Only built under
//! `--features testutil`, used by the integration test suite.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::transport::Transport;

/// A shared broadcast medium that several [`MockTransport`]s connect to.
#[derive(Default)]
pub struct Network {
    inboxes: RefCell<Vec<Rc<RefCell<VecDeque<Vec<u8>>>>>>,
    blocked: RefCell<HashSet<(usize, usize)>>,
}

impl Network {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Attach a new node to the network, returning its transport.
    pub fn connect(self: &Rc<Self>) -> MockTransport {
        let inbox = Rc::new(RefCell::new(VecDeque::new()));
        let id = {
            let mut inboxes = self.inboxes.borrow_mut();
            inboxes.push(inbox.clone());
            inboxes.len() - 1
        };
        MockTransport {
            id,
            network: self.clone(),
            inbox,
        }
    }

    /// Drop every datagram sent from `from` to `to` until [`Self::unblock`].
    pub fn block(&self, from: usize, to: usize) {
        self.blocked.borrow_mut().insert((from, to));
    }

    pub fn unblock(&self, from: usize, to: usize) {
        self.blocked.borrow_mut().remove(&(from, to));
    }
}

/// One node's connection to a [`Network`].
pub struct MockTransport {
    id: usize,
    network: Rc<Network>,
    inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
}

impl MockTransport {
    /// This transport's index on the network, for use with
    /// [`Network::block`]/[`Network::unblock`].
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Transport for MockTransport {
    fn send_all(&mut self, datagram: &[u8]) {
        let inboxes = self.network.inboxes.borrow();
        let blocked = self.network.blocked.borrow();
        for (other_id, inbox) in inboxes.iter().enumerate() {
            if other_id == self.id || blocked.contains(&(self.id, other_id)) {
                continue;
            }
            inbox.borrow_mut().push_back(datagram.to_vec());
        }
    }

    fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbox.borrow_mut().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_to_every_other_node_but_not_self() {
        let network = Network::new();
        let mut a = network.connect();
        let mut b = network.connect();

        a.send_all(b"hello");
        assert_eq!(a.try_recv(), None);
        assert_eq!(b.try_recv(), Some(b"hello".to_vec()));
    }

    #[test]
    fn blocked_pairs_drop_silently() {
        let network = Network::new();
        let mut a = network.connect();
        let mut b = network.connect();
        network.block(a.id(), b.id());

        a.send_all(b"hello");
        assert_eq!(b.try_recv(), None);
    }
}
