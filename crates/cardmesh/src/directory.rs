//! The peer directory: advertised address → registered peer.
//!
//! Owned and mutated by the dispatch loop only. Peers are kept in the
//! order they registered, which is the order `peers()` reports.

use cardmesh_transport::ConnectionId;

use crate::peer::Peer;

#[derive(Default)]
pub(crate) struct PeerDirectory {
    peers: Vec<Peer>,
}

impl PeerDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, addr: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.addr() == addr)
    }

    pub(crate) fn contains(&self, addr: &str) -> bool {
        self.get(addr).is_some()
    }

    /// Registers `peer`. A peer already filed under the same address is
    /// replaced in place and returned so the caller can close it.
    pub(crate) fn insert(&mut self, peer: Peer) -> Option<Peer> {
        match self.peers.iter_mut().find(|p| p.addr() == peer.addr()) {
            Some(slot) => Some(std::mem::replace(slot, peer)),
            None => {
                self.peers.push(peer);
                None
            }
        }
    }

    /// Removes the peer at `addr`, but only if it is still the connection
    /// `conn_id`. A replaced connection's late disconnect is ignored.
    pub(crate) fn remove(
        &mut self,
        addr: &str,
        conn_id: ConnectionId,
    ) -> Option<Peer> {
        let idx = self
            .peers
            .iter()
            .position(|p| p.addr() == addr && p.id() == conn_id)?;
        Some(self.peers.remove(idx))
    }

    /// Every advertised address, in registration order.
    pub(crate) fn addrs(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(|p| p.addr())
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cardmesh_transport::{
        DEFAULT_MAX_FRAME_LEN, TcpConnection, TcpTransport, Transport,
    };

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn connection(transport: &mut TcpTransport) -> TcpConnection {
        let addr = transport.local_addr().unwrap().to_string();
        let (client, _server) = tokio::join!(
            TcpConnection::connect(
                &addr,
                Duration::from_secs(1),
                DEFAULT_MAX_FRAME_LEN
            ),
            transport.accept(),
        );
        client.unwrap()
    }

    #[tokio::test]
    async fn test_insert_keeps_registration_order() {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut dir = PeerDirectory::new();
        for addr in ["c:3", "a:1", "b:2"] {
            let conn = connection(&mut transport).await;
            assert!(dir.insert(Peer::new(addr.into(), conn, TIMEOUT)).is_none());
        }
        assert_eq!(dir.addrs().collect::<Vec<_>>(), vec!["c:3", "a:1", "b:2"]);
        assert_eq!(dir.len(), 3);
    }

    #[tokio::test]
    async fn test_insert_same_addr_replaces_in_place() {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut dir = PeerDirectory::new();
        let first = Peer::new("a:1".into(), connection(&mut transport).await, TIMEOUT);
        let first_id = first.id();
        dir.insert(first);
        dir.insert(Peer::new("b:2".into(), connection(&mut transport).await, TIMEOUT));

        let second = Peer::new("a:1".into(), connection(&mut transport).await, TIMEOUT);
        let second_id = second.id();
        let replaced = dir.insert(second).unwrap();

        assert_eq!(replaced.id(), first_id);
        assert_eq!(dir.get("a:1").unwrap().id(), second_id);
        assert_eq!(dir.addrs().collect::<Vec<_>>(), vec!["a:1", "b:2"]);
    }

    #[tokio::test]
    async fn test_remove_stale_connection_is_ignored() {
        let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut dir = PeerDirectory::new();
        let old = Peer::new("a:1".into(), connection(&mut transport).await, TIMEOUT);
        let old_id = old.id();
        dir.insert(old);
        let new = Peer::new("a:1".into(), connection(&mut transport).await, TIMEOUT);
        let new_id = new.id();
        dir.insert(new);

        assert!(dir.remove("a:1", old_id).is_none());
        assert!(dir.contains("a:1"));
        assert!(dir.remove("a:1", new_id).is_some());
        assert!(!dir.contains("a:1"));
    }
}
