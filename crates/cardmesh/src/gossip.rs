//! Peer-list gossip.
//!
//! When a node accepts a connection it tells the newcomer about every
//! other peer it knows. The newcomer dials the ones it hasn't met, and as
//! the inbound side of each of those connections they tell it about
//! theirs, until membership converges.

use cardmesh_protocol::PeerList;

/// The list to send `target`: every known address except its own.
/// `None` when that leaves nothing to say.
pub(crate) fn peer_list_for<'a>(
    known: impl IntoIterator<Item = &'a str>,
    target: &str,
) -> Option<PeerList> {
    let peers: Vec<String> = known
        .into_iter()
        .filter(|addr| *addr != target)
        .map(str::to_string)
        .collect();
    (!peers.is_empty()).then_some(PeerList { peers })
}

/// Addresses from a received list worth dialing.
pub(crate) fn addrs_to_dial<'a>(
    list: &'a PeerList,
    local_addr: &'a str,
    already_known: impl Fn(&str) -> bool + 'a,
) -> impl Iterator<Item = &'a str> + 'a {
    list.peers
        .iter()
        .map(String::as_str)
        .filter(move |addr| *addr != local_addr && !already_known(*addr))
}
