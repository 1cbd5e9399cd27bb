use cardmesh::prelude::*;
use tracing_subscriber::EnvFilter;

// Three nodes on localhost: a dealer on :3000 and two players. The player
// on :5000 only knows about :4000 and finds the dealer through gossip.
// Run with RUST_LOG=debug to watch the handshakes and peer lists.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dealer = Node::builder()
        .listen("127.0.0.1:3000")
        .dealer(true)
        .build()
        .await?
        .spawn();

    let alice = Node::builder().listen("127.0.0.1:4000").build().await?.spawn();
    let bob = Node::builder().listen("127.0.0.1:5000").build().await?.spawn();

    alice.connect(dealer.listen_addr()).await?;
    bob.connect(alice.listen_addr()).await?;

    tracing::info!(
        dealer = dealer.listen_addr(),
        alice = alice.listen_addr(),
        bob = bob.listen_addr(),
        "mesh started, ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    Ok(())
}
