//! Chat Gateway - Entry Point
//!
//! Accepts tenant chat requests and enqueues them for async processing.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    chat_gateway::run().await
}
