//! Chat Worker Service - Entry Point
//!
//! Background worker that processes tenant chat events from the Redis stream.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    chat_worker::run().await
}
