//! Housemate client - Main entry point
//!
//! All the heavy lifting is done in lib.rs.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    housemate_client_lib::run().await
}
