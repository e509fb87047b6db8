mod config;
mod service;

use anyhow::Result;
use config::Config;
use service::GatewayService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Resolve, load and print one capability bundle
    let gateway = GatewayService::new(config);
    gateway.run().await
}
