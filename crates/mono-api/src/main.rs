use anyhow::Result;

use mono_api::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal outside local development.
    let _ = dotenvy::dotenv();
    let _telemetry = telemetry::init("mono-api")?;
    mono_api::server::run().await
}
