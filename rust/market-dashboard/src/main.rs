use market_dashboard::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    market_dashboard::run().await
}
