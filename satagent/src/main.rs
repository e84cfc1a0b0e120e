#[tokio::main]
async fn main() -> anyhow::Result<()> {
    satagent::run_cli().await
}
