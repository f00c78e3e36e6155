#[tokio::main]
async fn main() {
    lodestone_lib::init_tracing();

    if let Err(e) = lodestone_lib::run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
