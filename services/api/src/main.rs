#[tokio::main]
async fn main() {
    if let Err(err) = lendflow_api::run().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}
