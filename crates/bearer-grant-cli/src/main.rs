#[tokio::main]
async fn main() {
    let code = bearer_grant_cli::run().await;
    std::process::exit(code);
}
