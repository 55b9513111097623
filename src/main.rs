// src/main.rs

use pipeshard::engine::summary::EXIT_WORKER_ERROR;
use pipeshard::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("pipeshard error: {err:?}");
            std::process::exit(EXIT_WORKER_ERROR);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
