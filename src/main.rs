// src/main.rs

use hostdag::types::Status;
use hostdag::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(Status::Failed) => std::process::exit(2),
        Ok(_) => {}
        Err(err) => {
            eprintln!("hostdag error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<Status> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
