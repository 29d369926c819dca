use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    jobpacer::app::startup::startup().await
}
