use clap::Parser;
use tracing_subscriber::EnvFilter;

use insight_chat_lib::cli::CliArgs;

const DEFAULT_LOG_FILTER: &str = "insight_chat=info,insight_chat_lib=info,tower_http=warn";

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Err(e) = insight_chat_lib::run(args).await {
        tracing::error!(error = %e, "insight-chat exited with an error");
        std::process::exit(1);
    }
}
