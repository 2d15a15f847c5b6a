use std::env;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let config = rebalance::Config::new(&args).unwrap_or_else(|err| err.exit());

    if let Err(e) = rebalance::run(config) {
        eprintln!("Application error: {e}");
        process::exit(1);
    }
}
