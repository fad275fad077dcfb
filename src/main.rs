use clap::Parser;
use tracing_subscriber::EnvFilter;

use hopper_can_runtime::config::Settings;
use hopper_can_runtime::runtime;

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let settings = Settings::parse();
    match runtime::run(&settings) {
        Ok(report) => {
            if settings.json {
                println!("{}", serde_json::to_string(&report).expect("report serializes"));
            }
        }
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            std::process::exit(1);
        }
    }
}
