use samsung_sensors_hal::{init_tracing, run_sensor_service};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug for verbose, RUST_LOG=trace to see every decoded event
    init_tracing();

    // Load configuration from CONFIG_PATH or default
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    tracing::info!("[main] Configuration path: {}", config_path);

    run_sensor_service(&config_path).await
}
