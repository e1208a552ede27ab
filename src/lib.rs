// Public modules
pub mod config;
pub mod device;
pub mod errors;
pub mod input;
pub mod messages;
pub mod poll;
pub mod registry;
pub mod sensors;
pub mod wait;

// Re-export commonly used types
pub use config::{load_hal_config, HalConfig};
pub use device::{DeviceApiVersion, SensorsModule, SensorsPollDevice};
pub use errors::{OpenError, SensorError, SensorResult};
pub use messages::{EventPayload, SensorEvent, SensorType};
pub use poll::{DriverSources, PollContext, PollSettings};
pub use sensors::{Sensor, SensorHandle};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

/// Open the sensors device described by `config_path/hal.toml` and log every
/// event it produces until Ctrl-C.
pub async fn run_sensor_service(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("[{}] ({}) starting up...", SensorsModule::NAME, SensorsModule::AUTHOR);

    let hal_config_path = format!("{}/hal.toml", config_path);
    let config = load_hal_config(&hal_config_path)?;
    info!("[config] loaded {}", hal_config_path);

    for sensor in SensorsModule::sensors_list() {
        info!(
            "[registry] {} '{}' ({}), handle {}",
            sensor.string_type, sensor.name, sensor.vendor, sensor.handle
        );
    }

    let device = SensorsModule::open(&config, DeviceApiVersion::V1_3).await?;

    let delay_ns = i64::try_from(config.service.delay_ms)?.saturating_mul(1_000_000);
    for sensor in config.service.sensors() {
        device.activate(sensor.handle(), true).await?;
        if let Err(e) = device.set_delay(sensor.handle(), delay_ns).await {
            warn!("[main] {} keeps its default rate: {}", sensor.name(), e);
        }
        info!("[main] {} enabled", sensor.name());
    }

    let mut buffer = vec![SensorEvent::default(); config.service.event_buffer];
    info!("[main] Ready to serve sensor data");

    loop {
        tokio::select! {
            polled = device.poll(&mut buffer) => match polled {
                Ok(n) => {
                    for event in &buffer[..n] {
                        match event.to_json() {
                            Ok(json) => info!("[event] {}", json),
                            Err(e) => warn!("[event] failed to encode event: {}", e),
                        }
                    }
                }
                Err(e) => {
                    error!("[main] poll failed ({}): {}", e.errno(), e);
                    return Err(Box::new(e));
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[main] shutting down");
                break;
            }
        }
    }

    for sensor in config.service.sensors() {
        if let Err(e) = device.activate(sensor.handle(), false).await {
            warn!("[main] failed to disable {}: {}", sensor.name(), e);
        }
    }
    device.close();
    Ok(())
}
