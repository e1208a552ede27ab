pub mod hal_config;

pub use hal_config::{
    load_hal_config, DriverConfig, DriversConfig, HalConfig, InputConfig, PollConfig, ServiceConfig,
};
