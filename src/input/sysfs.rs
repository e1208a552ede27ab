use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::errors::{OpenError, OpenResult, SensorError, SensorResult};

pub const ENABLE_ATTR: &str = "enable";
pub const POLL_DELAY_ATTR: &str = "poll_delay";

/// Writable attribute directory of one input device (`/sys/class/input/inputN`)
pub struct SysfsControl {
    dir: PathBuf,
    warned: AtomicBool,
}

impl SysfsControl {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            warned: AtomicBool::new(false),
        }
    }

    /// Write `value` followed by a newline to an existing attribute.
    ///
    /// A failure to open is logged only the first time for this control.
    pub async fn write_int(&self, attr: &str, value: i64) -> SensorResult<()> {
        let path = self.dir.join(attr);
        debug!("[sysfs] write_int: path=\"{}\", value=\"{}\"", path.display(), value);

        let mut file = match tokio::fs::OpenOptions::new().write(true).truncate(true).open(&path).await {
            Ok(file) => file,
            Err(source) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    error!("[sysfs] write_int failed to open {}: {}", path.display(), source);
                }
                return Err(SensorError::Control { path, source });
            }
        };

        let payload = format!("{}\n", value);
        file.write_all(payload.as_bytes())
            .await
            .map_err(|source| SensorError::Control { path: path.clone(), source })?;
        file.flush()
            .await
            .map_err(|source| SensorError::Control { path, source })
    }
}

/// Where a named input device lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevicePaths {
    /// Character device to read events from (`/dev/input/eventN`)
    pub device: PathBuf,
    /// Attribute directory (`/sys/class/input/inputN`)
    pub control: PathBuf,
}

/// Look up an input device by the name it registered with the kernel.
///
/// Scans `sysfs_root/input*/name`; the matching directory's `eventN` child
/// names the node under `dev_root`.
pub async fn find_input_device(sysfs_root: &Path, dev_root: &Path, name: &str) -> OpenResult<InputDevicePaths> {
    let discovery = |source: std::io::Error| OpenError::Discovery {
        root: sysfs_root.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(sysfs_root).await.map_err(discovery)?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(discovery)? {
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with("input") {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    for dir in candidates {
        let Ok(found) = tokio::fs::read_to_string(dir.join("name")).await else {
            continue;
        };
        if found.trim() != name {
            continue;
        }
        if let Some(event_node) = event_node_of(&dir).await {
            debug!("[sysfs] '{}' is {} ({})", name, event_node, dir.display());
            return Ok(InputDevicePaths {
                device: dev_root.join(event_node),
                control: dir,
            });
        }
    }

    Err(OpenError::DeviceNotFound {
        name: name.to_string(),
        root: sysfs_root.to_path_buf(),
    })
}

async fn event_node_of(dir: &Path) -> Option<String> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.starts_with("event") {
            return Some(file_name);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_input(root: &Path, index: u32, name: &str, event: u32) -> PathBuf {
        let dir = root.join(format!("input{}", index));
        std::fs::create_dir_all(dir.join(format!("event{}", event))).unwrap();
        std::fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
        std::fs::write(dir.join(ENABLE_ATTR), "0\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_find_input_device_by_name() {
        let sysfs = tempfile::tempdir().unwrap();
        fake_input(sysfs.path(), 0, "gyro_sensor", 0);
        let light = fake_input(sysfs.path(), 3, "light_sensor", 5);

        let paths = find_input_device(sysfs.path(), Path::new("/dev/input"), "light_sensor")
            .await
            .unwrap();
        assert_eq!(paths.device, PathBuf::from("/dev/input/event5"));
        assert_eq!(paths.control, light);
    }

    #[tokio::test]
    async fn test_missing_device() {
        let sysfs = tempfile::tempdir().unwrap();
        fake_input(sysfs.path(), 0, "gyro_sensor", 0);
        let err = find_input_device(sysfs.path(), Path::new("/dev/input"), "compass_sensor")
            .await
            .unwrap_err();
        assert!(matches!(err, OpenError::DeviceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_write_int_to_attribute() {
        let sysfs = tempfile::tempdir().unwrap();
        let dir = fake_input(sysfs.path(), 1, "proximity_sensor", 1);
        let control = SysfsControl::new(&dir);

        control.write_int(ENABLE_ATTR, 1).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.join(ENABLE_ATTR)).unwrap(), "1\n");
    }

    #[tokio::test]
    async fn test_write_int_missing_attribute() {
        let sysfs = tempfile::tempdir().unwrap();
        let control = SysfsControl::new(sysfs.path().join("input9"));

        let err = control.write_int(POLL_DELAY_ATTR, 1_000).await.unwrap_err();
        assert!(matches!(err, SensorError::Control { .. }));
        assert!(err.errno() < 0);
        // warned once, still reports every failure
        assert!(control.write_int(POLL_DELAY_ATTR, 1_000).await.is_err());
    }
}
