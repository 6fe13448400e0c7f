use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "pi_gatt_server".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// One characteristic exposed beneath the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CharacteristicSettings {
    pub uuid: String,
    #[serde(default = "default_initial_value")]
    pub initial_value: Vec<u8>,
    /// Whether the background sampler pushes sensor readings into it.
    #[serde(default = "default_false")]
    pub sampled: bool,
}

/// A2DP sink registration stub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaEndpointSettings {
    #[serde(default = "default_endpoint_uuid")]
    pub uuid: String,
    #[serde(default)]
    pub codec: u8,
    #[serde(default = "default_endpoint_capabilities")]
    pub capabilities: Vec<u8>,
}

impl Default for MediaEndpointSettings {
    fn default() -> Self {
        Self {
            uuid: default_endpoint_uuid(),
            codec: 0x00, // SBC
            capabilities: default_endpoint_capabilities(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_adapter_path")]
    pub adapter_path: String,
    #[serde(default = "default_local_name")]
    pub local_name: String,
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,
    #[serde(default = "default_characteristics")]
    pub characteristics: Vec<CharacteristicSettings>,
    #[serde(default)]
    pub media_endpoint: Option<MediaEndpointSettings>,

    // Sampler
    #[serde(default = "default_sensor_path")]
    pub sensor_path: String,
    #[serde(default = "default_sample_period_ms")]
    pub sample_period_ms: u64,

    // Registration
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            adapter_path: default_adapter_path(),
            local_name: default_local_name(),
            service_uuid: default_service_uuid(),
            characteristics: default_characteristics(),
            media_endpoint: None,
            sensor_path: default_sensor_path(),
            sample_period_ms: default_sample_period_ms(),
            registration_timeout_ms: default_registration_timeout_ms(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }

    /// Replace zero timings with their defaults, returning one message per
    /// field changed.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut corrections = Vec::new();
        if self.sample_period_ms == 0 {
            self.sample_period_ms = default_sample_period_ms();
            corrections.push(format!(
                "sample_period_ms must be positive, using {}",
                self.sample_period_ms
            ));
        }
        if self.registration_timeout_ms == 0 {
            self.registration_timeout_ms = default_registration_timeout_ms();
            corrections.push(format!(
                "registration_timeout_ms must be positive, using {}",
                self.registration_timeout_ms
            ));
        }
        corrections
    }
}

fn default_adapter_path() -> String {
    "/org/bluez/hci0".to_string()
}
fn default_local_name() -> String {
    "PiGattServer".to_string()
}
fn default_service_uuid() -> String {
    "12345678-1234-5678-1234-56789abcdef0".to_string()
}
fn default_characteristics() -> Vec<CharacteristicSettings> {
    vec![CharacteristicSettings {
        uuid: "12345678-1234-5678-1234-56789abcdef1".to_string(),
        initial_value: default_initial_value(),
        sampled: true,
    }]
}
fn default_initial_value() -> Vec<u8> {
    vec![0x00]
}
fn default_endpoint_uuid() -> String {
    "0000110b-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_endpoint_capabilities() -> Vec<u8> {
    vec![0xff, 0xff, 0x02, 0x35]
}
fn default_sensor_path() -> String {
    "/sys/class/thermal/thermal_zone0/temp".to_string()
}
fn default_sample_period_ms() -> u64 {
    2000
}
fn default_registration_timeout_ms() -> u64 {
    10_000
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
    load_error: Option<anyhow::Error>,
    corrections: Vec<String>,
}

impl SettingsService {
    /// Load settings from `path`, or from the per-user config directory.
    ///
    /// A missing or malformed file yields the defaults; the cause is kept in
    /// [`load_error`](Self::load_error) since logging is not up yet.
    pub fn new(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = match path {
            Some(path) => path,
            None => Self::get_settings_path()?,
        };
        let (mut settings, load_error) = match Self::load_from_file(&settings_path) {
            Ok(settings) => (settings, None),
            Err(e) => (Settings::default(), Some(e)),
        };
        let corrections = settings.normalize();

        Ok(Self {
            settings,
            settings_path,
            load_error,
            corrections,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("pi-gatt-server");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    /// Why the file was not used, if the defaults were substituted.
    pub fn load_error(&self) -> Option<&anyhow::Error> {
        self.load_error.as_ref()
    }

    /// Values replaced while loading.
    pub fn corrections(&self) -> &[String] {
        &self.corrections
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }
}
