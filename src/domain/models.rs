use std::fmt;

/// Capability flags a characteristic advertises through its `Flags` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicFlag {
    Read,
    Write,
    Notify,
}

impl CharacteristicFlag {
    /// The fixed flag set every characteristic of this server carries.
    pub const ALL: [CharacteristicFlag; 3] = [Self::Read, Self::Write, Self::Notify];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Notify => "notify",
        }
    }
}

/// Events produced by the value store and turned into `PropertiesChanged`
/// signals by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacteristicEvent {
    ValueChanged { path: String, value: Vec<u8> },
    NotifyingChanged { path: String, notifying: bool },
}

impl CharacteristicEvent {
    pub fn path(&self) -> &str {
        match self {
            Self::ValueChanged { path, .. } | Self::NotifyingChanged { path, .. } => path,
        }
    }
}

/// Immutable description of a GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub path: String,
    pub uuid: String,
    pub primary: bool,
    /// Owned characteristic paths, in exposure order.
    pub characteristics: Vec<String>,
}

/// Advertising payload, fixed after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub path: String,
    pub adv_type: String,
    pub local_name: String,
    pub service_uuids: Vec<String>,
    pub discoverable: bool,
}

/// Registration-only media endpoint stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub path: String,
    pub uuid: String,
    pub codec: u8,
    pub capabilities: Vec<u8>,
}

/// One step of the registration handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    Application,
    Advertisement,
    Endpoint,
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => write!(f, "RegisterApplication"),
            Self::Advertisement => write!(f, "RegisterAdvertisement"),
            Self::Endpoint => write!(f, "RegisterEndpoint"),
        }
    }
}

/// States of the registration handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    PoweringAdapter,
    RegisteringApplication,
    RegisteringAdvertisement,
    RegisteringEndpoint,
    Running,
    Failed,
}

impl RegistrationState {
    pub fn for_step(step: RegistrationStep) -> Self {
        match step {
            RegistrationStep::Application => Self::RegisteringApplication,
            RegistrationStep::Advertisement => Self::RegisteringAdvertisement,
            RegistrationStep::Endpoint => Self::RegisteringEndpoint,
        }
    }
}

/// Formats bytes the way the audit log prints them: `[0x01, 0x02]`.
pub fn hex_bytes(bytes: &[u8]) -> String {
    let parts: Vec<String> = bytes.iter().map(|b| format!("0x{:02x}", b)).collect();
    format!("[{}]", parts.join(", "))
}
