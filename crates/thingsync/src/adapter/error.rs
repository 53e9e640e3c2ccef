/// Failure to fetch a JSON document from a device endpoint.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} did not return JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to turn a location into devices.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{url} did not describe any device: {reason}")]
    Document { url: String, reason: String },
}

/// Failure while reading or writing a property.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("unknown device {0}")]
    UnknownDevice(String),

    /// The device reported a value for a property it never described.
    #[error("device {device_id} has no property named {name:?}")]
    UnknownProperty { device_id: String, name: String },

    #[error("response from {url} is not a flat JSON object")]
    NotAnObject { url: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl SyncError {
    /// Schema mismatch between adapter and device, as opposed to the device
    /// being temporarily unreachable.
    pub fn is_data_error(&self) -> bool {
        matches!(self, SyncError::UnknownProperty { .. })
    }
}

/// Failure to start a pairing session.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("a pairing session is already running")]
    AlreadyPairing,

    #[error("failed to bind SSDP socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
