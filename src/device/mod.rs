// Device model for target network equipment

mod profile;

pub use profile::{Vendor, VendorProfile};

use std::fmt;

use zeroize::Zeroizing;

/// Login credentials for one device's management plane.
///
/// Held in memory only for the duration of a run; the password is zeroized
/// on drop and is excluded from Debug output and serialization.
#[derive(Clone)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Credentials {
            host: host.into(),
            port: 22,
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// Empty credentials, useful as a placeholder for devices that have not
    /// been provisioned yet. `is_complete` returns false for these.
    pub fn empty() -> Self {
        Credentials {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: Zeroizing::new(String::new()),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Whether enough is present to attempt a login.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    /// host:port form used in connect calls and log fields
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A single managed device
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub vendor: Vendor,
    pub credentials: Credentials,
}

impl Device {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Device {
            name: id.clone(),
            id,
            vendor: Vendor::Generic,
            credentials: Credentials::empty(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_vendor(mut self, vendor: Vendor) -> Self {
        self.vendor = vendor;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// The vendor detection strategy for this device.
    pub fn profile(&self) -> &'static VendorProfile {
        self.vendor.profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_completeness() {
        assert!(Credentials::new("10.0.0.1", "admin", "secret").is_complete());
        assert!(!Credentials::empty().is_complete());
        assert!(!Credentials::new("10.0.0.1", "admin", "").is_complete());
        assert!(!Credentials::new("", "admin", "secret").is_complete());
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("10.0.0.1", "admin", "hunter2");
        let dump = format!("{:?}", creds);
        assert!(!dump.contains("hunter2"));
        assert!(dump.contains("<redacted>"));
    }

    #[test]
    fn test_device_builder() {
        let dev = Device::new("sw-floor3")
            .with_vendor(Vendor::Huawei)
            .with_credentials(Credentials::new("192.168.10.5", "backup", "pw").with_port(2222));

        assert_eq!(dev.name, "sw-floor3");
        assert_eq!(dev.credentials.port, 2222);
        assert_eq!(dev.credentials.address(), "192.168.10.5:2222");
    }
}
