//! Remote-access endpoints and their authentication configuration

use crate::error::{ConfigError, ResolveError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use zeroize::Zeroizing;

/// Port used when the host string does not carry one
pub const DEFAULT_PORT: u16 = 22;

/// Login used when neither the host string nor the config names one
pub const DEFAULT_USER: &str = "root";

/// A dialable `host:port` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddr {
    /// Hostname or IP literal, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl HostAddr {
    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let input = input.trim();

        if let Some(rest) = input.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ResolveError::Malformed(input.to_string()))?;
            let port = match tail {
                "" => DEFAULT_PORT,
                _ => {
                    let port = tail
                        .strip_prefix(':')
                        .ok_or_else(|| ResolveError::Malformed(input.to_string()))?;
                    parse_port(input, port)?
                }
            };
            return Self::checked(input, host, port);
        }

        match input.split_once(':') {
            None => Self::checked(input, input, DEFAULT_PORT),
            Some((_, port)) if port.contains(':') => {
                // bare IPv6 literals must be bracketed
                Err(ResolveError::Malformed(input.to_string()))
            }
            Some((host, port)) => {
                let port = parse_port(input, port)?;
                Self::checked(input, host, port)
            }
        }
    }

    fn checked(input: &str, host: &str, port: u16) -> Result<Self, ResolveError> {
        if host.is_empty() {
            return Err(ResolveError::EmptyHost(input.to_string()));
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

fn parse_port(input: &str, port: &str) -> Result<u16, ResolveError> {
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ResolveError::InvalidPort {
            input: input.to_string(),
            port: port.to_string(),
        }),
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// A remote-access target: address, login and credentials.
///
/// Built at configuration time and immutable afterwards, except for the
/// cached address filled in by [`Endpoint::resolve`].
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    /// `host`, `host:port` or `user@host:port`
    pub host: String,

    /// Login name, overridden by a `user@` prefix in `host`
    #[serde(default, rename = "username")]
    pub user: String,

    /// Password credential
    #[serde(default, skip_serializing, deserialize_with = "secret")]
    pub password: Option<Zeroizing<String>>,

    /// Path to a private key file
    #[serde(default, rename = "key")]
    pub private_key: Option<PathBuf>,

    /// Passphrase protecting the private key
    #[serde(default, skip_serializing, deserialize_with = "secret")]
    pub passphrase: Option<Zeroizing<String>>,

    /// known_hosts file to verify the server key against; any key is accepted when unset
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    #[serde(skip)]
    address: Option<HostAddr>,
}

fn secret<'de, D>(deserializer: D) -> Result<Option<Zeroizing<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(Zeroizing::new))
}

impl Endpoint {
    /// Create an endpoint for `host` with no credentials
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Set the login name
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password credential
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Set the private key file
    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    /// Set the private key passphrase
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Verify the server key against a known_hosts file
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    /// Split the host string into login and address and cache the address.
    ///
    /// Performs no network I/O: name lookup happens at dial time, and for
    /// tunnelled targets on the bastion, which may be the only place the
    /// name resolves.
    pub fn resolve(&mut self) -> Result<&HostAddr, ResolveError> {
        let raw = self.host.trim().to_string();
        let host = match raw.split_once('@') {
            Some((user, host)) => {
                if !user.is_empty() {
                    self.user = user.to_string();
                }
                host
            }
            None => raw.as_str(),
        };

        let address = HostAddr::parse(host)?;
        if self.user.is_empty() {
            self.user = DEFAULT_USER.to_string();
        }
        Ok(self.address.insert(address))
    }

    /// The cached address, if [`Endpoint::resolve`] succeeded
    pub fn address(&self) -> Option<&HostAddr> {
        self.address.as_ref()
    }

    /// Whether a password or a private key is configured
    pub fn has_credentials(&self) -> bool {
        self.password.as_ref().is_some_and(|p| !p.is_empty())
            || self.private_key.as_ref().is_some_and(|k| !k.as_os_str().is_empty())
    }

    /// Fail unless at least one credential form is present
    pub fn validate_credentials(&self) -> Result<(), ConfigError> {
        if self.has_credentials() {
            Ok(())
        } else {
            Err(ConfigError::MissingCredential)
        }
    }

    /// Authentication settings for one dial+handshake bounded by `timeout`
    pub fn auth_config(&self, timeout: Duration) -> AuthConfig {
        AuthConfig {
            user: self.user.clone(),
            password: self.password.clone().filter(|p| !p.is_empty()),
            private_key: self.private_key.clone(),
            passphrase: self.passphrase.clone(),
            known_hosts: self.known_hosts.clone(),
            timeout,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("known_hosts", &self.known_hosts)
            .field("address", &self.address)
            .finish()
    }
}

/// Credentials and deadline for a single handshake
#[derive(Clone)]
pub struct AuthConfig {
    /// Login name
    pub user: String,
    /// Password, tried first
    pub password: Option<Zeroizing<String>>,
    /// Private key file, tried after the password
    pub private_key: Option<PathBuf>,
    /// Key passphrase
    pub passphrase: Option<Zeroizing<String>>,
    /// Optional known_hosts file
    pub known_hosts: Option<PathBuf>,
    /// Dial plus handshake deadline
    pub timeout: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_addr_parse() {
        let cases = vec![
            ("example.com", ("example.com", 22)),
            ("example.com:2222", ("example.com", 2222)),
            ("10.0.0.1", ("10.0.0.1", 22)),
            ("10.0.0.1:22", ("10.0.0.1", 22)),
            ("[::1]", ("::1", 22)),
            ("[fe80::1]:2022", ("fe80::1", 2022)),
        ];

        for (input, (host, port)) in cases {
            let addr = HostAddr::parse(input).unwrap();
            assert_eq!((addr.host.as_str(), addr.port), (host, port), "Failed for: {}", input);
        }
    }

    #[test]
    fn test_host_addr_parse_errors() {
        assert_eq!(HostAddr::parse(""), Err(ResolveError::EmptyHost(String::new())));
        assert_eq!(HostAddr::parse(":22"), Err(ResolveError::EmptyHost(":22".to_string())));
        assert!(matches!(HostAddr::parse("host:abc"), Err(ResolveError::InvalidPort { .. })));
        assert!(matches!(HostAddr::parse("host:0"), Err(ResolveError::InvalidPort { .. })));
        assert!(matches!(HostAddr::parse("host:70000"), Err(ResolveError::InvalidPort { .. })));
        assert!(matches!(HostAddr::parse("host:"), Err(ResolveError::InvalidPort { .. })));
        assert!(matches!(HostAddr::parse("fe80::1"), Err(ResolveError::Malformed(_))));
        assert!(matches!(HostAddr::parse("[::1"), Err(ResolveError::Malformed(_))));
        assert!(matches!(HostAddr::parse("[::1]22"), Err(ResolveError::Malformed(_))));
    }

    #[test]
    fn test_host_addr_display() {
        assert_eq!(HostAddr::parse("example.com").unwrap().to_string(), "example.com:22");
        assert_eq!(HostAddr::parse("[::1]:2222").unwrap().to_string(), "[::1]:2222");
    }

    #[test]
    fn test_resolve_user_prefix_overrides_user() {
        let mut endpoint = Endpoint::new("deploy@build.internal:2200").with_user("ignored");
        let addr = endpoint.resolve().unwrap().clone();

        assert_eq!(addr.host, "build.internal");
        assert_eq!(addr.port, 2200);
        assert_eq!(endpoint.user, "deploy");
        assert_eq!(endpoint.address(), Some(&addr));
    }

    #[test]
    fn test_resolve_defaults() {
        let mut endpoint = Endpoint::new("build.internal");
        endpoint.resolve().unwrap();

        assert_eq!(endpoint.user, DEFAULT_USER);
        assert_eq!(endpoint.address().unwrap().port, DEFAULT_PORT);
    }

    #[test]
    fn test_resolve_failure_leaves_address_unset() {
        let mut endpoint = Endpoint::new("user@host:notaport");
        assert!(endpoint.resolve().is_err());
        assert!(endpoint.address().is_none());
    }

    #[test]
    fn test_credentials_required() {
        let endpoint = Endpoint::new("host");
        assert_eq!(endpoint.validate_credentials(), Err(ConfigError::MissingCredential));

        let endpoint = Endpoint::new("host").with_password("");
        assert_eq!(endpoint.validate_credentials(), Err(ConfigError::MissingCredential));

        assert!(Endpoint::new("host").with_password("secret").validate_credentials().is_ok());
        assert!(Endpoint::new("host").with_private_key("/keys/id_ed25519").validate_credentials().is_ok());
    }

    #[test]
    fn test_auth_config_carries_timeout_and_credentials() {
        let endpoint = Endpoint::new("ops@host")
            .with_password("secret")
            .with_private_key("/keys/id_rsa")
            .with_passphrase("pass");
        let auth = endpoint.auth_config(Duration::from_secs(7));

        assert_eq!(auth.timeout, Duration::from_secs(7));
        assert_eq!(auth.password.as_deref().map(String::as_str), Some("secret"));
        assert_eq!(auth.private_key, Some(PathBuf::from("/keys/id_rsa")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let endpoint = Endpoint::new("host").with_password("hunter2").with_passphrase("s3cret");
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));

        let auth = format!("{:?}", endpoint.auth_config(Duration::from_secs(1)));
        assert!(!auth.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_config_fields() {
        let endpoint: Endpoint = serde_json::from_str(
            r#"{"host": "jump.example.com:2222", "username": "ops", "password": "pw", "key": "/k/id"}"#,
        )
        .unwrap();

        assert_eq!(endpoint.host, "jump.example.com:2222");
        assert_eq!(endpoint.user, "ops");
        assert_eq!(endpoint.password.as_deref().map(String::as_str), Some("pw"));
        assert_eq!(endpoint.private_key, Some(PathBuf::from("/k/id")));
        assert!(endpoint.address().is_none());

        let serialized = serde_json::to_string(&endpoint).unwrap();
        assert!(!serialized.contains("\"pw\""));
    }
}
