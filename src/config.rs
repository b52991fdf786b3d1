use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_SOCKET_DIR: &str = "/var/run/lestrade";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("environment variable `{name}` is set but empty")]
    Empty { name: &'static str },
    #[error("environment variable `{name}` has invalid value `{value}`: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Process configuration, read from `LESTRADE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Unix socket of the docker daemon (`LESTRADE_DOCKER_SOCKET`).
    pub docker_socket: PathBuf,
    /// Directory that receives one introspection socket per container (`LESTRADE_SOCKET_DIR`).
    pub socket_dir: PathBuf,
    /// Graph directory reported by the introspection servers (`LESTRADE_GRAPH_DIR`).
    /// Falls back to the daemon's root directory when unset.
    pub graph_dir: Option<PathBuf>,
    /// Docker API version to pin requests to, e.g. `1.43` (`LESTRADE_API_VERSION`).
    pub api_version: Option<String>,
    /// How long to wait for servers to close on shutdown (`LESTRADE_SHUTDOWN_GRACE_SECS`).
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            graph_dir: None,
            api_version: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an empty or malformed value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &'static str| -> Result<Option<String>> {
            match lookup(name) {
                Some(value) if value.trim().is_empty() => Err(Error::Empty { name }),
                Some(value) => Ok(Some(value.trim().to_owned())),
                None => Ok(None),
            }
        };

        let mut config = Config::default();
        if let Some(socket) = var("LESTRADE_DOCKER_SOCKET")? {
            config.docker_socket = PathBuf::from(socket);
        }
        if let Some(dir) = var("LESTRADE_SOCKET_DIR")? {
            config.socket_dir = PathBuf::from(dir);
        }
        config.graph_dir = var("LESTRADE_GRAPH_DIR")?.map(PathBuf::from);
        if let Some(version) = var("LESTRADE_API_VERSION")? {
            let version = version.trim_start_matches('v');
            if !is_api_version(version) {
                return Err(Error::Invalid {
                    name: "LESTRADE_API_VERSION",
                    value: version.to_owned(),
                    expected: "`<major>.<minor>`",
                });
            }
            config.api_version = Some(version.to_owned());
        }
        if let Some(secs) = var("LESTRADE_SHUTDOWN_GRACE_SECS")? {
            let secs = secs.parse::<u64>().map_err(|_| Error::Invalid {
                name: "LESTRADE_SHUTDOWN_GRACE_SECS",
                value: secs.clone(),
                expected: "a number of seconds",
            })?;
            config.shutdown_grace = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn is_api_version(s: &str) -> bool {
    let mut parts = s.split('.');
    let valid = |part: Option<&str>| {
        part.is_some_and(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    };
    valid(parts.next()) && valid(parts.next()) && parts.next().is_none()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.docker_socket, PathBuf::from("/var/run/docker.sock"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("LESTRADE_DOCKER_SOCKET", "/rootfs/var/run/docker.sock"),
            ("LESTRADE_SOCKET_DIR", "/tmp/lestrade"),
            ("LESTRADE_GRAPH_DIR", "/docker"),
            ("LESTRADE_API_VERSION", "v1.43"),
            ("LESTRADE_SHUTDOWN_GRACE_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.docker_socket, PathBuf::from("/rootfs/var/run/docker.sock"));
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/lestrade"));
        assert_eq!(config.graph_dir, Some(PathBuf::from("/docker")));
        assert_eq!(config.api_version.as_deref(), Some("1.43"));
        assert_eq!(config.shutdown_grace, Duration::from_secs(12));
    }

    #[test]
    fn test_empty_value() {
        let err = Config::from_lookup(lookup(&[("LESTRADE_SOCKET_DIR", " ")])).unwrap_err();
        assert_eq!(
            err,
            Error::Empty {
                name: "LESTRADE_SOCKET_DIR"
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        for version in ["1", "1.x", "1.43.2", "latest"] {
            let err =
                Config::from_lookup(lookup(&[("LESTRADE_API_VERSION", version)])).unwrap_err();
            assert!(matches!(err, Error::Invalid { .. }), "{version}");
        }
        let err = Config::from_lookup(lookup(&[("LESTRADE_SHUTDOWN_GRACE_SECS", "-1")])).unwrap_err();
        assert!(matches!(err, Error::Invalid { .. }));
    }
}
