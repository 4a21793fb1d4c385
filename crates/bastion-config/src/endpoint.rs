use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// TCP endpoint of a JSON-RPC server, written as `tcp://host:port`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RpcEndpoint {
    host: String,
    port: u16,
}

impl RpcEndpoint {
    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port. Zero asks the operating system for a free port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "tcp://{}:{}", self.host, self.port)
    }
}

impl FromStr for RpcEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| EndpointParseError::MissingHost(input.to_owned()))?;
                let port = url
                    .port()
                    .ok_or_else(|| EndpointParseError::MissingPort(input.to_owned()))?;
                Ok(Self::new(host.trim_start_matches('[').trim_end_matches(']'), port))
            }
            other => Err(EndpointParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Errors encountered while parsing an [`RpcEndpoint`] from text.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme was not `tcp`.
    #[error("unsupported endpoint scheme '{0}'")]
    UnsupportedScheme(String),
    /// Host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// Port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn displays_as_tcp_url() {
        assert_eq!(
            RpcEndpoint::new("127.0.0.1", 9000).to_string(),
            "tcp://127.0.0.1:9000"
        );
    }

    #[rstest]
    #[case("tcp://127.0.0.1:9000", "127.0.0.1", 9000)]
    #[case("tcp://localhost:1", "localhost", 1)]
    #[case("tcp://[::1]:7000", "::1", 7000)]
    fn parses_tcp_urls(#[case] input: &str, #[case] host: &str, #[case] port: u16) {
        let endpoint: RpcEndpoint = input.parse().expect("endpoint parses");
        assert_eq!(endpoint, RpcEndpoint::new(host, port));
    }

    #[rstest]
    #[case("http://127.0.0.1:9000")]
    #[case("tcp://127.0.0.1")]
    #[case("not a url")]
    fn rejects_other_shapes(#[case] input: &str) {
        assert!(input.parse::<RpcEndpoint>().is_err());
    }
}
