use ::url::{Host, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }
}

/// Where to connect and what to put on the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path plus query, never empty.
    pub resource: String,
}

#[derive(thiserror::Error, Debug)]
pub enum UrlError {
    #[error(transparent)]
    Parse(#[from] ::url::ParseError),
    #[error("URL must start with ws:// or wss://")]
    Scheme,
    #[error("URL has no host")]
    Host,
    #[error("WebSocket URLs cannot carry a fragment")]
    Fragment,
}

impl Endpoint {
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let url = Url::parse(input)?;
        let scheme = match url.scheme() {
            "ws" => Scheme::Ws,
            "wss" => Scheme::Wss,
            _ => return Err(UrlError::Scheme),
        };
        if url.fragment().is_some() {
            return Err(UrlError::Fragment);
        }
        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(host) => host.to_string(),
            None => return Err(UrlError::Host),
        };
        let port = url.port().unwrap_or(scheme.default_port());

        let mut resource = url.path().to_owned();
        if resource.is_empty() {
            resource.push('/');
        }
        if let Some(query) = url.query() {
            resource.push('?');
            resource.push_str(query);
        }

        Ok(Self {
            scheme,
            host,
            port,
            resource,
        })
    }

    /// `Host` header value; the port is omitted when it is the scheme default.
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults_and_resource() {
        let ep = Endpoint::parse("wss://stream.example.com/ws/btc?depth=5").unwrap();
        assert_eq!(ep.scheme, Scheme::Wss);
        assert_eq!(ep.host, "stream.example.com");
        assert_eq!(ep.port, 443);
        assert_eq!(ep.resource, "/ws/btc?depth=5");
        assert_eq!(ep.host_header(), "stream.example.com");

        let ep = Endpoint::parse("ws://localhost:9001").unwrap();
        assert_eq!(ep.port, 9001);
        assert_eq!(ep.resource, "/");
        assert_eq!(ep.host_header(), "localhost:9001");
    }

    #[test]
    fn ipv6_hosts_are_bracketed_in_host_header() {
        let ep = Endpoint::parse("ws://[::1]:8080/chat").unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.host_header(), "[::1]:8080");
    }

    #[test]
    fn rejects_other_schemes_and_fragments() {
        assert!(matches!(
            Endpoint::parse("https://example.com"),
            Err(UrlError::Scheme)
        ));
        assert!(matches!(
            Endpoint::parse("ws://example.com/#frag"),
            Err(UrlError::Fragment)
        ));
        assert!(matches!(Endpoint::parse("not a url"), Err(UrlError::Parse(_))));
    }
}
