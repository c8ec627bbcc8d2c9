use std::collections::HashMap;

use conf_parser::ServerConfig;

/// Precomputed virtual-host lookup tables: the first server declared on a
/// port is that port's default, and every non-empty server name maps
/// `(port, name)` to its server index.
#[derive(Debug, Default)]
pub struct HostMap {
    default_by_port: HashMap<u16, usize>,
    by_port_host: HashMap<(u16, String), usize>,
}

impl HostMap {
    pub fn build(servers: &[ServerConfig]) -> Self {
        let mut map = HostMap::default();
        for (i, srv) in servers.iter().enumerate() {
            map.default_by_port.entry(srv.listen_port).or_insert(i);
            for name in &srv.server_names {
                map.by_port_host
                    .entry((srv.listen_port, name.clone()))
                    .or_insert(i);
            }
        }
        map
    }

    /// Picks the server for a request: exact `(port, host)` match, else the
    /// port default, else the accept-time fallback.
    pub fn select(&self, port: u16, host: &str, fallback: usize) -> usize {
        let host = normalize_host(host);
        if !host.is_empty() {
            if let Some(&i) = self.by_port_host.get(&(port, host)) {
                return i;
            }
        }
        self.default_by_port.get(&port).copied().unwrap_or(fallback)
    }
}

/// Lowercases a Host header value, stripping an optional `:port` suffix and
/// IPv6 brackets.
pub fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    let host = if let Some(stripped) = raw.strip_prefix('[') {
        match stripped.find(']') {
            Some(pos) => &stripped[..pos],
            None => stripped,
        }
    } else {
        match raw.find(':') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
    };
    host.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(port: u16, names: &[&str]) -> ServerConfig {
        ServerConfig {
            listen_port: port,
            server_names: names.iter().map(|s| s.to_string()).collect(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn host_header_normalization() {
        assert_eq!(normalize_host("Example.COM:8080"), "example.com");
        assert_eq!(normalize_host("[::1]:8080"), "::1");
        assert_eq!(normalize_host(" localhost "), "localhost");
    }

    #[test]
    fn named_host_beats_port_default() {
        let servers = vec![server(8080, &["a.example"]), server(8080, &["b.example"])];
        let map = HostMap::build(&servers);
        assert_eq!(map.select(8080, "b.example", 0), 1);
        assert_eq!(map.select(8080, "b.example:8080", 0), 1);
        assert_eq!(map.select(8080, "unknown.example", 0), 0);
    }

    #[test]
    fn unknown_port_falls_back_to_accept_default() {
        let map = HostMap::build(&[server(8080, &[])]);
        assert_eq!(map.select(9999, "whatever", 3), 3);
    }
}
