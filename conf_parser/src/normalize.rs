use std::collections::HashSet;

use crate::types::{LocationConfig, ServerConfig};

/// Post-parse fixups: defaults, server-name dedup, index inheritance, the
/// synthetic `/` location, and longest-prefix-first ordering.
pub fn normalize(servers: &mut [ServerConfig]) {
    for srv in servers.iter_mut() {
        if srv.root.is_empty() {
            srv.root = "www".to_string();
        }
        if srv.index.is_empty() {
            srv.index = "index.html".to_string();
        }

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(srv.server_names.len());
        for name in &srv.server_names {
            let n = name.to_ascii_lowercase();
            if n.is_empty() {
                continue;
            }
            if seen.insert(n.clone()) {
                names.push(n);
            }
        }
        srv.server_names = names;

        for loc in srv.locations.iter_mut() {
            if loc.index.is_empty() {
                loc.index = srv.index.clone();
            }
        }

        if !srv.locations.iter().any(|l| l.prefix == "/") {
            srv.locations.push(LocationConfig {
                prefix: "/".to_string(),
                index: srv.index.clone(),
                allow_get: true,
                allow_head: true,
                allow_post: false,
                allow_delete: false,
                ..LocationConfig::default()
            });
        }

        srv.locations.sort_by(|a, b| {
            b.prefix
                .len()
                .cmp(&a.prefix.len())
                .then_with(|| a.prefix.cmp(&b.prefix))
        });
    }
}
