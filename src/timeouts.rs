use crate::prelude::*;

/// Periodic pass, resolution bounded by the 1 s poll timeout: idle clients,
/// stuck reads/writes, and overdue CGI children. A timed-out client is
/// closed; a timed-out CGI is killed and answered with 502 at finalization.
/// The deadlines live on the `Server` so tests can shorten them.
pub fn process(server: &mut Server, poll: &Poll) {
    let now = Instant::now();

    let mut to_close = Vec::new();
    for (token, conn) in &server.connections {
        let idle = now.duration_since(conn.last_activity);
        if idle > server.idle_timeout {
            info!("idle timeout on token {}", token.0);
            to_close.push(*token);
        } else if conn.state == ConnectionState::Reading && idle > server.read_timeout {
            info!("read timeout on token {}", token.0);
            to_close.push(*token);
        } else if conn.state == ConnectionState::Writing && idle > server.write_timeout {
            info!("write timeout on token {}", token.0);
            to_close.push(*token);
        }
    }
    for token in to_close {
        server.close_client(poll, token);
    }

    let mut to_kill = Vec::new();
    for (pid, p) in &server.cgi {
        if !p.timed_out && p.started_at.elapsed() > server.cgi_timeout {
            to_kill.push(*pid);
        }
    }
    for pid in to_kill {
        if let Some(p) = server.cgi.get_mut(&pid) {
            warn!("cgi pid {} timed out, killing", pid);
            p.timed_out = true;
            let _ = p.child.kill();
        }
    }
}
