use std::collections::HashMap;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ROOT: &str = "www";
pub const DEFAULT_INDEX: &str = "index.html";
pub const DEFAULT_UPLOAD_DIR: &str = "www/uploads";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_000_000;
pub const DEFAULT_SESSION_TIMEOUT: u64 = 3600;

#[derive(Debug, Clone)]
pub struct LocationConfig {
    pub prefix: String,
    /// Overrides the server root when non-empty.
    pub root: String,
    /// Inherits the server index when empty (see normalize).
    pub index: String,
    pub autoindex: bool,
    pub allow_get: bool,
    pub allow_head: bool,
    pub allow_post: bool,
    pub allow_delete: bool,
    pub return_code: Option<u16>,
    pub return_url: Option<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            prefix: "/".to_string(),
            root: String::new(),
            index: String::new(),
            autoindex: false,
            allow_get: true,
            allow_head: true,
            allow_post: false,
            allow_delete: false,
            return_code: None,
            return_url: None,
        }
    }
}

impl LocationConfig {
    pub fn allowed_methods(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.allow_get {
            out.push("GET");
        }
        if self.allow_head {
            out.push("HEAD");
        }
        if self.allow_post {
            out.push("POST");
        }
        if self.allow_delete {
            out.push("DELETE");
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub server_names: Vec<String>,
    pub root: String,
    pub index: String,
    pub upload_dir: String,
    pub client_max_body_size: usize,
    /// status code -> error page path
    pub error_pages: HashMap<u16, String>,
    /// file extension (without dot) -> interpreter path
    pub cgi: HashMap<String, String>,
    pub session_enabled: bool,
    pub session_timeout: u64,
    pub session_store_path: String,
    pub locations: Vec<LocationConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            server_names: Vec::new(),
            root: DEFAULT_ROOT.to_string(),
            index: DEFAULT_INDEX.to_string(),
            upload_dir: DEFAULT_UPLOAD_DIR.to_string(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            error_pages: HashMap::new(),
            cgi: HashMap::new(),
            session_enabled: false,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            session_store_path: String::new(),
            locations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
}
