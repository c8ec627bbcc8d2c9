use origin_server::config::Config;

#[test]
fn minimal_server_block_gets_defaults() {
    let conf = "server { listen 9090; }";
    let config = Config::parse_str(conf).unwrap();

    assert_eq!(config.servers.len(), 1);
    let srv = &config.servers[0];
    assert_eq!(srv.listen_port, 9090);
    assert_eq!(srv.root, "www");
    assert_eq!(srv.index, "index.html");
    assert_eq!(srv.client_max_body_size, 1_000_000);
}

#[test]
fn missing_file_yields_single_default_server() {
    let config = Config::load("/definitely/not/here.conf").unwrap();
    assert_eq!(config.servers.len(), 1);
    assert_eq!(config.servers[0].listen_port, 8080);

    // the synthetic root location only allows GET and HEAD
    let root = config.servers[0]
        .locations
        .iter()
        .find(|l| l.prefix == "/")
        .unwrap();
    assert!(root.allow_get && root.allow_head);
    assert!(!root.allow_post && !root.allow_delete);
}

#[test]
fn synthetic_root_location_is_get_head_only() {
    let conf = r#"
server {
    listen 8080;
    location /api {
        allowed_methods ALL;
    }
}
"#;
    let config = Config::parse_str(conf).unwrap();
    let srv = &config.servers[0];
    let root = srv.locations.iter().find(|l| l.prefix == "/").unwrap();
    assert!(root.allow_get && root.allow_head);
    assert!(!root.allow_post && !root.allow_delete);

    let api = srv.locations.iter().find(|l| l.prefix == "/api").unwrap();
    assert!(api.allow_get && api.allow_head && api.allow_post && api.allow_delete);
}

#[test]
fn locations_sorted_longest_prefix_first() {
    let conf = r#"
server {
    listen 8080;
    location / { }
    location /img { }
    location /img/icons { }
}
"#;
    let config = Config::parse_str(conf).unwrap();
    let prefixes: Vec<&str> = config.servers[0]
        .locations
        .iter()
        .map(|l| l.prefix.as_str())
        .collect();
    assert_eq!(prefixes, vec!["/img/icons", "/img", "/"]);
}

#[test]
fn location_trailing_slash_is_stripped() {
    let conf = "server { listen 8080; location /upload/ { } }";
    let config = Config::parse_str(conf).unwrap();
    assert!(
        config.servers[0]
            .locations
            .iter()
            .any(|l| l.prefix == "/upload")
    );
}

#[test]
fn error_page_maps_every_code_to_the_path() {
    let conf = "server { listen 8080; error_page 404 500 errors/oops.html; }";
    let config = Config::parse_str(conf).unwrap();
    let pages = &config.servers[0].error_pages;
    assert_eq!(pages.get(&404).unwrap(), "errors/oops.html");
    assert_eq!(pages.get(&500).unwrap(), "errors/oops.html");
}

#[test]
fn cgi_extension_is_stored_without_the_dot() {
    let conf = "server { listen 8080; cgi .py /usr/bin/python3; cgi sh /bin/sh; }";
    let config = Config::parse_str(conf).unwrap();
    let cgi = &config.servers[0].cgi;
    assert_eq!(cgi.get("py").unwrap(), "/usr/bin/python3");
    assert_eq!(cgi.get("sh").unwrap(), "/bin/sh");
}

#[test]
fn listen_accepts_host_port_form() {
    let conf = "server { listen 127.0.0.1:8181; }";
    let config = Config::parse_str(conf).unwrap();
    assert_eq!(config.servers[0].listen_port, 8181);
}

#[test]
fn listen_port_out_of_range_fails() {
    let err = Config::parse_str("server { listen 70000; }").unwrap_err();
    assert!(err.to_string().contains("line 1"), "got: {}", err);
}

#[test]
fn unknown_directive_reports_its_line() {
    let conf = "server {\n    listen 8080;\n    nonsense on;\n}";
    let err = Config::parse_str(conf).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("line 3"), "got: {}", msg);
    assert!(msg.contains("nonsense"), "got: {}", msg);
}

#[test]
fn missing_semicolon_is_an_error() {
    let conf = "server {\n    listen 8080\n}";
    let err = Config::parse_str(conf).unwrap_err();
    assert!(err.to_string().contains("';'"), "got: {}", err);
}

#[test]
fn server_names_are_lowercased_and_deduped() {
    let conf = "server { listen 8080; server_name A.Example a.example b.example; }";
    let config = Config::parse_str(conf).unwrap();
    assert_eq!(
        config.servers[0].server_names,
        vec!["a.example".to_string(), "b.example".to_string()]
    );
}

#[test]
fn return_with_single_url_defaults_to_302() {
    let conf = "server { listen 8080; location /go { return http://example.com/; } }";
    let config = Config::parse_str(conf).unwrap();
    let loc = config.servers[0]
        .locations
        .iter()
        .find(|l| l.prefix == "/go")
        .unwrap();
    assert_eq!(loc.return_code, Some(302));
    assert_eq!(loc.return_url.as_deref(), Some("http://example.com/"));
}

#[test]
fn redirect_is_an_alias_for_return() {
    let conf = "server { listen 8080; location /moved { redirect 308 /here; } }";
    let config = Config::parse_str(conf).unwrap();
    let loc = config.servers[0]
        .locations
        .iter()
        .find(|l| l.prefix == "/moved")
        .unwrap();
    assert_eq!(loc.return_code, Some(308));
    assert_eq!(loc.return_url.as_deref(), Some("/here"));
}

#[test]
fn non_numeric_body_size_fails() {
    let err = Config::parse_str("server { client_max_body_size big; }").unwrap_err();
    assert!(err.to_string().contains("positive integer"), "got: {}", err);
}

#[test]
fn comments_are_ignored() {
    let conf = "# leading comment\nserver { listen 8080; # inline\n root www; }";
    let config = Config::parse_str(conf).unwrap();
    assert_eq!(config.servers[0].listen_port, 8080);
    assert_eq!(config.servers[0].root, "www");
}

#[test]
fn location_index_inherits_server_index() {
    let conf = "server { listen 8080; index home.html; location /a { } }";
    let config = Config::parse_str(conf).unwrap();
    let loc = config.servers[0]
        .locations
        .iter()
        .find(|l| l.prefix == "/a")
        .unwrap();
    assert_eq!(loc.index, "home.html");
}
