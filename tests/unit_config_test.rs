use std::io::Write;
use tempfile::NamedTempFile;
use twice::config::{CacheKind, Config};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_empty_file_yields_defaults() {
    let file = write_config("");
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.port, 8080);
    assert_eq!(config.interface, "127.0.0.1");
    assert_eq!(config.cache.kind, CacheKind::Internal);
    assert_eq!(config.memory_limit, 100);
    assert_eq!(config.headers.cache, "x-twice-control");
    assert_eq!(config.headers.cookies, "x-twice-vary");
    assert_eq!(config.hash.session_cookie, "session_cookie");
    assert_eq!(config.rewrite_host(), None);
    assert!(config.compiled_template().is_ok());
}

#[test]
fn test_full_config_roundtrip() {
    let file = write_config(
        r#"
port = 9090
interface = "0.0.0.0"
log_level = "debug"
memory_limit = 256
template_regex = '<%%\s+(.*?)\s+%%>'

[backend]
appserver = "app.internal:8000"
memcache = "kv.internal:11211"
origin_timeout_secs = 5

[backend.db]
host = "db.internal"
name = "twice"
user = "proxy"
password = "secret"
pool_min = 2
pool_max = 8

[cache]
kind = "memcache"
server = "cache.internal:11211"
pool = 4

[headers]
purge = "x-purge"
cache = "x-twice-control"
twice = "x-twice"
cookies = "x-twice-vary"

[hash]
rewrite_host = "www.example.com"
lang_header = true
lang_default = "en-us"
session_cookie = "sid"
"#,
    );
    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();

    assert_eq!(config.port, 9090);
    assert_eq!(config.backend.appserver, "app.internal:8000");
    assert_eq!(config.backend.db.pool_min, 2);
    assert_eq!(config.backend.db.pool_max, 8);
    assert_eq!(config.cache.kind, CacheKind::Memcache);
    assert_eq!(config.cache.pool, 4);
    assert_eq!(config.rewrite_host(), Some("www.example.com".to_string()));
    assert!(config.hash.lang_header);
    assert_eq!(config.hash.session_cookie, "sid");
}

#[test]
fn test_missing_file_is_an_error() {
    assert!(Config::from_file("/nonexistent/twice.toml").is_err());
}

#[test]
fn test_port_zero_is_rejected() {
    let file = write_config("port = 0\n");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_inverted_db_pool_bounds_are_rejected() {
    let file = write_config("[backend.db]\npool_min = 5\npool_max = 2\n");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_template_regex_must_compile() {
    let file = write_config("template_regex = '<%%(unclosed'\n");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_template_regex_must_have_one_capture_group() {
    // No capture group at all.
    let file = write_config(r"template_regex = '<%%\s+.*?\s+%%>'");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());

    // Two capture groups are just as wrong.
    let file = write_config(r"template_regex = '<%%(\s+)(.*?)%%>'");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}

#[test]
fn test_duplicate_keys_are_a_parse_error() {
    let file = write_config("port = 1\nport = 2\n");
    assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
}
