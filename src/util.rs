const STORAGE_URI: &str = "STORAGE_URI";

const DEFAULT_STORAGE_URI: &str = "cache://";

pub fn get_default_storage_uri() -> String {
    DEFAULT_STORAGE_URI.to_string()
}

pub fn get_storage_uri() -> String {
    let uri_from_env = std::env::var(STORAGE_URI);
    uri_from_env
        .ok()
        .filter(|uri| !uri.trim().is_empty())
        .unwrap_or_else(get_default_storage_uri)
}
