#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct PostgrestConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub jwt: String,
    /// Must not exceed the server's `max-rows` setting.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_page_size() -> usize {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            jwt: String::new(),
            max_page_size: default_max_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
