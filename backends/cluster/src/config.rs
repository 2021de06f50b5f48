#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Usually supplied through `CLUSTER_API_URL`.
    #[serde(default)]
    pub api_url: String,
    /// Pre-encoded `user:password` for HTTP basic auth.
    #[serde(default)]
    pub basic_auth_token: Option<String>,
    #[serde(default = "default_supports_multi_cid")]
    pub supports_multi_cid: bool,
    /// Upper bound on CIDs per `/pins` call, keeps the query string short.
    #[serde(default = "default_max_cids_per_request")]
    pub max_cids_per_request: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_supports_multi_cid() -> bool {
    true
}

fn default_max_cids_per_request() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            basic_auth_token: None,
            supports_multi_cid: default_supports_multi_cid(),
            max_cids_per_request: default_max_cids_per_request(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
