mod client;
mod config;
mod wire;

pub use client::ClusterClient;
pub use config::ClusterConfig;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),

    #[error("cluster api url '{0}' is not a valid base url")]
    InvalidApiUrl(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    HttpInvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}
