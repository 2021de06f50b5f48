mod config;
mod rows;
mod store;

pub use config::PostgrestConfig;
pub use store::PostgrestPinStore;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Got HTTP {0} with content '{1}'")]
    HttpFailWithBody(u16, String),

    #[error("postgrest url '{0}' is not a valid base url")]
    InvalidUrl(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    HttpInvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}
