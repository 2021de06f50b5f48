use async_trait::async_trait;

/// An external pinning backend that content is handed off to.
#[async_trait]
pub trait PinningService: std::fmt::Debug + Send + Sync + 'static {
    /// Asks the backend to pin `cid`. Succeeds once the backend accepted
    /// the request; it does not wait for the content to be fetched.
    async fn pin(&self, cid: &str) -> anyhow::Result<()>;
}
