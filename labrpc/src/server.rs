use crate::network::NetworkPackage;
use anyhow::Result;
use tokio::sync::mpsc::Sender;

#[async_trait::async_trait]
pub trait Server {
    type Service;

    /// Wraps `svc` and returns the channel requests should be delivered on.
    fn from_service(svc: Self::Service) -> (Self, Sender<NetworkPackage>)
    where
        Self: Sized;

    /// Serves one request. Returns `Ok(false)` once no sender is left.
    async fn handle(&mut self) -> Result<bool>;

    async fn run(&mut self) -> Result<()> {
        while self.handle().await? {}
        Ok(())
    }
}
