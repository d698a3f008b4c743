use std::time::Duration;

use labrpc::anyhow::Result;
use log::{info, trace};
use tokio::{sync::oneshot, time::MissedTickBehavior};

use crate::{View, ViewClient};

/// Client of the view service, used by replicas to report liveness and by
/// anyone looking for the current primary.
#[derive(Debug, Clone)]
pub struct Clerk {
    me: String,
    server: ViewClient,
}

impl Clerk {
    /// A clerk pinging on behalf of `me`.
    pub fn new(me: impl Into<String>, server: ViewClient) -> Self {
        Self {
            me: me.into(),
            server,
        }
    }

    /// Address reported in pings.
    pub fn me(&self) -> &str {
        &self.me
    }

    /// Reports that this server is alive and has seen view `viewnum`.
    /// A restarted server pings with 0.
    pub async fn ping(&self, viewnum: u64) -> Result<View> {
        self.server.ping(self.me.clone(), viewnum).await
    }

    /// Fetches the current view.
    pub async fn get(&self) -> Result<View> {
        self.server.get().await
    }

    /// The current primary, or `None` if there is none or the service could
    /// not be reached.
    pub async fn primary(&self) -> Option<String> {
        self.get().await.ok().and_then(|v| v.primary)
    }

    /// Pings every `interval` with the latest view number received, starting
    /// from 0, until `stop` fires or its sender is dropped. Returns the last
    /// view received.
    pub async fn heartbeat(&self, interval: Duration, mut stop: oneshot::Receiver<()>) -> Option<View> {
        let mut ticker = tokio::time::interval(interval);
        // After a stall, ping once and resume the period from there.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<View> = None;
        loop {
            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    let viewnum = last.as_ref().map_or(0, |v| v.viewnum);
                    match self.ping(viewnum).await {
                        Ok(view) => {
                            if last.as_ref() != Some(&view) {
                                info!("{}: view {}", self.me, view);
                            }
                            last = Some(view);
                        }
                        Err(e) => trace!("{}: ping failed: {}", self.me, e),
                    }
                }
            }
        }
        last
    }
}
