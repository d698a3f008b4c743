#![deny(missing_docs)]
//! View service for primary/backup replication.
//!
//! Replicas ping the service every [`PING_INTERVAL`]; it answers with the
//! current [`View`], naming at most one primary and one backup. A failure
//! detector promotes the backup when the primary goes quiet and drops a quiet
//! backup. The view only moves forward once the current primary has
//! acknowledged it, so no two servers act as primary for the same view.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A numbered assignment of the primary and backup roles.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Increases by one on every role change.
    pub viewnum: u64,
    /// Address of the primary.
    pub primary: Option<String>,
    /// Address of the backup, never equal to the primary.
    pub backup: Option<String>,
}

impl View {
    /// Whether `me` is the primary of this view.
    pub fn is_primary(&self, me: &str) -> bool {
        self.primary.as_deref() == Some(me)
    }

    /// Whether `me` is the backup of this view.
    pub fn is_backup(&self, me: &str) -> bool {
        self.backup.as_deref() == Some(me)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.viewnum,
            self.primary.as_deref().unwrap_or("-"),
            self.backup.as_deref().unwrap_or("-")
        )
    }
}

labrpc::service! {
    service view_svc {
        /// Reports that `me` is alive and has seen view `viewnum`.
        fn ping(me: String, viewnum: u64) -> View;
        /// Returns the current view.
        fn get() -> View;
    }
}

pub use view_svc::{Client as ViewClient, Server as ViewRpcServer, Service as ViewService};

mod client;
mod config;
mod error;
mod server;
mod store;

pub use client::Clerk;
pub use config::{Config, DEAD_PINGS, PING_INTERVAL};
pub use error::{Error, Result};
pub use server::ViewServer;
pub use store::ViewStore;
