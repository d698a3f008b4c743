use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use futures::Future;
use log::{info, trace, warn};
use rand::Rng;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::server::Server;

/// Probability that an unreliable network loses a request.
const DROP_RATE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: Sender<String>,
    pub data: String,
}

/// A client bound to one server id, as generated by [`service!`](crate::service).
pub trait Client {
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
}

/// Cloneable control surface of a [`Network`], usable after the network
/// itself has been moved into its dispatch task.
#[derive(Debug, Clone, Default)]
pub struct NetworkHandle {
    nodes: Arc<Mutex<HashMap<String, Sender<NetworkPackage>>>>,
    killed: Arc<Mutex<HashSet<String>>>,
    unreliable: Arc<AtomicBool>,
}

impl NetworkHandle {
    /// Unregisters `id`. Its server stops once in-flight requests drain and
    /// every later request to it goes unanswered.
    pub fn kill(&self, id: &str) {
        self.killed.lock().unwrap().insert(id.to_owned());
        if self.nodes.lock().unwrap().remove(id).is_some() {
            info!("{}: killed", id);
        }
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(id)
    }

    /// When unreliable, each request is lost with a fixed probability.
    pub fn set_reliable(&self, reliable: bool) {
        self.unreliable.store(!reliable, Ordering::SeqCst);
    }

    fn is_killed(&self, id: &str) -> bool {
        self.killed.lock().unwrap().contains(id)
    }

    fn should_drop(&self) -> bool {
        self.unreliable.load(Ordering::SeqCst) && rand::thread_rng().gen_bool(DROP_RATE)
    }
}

pub struct Network {
    pub tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    handle: NetworkHandle,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            handle: NetworkHandle::default(),
        }
    }

    pub fn handle(&self) -> NetworkHandle {
        self.handle.clone()
    }

    /// A client for `id`, whether or not it is registered yet.
    pub fn client<C: Client>(&self, id: &str) -> C {
        C::from_server(id.to_owned(), self.tx.clone())
    }

    /// Registers the service built by `f` under `id`.
    ///
    /// The server is reachable as soon as this returns; the returned future
    /// serves it until it is killed, rebuilding it with `f` whenever a
    /// handler fails.
    pub fn register_service<S, C, F>(&self, id: String, f: F) -> (C, impl Future<Output = ()>)
    where
        F: Fn() -> S::Service + Send + 'static,
        S: Server + Send + 'static,
        C: Client,
    {
        let client = self.client(&id);
        let handle = self.handle.clone();
        handle.killed.lock().unwrap().remove(&id);

        let (mut server, chan) = S::from_service(f());
        handle.nodes.lock().unwrap().insert(id.clone(), chan);

        (client, async move {
            loop {
                match server.run().await {
                    Ok(()) => {
                        info!("{}: server stopped", id);
                        break;
                    }
                    Err(e) if handle.is_killed(&id) => {
                        info!("{}: server stopped: {}", id, e);
                        break;
                    }
                    Err(e) => {
                        warn!("{}: server restart: {}", id, e);
                        let (restarted, chan) = S::from_service(f());
                        server = restarted;
                        handle.nodes.lock().unwrap().insert(id.clone(), chan);
                    }
                }
            }
        })
    }

    /// Delivers requests to their servers. Runs until the task is dropped.
    pub async fn run(&mut self) {
        while let Some(p) = self.rx.recv().await {
            if self.handle.should_drop() {
                trace!("{}: request dropped", p.to);
                continue;
            }
            let node = {
                let x = self.handle.nodes.lock().unwrap();
                x.get(&p.to).cloned()
            };

            if let Some(x) = node {
                if let Err(e) = x.send(p).await {
                    warn!("{}: send to node failed, dropped", e.0.to);
                }
            } else {
                warn!("{}: node not found", p.to);
            }
        }
    }
}
