use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use labrpc::{anyhow, Network, NetworkHandle};
use log::{error, info};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    config::Config,
    error::{Error, Result},
    store::ViewStore,
    View, ViewClient, ViewRpcServer, ViewService,
};

/// State shared by the RPC handlers and the failure detector.
#[derive(Debug)]
struct Shared {
    me: String,
    net: NetworkHandle,
    store: Mutex<ViewStore>,
    dead: AtomicBool,
    rpc_count: AtomicU64,
    fatal: Mutex<Option<Error>>,
}

impl Shared {
    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    /// Locks the store, unless the service is dead.
    fn live_store(&self) -> Result<MutexGuard<'_, ViewStore>> {
        let store = self.store.lock().unwrap();
        if self.is_dead() {
            return Err(Error::Dead);
        }
        Ok(store)
    }

    /// Unregisters the service, then marks it dead. Callers hold the store
    /// lock, so no transaction runs after this one and a handler refused
    /// with `Dead` always finds the node already killed.
    fn unregister(&self) {
        self.net.kill(&self.me);
        self.dead.store(true, Ordering::SeqCst);
    }

    /// Stops the service on an unrecoverable error.
    fn halt(&self, e: Error) {
        error!("{}: view service halted: {}", self.me, e);
        self.unregister();
        let mut fatal = self.fatal.lock().unwrap();
        if fatal.is_none() {
            *fatal = Some(e);
        }
    }
}

/// Serves the view service RPCs.
#[derive(Debug, Clone)]
struct Handler {
    shared: Arc<Shared>,
}

#[labrpc::async_trait]
impl ViewService for Handler {
    async fn ping(&mut self, me: String, viewnum: u64) -> anyhow::Result<View> {
        self.shared.rpc_count.fetch_add(1, Ordering::SeqCst);
        let mut store = self.shared.live_store()?;
        match store.record_ping(&me, viewnum) {
            Ok(view) => Ok(view),
            Err(e) => {
                self.shared.halt(e.clone());
                Err(e.into())
            }
        }
    }

    async fn get(&mut self) -> anyhow::Result<View> {
        self.shared.rpc_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.shared.live_store()?.view())
    }
}

/// Runs one detector period. Returns false once the service is dead.
fn tick(shared: &Shared) -> bool {
    let mut store = match shared.live_store() {
        Ok(store) => store,
        Err(_) => return false,
    };
    match store.tick() {
        Ok(()) => true,
        Err(e) => {
            shared.halt(e);
            false
        }
    }
}

async fn detect_failures(shared: Arc<Shared>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // A stalled detector resumes with a single tick; missed periods are not
    // replayed against pings still waiting for the lock.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if !tick(&shared) {
            break;
        }
    }
    info!("failure detector stopped");
}

/// A running view service.
///
/// Started with [`ViewServer::start`], it serves `ping` and `get` on a
/// [`Network`] and runs the failure detector until it is killed or halts on a
/// fatal error.
#[derive(Debug)]
pub struct ViewServer {
    shared: Arc<Shared>,
    serve: JoinHandle<()>,
    detector: JoinHandle<()>,
}

impl ViewServer {
    /// Registers the service on `net` under `me` and spawns its tasks.
    /// Returns the server and a client for it.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(net: &Network, me: impl Into<String>, config: Config) -> Result<(Self, ViewClient)> {
        config.validate()?;
        let me = me.into();
        let shared = Arc::new(Shared {
            me: me.clone(),
            net: net.handle(),
            store: Mutex::new(ViewStore::new(config.dead_pings)),
            dead: AtomicBool::new(false),
            rpc_count: AtomicU64::new(0),
            fatal: Mutex::new(None),
        });

        let handler = Handler {
            shared: shared.clone(),
        };
        let (client, routine) = net
            .register_service::<ViewRpcServer<Handler>, _, _>(me.clone(), move || handler.clone());
        let serve = tokio::spawn(routine);
        let detector = tokio::spawn(detect_failures(shared.clone(), config.ping_interval));
        info!("{}: view service started with {:?}", me, config);

        let server = Self {
            shared,
            serve,
            detector,
        };
        Ok((server, client))
    }

    /// Address the service is registered under.
    pub fn me(&self) -> &str {
        &self.shared.me
    }

    /// Snapshot of the current view, read without an RPC.
    pub fn view(&self) -> View {
        self.shared.store.lock().unwrap().view()
    }

    /// Stops serving. In-flight transactions complete; later requests go
    /// unanswered and the failure detector exits on its next period.
    pub fn kill(&self) {
        let _store = self.shared.store.lock().unwrap();
        self.shared.unregister();
    }

    /// Whether the service was killed or halted.
    pub fn is_dead(&self) -> bool {
        self.shared.is_dead()
    }

    /// Number of RPCs received so far.
    pub fn rpc_count(&self) -> u64 {
        self.shared.rpc_count.load(Ordering::SeqCst)
    }

    /// The unrecoverable error the service halted on, if any.
    pub fn fatal_error(&self) -> Option<Error> {
        self.shared.fatal.lock().unwrap().clone()
    }

    /// Waits for the failure detector to stop, then unregisters the service
    /// and waits for it to stop serving.
    ///
    /// Returns the fatal error if the service halted on one.
    pub async fn join(self) -> Result<()> {
        let _ = self.detector.await;
        self.shared.net.kill(&self.shared.me);
        let _ = self.serve.await;
        match self.shared.fatal.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
