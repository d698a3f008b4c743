use std::collections::BTreeMap;
use std::time::Duration;

use log::{info, warn};
use structopt::StructOpt;
use tokio::{sync::oneshot, task::JoinHandle, time::sleep};

use labrpc::Network;
use viewservice::{Clerk, Config, View, ViewClient, ViewServer, DEAD_PINGS};

#[derive(StructOpt, Debug)]
#[structopt(name = env!("CARGO_PKG_NAME"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"), author = env!("CARGO_PKG_AUTHORS"))]
struct Opt {
    /// Number of simulated replicas pinging the view service
    #[structopt(short, long, default_value = "3")]
    replicas: usize,

    /// Ping interval in milliseconds
    #[structopt(long, default_value = "100")]
    ping_interval: u64,

    /// Missed pings before a replica is presumed dead
    #[structopt(long, default_value = "5")]
    dead_pings: u64,

    /// Seconds to run before shutting down
    #[structopt(short, long, default_value = "5")]
    duration: u64,

    /// Crash the primary after this many milliseconds
    #[structopt(long)]
    crash_after: Option<u64>,

    /// Restart the crashed primary this many milliseconds after the crash
    #[structopt(long)]
    restart_after: Option<u64>,

    /// Drop a fraction of requests
    #[structopt(long)]
    unreliable: bool,
}

struct Replica {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Option<View>>,
}

impl Replica {
    fn spawn(me: String, client: ViewClient, interval: Duration) -> Self {
        let (stop, stopped) = oneshot::channel();
        let clerk = Clerk::new(me, client);
        let task = tokio::spawn(async move { clerk.heartbeat(interval, stopped).await });
        Self { stop, task }
    }

    async fn stop(self) -> Option<View> {
        let _ = self.stop.send(());
        self.task.await.ok().flatten()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    let config = Config {
        ping_interval: Duration::from_millis(opt.ping_interval),
        dead_pings: opt.dead_pings,
    };

    let mut net = Network::new();
    net.handle().set_reliable(!opt.unreliable);
    let (server, client) = ViewServer::start(&net, "viewserver", config)?;
    tokio::spawn(async move { net.run().await });

    let mut replicas = BTreeMap::new();
    for i in 0..opt.replicas {
        let me = format!("replica-{}", i);
        replicas.insert(me.clone(), Replica::spawn(me, client.clone(), config.ping_interval));
    }

    let total = Duration::from_secs(opt.duration);
    let mut elapsed = Duration::from_millis(0);
    if let Some(crash_after) = opt.crash_after.map(Duration::from_millis) {
        sleep(crash_after).await;
        elapsed += crash_after;

        if let Some(primary) = server.view().primary {
            if let Some(replica) = replicas.remove(&primary) {
                let last = replica.stop().await;
                warn!("crashed primary {} (last saw {:?})", primary, last.map(|v| v.viewnum));

                let restart_after = opt.restart_after.map_or(
                    config.ping_interval * (2 * DEAD_PINGS.max(opt.dead_pings)) as u32,
                    Duration::from_millis,
                );
                sleep(restart_after).await;
                elapsed += restart_after;
                info!("restarting {}", primary);
                replicas.insert(
                    primary.clone(),
                    Replica::spawn(primary, client.clone(), config.ping_interval),
                );
            }
        }
    }
    if total > elapsed {
        sleep(total - elapsed).await;
    }

    for (me, replica) in replicas {
        if let Some(view) = replica.stop().await {
            info!("{}: last view {}", me, view);
        }
    }

    let view = server.view();
    let rpcs = server.rpc_count();
    server.kill();
    server.join().await?;
    println!("final view {} after {} rpcs", view, rpcs);
    Ok(())
}
