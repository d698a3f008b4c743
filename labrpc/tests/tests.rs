use labrpc::{anyhow::anyhow, anyhow::Result, tokio, Network};

labrpc::service! {
    service echo_svc {
        fn echo(x: String) -> String;
        fn count() -> u64;
        fn fail() -> ();
    }
}

use echo_svc::{Client as EchoClient, Server as EchoServer, Service as EchoService};

#[derive(Default)]
struct Echo {
    calls: u64,
}

#[labrpc::async_trait]
impl EchoService for Echo {
    async fn echo(&mut self, x: String) -> Result<String> {
        self.calls += 1;
        Ok(x)
    }
    async fn count(&mut self) -> Result<u64> {
        self.calls += 1;
        Ok(self.calls)
    }
    async fn fail(&mut self) -> Result<()> {
        Err(anyhow!("handler failed"))
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spawn_echo(net: &Network, id: &str) -> (EchoClient, tokio::task::JoinHandle<()>) {
    let (client, routine) =
        net.register_service::<EchoServer<Echo>, _, _>(id.to_owned(), Echo::default);
    (client, tokio::spawn(routine))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_call() {
    init_logger();
    let mut net = Network::new();
    let (client, _server) = spawn_echo(&net, "echo-0");
    tokio::spawn(async move { net.run().await });

    assert_eq!(client.echo("hello".to_owned()).await.unwrap(), "hello");
    assert_eq!(client.count().await.unwrap(), 2);
    assert_eq!(client.server_id(), "echo-0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_server() {
    init_logger();
    let mut net = Network::new();
    let client: EchoClient = net.client("nobody");
    tokio::spawn(async move { net.run().await });

    assert!(client.echo("hello".to_owned()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_handler_restarts_server() {
    init_logger();
    let mut net = Network::new();
    let (client, _server) = spawn_echo(&net, "echo-0");
    tokio::spawn(async move { net.run().await });

    assert_eq!(client.count().await.unwrap(), 1);
    assert!(client.fail().await.is_err());
    // The rebuilt server starts from a fresh service; requests racing the
    // restart go unanswered.
    loop {
        if let Ok(n) = client.count().await {
            assert_eq!(n, 1);
            break;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_kill() {
    init_logger();
    let mut net = Network::new();
    let handle = net.handle();
    let (client, server) = spawn_echo(&net, "echo-0");
    tokio::spawn(async move { net.run().await });

    assert!(client.echo("x".to_owned()).await.is_ok());
    assert!(handle.is_registered("echo-0"));

    handle.kill("echo-0");
    assert!(!handle.is_registered("echo-0"));
    server.await.expect("server should stop after kill");
    assert!(client.echo("x".to_owned()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreliable() {
    init_logger();
    let mut net = Network::new();
    let handle = net.handle();
    let (client, _server) = spawn_echo(&net, "echo-0");
    tokio::spawn(async move { net.run().await });

    handle.set_reliable(false);
    let mut ok = 0;
    for _ in 0..200 {
        if client.echo("x".to_owned()).await.is_ok() {
            ok += 1;
        }
    }
    assert!(ok > 0 && ok < 200, "{} of 200 calls succeeded", ok);

    handle.set_reliable(true);
    for _ in 0..20 {
        assert!(client.echo("x".to_owned()).await.is_ok());
    }
}
