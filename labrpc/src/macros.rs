/// Declares an RPC service.
///
/// ```ignore
/// labrpc::service! {
///     service echo_svc {
///         fn echo(x: String) -> String;
///     }
/// }
/// ```
///
/// expands to a module `echo_svc` holding a `Service` trait to implement, a
/// `Server<T: Service>` to register on a [`Network`](crate::Network) and a
/// cloneable `Client` whose methods mirror the service.
#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use $crate::network::NetworkPackage;
            use $crate::server;

            use $crate::tokio::sync::mpsc::{self, Sender, Receiver};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::trace;


            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&mut self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
            }

            impl Client {

                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = Request::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: response::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                /// Id of the server this client talks to.
                pub fn server_id(&self) -> &str {
                    &self.server_id
                }

                pub async fn call(&self, req: String) -> Result<String> {
                    let (tx, mut rx) = mpsc::channel(1);
                    self.tx.send(NetworkPackage{to: self.server_id.clone(), reply: tx, data: req.clone()}).await?;
                    // The reply sender is dropped unanswered when the request is
                    // lost, the server is gone, or the handler failed.
                    if let Some(resp) = rx.recv().await {
                        trace!("{}: req: {}, resp: {}", self.server_id, req, &resp);
                        Ok(resp)
                    } else {
                        Err(anyhow!("{}: no reply", self.server_id))
                    }
                }
            }

            impl $crate::network::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                    }
                }
            }

            #[derive(Debug)]
            pub struct Server<T: Service + Send> {
                svc: T,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service + Send> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> (Self, Sender<NetworkPackage>) {
                    let (tx, rx) = mpsc::channel(100);
                    (Self {svc, rx}, tx)
                }

                async fn handle(&mut self) -> Result<bool> {
                    match self.rx.recv().await {
                        Some(NetworkPackage{to, reply, data}) => {
                            trace!("{}: handle recv: {}", to, &data);
                            let req: Request = serde_json::from_str(&data)?;
                            match req {
                                $(
                                    Request::$method_name { $($arg_id),* } => {
                                        let data = self.svc.$method_name($($arg_id),* ).await?;
                                        let resp = response::$method_name {
                                            data
                                        };
                                        let resp = serde_json::to_string(&resp)?;
                                        trace!("{}: handle send: {}", to, &resp);
                                        if reply.send(resp).await.is_err() {
                                            trace!("{}: caller went away", to);
                                        }
                                        Ok(true)
                                    }
                                )*
                            }
                        }
                        None => Ok(false),
                    }
                }
            }
        }
    };
}
