use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use eyre::{Context, Result, bail};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// A TCP forwarder accepting connections on one or more bind addresses and
/// relaying them to upstream endpoints.
///
/// Routes are registered before `start`; `close` stops all listeners.
#[async_trait]
pub trait LoadBalancer: Send {
    fn add_route(&mut self, bind: SocketAddr, upstream_addrs: Vec<String>) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Factory for independent [`LoadBalancer`] instances.
pub trait LoadBalancerProvider: Send + Sync {
    fn new_load_balancer(&self) -> Result<Box<dyn LoadBalancer>>;
}

struct Route {
    bind: SocketAddr,
    upstreams: Arc<Upstreams>,
}

struct Upstreams {
    addrs: Vec<String>,
    next: AtomicUsize,
}

impl Upstreams {
    fn pick(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed);

        &self.addrs[i % self.addrs.len()]
    }
}

/// TCP load balancer built on tokio listeners, one accept loop per route.
pub struct TcpLoadBalancer {
    routes: Vec<Route>,
    tasks: JoinSet<()>,
    started: bool,
}

impl TcpLoadBalancer {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            tasks: JoinSet::new(),
            started: false,
        }
    }

    async fn accept_loop(listener: TcpListener, upstreams: Arc<Upstreams>) {
        loop {
            let (mut downstream, peer) = match listener.accept().await {
                Ok(x) => x,
                Err(_) => continue,
            };

            let upstreams = Arc::clone(&upstreams);

            tokio::spawn(async move {
                let target = upstreams.pick().to_string();

                debug!("forwarding connection from {peer} to {target}");

                let r: Result<()> = async {
                    let mut upstream = TcpStream::connect(&*target)
                        .await
                        .with_context(|| format!("failed to connect to upstream {target}"))?;

                    let _ = tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await;

                    Ok(())
                }
                .await;

                if let Err(e) = r {
                    warn!("forward[{peer},{target}]: {e:#}");
                }
            });
        }
    }
}

#[async_trait]
impl LoadBalancer for TcpLoadBalancer {
    fn add_route(&mut self, bind: SocketAddr, upstream_addrs: Vec<String>) -> Result<()> {
        if self.started {
            bail!("cannot add route to a started load balancer");
        }

        if upstream_addrs.is_empty() {
            bail!("route on {bind} has no upstream addresses");
        }

        self.routes.push(Route {
            bind,
            upstreams: Arc::new(Upstreams {
                addrs: upstream_addrs,
                next: AtomicUsize::new(0),
            }),
        });

        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        if self.started {
            bail!("load balancer is already started");
        }

        // bind everything first so a failing route leaves nothing running
        let mut listeners = Vec::with_capacity(self.routes.len());

        for route in &self.routes {
            let listener = TcpListener::bind(route.bind)
                .await
                .with_context(|| format!("failed to bind listener on {}", route.bind))?;

            listeners.push((listener, Arc::clone(&route.upstreams)));
        }

        for (listener, upstreams) in listeners {
            self.tasks.spawn(Self::accept_loop(listener, upstreams));
        }

        self.started = true;

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.tasks.shutdown().await;
        self.started = false;

        Ok(())
    }
}

/// Provider creating [`TcpLoadBalancer`] instances.
pub struct TcpLoadBalancerProvider;

impl LoadBalancerProvider for TcpLoadBalancerProvider {
    fn new_load_balancer(&self) -> Result<Box<dyn LoadBalancer>> {
        Ok(Box::new(TcpLoadBalancer::new()))
    }
}
