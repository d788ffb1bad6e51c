use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::time::{self, MissedTickBehavior};

use crate::cluster::ServiceClient;
use crate::service::ServiceHandler;

use super::{IpSet, IpSetRefresher};

pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);

/// Tracks changes of the host IP set and re-handles every service when the
/// set drifts, so mappings follow interface changes.
pub struct Tracker {
    refresher: Arc<dyn IpSetRefresher>,
    client: Arc<dyn ServiceClient>,
    handler: Arc<dyn ServiceHandler>,
    period: Duration,
    ip_set: IpSet,
}

impl Tracker {
    pub fn new(
        refresher: Arc<dyn IpSetRefresher>,
        client: Arc<dyn ServiceClient>,
        handler: Arc<dyn ServiceHandler>,
        period: Duration,
    ) -> Self {
        Self {
            refresher,
            client,
            handler,
            period,
            ip_set: IpSet::new(),
        }
    }

    /// Runs until cancelled. A failing tick is logged and never ends the loop.
    pub async fn run(mut self) -> Result<()> {
        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.handle_changes().await {
                error!("failed to handle IP set changes: {e:#}");
            }
        }
    }

    async fn handle_changes(&mut self) -> Result<()> {
        debug!("check for changed IPs");

        let ip_set = self
            .refresher
            .refresh()
            .context("failed to refresh IP set")?;

        if ip_set == self.ip_set {
            debug!("IP set didn't change, skip refresh");

            return Ok(());
        }

        self.ip_set = ip_set;

        info!("detected changes on IP set, refreshing mappings");

        let services = self
            .client
            .list_all()
            .await
            .context("failed to list services")?;

        let total = services.len();
        let mut failures = Vec::new();

        for svc in &services {
            if let Err(e) = self.handler.handle(svc).await {
                let name = svc.metadata.name.as_deref().unwrap_or_default();
                let namespace = svc.metadata.namespace.as_deref().unwrap_or_default();

                failures.push(format!("{namespace}/{name}: {e:#}"));
            }
        }

        if !failures.is_empty() {
            return Err(eyre!(
                "failed to handle {} of {total} services: {}",
                failures.len(),
                failures.join("; ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use eyre::bail;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    struct MockRefresher {
        ip_set: StdMutex<IpSet>,
        fail: StdMutex<bool>,
    }

    impl MockRefresher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                ip_set: StdMutex::new(IpSet::new()),
                fail: StdMutex::new(false),
            })
        }

        fn set(&self, ips: &[&str]) {
            *self.ip_set.lock().unwrap() = ips.iter().map(|ip| ip.to_string()).collect();
        }
    }

    impl IpSetRefresher for MockRefresher {
        fn refresh(&self) -> Result<IpSet> {
            if *self.fail.lock().unwrap() {
                bail!("refresh failed");
            }

            Ok(self.ip_set.lock().unwrap().clone())
        }
    }

    struct MockServiceClient {
        services: Vec<Service>,
    }

    #[async_trait]
    impl ServiceClient for MockServiceClient {
        async fn get(&self, _namespace: &str, _name: &str) -> Result<Option<Service>> {
            unimplemented!("not used by the tracker")
        }

        async fn list_all(&self) -> Result<Vec<Service>> {
            Ok(self.services.clone())
        }
    }

    #[derive(Default)]
    struct MockHandler {
        handled: StdMutex<Vec<String>>,
    }

    impl MockHandler {
        fn handled(&self) -> Vec<String> {
            self.handled.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServiceHandler for MockHandler {
        async fn handle(&self, svc: &Service) -> Result<()> {
            let name = svc.metadata.name.as_deref().unwrap_or_default();
            let namespace = svc.metadata.namespace.as_deref().unwrap_or_default();

            self.handled.lock().unwrap().push(format!("{name}.{namespace}"));

            Ok(())
        }

        async fn handle_delete(&self, _svc_name: &str) -> Result<()> {
            unimplemented!("not used by the tracker")
        }
    }

    fn service(name: &str, namespace: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn client() -> Arc<MockServiceClient> {
        Arc::new(MockServiceClient {
            services: vec![service("test1", "testns1"), service("test2", "testns2")],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn handles_all_services_on_ip_set_change() {
        let refresher = MockRefresher::new();
        let handler = Arc::new(MockHandler::default());

        let tracker = Tracker::new(
            Arc::clone(&refresher) as _,
            client(),
            Arc::clone(&handler) as _,
            Duration::from_secs(2),
        );

        let task = tokio::spawn(tracker.run());

        // ticks with an unchanged (empty) set do nothing
        time::sleep(Duration::from_secs(3)).await;
        assert!(handler.handled().is_empty());

        refresher.set(&["192.168.2.42", "172.20.0.42"]);

        time::sleep(Duration::from_secs(2)).await;

        let mut handled = handler.handled();
        handled.sort();
        assert_eq!(handled, vec!["test1.testns1", "test2.testns2"]);

        // an unchanged set performs no further handling
        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(handler.handled().len(), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_does_not_end_the_loop() {
        let refresher = MockRefresher::new();
        let handler = Arc::new(MockHandler::default());

        let tracker = Tracker::new(
            Arc::clone(&refresher) as _,
            client(),
            Arc::clone(&handler) as _,
            Duration::from_secs(2),
        );

        *refresher.fail.lock().unwrap() = true;

        let task = tokio::spawn(tracker.run());

        time::sleep(Duration::from_secs(5)).await;
        assert!(handler.handled().is_empty());
        assert!(!task.is_finished());

        *refresher.fail.lock().unwrap() = false;
        refresher.set(&["192.168.2.42"]);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handler.handled().len(), 2);

        task.abort();
    }
}
