use eyre::Result;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::watch;

#[derive(Debug)]
pub struct Signals {
    int: Signal,
    term: Signal,
}

impl Signals {
    pub fn new() -> Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    pub async fn wait_terminate(&mut self) {
        tokio::select! {
            _ = self.int.recv() => {},
            _ = self.term.recv() => {}
        }
    }

    /// Turns the signals into a shutdown flag observable by many tasks.
    pub fn into_shutdown(mut self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            self.wait_terminate().await;

            let _ = tx.send(true);
        });

        rx
    }
}
