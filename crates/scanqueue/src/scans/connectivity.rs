use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What subscribers see. `reconnects` goes up on every offline -> online
/// edge, so a drop and recovery that happen between two reads still show up
/// as a new value even though `online` looks unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkState {
    pub online: bool,
    pub reconnects: u64,
}

/// Current online/offline state plus change notifications.
///
/// Setting the same value twice does not wake subscribers, so a flapping
/// source that repeats "online" cannot trigger extra replay passes.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<LinkState>>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(LinkState {
            online: initially_online,
            reconnects: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    /// Returns true when the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if current.online == online {
                return false;
            }
            current.online = online;
            if online {
                current.reconnects += 1;
            }
            true
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.tx.subscribe()
    }
}

/// One health check; any 2xx counts as online.
pub async fn probe_once(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(err) => {
            tracing::debug!(url, error = %err, "health probe failed");
            false
        }
    }
}

/// Polls `url` forever and mirrors the result into `connectivity`.
pub fn spawn_probe(
    client: reqwest::Client,
    url: String,
    every: Duration,
    connectivity: Connectivity,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let online = probe_once(&client, &url).await;
            if connectivity.set_online(online) {
                if online {
                    tracing::info!(url = %url, "upload endpoint reachable, going online");
                } else {
                    tracing::warn!(url = %url, "upload endpoint unreachable, going offline");
                }
            }
        }
    })
}
