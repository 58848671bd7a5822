use tokio::{sync::watch, task::JoinHandle};

use std::sync::Arc;

use crate::{models::UserId, service::NoteService};

/// Holds the signed-in identity and announces every change to subscribers.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    sender: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        self.set(Some(user));
    }

    pub fn sign_out(&self) {
        self.set(None);
    }

    pub fn current(&self) -> Option<UserId> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UserId>> {
        self.sender.subscribe()
    }

    fn set(&self, identity: Option<UserId>) {
        self.sender.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }
}

/// Forwards identity changes to `service` until the provider is dropped.
pub fn spawn_listener(
    service: Arc<NoteService>,
    mut identity: watch::Receiver<Option<UserId>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let current = identity.borrow_and_update().clone();
            if let Err(e) = service.on_identity_changed(current).await {
                tracing::warn!("identity change left the cache incomplete: {e}");
            }

            if identity.changed().await.is_err() {
                tracing::info!("identity provider closed, listener stopping");
                break;
            }
        }
    })
}
