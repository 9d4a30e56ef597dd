//! Session ownership and distribution.
//!
//! [`ChatProvider`] owns the single connection to the chat service for the
//! lifetime of an application instance. [`ChatHandle`] is the cheap,
//! clone-able context handed to anything that needs the session: it exposes
//! the connected user, the service, and a readiness signal that resolves
//! exactly once, including for subscribers that arrive after the fact.

use std::sync::Arc;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use chat_sdk::{ChatService, ChatServiceError, Room, TokenProvider, User};

/// Connection configuration for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Service instance locator, e.g. `"v1:cluster:instance-id"`.
    pub instance_locator: String,
    /// The id to connect as.
    pub user_id: String,
}

impl ProviderConfig {
    pub fn new(instance_locator: &str, user_id: &str) -> Self {
        Self {
            instance_locator: instance_locator.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// An established connection to the chat service.
#[derive(Debug, Clone)]
pub struct Session {
    pub current_user: User,
    /// Instance id for log correlation; fresh per connection.
    pub session_id: Uuid,
}

/// Owns the one connection per application instance.
pub struct ChatProvider<S, P> {
    service: Arc<S>,
    token_provider: P,
    config: ProviderConfig,
    session: Arc<RwLock<Option<Session>>>,
    ready_tx: watch::Sender<bool>,
}

impl<S: ChatService, P: TokenProvider> ChatProvider<S, P> {
    pub fn new(service: Arc<S>, token_provider: P, config: ProviderConfig) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            service,
            token_provider,
            config,
            session: Arc::new(RwLock::new(None)),
            ready_tx,
        }
    }

    /// Issue the single connection attempt.
    ///
    /// On success the session is stored and every current and future
    /// [`ChatHandle::ready`] caller is released. On failure the error is
    /// logged and the session stays unready indefinitely; nothing is
    /// propagated to dependents and no retry is attempted.
    pub async fn connect(&self) {
        if *self.ready_tx.borrow() {
            debug!("[connect]: session already established, ignoring");
            return;
        }
        match self.try_connect().await {
            Ok(session) => {
                info!(
                    "[connect]: session {} established for user {}",
                    session.session_id, session.current_user.id
                );
                *self.session.write().await = Some(session);
                self.ready_tx.send_replace(true);
            }
            Err(e) => {
                error!(
                    "[connect]: connection failed for user {}: {e}",
                    self.config.user_id
                );
            }
        }
    }

    async fn try_connect(&self) -> Result<Session, ChatServiceError> {
        let current_user = self
            .service
            .connect(
                &self.config.instance_locator,
                &self.token_provider,
                &self.config.user_id,
            )
            .await?;
        Ok(Session {
            current_user,
            session_id: Uuid::new_v4(),
        })
    }

    /// A context handle for dependents. Available before the connection is
    /// established; consumers observe readiness through it.
    pub fn handle(&self) -> ChatHandle<S> {
        ChatHandle {
            service: Arc::clone(&self.service),
            session: Arc::clone(&self.session),
            ready: self.ready_tx.subscribe(),
        }
    }
}

/// Shared view of the provider's state.
pub struct ChatHandle<S> {
    service: Arc<S>,
    session: Arc<RwLock<Option<Session>>>,
    ready: watch::Receiver<bool>,
}

impl<S> Clone for ChatHandle<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            session: Arc::clone(&self.session),
            ready: self.ready.clone(),
        }
    }
}

impl<S: ChatService> ChatHandle<S> {
    /// True until the session is established; never flips back.
    pub fn is_loading(&self) -> bool {
        !*self.ready.borrow()
    }

    /// Resolves once the session is ready. Completes immediately for
    /// subscribers that arrive after readiness.
    pub async fn ready(&self) {
        let mut rx = self.ready.clone();
        if rx.wait_for(|ready| *ready).await.is_err() {
            // The provider was torn down without ever connecting; a session
            // that never became ready stays unready forever.
            std::future::pending::<()>().await;
        }
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.current_user.clone())
    }

    /// Snapshot of the rooms the connected user belongs to; empty while
    /// unconnected.
    pub async fn rooms(&self) -> Vec<Room> {
        match self.current_user().await {
            Some(user) => self.service.rooms(&user.id),
            None => Vec::new(),
        }
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }
}
