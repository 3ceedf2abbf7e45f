//! Bot group
//!
//! A group owns the codec strategies, the username-keyed bot registry and
//! the lazily started IO thread. Adding the first bot spins the reactor up;
//! when the last bot leaves, the thread winds itself down, and a later add
//! starts a fresh one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::GroupConfig;
use crate::error::{NetworkError, Result};
use crate::net::connection::Bot;
use crate::net::reactor::{Command, Reactor, ReactorShared};

/// Live IO thread and its command channel
struct Runtime {
    shared: Arc<ReactorShared>,
    thread: JoinHandle<()>,
}

/// A cluster of bots sharing one reactor and one codec configuration
pub struct BotGroup {
    config: Arc<GroupConfig>,
    bots: Arc<DashMap<String, Arc<Bot>>>,
    runtime: Mutex<Option<Runtime>>,
    /// Token source; 0 is reserved for the reactor's waker
    next_token: AtomicUsize,
}

impl BotGroup {
    /// Create a group around a validated configuration
    pub fn new(config: GroupConfig) -> Self {
        Self {
            config: Arc::new(config),
            bots: Arc::new(DashMap::new()),
            runtime: Mutex::new(None),
            next_token: AtomicUsize::new(1),
        }
    }

    /// Register a new bot and start its login attempt.
    ///
    /// Usernames are unique within a group. The first add starts the IO
    /// thread.
    pub fn add(&self, username: impl Into<String>, password: impl Into<String>) -> Result<Arc<Bot>> {
        let username = username.into();
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        let mut slot = self.runtime.lock();
        let shared = self.ensure_runtime(&mut slot)?;

        let credentials = crate::protocol::Credentials::new(username.clone(), password.into());
        let bot = Arc::new(Bot::new(credentials, token, shared.clone()));

        match self.bots.entry(username.clone()) {
            Entry::Occupied(_) => {
                return Err(NetworkError::DuplicateBot(username).into());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(bot.clone());
            }
        }

        if !shared.push(Command::Register(bot.clone())) {
            // The loop exited between spawn and push; recover on a fresh one
            let shared = self.respawn_runtime(&mut slot)?;
            shared.push(Command::Register(bot.clone()));
        }

        debug!(username = %bot.username(), "Bot added to group");
        Ok(bot)
    }

    /// Look up a bot by username
    pub fn get(&self, username: &str) -> Option<Arc<Bot>> {
        self.bots.get(username).map(|entry| entry.value().clone())
    }

    /// Number of registered bots
    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Close a bot's connection and drop it from the registry
    pub fn remove(&self, username: &str) -> Result<()> {
        let bot = self
            .get(username)
            .ok_or_else(|| NetworkError::BotNotRegistered(username.into()))?;

        let slot = self.runtime.lock();
        let delivered = slot
            .as_ref()
            .map(|runtime| runtime.shared.push(Command::Close(bot.token())))
            .unwrap_or(false);
        drop(slot);

        if !delivered {
            // No live loop to do it for us
            self.bots.remove(username);
            bot.mark_logged_out();
        }
        Ok(())
    }

    /// Stop the IO thread, closing every bot
    pub fn shutdown(&self) {
        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            runtime.shared.push(Command::Shutdown);
            let _ = runtime.thread.join();
        }
        // Anything the loop never saw still has waiters to release
        for entry in self.bots.iter() {
            entry.value().mark_logged_out();
        }
        self.bots.clear();
    }

    fn ensure_runtime(&self, slot: &mut Option<Runtime>) -> Result<Arc<ReactorShared>> {
        if let Some(runtime) = slot.as_ref() {
            if !runtime.thread.is_finished() {
                return Ok(runtime.shared.clone());
            }
        }
        self.respawn_runtime(slot)
    }

    fn respawn_runtime(&self, slot: &mut Option<Runtime>) -> Result<Arc<ReactorShared>> {
        if let Some(old) = slot.take() {
            let _ = old.thread.join();
        }
        let reactor = Reactor::new(self.config.clone(), self.bots.clone())?;
        let shared = reactor.shared();
        let thread = reactor.spawn_thread()?;
        *slot = Some(Runtime { shared: shared.clone(), thread });
        debug!("IO thread spawned");
        Ok(shared)
    }
}

impl Drop for BotGroup {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BotGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotGroup")
            .field("bots", &self.bots.len())
            .field("address", &self.config.connect_address)
            .finish()
    }
}
