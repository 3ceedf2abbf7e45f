//! Single-threaded event loop
//!
//! One IO thread per group multiplexes connect, read and write readiness
//! for every bot over a `mio::Poll`. The thread blocks only in `poll`;
//! user threads reach it through a command queue paired with a waker.
//!
//! One bot's failure is contained: the error routes through the group's
//! exception handler and the loop carries on. A failure of the selector
//! itself logs out every bot and ends the thread; the group spawns a fresh
//! loop lazily on the next `add`.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::GroupConfig;
use crate::error::{BotscapeError, Result};
use crate::net::connection::{Bot, BotConnection};

/// Token reserved for cross-thread wake-ups
const WAKER_TOKEN: Token = Token(0);

/// Readiness event capacity per poll
const EVENT_CAPACITY: usize = 1024;

/// Cross-thread requests into the IO thread
pub(crate) enum Command {
    /// Connect and register a freshly added bot
    Register(Arc<Bot>),
    /// A producer enqueued outbound messages for this token
    ArmWrite(usize),
    /// Close one bot's connection
    Close(usize),
    /// Close everything and stop the thread
    Shutdown,
}

struct CommandQueue {
    commands: Vec<Command>,
    /// Set exactly once, by the IO thread on exit or by spawn failure;
    /// pushes after that are refused so callers can respawn.
    closed: bool,
}

/// Handle shared between the IO thread and every producer
pub(crate) struct ReactorShared {
    queue: Mutex<CommandQueue>,
    waker: Waker,
}

impl ReactorShared {
    /// Enqueue a command and wake the loop. Returns `false` if the loop
    /// already exited and a new one must be spawned.
    pub(crate) fn push(&self, command: Command) -> bool {
        {
            let mut queue = self.queue.lock();
            if queue.closed {
                return false;
            }
            queue.commands.push(command);
        }
        // A failed wake on a live loop surfaces at the next poll anyway
        let _ = self.waker.wake();
        true
    }

    fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut self.queue.lock().commands)
    }

    /// Close the queue if nothing is pending; the atomicity with `push`
    /// guarantees no command is ever dropped on the floor.
    fn close_if_idle(&self) -> bool {
        let mut queue = self.queue.lock();
        if queue.commands.is_empty() {
            queue.closed = true;
            true
        } else {
            false
        }
    }

    fn force_close(&self) {
        self.queue.lock().closed = true;
    }
}

/// Selector-driven dispatcher for all connections of one group
pub(crate) struct Reactor {
    poll: Poll,
    events: Events,
    connections: HashMap<Token, BotConnection>,
    shared: Arc<ReactorShared>,
    bots: Arc<DashMap<String, Arc<Bot>>>,
    config: Arc<GroupConfig>,
}

impl Reactor {
    pub(crate) fn new(
        config: Arc<GroupConfig>,
        bots: Arc<DashMap<String, Arc<Bot>>>,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN)?;
        let shared = Arc::new(ReactorShared {
            queue: Mutex::new(CommandQueue {
                commands: Vec::new(),
                closed: false,
            }),
            waker,
        });

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            connections: HashMap::new(),
            shared,
            bots,
            config,
        })
    }

    pub(crate) fn shared(&self) -> Arc<ReactorShared> {
        self.shared.clone()
    }

    /// Move the reactor onto its dedicated IO thread
    pub(crate) fn spawn_thread(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("botscape-io".into())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        debug!("IO thread started");
        loop {
            if let Err(err) = self.poll.poll(&mut self.events, None) {
                // Selector failure is unrecoverable for this loop
                error!(error = %err, "Selector failure; logging out all bots");
                self.shared.force_close();
                self.close_all();
                return;
            }

            let ready: Vec<(Token, bool, bool)> = self
                .events
                .iter()
                .filter(|event| event.token() != WAKER_TOKEN)
                .map(|event| {
                    (
                        event.token(),
                        event.is_readable() || event.is_read_closed(),
                        event.is_writable(),
                    )
                })
                .collect();

            if self.drain_commands() {
                debug!("Shutdown requested; stopping IO thread");
                self.shared.force_close();
                self.close_all();
                return;
            }

            for (token, readable, writable) in ready {
                self.dispatch(token, readable, writable);
            }

            if self.connections.is_empty() && self.shared.close_if_idle() {
                debug!("Last bot gone; stopping IO thread");
                return;
            }
        }
    }

    /// Apply queued cross-thread commands. Returns true on shutdown.
    fn drain_commands(&mut self) -> bool {
        for command in self.shared.drain() {
            match command {
                Command::Register(bot) => self.register_bot(bot),
                Command::ArmWrite(token) => self.update_interest(Token(token)),
                Command::Close(token) => self.close_bot(Token(token)),
                Command::Shutdown => return true,
            }
        }
        false
    }

    /// Open the non-blocking connect for a new bot and track it
    fn register_bot(&mut self, bot: Arc<Bot>) {
        let token = Token(bot.token());
        let connect = || -> Result<BotConnection> {
            let stream = TcpStream::connect(self.config.connect_address)?;
            stream.set_nodelay(true)?;
            let mut connection = BotConnection::new(stream, bot.clone());
            self.poll.registry().register(
                connection.stream_mut(),
                token,
                Interest::WRITABLE,
            )?;
            Ok(connection)
        };

        match connect() {
            Ok(connection) => {
                debug!(username = %bot.username(), "Connecting");
                self.connections.insert(token, connection);
            }
            Err(err) => {
                self.bots.remove(bot.username());
                bot.mark_logged_out();
                (self.config.exception_handler)(bot.username(), err);
            }
        }
    }

    fn dispatch(&mut self, token: Token, readable: bool, writable: bool) {
        if let Err(err) = self.drive(token, readable, writable) {
            self.fail_bot(token, err);
        }
    }

    fn drive(&mut self, token: Token, readable: bool, writable: bool) -> Result<()> {
        let Some(connection) = self.connections.get_mut(&token) else {
            return Ok(());
        };

        if connection.is_connecting() {
            if !connection.try_finish_connect()? {
                return Ok(());
            }
            connection.begin_login(&self.config)?;
        } else {
            if readable {
                connection.on_readable(&self.config)?;
            }
            if writable {
                connection.on_writable(&self.config)?;
            }
        }

        self.update_interest(token);
        Ok(())
    }

    /// Re-arm readiness interest to match the connection's pending work
    fn update_interest(&mut self, token: Token) {
        let Some(connection) = self.connections.get_mut(&token) else {
            return;
        };
        let interest = if connection.wants_write() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        if let Err(err) = self
            .poll
            .registry()
            .reregister(connection.stream_mut(), token, interest)
        {
            let err = BotscapeError::from(err);
            self.fail_bot(token, err);
        }
    }

    /// Error path: close the bot and route the error to the group handler
    fn fail_bot(&mut self, token: Token, err: BotscapeError) {
        if let Some(bot) = self.remove_connection(token) {
            warn!(username = %bot.username(), error = %err, "Bot connection failed");
            (self.config.exception_handler)(bot.username(), err);
        }
    }

    /// Clean close requested through the group
    fn close_bot(&mut self, token: Token) {
        if let Some(bot) = self.remove_connection(token) {
            debug!(username = %bot.username(), "Bot closed");
        }
    }

    fn remove_connection(&mut self, token: Token) -> Option<Arc<Bot>> {
        let mut connection = self.connections.remove(&token)?;
        let _ = self.poll.registry().deregister(connection.stream_mut());
        let bot = connection.handle().clone();
        self.bots.remove(bot.username());
        bot.mark_logged_out();
        Some(bot)
    }

    fn close_all(&mut self) {
        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_bot(token);
        }
    }
}
