//! Integration tests for the login handshake and game traffic
//!
//! Each test runs a scripted 317 server on a loopback listener and drives
//! real bots at it through a `BotGroup`, verifying:
//! - the full three-step handshake, including partial reads
//! - login rejection isolation (one bot failing leaves the rest alone)
//! - opcode masking in both directions
//! - variable-length frame reassembly
//! - group lifecycle (lazy IO thread start, removal, shutdown)

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::channel;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use botscape::crypto::Isaac;
use botscape::protocol::outgoing::ButtonClickPacket;
use botscape::{BotGroup, ConnState, GroupConfig};

/// Server seed used by the scripted handshakes
const SERVER_SEED: u64 = 0x0102_0304_0506_0708;

/// Seed words recovered from one client's secure block
type SessionSeeds = [u32; 4];

/// Spawn a listener that feeds each accepted connection, in accept order,
/// to the next script in the list.
fn scripted_server(
    scripts: Vec<Box<dyn FnOnce(TcpStream) + Send>>,
) -> (SocketAddr, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let addr = listener.local_addr().unwrap();

    let handle = thread::spawn(move || {
        let mut workers = Vec::new();
        for script in scripts {
            let (stream, _) = listener.accept().expect("accept");
            stream.set_nodelay(true).ok();
            workers.push(thread::spawn(move || script(stream)));
        }
        for worker in workers {
            worker.join().expect("script thread panicked");
        }
    });

    (addr, handle)
}

fn read_exact_n(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).expect("short read from client");
    buf
}

/// Drive the server half of the handshake and return the session seed
/// words pulled out of the client's plaintext secure block.
///
/// `split_initial_response` sends the stage-1 response in two fragments to
/// force the client across multiple read wake-ups.
fn serve_handshake(
    stream: &mut TcpStream,
    username: &str,
    password: &str,
    split_initial_response: bool,
) -> SessionSeeds {
    // Stage 1: login opcode and name hash
    let hello = read_exact_n(stream, 2);
    assert_eq!(hello[0], 14);

    let mut response = vec![0u8; 8];
    response.push(0);
    response.extend_from_slice(&SERVER_SEED.to_be_bytes());
    if split_initial_response {
        stream.write_all(&response[..10]).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(30));
        stream.write_all(&response[10..]).unwrap();
    } else {
        stream.write_all(&response).unwrap();
    }

    // Stage 2: client-info block
    let header = read_exact_n(stream, 2);
    assert_eq!(header[0], 0x10, "login type byte");
    let body = read_exact_n(stream, header[1] as usize);

    assert_eq!(body[0], 0xFF, "client variant marker");
    assert_eq!(u16::from_be_bytes([body[1], body[2]]), 317, "revision");
    assert_eq!(body[3], 0, "low memory flag");

    let secure_len = body[40] as usize;
    let secure = &body[41..41 + secure_len];
    assert_eq!(secure[0], 10, "secure block magic");

    let mut seeds = [0u32; 4];
    for (i, seed) in seeds.iter_mut().enumerate() {
        let at = 1 + i * 4;
        *seed = u32::from_be_bytes([secure[at], secure[at + 1], secure[at + 2], secure[at + 3]]);
    }
    assert_eq!(seeds[2], (SERVER_SEED >> 32) as u32);
    assert_eq!(seeds[3], SERVER_SEED as u32);

    let tail = &secure[21..];
    let mut expected = Vec::new();
    expected.extend_from_slice(username.as_bytes());
    expected.push(0x0A);
    expected.extend_from_slice(password.as_bytes());
    expected.push(0x0A);
    assert_eq!(tail, &expected[..], "credentials");

    // Stage 3: acknowledge
    stream.write_all(&[2, 0, 0]).unwrap();
    seeds
}

fn happy_script(username: &str, password: &str) -> Box<dyn FnOnce(TcpStream) + Send> {
    let username = username.to_string();
    let password = password.to_string();
    Box::new(move |mut stream| {
        serve_handshake(&mut stream, &username, &password, false);
        // Keep the connection up until the client side goes away
        let mut sink = [0u8; 64];
        while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
    })
}

fn wait_until(what: &str, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

fn group_for(addr: SocketAddr) -> BotGroup {
    BotGroup::new(GroupConfig::new().with_address(addr))
}

/// Happy path: full handshake, login future resolves true
#[test]
fn test_handshake_happy_path() {
    let (addr, server) = scripted_server(vec![happy_script("bot", "pw")]);
    let group = group_for(addr);

    let bot = group.add("bot", "pw").unwrap();
    assert!(bot.login_future().wait_timeout(Duration::from_secs(5)));
    assert_eq!(bot.state(), ConnState::LoggedIn);

    group.shutdown();
    server.join().unwrap();
}

/// A rejected login routes through the exception handler and closes only
/// the affected bot
#[test]
fn test_login_rejection_is_isolated() {
    let reject_script: Box<dyn FnOnce(TcpStream) + Send> = Box::new(|mut stream| {
        let _ = read_exact_n(&mut stream, 2);
        // 8 filler bytes, then a rejection status instead of 0
        let mut response = vec![0u8; 8];
        response.push(3);
        response.extend_from_slice(&SERVER_SEED.to_be_bytes());
        stream.write_all(&response).unwrap();
    });
    let (addr, server) = scripted_server(vec![reject_script, happy_script("survivor", "pw")]);

    let (error_tx, error_rx) = channel();
    let error_tx = Mutex::new(error_tx);
    let config = GroupConfig::new()
        .with_address(addr)
        .on_exception(move |username, err| {
            error_tx
                .lock()
                .unwrap()
                .send((username.to_string(), err.to_string()))
                .ok();
        });
    let group = BotGroup::new(config);

    let doomed = group.add("doomed", "pw").unwrap();
    let (username, error) = error_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("rejection should reach the exception handler");
    assert_eq!(username, "doomed");
    assert!(error.contains("InvalidCredentials"), "got: {error}");

    wait_until("doomed bot to be dropped", Duration::from_secs(5), || {
        group.get("doomed").is_none()
    });
    assert_eq!(doomed.state(), ConnState::LoggedOut);
    assert!(!doomed.login_future().is_logged_in());

    // The loop survived; a second bot still logs in fine
    let survivor = group.add("survivor", "pw").unwrap();
    assert!(survivor.login_future().wait_timeout(Duration::from_secs(5)));

    group.shutdown();
    server.join().unwrap();
}

/// Stage-1 response delivered across two socket writes must be retained
/// and completed on a later wake-up
#[test]
fn test_partial_initial_response() {
    let script: Box<dyn FnOnce(TcpStream) + Send> = Box::new(|mut stream| {
        serve_handshake(&mut stream, "bot", "pw", true);
    });
    let (addr, server) = scripted_server(vec![script]);
    let group = group_for(addr);

    let bot = group.add("bot", "pw").unwrap();
    assert!(bot.login_future().wait_timeout(Duration::from_secs(5)));

    group.shutdown();
    server.join().unwrap();
}

/// Outbound messages carry an opcode offset by exactly one keystream word
#[test]
fn test_outbound_opcode_masking() {
    let (frame_tx, frame_rx) = channel::<Vec<u8>>();
    let script: Box<dyn FnOnce(TcpStream) + Send> = Box::new(move |mut stream| {
        let seeds = serve_handshake(&mut stream, "bot", "pw", false);
        // The server unmasks client opcodes with the plain session seeds
        let mut decryptor = Isaac::new(&seeds);
        let frame = read_exact_n(&mut stream, 3);
        let opcode = frame[0].wrapping_sub(decryptor.next_key() as u8);
        assert_eq!(opcode, 185, "button click opcode");
        frame_tx.send(frame).unwrap();
    });
    let (addr, server) = scripted_server(vec![script]);
    let group = group_for(addr);

    let bot = group.add("bot", "pw").unwrap();
    assert!(bot.login_future().wait_timeout(Duration::from_secs(5)));

    bot.send(&ButtonClickPacket { button: 2452 }).unwrap();
    let frame = frame_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("server should receive the click");
    assert_eq!(&frame[1..], &[0x09, 0x94]);

    group.shutdown();
    server.join().unwrap();
}

/// A var-short frame with a length above 255 arrives intact
#[test]
fn test_inbound_var_short_frame() {
    let body: Vec<u8> = (0..259u32).map(|i| (i * 7) as u8).collect();
    let expected_body = body.clone();

    let script: Box<dyn FnOnce(TcpStream) + Send> = Box::new(move |mut stream| {
        let seeds = serve_handshake(&mut stream, "bot", "pw", false);
        // The server masks its opcodes with the offset seeds
        let mut encryptor = Isaac::with_seed_offset(&seeds, 50);
        let mut frame = vec![53u8.wrapping_add(encryptor.next_key() as u8)];
        // 259 = 0x0103, little-endian on the wire
        frame.extend_from_slice(&[0x03, 0x01]);
        frame.extend_from_slice(&body);
        stream.write_all(&frame).unwrap();
        // Hold the socket open until the client is done
        let mut sink = [0u8; 64];
        while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
    });
    let (addr, server) = scripted_server(vec![script]);

    let (message_tx, message_rx) = channel::<(u8, i32, Vec<u8>)>();
    let message_tx = Mutex::new(message_tx);
    let config = GroupConfig::new()
        .with_address(addr)
        .on_message(move |_bot, message| {
            message_tx
                .lock()
                .unwrap()
                .send((
                    message.opcode(),
                    message.size(),
                    message.payload().as_bytes().to_vec(),
                ))
                .ok();
        });
    let group = BotGroup::new(config);

    let bot = group.add("bot", "pw").unwrap();
    assert!(bot.login_future().wait_timeout(Duration::from_secs(5)));

    let (opcode, size, payload) = message_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("frame should reach the message handler");
    assert_eq!(opcode, 53);
    assert_eq!(size, 259);
    assert_eq!(payload, expected_body);

    group.shutdown();
    server.join().unwrap();
}

/// Group lifecycle: three bots share one lazily started IO thread;
/// removals are independent; clearing the group stops the thread
#[test]
fn test_group_lifecycle() {
    let names = ["alpha", "bravo", "charlie"];
    let scripts = names
        .iter()
        .map(|name| happy_script(name, "pw"))
        .collect::<Vec<_>>();
    let (addr, server) = scripted_server(scripts);
    let group = group_for(addr);

    // Sequential adds keep the accept order aligned with the scripts
    for name in names {
        let bot = group.add(name, "pw").unwrap();
        assert!(
            bot.login_future().wait_timeout(Duration::from_secs(5)),
            "{name} should log in"
        );
    }
    assert_eq!(group.len(), 3);

    // Duplicate usernames are refused
    assert!(group.add("alpha", "pw").is_err());

    let bravo = group.get("bravo").unwrap();
    group.remove("bravo").unwrap();
    wait_until("bravo to close", Duration::from_secs(5), || {
        group.get("bravo").is_none()
    });
    assert_eq!(bravo.state(), ConnState::LoggedOut);

    // The others never noticed
    assert_eq!(group.get("alpha").unwrap().state(), ConnState::LoggedIn);
    assert_eq!(group.get("charlie").unwrap().state(), ConnState::LoggedIn);

    group.remove("alpha").unwrap();
    group.remove("charlie").unwrap();
    wait_until("group to drain", Duration::from_secs(5), || {
        group.is_empty()
    });

    // Removing an unknown bot is an error, not a panic
    assert!(group.remove("nobody").is_err());

    group.shutdown();
    server.join().unwrap();
}

/// Writes before the session is established are silent no-ops
#[test]
fn test_write_before_login_is_dropped() {
    let (addr, server) = scripted_server(vec![happy_script("bot", "pw")]);
    let group = group_for(addr);

    let bot = group.add("bot", "pw").unwrap();
    // Racing the handshake: this must never reach the wire out of order
    // and must never panic, whatever state the bot is in.
    let _ = bot.send(&ButtonClickPacket { button: 1 });

    assert!(bot.login_future().wait_timeout(Duration::from_secs(5)));
    group.shutdown();
    server.join().unwrap();
}
