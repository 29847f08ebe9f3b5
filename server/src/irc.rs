//! Minimal IRC client backing the relay bridge
//!
//! Runs on a dedicated OS thread: connects, registers, joins the bridge
//! channel after the welcome reply, answers PINGs and forwards PRIVMSGs as
//! [`RelayEvent`]s. Outbound lines are polled between reads, so the socket uses
//! a short read timeout. Lost connections are retried with a growing delay
//! until [`IrcLink::stop`] is called.

use crate::relay::{RelayEvent, RelayLine};
use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

const READ_POLL: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const WRITE_TIMEOUT: Duration = Duration::from_secs(3);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcConfig {
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub channel: String,
}

/// One parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine<'a> {
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    pub params: Vec<&'a str>,
}

impl IrcLine<'_> {
    /// Nick part of the prefix (`nick!user@host`)
    pub fn nick(&self) -> Option<&str> {
        self.prefix
            .map(|prefix| prefix.split('!').next().unwrap_or(prefix))
    }
}

/// Splits a line into prefix, command and parameters
///
/// Returns `None` for empty lines.
pub fn parse_line(line: &str) -> Option<IrcLine<'_>> {
    let mut rest = line.trim_end_matches(&['\r', '\n'][..]);
    let prefix = match rest.strip_prefix(':') {
        Some(stripped) => {
            let (prefix, tail) = stripped.split_once(' ')?;
            rest = tail;
            Some(prefix)
        }
        None => None,
    };

    let (head, trailing) = match rest.split_once(" :") {
        Some((head, trailing)) => (head, Some(trailing)),
        None => (rest, None),
    };
    let mut words = head.split(' ').filter(|word| !word.is_empty());
    let command = words.next()?;
    let mut params: Vec<&str> = words.collect();
    params.extend(trailing);

    Some(IrcLine {
        prefix,
        command,
        params,
    })
}

/// Strips characters that would end or split a protocol line.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// Handle to the link thread
pub struct IrcLink {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl IrcLink {
    pub fn start(
        config: IrcConfig,
        events: mpsc::Sender<RelayEvent>,
        lines: mpsc::UnboundedReceiver<RelayLine>,
    ) -> io::Result<Self> {
        let keep_running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&keep_running);
        let thread = thread::Builder::new()
            .name("irc-link".into())
            .spawn(move || run_link(config, flag, events, lines))?;
        Ok(Self {
            keep_running,
            thread: Some(thread),
        })
    }

    /// Signals the thread to quit and waits for it
    ///
    /// Blocks for at most one connect or write timeout. Call it from a
    /// blocking context.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("IRC link thread panicked");
            }
        }
    }
}

enum Flow {
    Continue,
    /// The tick loop is gone; no point in reconnecting.
    Closed,
}

fn run_link(
    config: IrcConfig,
    keep_running: Arc<AtomicBool>,
    events: mpsc::Sender<RelayEvent>,
    mut lines: mpsc::UnboundedReceiver<RelayLine>,
) {
    let mut backoff = INITIAL_BACKOFF;
    while keep_running.load(Ordering::SeqCst) {
        match run_session(&config, &keep_running, &events, &mut lines) {
            Ok(Flow::Closed) => break,
            Ok(Flow::Continue) => backoff = INITIAL_BACKOFF,
            Err(e) => {
                warn!(
                    "IRC connection to {}:{} failed: {}",
                    config.host, config.port, e
                );
                if let Flow::Closed = push_event(
                    &events,
                    RelayEvent::Disconnected {
                        reason: e.to_string(),
                    },
                ) {
                    break;
                }
                sleep_while_running(&keep_running, backoff);
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
    debug!("IRC link thread exiting");
}

fn sleep_while_running(keep_running: &AtomicBool, total: Duration) {
    let mut slept = Duration::ZERO;
    while slept < total && keep_running.load(Ordering::SeqCst) {
        thread::sleep(READ_POLL);
        slept += READ_POLL;
    }
}

fn push_event(events: &mpsc::Sender<RelayEvent>, event: RelayEvent) -> Flow {
    match events.try_send(event) {
        Ok(()) => Flow::Continue,
        Err(TrySendError::Full(_)) => {
            warn!("Relay event queue full, dropping event");
            Flow::Continue
        }
        Err(TrySendError::Closed(_)) => Flow::Closed,
    }
}

/// Tries every resolved address with a bounded connect.
fn connect(config: &IrcConfig) -> io::Result<TcpStream> {
    let mut last_error = io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} did not resolve", config.host),
    );
    for addr in (config.host.as_str(), config.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = e,
        }
    }
    Err(last_error)
}

fn send_command(writer: &mut impl Write, command: &str) -> io::Result<()> {
    writer.write_all(command.as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.flush()
}

fn run_session(
    config: &IrcConfig,
    keep_running: &AtomicBool,
    events: &mpsc::Sender<RelayEvent>,
    lines: &mut mpsc::UnboundedReceiver<RelayLine>,
) -> io::Result<Flow> {
    let stream = connect(config)?;
    stream.set_read_timeout(Some(READ_POLL))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    info!("Connected to IRC server {}:{}", config.host, config.port);

    send_command(&mut writer, &format!("NICK {}", config.nick))?;
    send_command(
        &mut writer,
        &format!("USER {} 0 * :{}", config.nick, config.nick),
    )?;

    let mut joined = false;
    let mut pending: Vec<u8> = Vec::new();
    while keep_running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut pending) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ))
            }
            Ok(_) if pending.ends_with(b"\n") => {
                let raw = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();
                let Some(line) = parse_line(&raw) else {
                    continue;
                };
                match line.command {
                    "PING" => {
                        let token = line.params.first().copied().unwrap_or_default();
                        send_command(&mut writer, &format!("PONG :{}", token))?;
                    }
                    "001" => {
                        send_command(&mut writer, &format!("JOIN {}", config.channel))?;
                        joined = true;
                        if let Flow::Closed = push_event(events, RelayEvent::Connected) {
                            return Ok(Flow::Closed);
                        }
                    }
                    "PRIVMSG" if line.params.len() >= 2 => {
                        let event = RelayEvent::Message {
                            sender: line.nick().unwrap_or_default().to_string(),
                            target: line.params[0].to_string(),
                            text: line.params[1].to_string(),
                        };
                        if let Flow::Closed = push_event(events, event) {
                            return Ok(Flow::Closed);
                        }
                    }
                    _ => {}
                }
            }
            // Partial line; the rest arrives with the next read.
            Ok(_) => {}
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => return Err(e),
        }

        loop {
            match lines.try_recv() {
                Ok(line) if joined => send_command(
                    &mut writer,
                    &format!("PRIVMSG {} :{}", line.target, sanitize(&line.text)),
                )?,
                Ok(_) => debug!("Not in the relay channel yet, dropping line"),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => return Ok(Flow::Closed),
            }
        }
    }

    // Best effort; the connection is going away either way.
    let _ = send_command(&mut writer, "QUIT :shutting down");
    Ok(Flow::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    #[test]
    fn test_parse_privmsg() {
        let line = parse_line(":X!x@host PRIVMSG #bridge :hi there\r\n").unwrap();
        assert_eq!(line.prefix, Some("X!x@host"));
        assert_eq!(line.nick(), Some("X"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#bridge", "hi there"]);
    }

    #[test]
    fn test_parse_ping_without_prefix() {
        let line = parse_line("PING :irc.example.net").unwrap();
        assert_eq!(line.prefix, None);
        assert_eq!(line.command, "PING");
        assert_eq!(line.params, vec!["irc.example.net"]);
    }

    #[test]
    fn test_parse_numeric_reply() {
        let line = parse_line(":server 001 bridge :Welcome").unwrap();
        assert_eq!(line.command, "001");
        assert_eq!(line.params, vec!["bridge", "Welcome"]);
    }

    #[test]
    fn test_parse_empty_line() {
        assert!(parse_line("").is_none());
        assert!(parse_line("\r\n").is_none());
        assert!(parse_line(":prefixonly").is_none());
    }

    #[test]
    fn test_sanitize_strips_line_breaks() {
        assert_eq!(sanitize("a\r\nb"), "a  b");
    }

    #[test]
    fn test_connect_to_closed_port_fails() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = IrcConfig {
            host: "127.0.0.1".into(),
            port,
            nick: "bridge".into(),
            channel: "#bridge".into(),
        };
        assert!(connect(&config).is_err());
    }

    #[test]
    fn test_stop_while_reconnecting_is_prompt() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_line_tx, line_rx) = mpsc::unbounded_channel();
        let link = IrcLink::start(
            IrcConfig {
                host: "127.0.0.1".into(),
                port,
                nick: "bridge".into(),
                channel: "#bridge".into(),
            },
            event_tx,
            line_rx,
        )
        .unwrap();

        assert!(matches!(
            event_rx.blocking_recv(),
            Some(RelayEvent::Disconnected { .. })
        ));
        let started = std::time::Instant::now();
        link.stop();
        assert!(started.elapsed() < CONNECT_TIMEOUT);
    }

    #[test]
    fn test_link_registers_joins_and_forwards() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let link = IrcLink::start(
            IrcConfig {
                host: "127.0.0.1".into(),
                port,
                nick: "bridge".into(),
                channel: "#bridge".into(),
            },
            event_tx,
            line_rx,
        )
        .unwrap();

        let (mut server, _) = listener.accept().unwrap();
        server
            .write_all(b":srv 001 bridge :Welcome\r\n:X!x@h PRIVMSG #bridge :hi\r\n")
            .unwrap();

        assert_eq!(event_rx.blocking_recv(), Some(RelayEvent::Connected));
        assert_eq!(
            event_rx.blocking_recv(),
            Some(RelayEvent::Message {
                sender: "X".into(),
                target: "#bridge".into(),
                text: "hi".into(),
            })
        );

        line_tx
            .send(RelayLine {
                target: "#bridge".into(),
                text: "<Y> hello".into(),
            })
            .unwrap();

        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut received = String::new();
        let mut buf = [0u8; 256];
        while !received.contains("PRIVMSG #bridge :<Y> hello") {
            let n = server.read(&mut buf).unwrap();
            assert!(n > 0, "link closed early: {received:?}");
            received.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(received.starts_with("NICK bridge\r\nUSER bridge 0 * :bridge\r\n"));
        assert!(received.contains("JOIN #bridge\r\n"));

        link.stop();
    }
}
