//! Line-oriented command server (`-s/--server`).
//!
//! Each client gets its own thread. Commands turn into MIDI messages and are
//! queued exactly like hardware input.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::engine::MidiMessage;
use crate::error::{Error, Result};
use crate::modulator::ADSR_MODULATORS;

/// How long blocking socket calls wait before re-checking the stop flag.
const STOP_POLL: Duration = Duration::from_millis(100);

const HELP: &str = "\
noteon CHAN KEY VEL     start a note
noteoff CHAN KEY        stop a note
cc CHAN CTRL VAL        set a controller (71-75, 79 drive the ADSR/filter)
prog CHAN NUM           change program
pitch_bend CHAN VAL     bend, 0-16383 (8192 = center)
reset                   system reset
mods                    list the controller bindings
help                    this text
quit                    close the connection";

/// One parsed client line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Midi(MidiMessage),
    Modulators,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(Self::Empty);
        };
        let args: Vec<&str> = words.collect();

        let command = match name.to_ascii_lowercase().as_str() {
            "noteon" => {
                let [channel, key, velocity] = parse_args(name, &args, [255, 127, 127])?;
                Self::Midi(MidiMessage::NoteOn {
                    channel: channel as u8,
                    key: key as u8,
                    velocity: velocity as u8,
                })
            }
            "noteoff" => {
                let [channel, key] = parse_args(name, &args, [255, 127])?;
                Self::Midi(MidiMessage::NoteOff {
                    channel: channel as u8,
                    key: key as u8,
                })
            }
            "cc" => {
                let [channel, controller, value] = parse_args(name, &args, [255, 127, 127])?;
                Self::Midi(MidiMessage::ControlChange {
                    channel: channel as u8,
                    controller: controller as u8,
                    value: value as u8,
                })
            }
            "prog" => {
                let [channel, program] = parse_args(name, &args, [255, 127])?;
                Self::Midi(MidiMessage::ProgramChange {
                    channel: channel as u8,
                    program: program as u8,
                })
            }
            "pitch_bend" => {
                let [channel, value] = parse_args(name, &args, [255, 16383])?;
                Self::Midi(MidiMessage::PitchBend {
                    channel: channel as u8,
                    value,
                })
            }
            "reset" => {
                parse_args(name, &args, [])?;
                Self::Midi(MidiMessage::SystemReset)
            }
            "mods" => Self::Modulators,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => return Err(format!("unknown command '{name}' (try 'help')")),
        };
        Ok(command)
    }
}

/// Parse exactly `N` integer arguments, each no larger than its limit.
fn parse_args<const N: usize>(name: &str, args: &[&str], limits: [u16; N]) -> std::result::Result<[u16; N], String> {
    if args.len() != N {
        return Err(format!("{name} takes {N} argument(s), got {}", args.len()));
    }
    let mut values = [0u16; N];
    for (i, (arg, limit)) in args.iter().zip(limits).enumerate() {
        let value: u16 = arg
            .parse()
            .map_err(|_| format!("{name}: '{arg}' is not a number"))?;
        if value > limit {
            return Err(format!("{name}: {value} is out of range (max {limit})"));
        }
        values[i] = value;
    }
    Ok(values)
}

/// Listening command server. Dropping it stops accepting and joins the
/// listener thread; client threads notice the stop flag within [`STOP_POLL`].
pub struct CommandServer {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    listener_thread: Option<JoinHandle<()>>,
}

impl CommandServer {
    pub fn start(port: u16, midi_tx: Sender<MidiMessage>) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).map_err(Error::Server)?;
        listener.set_nonblocking(true).map_err(Error::Server)?;
        let local_addr = listener.local_addr().map_err(Error::Server)?;

        let stop = Arc::new(AtomicBool::new(false));
        let listener_thread = thread::Builder::new()
            .name("command-server".into())
            .spawn({
                let stop = Arc::clone(&stop);
                move || accept_loop(listener, midi_tx, stop)
            })
            .map_err(Error::Server)?;

        log::info!("[Server] Listening on {local_addr}");
        Ok(Self {
            local_addr,
            stop,
            listener_thread: Some(listener_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener_thread.take() {
            let _ = handle.join();
        }
        log::info!("[Server] Stopped");
    }
}

fn accept_loop(listener: TcpListener, midi_tx: Sender<MidiMessage>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("[Server] Client connected: {peer}");
                let midi_tx = midi_tx.clone();
                let stop = Arc::clone(&stop);
                let spawned = thread::Builder::new()
                    .name(format!("command-client-{peer}"))
                    .spawn(move || {
                        if let Err(e) = serve_client(stream, &midi_tx, &stop) {
                            log::warn!("[Server] Client {peer}: {e}");
                        }
                        log::info!("[Server] Client disconnected: {peer}");
                    });
                if let Err(e) = spawned {
                    log::error!("[Server] Failed to spawn client thread: {e}");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(STOP_POLL),
            Err(e) => {
                log::warn!("[Server] Accept failed: {e}");
                thread::sleep(STOP_POLL);
            }
        }
    }
}

fn serve_client(stream: TcpStream, midi_tx: &Sender<MidiMessage>, stop: &AtomicBool) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(STOP_POLL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();

    while !stop.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let command = Command::parse(&line);
                line.clear();
                match command {
                    Ok(Command::Midi(message)) => {
                        if midi_tx.try_send(message).is_err() {
                            writeln!(writer, "error: MIDI queue full")?;
                        }
                    }
                    Ok(Command::Modulators) => {
                        for modulator in &ADSR_MODULATORS {
                            writeln!(writer, "{modulator}")?;
                        }
                    }
                    Ok(Command::Help) => writeln!(writer, "{HELP}")?,
                    Ok(Command::Quit) => break,
                    Ok(Command::Empty) => {}
                    Err(e) => writeln!(writer, "error: {e}")?,
                }
            }
            // Partial input stays in `line` until the newline arrives
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_commands() {
        assert_eq!(
            Command::parse("noteon 0 60 100"),
            Ok(Command::Midi(MidiMessage::NoteOn { channel: 0, key: 60, velocity: 100 }))
        );
        assert_eq!(
            Command::parse("  NOTEOFF 2 61\n"),
            Ok(Command::Midi(MidiMessage::NoteOff { channel: 2, key: 61 }))
        );
    }

    #[test]
    fn test_parse_cc_and_bend() {
        assert_eq!(
            Command::parse("cc 0 74 127"),
            Ok(Command::Midi(MidiMessage::ControlChange { channel: 0, controller: 74, value: 127 }))
        );
        assert_eq!(
            Command::parse("pitch_bend 1 16383"),
            Ok(Command::Midi(MidiMessage::PitchBend { channel: 1, value: 16383 }))
        );
        assert_eq!(Command::parse("reset"), Ok(Command::Midi(MidiMessage::SystemReset)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("cc 0 74").is_err());
        assert!(Command::parse("cc 0 74 128").is_err());
        assert!(Command::parse("noteon a b c").is_err());
        assert!(Command::parse("reset now").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(Command::parse(""), Ok(Command::Empty));
        assert_eq!(Command::parse("mods"), Ok(Command::Modulators));
        assert_eq!(Command::parse("help"), Ok(Command::Help));
        assert_eq!(Command::parse("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_server_round_trip() {
        let (tx, rx) = crossbeam_channel::bounded(8);
        let server = CommandServer::start(0, tx).unwrap();

        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        client.write_all(b"cc 0 73 64\nbogus\n").unwrap();

        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(message, MidiMessage::ControlChange { channel: 0, controller: 73, value: 64 });

        let mut reply = String::new();
        BufReader::new(client.try_clone().unwrap()).read_line(&mut reply).unwrap();
        assert!(reply.starts_with("error: unknown command"), "got {reply:?}");

        client.write_all(b"quit\n").unwrap();
        drop(server);
    }
}
