//! MIDI input driver using midir.

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};

use crate::engine::MidiMessage;
use crate::error::{Error, Result};
use crate::settings::{self, Settings};

/// Client name shown to other MIDI software.
pub const CLIENT_NAME: &str = "FluidADSR";
/// Name of our input port(s).
pub const PORT_NAME: &str = "FluidADSR Input";

/// Open MIDI input connections. Decoded messages go to the audio callback
/// through a channel; dropping the driver closes every connection.
pub struct MidiDriver {
    connections: Vec<MidiInputConnection<()>>,
}

impl MidiDriver {
    /// Names accepted by `midi.driver` on this platform.
    pub fn available() -> &'static [&'static str] {
        if cfg!(target_os = "linux") {
            &["alsa_seq"]
        } else if cfg!(target_os = "macos") {
            &["coremidi"]
        } else if cfg!(windows) {
            &["winmm"]
        } else {
            &[]
        }
    }

    /// Open the MIDI backend: a virtual input port where the platform has
    /// one, plus connections to existing inputs when `midi.autoconnect` is on.
    pub fn new(settings: &Settings, midi_tx: Sender<MidiMessage>) -> Result<Self> {
        check_driver(settings.str(settings::MIDI_DRIVER))?;

        let mut connections = Vec::new();

        #[cfg(unix)]
        {
            use midir::os::unix::VirtualInput;

            let midi_in = new_input()?;
            let connection = midi_in
                .create_virtual(PORT_NAME, forward_to(midi_tx.clone()), ())
                .map_err(|e| Error::MidiDriver(format!("failed to create virtual port: {e}")))?;
            log::info!("[MidiDriver] Virtual port '{PORT_NAME}' open");
            connections.push(connection);
        }

        if settings.toggle(settings::MIDI_AUTOCONNECT) {
            let filter = settings.str(settings::MIDI_PORTNAME);
            for port_name in Self::enumerate_inputs() {
                if port_name.contains(CLIENT_NAME) || !port_name.contains(filter) {
                    continue;
                }
                match connect(&port_name, midi_tx.clone()) {
                    Ok(connection) => {
                        log::info!("[MidiDriver] Connected to: {port_name}");
                        connections.push(connection);
                    }
                    Err(e) => log::warn!("[MidiDriver] Skipping '{port_name}': {e}"),
                }
            }
        }

        if connections.is_empty() {
            log::warn!("[MidiDriver] No MIDI inputs connected");
        }

        Ok(Self { connections })
    }

    /// Enumerate available MIDI input ports.
    pub fn enumerate_inputs() -> Vec<String> {
        let Ok(midi_in) = MidiInput::new(CLIENT_NAME) else {
            return Vec::new();
        };
        midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect()
    }
}

impl Drop for MidiDriver {
    fn drop(&mut self) {
        for connection in self.connections.drain(..) {
            connection.close();
        }
        log::info!("[MidiDriver] Disconnected");
    }
}

fn check_driver(name: &str) -> Result<()> {
    let available = MidiDriver::available();
    if name.is_empty()
        || name.eq_ignore_ascii_case(settings::DEFAULT_DRIVER)
        || available.iter().any(|a| a.eq_ignore_ascii_case(name))
    {
        Ok(())
    } else {
        Err(Error::MidiDriver(format!(
            "'{name}' is not available (choose from: {})",
            available.join(", ")
        )))
    }
}

fn new_input() -> Result<MidiInput> {
    MidiInput::new(CLIENT_NAME).map_err(|e| Error::MidiDriver(format!("failed to create MIDI input: {e}")))
}

/// Connect to a MIDI input port by name.
fn connect(port_name: &str, midi_tx: Sender<MidiMessage>) -> Result<MidiInputConnection<()>> {
    let midi_in = new_input()?;
    let port = midi_in
        .ports()
        .into_iter()
        .find(|p| midi_in.port_name(p).as_deref() == Ok(port_name))
        .ok_or_else(|| Error::MidiDriver(format!("MIDI port '{port_name}' not found")))?;

    midi_in
        .connect(&port, PORT_NAME, forward_to(midi_tx), ())
        .map_err(|e| Error::MidiDriver(format!("failed to connect MIDI: {e}")))
}

/// Input callback: decode and queue for the audio thread. A full queue drops
/// the message rather than blocking the MIDI thread.
fn forward_to(midi_tx: Sender<MidiMessage>) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
    move |_timestamp, data, _| {
        if let Some(message) = MidiMessage::from_bytes(data) {
            if midi_tx.try_send(message).is_err() {
                log::trace!("[MidiDriver] Queue full, dropped {message:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_driver_accepted() {
        assert!(check_driver("default").is_ok());
        assert!(check_driver("").is_ok());
        for name in MidiDriver::available() {
            assert!(check_driver(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn test_unknown_driver_rejected() {
        assert!(matches!(check_driver("oss"), Err(Error::MidiDriver(_))));
    }

    #[test]
    fn test_forward_decodes_into_channel() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut callback = forward_to(tx);
        callback(0, &[0xB0, 73, 90], &mut ());
        callback(0, &[0x90, 60, 100], &mut ()); // queue full, dropped
        callback(0, &[0xF8], &mut ()); // clock, ignored

        assert_eq!(
            rx.try_recv().unwrap(),
            MidiMessage::ControlChange { channel: 0, controller: 73, value: 90 }
        );
        assert!(rx.try_recv().is_err());
    }
}
