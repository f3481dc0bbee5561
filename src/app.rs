//! Startup sequence and main loop.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cli::Options;
use crate::driver::{AudioDriver, MIDI_QUEUE_SIZE, MidiDriver};
use crate::engine::{MidiMessage, OxiEngine, SoundBankId, SynthEngine};
use crate::error::{Error, Result};
use crate::modulator::{self, ADSR_MODULATORS, CONTROLLER_CHANNEL};
use crate::runtime::{POLL_INTERVAL, ResourceStack, Shutdown};
use crate::server::CommandServer;
use crate::settings::{self, Settings};

/// Run until SIGINT/SIGTERM.
///
/// Settings → engine → sound bank → modulators → controller reset → audio
/// driver → MIDI driver → (command server). Resources are released in the
/// reverse order on the way out.
pub fn run(options: &Options) -> Result<()> {
    let settings = options.build_settings()?;
    log_settings(&settings);
    let sound_bank = options.sound_bank.as_deref().ok_or(Error::MissingSoundBank)?;

    let shutdown = Shutdown::new();
    shutdown.install_signal_handlers()?;

    let mut engine = OxiEngine::new(&settings)?;
    let bank = prepare_engine(&mut engine, sound_bank)?;
    log::info!("[App] SoundFont loaded as bank {}", bank.0);
    let engine = Arc::new(Mutex::new(engine));

    let mut resources = ResourceStack::new();
    let (midi_tx, midi_rx) = crossbeam_channel::bounded::<MidiMessage>(MIDI_QUEUE_SIZE);

    let audio = AudioDriver::new(&settings, Arc::clone(&engine), midi_rx)?;
    resources.push("synthesizer", engine);
    resources.push("audio driver", audio);
    resources.push("MIDI driver", MidiDriver::new(&settings, midi_tx.clone())?);

    if options.server {
        let port = u16::try_from(settings.int(settings::SHELL_PORT))
            .map_err(|_| Error::invalid_setting(settings::SHELL_PORT, "not a TCP port"))?;
        resources.push("command server", CommandServer::start(port, midi_tx)?);
    }

    print_banner(sound_bank);

    shutdown.wait(POLL_INTERVAL);

    println!("Shutting down FluidADSR...");
    resources.release();
    Ok(())
}

/// Load the sound bank, register the ADSR/filter modulators and zero their
/// controllers on the controller channel.
pub fn prepare_engine<E: SynthEngine + ?Sized>(engine: &mut E, sound_bank: &Path) -> Result<SoundBankId> {
    let bank = engine.load_sound_bank(sound_bank)?;
    modulator::install_modulators(engine);
    modulator::reset_controllers(engine, CONTROLLER_CHANNEL);
    Ok(bank)
}

/// Print the drivers `-a` and `-m` accept.
pub fn print_drivers() {
    println!("Available audio drivers:");
    println!(" {}", settings::DEFAULT_DRIVER);
    for name in AudioDriver::available() {
        println!(" {name}");
    }
    println!("Available MIDI drivers:");
    println!(" {}", settings::DEFAULT_DRIVER);
    for name in MidiDriver::available() {
        println!(" {name}");
    }
}

fn print_banner(sound_bank: &Path) {
    println!("FluidADSR started with SoundFont: {}", sound_bank.display());
    println!("MIDI controllers for ADSR and filter:");
    for modulator in &ADSR_MODULATORS {
        println!(" CC {}: {}", modulator.source, modulator.destination.label());
    }
    println!("Press Ctrl+C to quit");
}

fn log_settings(settings: &Settings) {
    for (name, value) in settings.iter() {
        log::debug!("[Settings] {name} = {value}");
    }
}
