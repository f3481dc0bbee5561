//! Audio output driver using cpal.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use super::buffer::RenderBuffer;
use crate::engine::{MidiMessage, SynthEngine};
use crate::error::{Error, Result};
use crate::settings::{self, Settings};

/// `audio.driver` value selecting the JACK host.
#[cfg(any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd", target_os = "netbsd"))]
const JACK: &str = "jack";

/// Drives a synthesizer from a cpal output stream.
///
/// The stream callback owns a clone of the engine handle; dropping the driver
/// stops the stream and releases that clone.
pub struct AudioDriver {
    /// Playing output stream (dropped to stop).
    _stream: Box<dyn StreamTrait>,
    device_name: String,
}

impl AudioDriver {
    /// Names accepted by `audio.driver`, in lower case.
    pub fn available() -> Vec<String> {
        cpal::available_hosts()
            .into_iter()
            .map(|id| id.name().to_ascii_lowercase())
            .collect()
    }

    /// Open the configured host's default output device and start playback.
    ///
    /// Every callback first drains `midi_rx` into the engine, then renders.
    pub fn new<E>(settings: &Settings, engine: Arc<Mutex<E>>, midi_rx: Receiver<MidiMessage>) -> Result<Self>
    where
        E: SynthEngine + 'static,
    {
        let driver = settings.str(settings::AUDIO_DRIVER);
        let autoconnect = settings.toggle(settings::AUDIO_JACK_AUTOCONNECT);
        let config = stream_config(settings);
        let period_size = settings.int(settings::AUDIO_PERIOD_SIZE) as usize;

        #[cfg(any(target_os = "linux", target_os = "dragonfly", target_os = "freebsd", target_os = "netbsd"))]
        {
            if driver.eq_ignore_ascii_case(JACK) {
                let mut host = cpal::platform::JackHost::new()
                    .map_err(|e| Error::AudioDriver(format!("{JACK}: {e}")))?;
                host.set_connect_automatically(autoconnect);
                log::info!(
                    "[AudioDriver] JACK outputs {} connected to the physical ports",
                    if autoconnect { "will be" } else { "will not be" }
                );
                return Self::start(&host, "JACK", &config, period_size, engine, midi_rx);
            }
        }

        if autoconnect {
            log::warn!("[AudioDriver] JACK autoconnect requested but audio driver is '{driver}'");
        }
        let host = select_host(driver)?;
        Self::start(&host, host.id().name(), &config, period_size, engine, midi_rx)
    }

    fn start<H, E>(
        host: &H,
        host_name: &str,
        config: &cpal::StreamConfig,
        period_size: usize,
        engine: Arc<Mutex<E>>,
        midi_rx: Receiver<MidiMessage>,
    ) -> Result<Self>
    where
        H: HostTrait,
        <H::Device as DeviceTrait>::Stream: 'static,
        E: SynthEngine + 'static,
    {
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioDriver(format!("no output device on {host_name}")))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".into());

        let mut scratch = RenderBuffer::new(period_size);
        let ch = config.channels as usize;

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    // Setup may still hold the engine; output silence until it lets go
                    let Some(mut synth) = engine.try_lock() else {
                        data.fill(0.0);
                        return;
                    };

                    while let Ok(message) = midi_rx.try_recv() {
                        if let Err(e) = synth.handle_midi_event(message) {
                            log::warn!("[AudioDriver] Dropped {message:?}: {e}");
                        }
                    }

                    let num_frames = data.len() / ch;
                    let mut offset = 0;
                    while offset < num_frames {
                        let chunk = (num_frames - offset).min(scratch.capacity());
                        let (left, right) = scratch.channels_mut(chunk);
                        synth.render(left, right);
                        scratch.interleave_into(data, ch, offset, chunk);
                        offset += chunk;
                    }
                },
                |err| {
                    log::error!("[AudioDriver] Stream error: {err}");
                },
                None, // no timeout
            )
            .map_err(|e| Error::AudioDriver(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| Error::AudioDriver(format!("failed to start playback: {e}")))?;

        let sample_rate = config.sample_rate.0;
        let frames = match config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => 0,
        };
        log::info!(
            "[AudioDriver] {host_name} / {device_name}: {sample_rate} Hz, {frames} frames buffered ({:.1} ms)",
            frames as f64 * 1000.0 / sample_rate as f64
        );

        Ok(Self {
            _stream: Box::new(stream),
            device_name,
        })
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        log::info!("[AudioDriver] Stopping {}", self.device_name);
    }
}

/// Stereo output at `synth.sample-rate`, buffering `audio.periods` periods of
/// `audio.period-size` frames. cpal takes the total and splits it into
/// periods itself.
fn stream_config(settings: &Settings) -> cpal::StreamConfig {
    let sample_rate = settings.num(settings::SYNTH_SAMPLE_RATE).round() as u32;
    let period_size = settings.int(settings::AUDIO_PERIOD_SIZE) as u32;
    let periods = settings.int(settings::AUDIO_PERIODS) as u32;

    cpal::StreamConfig {
        channels: 2, // We always want stereo
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Fixed(periods.saturating_mul(period_size)),
    }
}

fn select_host(name: &str) -> Result<cpal::Host> {
    if name.is_empty() || name.eq_ignore_ascii_case(settings::DEFAULT_DRIVER) {
        return Ok(cpal::default_host());
    }

    let id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            Error::AudioDriver(format!(
                "'{name}' is not available (choose from: {})",
                AudioDriver::available().join(", ")
            ))
        })?;

    cpal::host_from_id(id).map_err(|e| Error::AudioDriver(format!("{name}: {e}")))
}
