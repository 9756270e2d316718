// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt,
    sync::{atomic::AtomicU64, Arc},
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, Level};

use super::mixer::{Command, FrameClock, MixSettings, Mixer};
use super::{Clock, Device as AudioDevice, VoiceId};
use crate::{config, notes::NoteId, samples::SampleSet};

/// The thread that owns a running cpal stream. Streams are not Send on every platform,
/// so the stream lives and dies on this thread.
struct OutputThread {
    shutdown_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// A small wrapper around a cpal::Device. Output is not started until the device is
/// unlocked.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The number of output channels.
    channels: u16,
    /// The output sample rate.
    sample_rate: u32,
    /// The sample format the device wants.
    sample_format: cpal::SampleFormat,
    /// Master bus settings.
    settings: MixSettings,
    /// Frames rendered so far, which doubles as the clock.
    frame: Arc<AtomicU64>,
    /// Commands for the mixer.
    commands_tx: Sender<Command>,
    commands_rx: Receiver<Command>,
    /// The running output, if unlocked.
    output: Mutex<Option<OutputThread>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, SampleRate={}) ({})",
            self.name,
            self.channels,
            self.sample_rate,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn AudioDevice>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices(MixSettings {
            volume: 1.0,
            reverb_decay: 1.5,
            reverb_wet: 0.0,
        })?
        .into_iter()
        .map(|device| {
            let device: Box<dyn AudioDevice> = Box::new(device);
            device
        })
        .collect())
    }

    fn from_cpal(
        host_id: cpal::HostId,
        device: cpal::Device,
        sample_rate: Option<u32>,
        settings: MixSettings,
    ) -> Result<Device, Box<dyn Error>> {
        let default_config = device.default_output_config()?;
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        Ok(Device {
            name: device.name()?,
            host_id,
            channels: default_config.channels(),
            sample_rate: sample_rate.unwrap_or(default_config.sample_rate().0),
            sample_format: default_config.sample_format(),
            device,
            settings,
            frame: Arc::new(AtomicU64::new(0)),
            commands_tx,
            commands_rx,
            output: Mutex::new(None),
        })
    }

    /// Lists cpal devices that can produce output.
    fn list_cpal_devices(settings: MixSettings) -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                if let Ok(device) = Device::from_cpal(host_id, device, None, settings) {
                    devices.push(device);
                }
            }
        }

        Ok(devices)
    }

    /// Gets the device with the configured name. `default` picks the host's default
    /// output device.
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        let settings = config.mix_settings()?;

        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device available")?;
            return Device::from_cpal(host.id(), device, config.sample_rate(), settings);
        }

        match Device::list_cpal_devices(settings)?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(mut device) => {
                if let Some(sample_rate) = config.sample_rate() {
                    device.sample_rate = sample_rate;
                }
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    fn send(&self, command: Command) -> Result<(), Box<dyn Error>> {
        self.commands_tx.send(command)?;
        Ok(())
    }

    /// Starts the output thread and waits for the stream to come up.
    fn start_output(&self) -> Result<OutputThread, Box<dyn Error>> {
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let mixer = Mixer::new(
            self.channels,
            self.sample_rate,
            self.settings,
            self.commands_rx.clone(),
            self.frame.clone(),
        );
        let device = self.device.clone();
        let sample_format = self.sample_format;

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::spawn(move || {
            let span = span!(Level::INFO, "audio output");
            let _enter = span.enter();

            let stream = match build_stream(&device, &config, sample_format, mixer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Keep the stream alive until shutdown is requested or the device goes away.
            let _ = shutdown_rx.recv();
            drop(stream);
            info!("Output stream stopped");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(OutputThread {
                shutdown_tx,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e.into())
            }
            Err(e) => {
                let _ = handle.join();
                Err(format!("output thread exited before starting: {}", e).into())
            }
        }
    }
}

/// Builds an output stream for the device's native sample format.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: Mixer,
) -> Result<cpal::Stream, Box<dyn Error>> {
    match sample_format {
        cpal::SampleFormat::F32 => build_typed_stream::<f32>(device, config, mixer),
        cpal::SampleFormat::I16 => build_typed_stream::<i16>(device, config, mixer),
        cpal::SampleFormat::I32 => build_typed_stream::<i32>(device, config, mixer),
        cpal::SampleFormat::U16 => build_typed_stream::<u16>(device, config, mixer),
        other => Err(format!("unsupported output sample format {:?}", other).into()),
    }
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> Result<cpal::Stream, Box<dyn Error>>
where
    T: Sample + SizedSample + FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            mixer.render(&mut scratch);
            for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(*sample);
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

impl AudioDevice for Device {
    fn unlock(&self) -> Result<(), Box<dyn Error>> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }

        *output = Some(self.start_output()?);
        info!(
            device = self.name,
            sample_rate = self.sample_rate,
            channels = self.channels,
            "Output started"
        );
        Ok(())
    }

    fn install_samples(&self, samples: Arc<SampleSet>) -> Result<(), Box<dyn Error>> {
        self.send(Command::Install(samples))
    }

    fn start_voice(
        &self,
        voice: VoiceId,
        note: NoteId,
        at: f64,
        velocity: f32,
    ) -> Result<(), Box<dyn Error>> {
        self.send(Command::Start {
            voice,
            note,
            at,
            velocity,
        })
    }

    fn release_voice(&self, voice: VoiceId, at: f64, fade: f64) -> Result<(), Box<dyn Error>> {
        self.send(Command::Release { voice, at, fade })
    }

    fn release_all(&self) -> Result<(), Box<dyn Error>> {
        self.send(Command::ReleaseAll)
    }

    fn set_muted(&self, muted: bool) -> Result<(), Box<dyn Error>> {
        self.send(Command::SetMuted(muted))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(FrameClock::new(self.frame.clone(), self.sample_rate))
    }

    fn dispose(&self) {
        if let Some(output) = self.output.lock().take() {
            let _ = output.shutdown_tx.send(());
            if output.handle.join().is_err() {
                error!(device = self.name, "Output thread panicked");
            }
        }
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Device>, Box<dyn Error>> {
        Err("not a mock".into())
    }
}
