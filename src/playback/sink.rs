// MIDI Sinks - Where realtime playback bytes go
// Injected into the scheduler; device discovery lives outside the core

use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::midi::ChannelMessage;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No MIDI output available: {0}")]
    Unavailable(String),

    #[error("Failed to send MIDI message: {0}")]
    Send(String),
}

/// Output capability: accepts `[status, data1, data2]`
pub trait MidiSink: Send + Sync {
    fn send(&self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "midi-sink"
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Vec<u8>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails, for exercising error paths
    pub fn failing() -> Self {
        RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sent bytes decoded back into channel messages
    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.sent()
            .iter()
            .filter_map(|bytes| ChannelMessage::from_bytes(bytes))
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl MidiSink for RecordingSink {
    fn send(&self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Send("recording sink set to fail".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Dry-run output: logs each message instead of sending it
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&self, bytes: &[u8]) -> Result<(), SinkError> {
        match ChannelMessage::from_bytes(bytes) {
            Some(message) => log::info!("MIDI {:?}", message),
            None => log::info!("MIDI {:02X?}", bytes),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(feature = "midir")]
pub use self::device::{list_output_ports, MidirSink};

#[cfg(feature = "midir")]
mod device {
    use super::{MidiSink, SinkError};
    use midir::{MidiOutput, MidiOutputConnection};
    use std::sync::{Mutex, PoisonError};

    const CLIENT_NAME: &str = "chordflow";

    /// Names of the available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>, SinkError> {
        let output =
            MidiOutput::new(CLIENT_NAME).map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(output
            .ports()
            .iter()
            .enumerate()
            .map(|(index, port)| {
                output
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Port {}", index))
            })
            .collect())
    }

    /// Hardware or virtual MIDI output through midir
    pub struct MidirSink {
        port_name: String,
        connection: Mutex<MidiOutputConnection>,
    }

    impl MidirSink {
        /// Connect to the first port whose name contains `fragment`, or the
        /// first port when no fragment is given
        pub fn connect(fragment: Option<&str>) -> Result<Self, SinkError> {
            let output =
                MidiOutput::new(CLIENT_NAME).map_err(|e| SinkError::Unavailable(e.to_string()))?;

            let ports = output.ports();
            let port = ports
                .iter()
                .find(|port| match fragment {
                    Some(fragment) => output
                        .port_name(port)
                        .map(|name| name.contains(fragment))
                        .unwrap_or(false),
                    None => true,
                })
                .ok_or_else(|| {
                    SinkError::Unavailable(match fragment {
                        Some(fragment) => format!("MIDI device '{}' not found", fragment),
                        None => "no MIDI output ports".to_string(),
                    })
                })?;

            let port_name = output
                .port_name(port)
                .unwrap_or_else(|_| "MIDI Output".to_string());
            let connection = output
                .connect(port, "chordflow-output")
                .map_err(|e| SinkError::Unavailable(e.to_string()))?;

            log::info!("Connected to MIDI output: {}", port_name);

            Ok(MidirSink {
                port_name,
                connection: Mutex::new(connection),
            })
        }
    }

    impl MidiSink for MidirSink {
        fn send(&self, bytes: &[u8]) -> Result<(), SinkError> {
            self.connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(bytes)
                .map_err(|e| SinkError::Send(e.to_string()))
        }

        fn name(&self) -> &str {
            &self.port_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_collects_messages() {
        let sink = RecordingSink::new();
        sink.send(&[0x90, 60, 100]).unwrap();
        sink.send(&[0x80, 60, 0]).unwrap();

        assert_eq!(sink.sent().len(), 2);
        assert_eq!(
            sink.messages(),
            vec![
                ChannelMessage::NoteOn { channel: 1, note: 60, velocity: 100 },
                ChannelMessage::NoteOff { channel: 1, note: 60 },
            ]
        );

        sink.clear();
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_failing_sink() {
        let sink = RecordingSink::failing();
        assert!(matches!(sink.send(&[0x90, 60, 100]), Err(SinkError::Send(_))));
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn test_log_sink_accepts_anything() {
        assert!(LogSink.send(&[0xB0, 123, 0]).is_ok());
        assert!(LogSink.send(&[0xF8]).is_ok());
    }
}
