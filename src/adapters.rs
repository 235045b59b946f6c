// Output Adapters
// Destinations a rendered arrangement can be sent to

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputTransport {
    Osc,
    Midi,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Osc,
    Midi,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterAvailability {
    Available,
    Planned,
}

/// One output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputAdapter {
    pub id: &'static str,
    pub name: &'static str,
    pub transport: OutputTransport,
    pub format: OutputFormat,
    pub availability: AdapterAvailability,
    pub description: &'static str,
}

pub const OUTPUT_ADAPTERS: [OutputAdapter; 4] = [
    OutputAdapter {
        id: "live-osc",
        name: "Ableton Live OSC",
        transport: OutputTransport::Osc,
        format: OutputFormat::Osc,
        availability: AdapterAvailability::Available,
        description: "Send arranged progression to Live/M4L via OSC.",
    },
    OutputAdapter {
        id: "json-file",
        name: "Arrangement JSON File",
        transport: OutputTransport::File,
        format: OutputFormat::Json,
        availability: AdapterAvailability::Available,
        description: "Export arrangement snapshot to JSON.",
    },
    OutputAdapter {
        id: "midi-file",
        name: "Standard MIDI File",
        transport: OutputTransport::File,
        format: OutputFormat::Midi,
        availability: AdapterAvailability::Available,
        description: "Export rendered arrangement as .mid.",
    },
    OutputAdapter {
        id: "midi-out",
        name: "General MIDI Out",
        transport: OutputTransport::Midi,
        format: OutputFormat::Midi,
        availability: AdapterAvailability::Available,
        description: "Route arrangement to external MIDI devices and synths.",
    },
];

/// Get an adapter by id
pub fn get_adapter(id: &str) -> Option<&'static OutputAdapter> {
    OUTPUT_ADAPTERS.iter().find(|adapter| adapter.id == id)
}

/// All adapters using a transport
pub fn adapters_by_transport(transport: OutputTransport) -> Vec<&'static OutputAdapter> {
    OUTPUT_ADAPTERS
        .iter()
        .filter(|adapter| adapter.transport == transport)
        .collect()
}

/// Available adapters producing a format
pub fn available_adapters_by_format(format: OutputFormat) -> Vec<&'static OutputAdapter> {
    OUTPUT_ADAPTERS
        .iter()
        .filter(|adapter| {
            adapter.format == format && adapter.availability == AdapterAvailability::Available
        })
        .collect()
}
