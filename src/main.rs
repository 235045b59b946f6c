// chordflow CLI
// Render song files to MIDI, play them live, and inspect the results

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chordflow_lib::commands::{self, ArrangementInput, CommandError, CommandResult, TestNoteInput};
use chordflow_lib::config::SongDocument;
use chordflow_lib::midi;
use chordflow_lib::playback::{LogSink, MidiSink, PlaybackHandle, Scheduler, SessionState};
use chordflow_lib::storage;
use chordflow_lib::theory::{ChordQuality, DropVoicing, NoteRange, VoicingParams};

#[derive(Parser)]
#[command(name = "chordflow")]
#[command(about = "Chord arrangement renderer", long_about = None)]
struct Cli {
    /// Override the song's tempo (BPM)
    #[arg(long, global = true)]
    tempo: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a song file to a Standard MIDI File
    Export {
        /// Song JSON file
        input: PathBuf,

        /// Output .mid path (default: app data exports directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pulses per quarter note
        #[arg(long)]
        ppq: Option<u16>,

        /// Write each event on its routed channel
        #[arg(long)]
        route_channels: bool,
    },

    /// Write the arrangement snapshot JSON
    Snapshot {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the flattened chord events as JSON
    Events { input: PathBuf },

    /// Print the OSC bridge progression as JSON
    Osc { input: PathBuf },

    /// Play a song through a MIDI output
    Play {
        input: PathBuf,

        /// Output port name (substring match)
        #[arg(short, long)]
        device: Option<String>,

        /// Log messages instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Send a single note to check the output
    TestNote {
        #[arg(short, long, default_value = "1")]
        channel: i32,

        #[arg(short, long, default_value = "60")]
        note: i32,

        #[arg(short, long, default_value = "100")]
        velocity: i32,

        #[arg(long, default_value = "250")]
        duration_ms: u64,

        #[arg(short, long)]
        device: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },

    /// List MIDI output ports
    Devices,

    /// List output destinations
    Adapters,

    /// Voice a single chord, e.g. `chord 60 Maj7 --inversion 1 --drop 2`
    Chord {
        /// Root MIDI note
        root: i32,

        /// Quality tag (Maj, min7, dom9, ...)
        #[arg(default_value = "Maj")]
        quality: String,

        #[arg(short, long, default_value = "0")]
        inversion: usize,

        /// Drop voicing code: 0, 2, 3 or 23
        #[arg(long, default_value = "0")]
        drop: u8,

        /// Constrain to MIN,MAX
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"])]
        range: Option<Vec<i32>>,
    },

    /// Summarize a .mid file
    Inspect { input: PathBuf },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e.message());
            ExitCode::FAILURE
        }
    }
}

fn load_input(path: &Path, tempo: Option<f64>) -> CommandResult<(String, ArrangementInput)> {
    let song = SongDocument::load(path)?;
    let name = if song.name.trim().is_empty() {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    } else {
        song.name.clone()
    };

    let mut input = ArrangementInput::from(song);
    if let Some(tempo) = tempo {
        input.config.tempo = tempo;
    }
    Ok((name, input))
}

/// Split an output path into directory and file name, or fall back to the
/// exports directory
fn output_target(output: Option<PathBuf>, default_name: String) -> CommandResult<(PathBuf, String)> {
    match output {
        Some(path) => {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .ok_or_else(|| CommandError::from(format!("Invalid output path: {}", path.display())))?;
            let dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            Ok((dir, filename))
        }
        None => Ok((storage::get_exports_dir()?, default_name)),
    }
}

fn open_sink(device: Option<String>, dry_run: bool) -> CommandResult<Arc<dyn MidiSink>> {
    if dry_run {
        return Ok(Arc::new(LogSink));
    }

    #[cfg(feature = "midir")]
    {
        let sink = chordflow_lib::playback::MidirSink::connect(device.as_deref())?;
        Ok(Arc::new(sink))
    }

    #[cfg(not(feature = "midir"))]
    {
        let _ = device;
        Err(CommandError::from(
            "built without MIDI device support (enable the `midir` feature) - use --dry-run",
        ))
    }
}

/// Block until the session ends, stopping it on Ctrl-C
fn wait_for(handle: PlaybackHandle, runtime: &tokio::runtime::Runtime) -> CommandResult<()> {
    let state = runtime.block_on(async {
        tokio::select! {
            state = handle.finished() => state,
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping playback");
                handle.stop();
                SessionState::Cancelled
            }
        }
    });

    let stats = handle.stats();
    log::info!("Playback {} ({} messages sent, {} failed)", state, stats.sent, stats.failed);
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> CommandResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> CommandResult<()> {
    match cli.command {
        Commands::Export {
            input,
            output,
            ppq,
            route_channels,
        } => {
            let (name, mut input) = load_input(&input, cli.tempo)?;
            if let Some(ppq) = ppq {
                input.config.ppq = ppq;
            }
            if route_channels {
                input.config.route_file_channels = true;
            }

            let bytes = commands::export_midi_command(&input)?;
            let (dir, filename) =
                output_target(output, format!("{}.mid", storage::artifact_stem(&name)))?;
            let saved = commands::save_artifact_command(&dir, &filename, &bytes)?;
            print_json(&saved)
        }

        Commands::Snapshot { input, output } => {
            let (name, input) = load_input(&input, cli.tempo)?;
            let snapshot = commands::snapshot_command(&input)?;
            let json = snapshot.to_json()?;
            let (dir, filename) =
                output_target(output, format!("{}.json", storage::artifact_stem(&name)))?;
            let saved = commands::save_artifact_command(&dir, &filename, json.as_bytes())?;
            print_json(&saved)
        }

        Commands::Events { input } => {
            let (_, input) = load_input(&input, cli.tempo)?;
            print_json(&commands::flatten_events_command(&input)?)
        }

        Commands::Osc { input } => {
            let (_, input) = load_input(&input, cli.tempo)?;
            print_json(&commands::osc_progression_command(&input)?)
        }

        Commands::Play {
            input,
            device,
            dry_run,
        } => {
            let (name, input) = load_input(&input, cli.tempo)?;
            let scheduler = Scheduler::new(open_sink(device, dry_run)?);
            let runtime = tokio::runtime::Runtime::new()?;

            log::info!("Playing {} at {} BPM", name, input.config.sanitized().tempo);
            let handle = {
                let _guard = runtime.enter();
                commands::play_command(&scheduler, &input)?
            };
            wait_for(handle, &runtime)
        }

        Commands::TestNote {
            channel,
            note,
            velocity,
            duration_ms,
            device,
            dry_run,
        } => {
            let scheduler = Scheduler::new(open_sink(device, dry_run)?);
            let runtime = tokio::runtime::Runtime::new()?;
            let input = TestNoteInput {
                channel,
                note,
                velocity,
                duration_ms,
            };

            let handle = {
                let _guard = runtime.enter();
                commands::send_test_note_command(&scheduler, &input)?
            };
            wait_for(handle, &runtime)
        }

        Commands::Devices => {
            #[cfg(feature = "midir")]
            {
                print_json(&chordflow_lib::playback::list_output_ports()?)
            }

            #[cfg(not(feature = "midir"))]
            {
                Err(CommandError::from(
                    "built without MIDI device support (enable the `midir` feature)",
                ))
            }
        }

        Commands::Adapters => print_json(&commands::list_output_adapters()),

        Commands::Chord {
            root,
            quality,
            inversion,
            drop,
            range,
        } => {
            let params = VoicingParams {
                root,
                quality: ChordQuality::parse_lossy(&quality),
                inversion,
                drop: DropVoicing::from_code(drop),
                range: range.and_then(|r| match r.as_slice() {
                    [min, max] => Some(NoteRange::new(*min, *max)),
                    _ => None,
                }),
            };
            print_json(&commands::generate_chord_command(&params)?)
        }

        Commands::Inspect { input } => {
            let bytes = storage::read_file(&input)?;
            print_json(&midi::inspect_midi(&bytes)?)
        }
    }
}
