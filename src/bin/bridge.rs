//! Bootstrap binary (C10): wires MIDI ports, configuration and a thin
//! process-based model adapter into [`genseq_bridge::run`].
//!
//! CLI parsing and process bootstrap are explicitly out of scope for the
//! library (spec.md §1); this binary is the thinnest wiring that could
//! plausibly ship it. Usage: `genseq-bridge [config.toml]`.

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use genseq_bridge::{midi_io, BridgeConfig, ModelError, ModelEngine};

/// Shells out to an external program for generation: writes the prompt MIDI
/// blob to its stdin, passes sampling parameters as positional arguments,
/// reads the generated MIDI blob back from its stdout. The model itself is
/// out of scope (spec.md §1); this is a grounding stub for the interface,
/// not a product feature.
struct ProcessModelEngine {
    command: String,
}

impl ModelEngine for ProcessModelEngine {
    fn generate(
        &self,
        prompt_midi_blob: &[u8],
        horizon_s: f32,
        temperature: f32,
        top_p: f32,
    ) -> Result<Vec<u8>, ModelError> {
        let mut child = Command::new(&self.command)
            .arg(horizon_s.to_string())
            .arg(temperature.to_string())
            .arg(top_p.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ModelError::Generation {
                reason: format!("failed to start model process '{}': {e}", self.command),
            })?;

        child
            .stdin
            .take()
            .expect("child spawned with piped stdin")
            .write_all(prompt_midi_blob)
            .map_err(|e| ModelError::Generation {
                reason: format!("failed to write prompt to model process: {e}"),
            })?;

        let output = child.wait_with_output().map_err(|e| ModelError::Generation {
            reason: format!("model process did not complete: {e}"),
        })?;

        if !output.status.success() {
            return Err(ModelError::Generation {
                reason: format!(
                    "model process exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        Ok(output.stdout)
    }
}

/// Prompts the user to pick a port index when more than one is available,
/// mirroring the teacher's interactive port-selection flow.
fn select_port(kind: &str, ports: &[String]) -> usize {
    if ports.is_empty() {
        eprintln!("no {kind} MIDI ports available");
        std::process::exit(1);
    }
    if ports.len() == 1 {
        return 0;
    }
    println!("available {kind} ports:");
    for (index, name) in ports.iter().enumerate() {
        println!("  [{index}] {name}");
    }
    promptly::prompt_default(format!("select {kind} port"), 0usize).unwrap_or(0)
}

fn main() {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => BridgeConfig::load_from_file(&path).unwrap_or_else(|e| {
            eprintln!("failed to load config from {path}: {e}");
            std::process::exit(1);
        }),
        None => BridgeConfig::default(),
    };

    let client_name = "genseq-bridge";

    let clock_ports =
        midi_io::list_input_ports(client_name).expect("failed to enumerate MIDI input ports");
    let clock_index = select_port("clock", &clock_ports);
    let clock_source = midi_io::MidirClockSource::connect(client_name, clock_index)
        .expect("failed to connect clock source");

    let input_ports =
        midi_io::list_input_ports(client_name).expect("failed to enumerate MIDI input ports");
    let input_index = select_port("performer input", &input_ports);
    let input_source = midi_io::MidirInputSource::connect(client_name, input_index)
        .expect("failed to connect input source");

    let output_ports =
        midi_io::list_output_ports(client_name).expect("failed to enumerate MIDI output ports");
    let output_index = select_port("output", &output_ports);
    let output_sink = midi_io::MidirOutputSink::connect(client_name, output_index)
        .expect("failed to connect output sink");

    let model_command = env::var("GENSEQ_MODEL_COMMAND").unwrap_or_else(|_| "genseq-model".into());
    let engine = ProcessModelEngine { command: model_command };

    let stop = Arc::new(AtomicBool::new(false));
    if let Err(e) = genseq_bridge::run(config, clock_source, input_source, output_sink, engine, stop) {
        eprintln!("bridge exited with error: {e}");
        std::process::exit(1);
    }
}
