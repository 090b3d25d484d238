//! Patchbay CLI - list, monitor and drive MIDI, OSC and Ableton remote ports
//!
//! Opens router ports from the command line or from a `patchbay.toml` file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use patchbay_bridge::{
    midi, AbletonIn, MetronomeArgs, MetronomeIn, MidiIn, MidiOut, MidiPortArgs, MidiPortsWatcher,
    OscIn, OscIo, OscIoArgs, OscOut,
};
use patchbay_core::{Msg, OscMsg, OscValue};
use patchbay_router::{AppContext, CallStats, Output, Port, Subscribable};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{Config, MonitorConfig};

/// Patchbay - control-surface message routing
#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "PATCHBAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List MIDI devices
    Ports,

    /// Open inputs and print every message they receive
    Monitor {
        /// MIDI input device (repeatable)
        #[arg(short, long)]
        midi: Vec<String>,

        /// MIDI device proxying an Ableton Live remote script (repeatable)
        #[arg(short, long)]
        ableton: Vec<String>,

        /// OSC listen endpoint, `port` or `host:port` (repeatable)
        #[arg(short, long)]
        osc: Vec<String>,

        /// Also print metronome clicks at this tempo
        #[arg(long)]
        bpm: Option<f64>,

        /// Report MIDI devices appearing and disappearing
        #[arg(short, long)]
        watch: bool,
    },

    /// Send a single message
    Send {
        #[command(subcommand)]
        target: SendTarget,
    },

    /// Send an OSC request and print the response
    Query {
        /// Local endpoint the response arrives on
        #[arg(long)]
        listen: String,

        /// Endpoint of the application answering the request
        #[arg(short, long)]
        target: String,

        /// Request address, the response comes back on the same address
        address: String,

        /// Request arguments (JSON values, bare words are strings)
        #[arg(allow_hyphen_values = true)]
        values: Vec<String>,

        /// Response timeout in milliseconds, defaults to `bridge.query_timeout_ms`
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SendTarget {
    /// Send an OSC message over UDP
    Osc {
        /// Target endpoint, `port` or `host:port`
        #[arg(short, long)]
        target: String,

        /// OSC address
        address: String,

        /// Arguments (JSON values, bare words are strings)
        #[arg(allow_hyphen_values = true)]
        values: Vec<String>,
    },

    /// Send raw MIDI bytes to a device
    Midi {
        /// Output device name
        #[arg(short, long)]
        device: String,

        /// Create a virtual output instead of connecting to a device
        #[arg(long = "virtual")]
        is_virtual: bool,

        /// Message bytes in hex, e.g. `B0 07 64`
        #[arg(required = true)]
        bytes: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let level = cli
        .log_level
        .as_deref()
        .or(config.logging.level.as_deref())
        .unwrap_or("info");
    setup_logging(level, cli.json_logs || config.logging.json)?;

    match cli.command {
        Commands::Ports => {
            print_ports(&config.bridge.midi_client_name)?;
        }

        Commands::Monitor {
            midi,
            ableton,
            osc,
            bpm,
            watch,
        } => {
            let monitor = merge_monitor(
                config.monitor.clone(),
                MonitorConfig {
                    midi_inputs: midi,
                    ableton_inputs: ableton,
                    osc_listen: osc,
                    metronome_bpm: bpm,
                    watch_ports: watch,
                },
            );
            run_monitor(&config, &monitor)?;
        }

        Commands::Send { target } => match target {
            SendTarget::Osc {
                target,
                address,
                values,
            } => {
                let msg = OscMsg::new(address, parse_values(&values));
                println!(
                    "{} Sending {} to {}",
                    "PATCHBAY".cyan().bold(),
                    msg.to_string().yellow(),
                    target
                );
                send_osc(&config, &target, msg)?;
            }
            SendTarget::Midi {
                device,
                is_virtual,
                bytes,
            } => {
                let bytes = parse_hex(&bytes)?;
                let msg = patchbay_core::midi::decode(&bytes)
                    .with_context(|| format!("Not a MIDI message: {:02X?}", bytes))?;
                println!(
                    "{} Sending {} to {}",
                    "PATCHBAY".cyan().bold(),
                    msg.to_string().yellow(),
                    device
                );
                let args = if is_virtual {
                    MidiPortArgs::new_virtual(device)
                } else {
                    MidiPortArgs::device(device)
                };
                send_midi(&config, args, msg.into())?;
            }
        },

        Commands::Query {
            listen,
            target,
            address,
            values,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.bridge.query_timeout());
            run_query(
                &config,
                OscIoArgs { listen, target },
                &address,
                parse_values(&values),
                timeout,
            )?;
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn print_ports(client_name: &str) -> Result<()> {
    let inputs = midi::input_names(client_name).context("Failed to list MIDI inputs")?;
    let outputs = midi::output_names(client_name).context("Failed to list MIDI outputs")?;

    println!("{}", "MIDI inputs:".green());
    if inputs.is_empty() {
        println!("  (none)");
    }
    for name in &inputs {
        println!("  {}", name);
    }

    println!("{}", "MIDI outputs:".green());
    if outputs.is_empty() {
        println!("  (none)");
    }
    for name in &outputs {
        println!("  {}", name);
    }

    Ok(())
}

/// Router context carrying the configured bridge settings
fn start_context(config: &Config) -> Result<AppContext> {
    let ctx = AppContext::new(config.router.clone()).context("Failed to start the router")?;
    config.bridge.clone().apply(&ctx);
    Ok(ctx)
}

/// Command line entries are added to the configured ones
fn merge_monitor(mut config: MonitorConfig, flags: MonitorConfig) -> MonitorConfig {
    config.midi_inputs.extend(flags.midi_inputs);
    config.ableton_inputs.extend(flags.ableton_inputs);
    config.osc_listen.extend(flags.osc_listen);
    if flags.metronome_bpm.is_some() {
        config.metronome_bpm = flags.metronome_bpm;
    }
    config.watch_ports |= flags.watch_ports;
    config
}

fn run_monitor(config: &Config, monitor: &MonitorConfig) -> Result<()> {
    let ctx = start_context(config)?;

    for name in &monitor.midi_inputs {
        let input = ctx
            .declare::<MidiIn>(name.as_str())
            .with_context(|| format!("Invalid MIDI input {:?}", name))?;
        input.subscribe_all(print_msg)?;
    }
    for name in &monitor.ableton_inputs {
        let input = ctx
            .declare::<AbletonIn>(name.as_str())
            .with_context(|| format!("Invalid remote script port {:?}", name))?;
        input.subscribe_all(print_msg)?;
    }
    for listen in &monitor.osc_listen {
        let input = ctx
            .declare::<OscIn>(listen.as_str())
            .with_context(|| format!("Invalid OSC endpoint {:?}", listen))?;
        input.subscribe_all(print_msg)?;
    }
    if let Some(bpm) = monitor.metronome_bpm {
        let metronome = ctx
            .declare::<MetronomeIn>(MetronomeArgs::from(bpm))
            .context("Invalid metronome tempo")?;
        metronome.subscribe_all(print_msg)?;
    }
    if monitor.watch_ports {
        let watcher = ctx.declare::<MidiPortsWatcher>(())?;
        let client_name = config.bridge.midi_client_name.clone();
        watcher.subscribe_all(move |msg| {
            print_msg(msg);
            if let Ok(snapshot) = midi::input_names(&client_name) {
                println!("  inputs: {}", snapshot.join(", "));
            }
        })?;
    }

    if ctx.ports().is_empty() {
        bail!("Nothing to monitor, pass --midi, --ableton, --osc, --bpm or --watch");
    }

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install the Ctrl+C handler")?;

    ctx.open_all();
    for port in ctx.ports() {
        let state = if port.is_open() {
            "OK".green().bold()
        } else {
            "UNAVAILABLE".red().bold()
        };
        println!("{} {}", state, port.id());
    }
    println!("Press Ctrl+C to stop");

    let _ = stop_rx.recv();
    info!("Received shutdown signal");
    ctx.shutdown();

    print_stats(&ctx);
    println!("{}", "Monitor stopped".yellow());
    Ok(())
}

fn print_msg(msg: Msg) {
    let tag = match &msg {
        Msg::Midi(_) => "MIDI".magenta(),
        Msg::Osc(_) => "OSC".cyan(),
        Msg::Ableton(_) => "LIVE".green(),
        Msg::Event(_) => "EVENT".yellow(),
    };
    let source = msg
        .source()
        .map(|id| id.uid.clone())
        .unwrap_or_default();
    println!("{} {} {}", tag, source.dimmed(), msg);
}

fn print_stats(ctx: &AppContext) {
    for line in stats_lines(ctx.stats()) {
        println!("  {}", line);
    }
}

/// One line per call that ran at least once
fn stats_lines(stats: Vec<CallStats>) -> Vec<String> {
    stats
        .into_iter()
        .filter(|stats| stats.calls > 0)
        .map(|stats| stats.to_string())
        .collect()
}

fn send_osc(config: &Config, target: &str, msg: OscMsg) -> Result<()> {
    let ctx = start_context(config)?;
    let output = ctx
        .declare::<OscOut>(target)
        .with_context(|| format!("Invalid OSC target {:?}", target))?;

    output.open();
    output.send(&msg.into()).context("Failed to send")?;
    ctx.shutdown();

    println!("{} Sent", "OK".green().bold());
    Ok(())
}

fn send_midi(config: &Config, args: MidiPortArgs, msg: Msg) -> Result<()> {
    let ctx = start_context(config)?;
    let output = ctx.declare::<MidiOut>(args)?;

    output.open();
    if !output.is_open() {
        bail!("MIDI output {} is not available", output.id());
    }
    output.send(&msg).context("Failed to send")?;
    // Closing drains the queue
    ctx.shutdown();

    println!("{} Sent", "OK".green().bold());
    Ok(())
}

fn run_query(
    config: &Config,
    args: OscIoArgs,
    address: &str,
    payload: OscValue,
    timeout: Duration,
) -> Result<()> {
    let ctx = start_context(config)?;
    let io = ctx.declare::<OscIo>(args)?;

    ctx.open_all();
    let response = io.query(address, payload, timeout);
    ctx.shutdown();

    let value = response.with_context(|| format!("Query {} failed", address))?;
    println!("{} {}", address.yellow(), value);
    Ok(())
}

/// OSC arguments from command line words
fn parse_values(words: &[String]) -> OscValue {
    OscValue::from_args(words.iter().map(|w| parse_value(w)).collect())
}

/// Parse a word as JSON, falling back to a string
fn parse_value(word: &str) -> OscValue {
    serde_json::from_str(word)
        .map(json_to_osc)
        .unwrap_or_else(|_| OscValue::String(word.to_string()))
}

fn json_to_osc(value: serde_json::Value) -> OscValue {
    use serde_json::Value;

    match value {
        Value::Null => OscValue::Nil,
        Value::Bool(b) => OscValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => OscValue::Int(i),
            None => OscValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => OscValue::String(s),
        Value::Array(items) => OscValue::List(items.into_iter().map(json_to_osc).collect()),
        Value::Object(_) => OscValue::String(value.to_string()),
    }
}

fn parse_hex(words: &[String]) -> Result<Vec<u8>> {
    words
        .iter()
        .flat_map(|w| w.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|w| !w.is_empty())
        .map(|w| {
            let digits = w.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16).with_context(|| format!("Not a hex byte: {:?}", w))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use patchbay_core::PortId;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(parse_values(&[]), OscValue::Nil);
        assert_eq!(parse_values(&words(&["120"])), OscValue::Int(120));
        assert_eq!(parse_values(&words(&["0.5"])), OscValue::Float(0.5));
        assert_eq!(
            parse_values(&words(&["Bass", "true", "null"])),
            OscValue::List(vec![
                OscValue::String("Bass".to_string()),
                OscValue::Bool(true),
                OscValue::Nil,
            ])
        );
        assert_eq!(
            parse_value("[1, 2.5]"),
            OscValue::List(vec![OscValue::Int(1), OscValue::Float(2.5)])
        );
        assert_eq!(parse_value("\"42\""), OscValue::String("42".to_string()));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(
            parse_hex(&words(&["B0", "07", "0x64"])).unwrap(),
            vec![0xB0, 0x07, 0x64]
        );
        assert_eq!(parse_hex(&words(&["90,3c,7f"])).unwrap(), vec![0x90, 0x3C, 0x7F]);
        assert!(parse_hex(&words(&["zz"])).is_err());
        assert!(parse_hex(&words(&["100"])).is_err());
    }

    #[test]
    fn test_stats_lines_skip_idle_calls() {
        let stats = |name: &str, latencies: Vec<Duration>| CallStats {
            name: name.to_string(),
            port: PortId::new("MidiIn", "Ctrl"),
            conditions: "any".to_string(),
            calls: latencies.len() as u64,
            failures: 0,
            latencies,
        };

        let lines = stats_lines(vec![
            stats("idle", vec![]),
            stats(
                "volume",
                vec![Duration::from_millis(1), Duration::from_millis(3)],
            ),
        ]);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("volume on "));
        assert!(lines[0].ends_with("2 calls, 0 failed, mean latency 2.000 ms"));
    }

    #[test]
    fn test_flags_extend_the_monitor_section() {
        let configured = MonitorConfig {
            midi_inputs: words(&["Ctrl"]),
            metronome_bpm: Some(60.0),
            ..Default::default()
        };
        let flags = MonitorConfig {
            midi_inputs: words(&["Pads"]),
            osc_listen: words(&["9000"]),
            metronome_bpm: Some(120.0),
            watch_ports: true,
            ..Default::default()
        };

        let merged = merge_monitor(configured, flags);
        assert_eq!(merged.midi_inputs, words(&["Ctrl", "Pads"]));
        assert_eq!(merged.osc_listen, words(&["9000"]));
        assert_eq!(merged.metronome_bpm, Some(120.0));
        assert!(merged.watch_ports);
    }

    #[test]
    fn test_monitor_flags_parse() {
        let cli = Cli::try_parse_from([
            "patchbay", "monitor", "--midi", "Ctrl", "--osc", "9000", "--osc", "9001", "--watch",
        ])
        .unwrap();
        match cli.command {
            Commands::Monitor {
                midi, osc, watch, ..
            } => {
                assert_eq!(midi, words(&["Ctrl"]));
                assert_eq!(osc, words(&["9000", "9001"]));
                assert!(watch);
            }
            _ => panic!("expected monitor"),
        }
    }
}
