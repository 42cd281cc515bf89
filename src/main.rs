use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uart_mcp::worker::Worker;
use uart_mcp::{
    logging, ConfigLoader, ConfigOverrides, SerialError, SerialManager, SystemPortOpener,
    TerminalManager,
};

/// How often `monitor` flushes buffered output to stdout.
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Concurrent UART connection manager.",
    long_about = "Lists, opens and talks to serial devices. Ports opened by `monitor` are supervised and reconnected automatically when the device comes back."
)]
struct Cli {
    /// Configuration file (overrides the standard search path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Baud rate for the port being opened.
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Log filter, e.g. "debug" or "uart_mcp=trace".
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available (non-blacklisted) serial ports as JSON.
    List,
    /// Write a payload to a port.
    Send {
        port: String,
        data: String,
        /// Treat DATA as base64-encoded bytes.
        #[arg(long)]
        binary: bool,
    },
    /// Read from a port.
    Read {
        port: String,
        /// Wait for this many bytes; without it, read what is available now.
        #[arg(long)]
        size: Option<usize>,
        /// Read timeout override in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the data base64-encoded.
        #[arg(long)]
        binary: bool,
    },
    /// Interactive terminal: stdin lines are sent as commands, output is printed.
    Monitor { port: String },
    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to this path.
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<SerialError>() {
                Some(serial) => println!("{}", serial.to_json()),
                None => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    if let Some(level) = &cli.log_level {
        loader.config.logging.level = level.clone();
    }
    logging::init(&loader.config().logging).map_err(|e| e.to_string())?;
    if let Some(path) = &loader.config_path {
        info!("Using configuration {}", path.display());
    }

    let config = loader.config();
    let mut options = config.serial.manager_options()?;
    // One-shot commands have nothing to supervise.
    options.auto_reconnect &= matches!(cli.command, Command::Monitor { .. });

    let serial = Arc::new(SerialManager::new(
        Arc::new(SystemPortOpener),
        Arc::new(loader.blacklist()),
        options,
    ));
    let mut overrides = ConfigOverrides::new();
    if let Some(baud) = cli.baud {
        overrides = overrides.baudrate(baud);
    }

    match cli.command {
        Command::List => {
            let ports = serial.list_ports()?;
            println!("{}", serde_json::to_string_pretty(&ports)?);
        }
        Command::Send { port, data, binary } => {
            let port = config.serial.resolve_port(&port);
            let payload = if binary {
                BASE64.decode(data.trim())?
            } else {
                data.into_bytes()
            };
            serial.open_port(&port, &overrides, false)?;
            let written = serial.send_data(&port, &payload)?;
            serial.close_port(&port)?;
            println!("{}", json!({ "port": port, "bytes_written": written }));
        }
        Command::Read {
            port,
            size,
            timeout_ms,
            binary,
        } => {
            let port = config.serial.resolve_port(&port);
            serial.open_port(&port, &overrides, false)?;
            let data = serial.read_data(&port, size, timeout_ms.map(Duration::from_millis))?;
            serial.close_port(&port)?;
            let text = if binary {
                BASE64.encode(&data)
            } else {
                String::from_utf8_lossy(&data).into_owned()
            };
            println!("{}", json!({ "port": port, "data": text, "bytes_read": data.len() }));
        }
        Command::Monitor { port } => {
            let port = config.serial.resolve_port(&port);
            let session_config = config.terminal.session_config()?;
            let terminals = Arc::new(TerminalManager::with_options(
                Arc::clone(&serial),
                config.terminal.options(),
            ));
            serial.open_port(&port, &overrides, config.serial.auto_reconnect)?;
            terminals.create_session_with_config(&port, session_config)?;
            monitor(&terminals, &port)?;
            terminals.close_session(&port)?;
            serial.close_port(&port)?;
        }
        Command::Config { write } => {
            print!("{}", toml::to_string_pretty(config)?);
            if let Some(path) = write {
                loader.save_to(&path)?;
                eprintln!("wrote {}", path.display());
            }
        }
    }

    serial.shutdown();
    Ok(())
}

fn monitor(terminals: &Arc<TerminalManager>, port: &str) -> Result<(), Box<dyn std::error::Error>> {
    let printer_terminals = Arc::clone(terminals);
    let session = port.to_string();
    let mut printer = Worker::spawn("monitor-output", move |signal| {
        let mut stdout = std::io::stdout();
        while !signal.wait(MONITOR_POLL_INTERVAL) {
            match printer_terminals.read_output(&session, true) {
                Ok(data) if !data.is_empty() => {
                    let _ = stdout.write_all(&data);
                    let _ = stdout.flush();
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })?;

    eprintln!("monitoring {port}; Ctrl-D to quit");
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if let Err(e) = terminals.send_command(port, &line, true) {
            eprintln!("{e}");
            if matches!(e, SerialError::SessionClosed(_)) {
                break;
            }
        }
    }

    printer.stop(Duration::from_secs(1));
    Ok(())
}
