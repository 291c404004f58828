//! # POPS Control
//!
//! Instrument program of the POPS optical particle counter. Loads the
//! configuration, brings up the hardware driver, the coprocessor and the
//! telemetry links, then runs the one-second acquisition loop until the
//! coprocessor, a command or a signal stops it. A coprocessor stop or a
//! shutdown command halts the host; a reboot command reboots it.
//!
//! With `--simulate` the simulation driver and an in-process coprocessor fed
//! by a synthetic particle producer stand in for the hardware.

use clap::Parser;
use pops_common::config::{ConfigError, ConfigLoader, LinkRole, PopsConfig};
use pops_common::consts::DEFAULT_CONFIG_PATH;
use pops_common::hal::pru::CoprocessorMemory;
use pops_control::cycle::{ControlLoop, Link, rt_setup};
use pops_control::error::ControlError;
use pops_hal::driver_registry::DriverRegistry;
use pops_hal::power;
use pops_hal::pru::{MappedPru, MemoryPru, SyntheticProducer, SyntheticProfile};
use pops_hal::transport::{SerialLink, UdpLink};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// POPS Control: particle acquisition and telemetry loop
#[derive(Parser, Debug)]
#[command(name = "pops_control")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Acquisition, telemetry and control loop of the POPS particle counter")]
struct Args {
    /// Path to the instrument configuration TOML.
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run against the simulation driver and a synthetic coprocessor.
    #[arg(long)]
    simulate: bool,

    /// Do not halt or reboot the host when the loop stops.
    #[arg(long)]
    no_power_off: bool,

    /// SCHED_FIFO priority (used with the `rt` feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("POPS Control v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("POPS Control shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if !args.simulate && !nix::unistd::geteuid().is_root() {
        return Err(ControlError::NotRoot.into());
    }

    let config = load_config(args)?;
    info!(
        "Config OK: status_type={}, nbins={}, period={}ms",
        config.instrument.status_type, config.bins.nbins, config.timing.period_ms
    );

    let registry = DriverRegistry::with_builtin_drivers()?;
    let driver_name = if args.simulate {
        "simulation"
    } else {
        config.hardware.driver.as_str()
    };
    let driver = registry.create_driver(driver_name)?;

    let (pru, mut producer): (Arc<dyn CoprocessorMemory>, Option<SyntheticProducer>) =
        if args.simulate {
            let memory = Arc::new(MemoryPru::new());
            memory.initialize(config.baseline.bl_start);
            let profile = SyntheticProfile {
                baseline: config.baseline.bl_start as u16,
                ..SyntheticProfile::default()
            };
            let producer = SyntheticProducer::spawn(memory.clone(), profile)?;
            (memory as Arc<dyn CoprocessorMemory>, Some(producer))
        } else {
            let mapped = MappedPru::open(
                &config.hardware.mem_device,
                config.hardware.remoteproc.clone(),
            )?;
            mapped.initialize(config.baseline.bl_start);
            mapped.start_firmware(&config.hardware.firmware)?;
            (Arc::new(mapped) as Arc<dyn CoprocessorMemory>, None)
        };

    let links = build_links(&config, args.simulate);
    info!("{} telemetry links configured", links.len());

    rt_setup(args.rt_priority)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut control = ControlLoop::new(
        config,
        Some(args.config.clone()),
        driver,
        pru,
        links,
        running,
    );
    let result = control.run();

    if let Some(producer) = producer.as_mut() {
        producer.stop();
    }
    let cause = result?;
    info!("Loop stopped: {:?}", cause);

    match cause.power_action() {
        Some(action) if !args.no_power_off && !args.simulate => power::execute(action)?,
        Some(action) => info!("Skipping OS {:?}", action),
        None => {}
    }
    Ok(())
}

/// Load, normalize and validate the configuration. A missing file falls
/// back to the built-in defaults.
fn load_config(args: &Args) -> Result<PopsConfig, ConfigError> {
    let mut config = match PopsConfig::load(&args.config) {
        Ok(config) => config,
        Err(ConfigError::FileNotFound) => {
            warn!(
                "Config '{}' not found, using defaults",
                args.config.display()
            );
            PopsConfig::default()
        }
        Err(e) => return Err(e),
    };
    config.normalize();
    config.validate()?;
    Ok(config)
}

/// Open the enabled serial and UDP links. Links that fail to open are
/// skipped with a warning; closed serial ports are retried by the loop.
fn build_links(config: &PopsConfig, simulate: bool) -> Vec<Link> {
    let mut links = Vec::new();
    if !simulate {
        for port in config.serial_ports.0.iter().filter(|p| p.enabled) {
            let path = format!("{}{}", config.hardware.serial_prefix, port.port);
            links.push(Link::new(
                port.role,
                Box::new(SerialLink::new(path, port.baud)),
            ));
        }
    }
    for udp in config.udp.iter().filter(|u| u.enabled) {
        match UdpLink::new(&udp.ip, udp.port) {
            Ok(link) => links.push(Link::new(udp.role, Box::new(link))),
            Err(e) => warn!("UDP {}:{} ({:?}) not opened: {e}", udp.ip, udp.port, udp.role),
        }
    }
    if links.iter().filter(|l| l.role == LinkRole::Aircraft).count() > 1 {
        warn!("More than one aircraft feed configured; the last datagram wins");
    }
    links
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
