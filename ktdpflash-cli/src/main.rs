//! ktdpflash CLI - Command-line tool for updating Kinetic DisplayPort
//! converter firmware over the AUX channel.
//!
//! ## Features
//!
//! - Update firmware through the secure AUX-ISP protocol
//! - Probe converter identity and firmware version
//! - Query the active flash bank on dual-bank parts
//! - Toggle AUX forwarding to daisy-chained sinks
//! - Shell completion generation
//! - Environment variable support

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use ktdpflash::{
    AppImageLayout, ChipFamily, DevPort, DrmDpAuxDev, FirmwarePackage, SecureAuxIspUpdater,
    Updater, image::secure::STD_PAYLOAD_SIZE,
};
use log::debug;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// ktdpflash - firmware updater for Kinetic DisplayPort converters.
///
/// Environment variables:
///   KTDPFLASH_DEVICE   - Default AUX device node (e.g. /dev/drm_dp_aux0)
///   KTDPFLASH_CHIP     - Default chip family (jaguar, mustang)
#[derive(Parser)]
#[command(name = "ktdpflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// AUX device node to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "KTDPFLASH_DEVICE")]
    device: Option<String>,

    /// Target chip family.
    #[arg(
        short,
        long,
        global = true,
        default_value = "jaguar",
        env = "KTDPFLASH_CHIP"
    )]
    chip: Chip,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Supported chip families.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Chip {
    /// Jaguar series (default).
    Jaguar,
    /// Mustang series.
    Mustang,
}

impl From<Chip> for ChipFamily {
    fn from(chip: Chip) -> Self {
        match chip {
            Chip::Jaguar => ChipFamily::Jaguar,
            Chip::Mustang => ChipFamily::Mustang,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Update the converter firmware from an update file.
    Update {
        /// Path to the firmware update file (payload plus ISP driver).
        firmware: PathBuf,

        /// ESM code size in bytes (hex accepted).
        #[arg(long, value_parser = parse_hex_u32)]
        esm_size: Option<u32>,

        /// Application code size in bytes (hex accepted).
        #[arg(long, value_parser = parse_hex_u32)]
        app_size: Option<u32>,

        /// Application init data size in bytes (hex accepted).
        #[arg(long, value_parser = parse_hex_u16)]
        init_size: Option<u16>,

        /// CMDB size in bytes, zero for none (hex accepted).
        #[arg(long, value_parser = parse_hex_u16)]
        cmdb_size: Option<u16>,

        /// The application executes in place from flash.
        #[arg(long)]
        xip: bool,
    },

    /// Probe the converter identity and firmware version.
    Probe {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Query which flash bank is currently active.
    Bank,

    /// Show information about a firmware update file.
    Info {
        /// Path to the firmware update file.
        firmware: PathBuf,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List candidate AUX device nodes.
    List {
        /// Output device list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Forward AUX transactions to a downstream port.
    Forward {
        /// Downstream port number (0-2); required unless --off is given.
        #[arg(value_parser = clap::value_parser!(u8).range(0..=2))]
        port: Option<u8>,

        /// Stop forwarding instead of starting it.
        #[arg(long)]
        off: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Parse hexadecimal or decimal value (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let cleaned: String = s.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {e}"))
    } else {
        cleaned
            .parse()
            .map_err(|e| format!("Invalid value: {e}"))
    }
}

/// As [`parse_hex_u32`] but for 16-bit fields.
fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let val = parse_hex_u32(s)?;
    u16::try_from(val).map_err(|_| format!("Value {val} does not fit in 16 bits"))
}

fn main() -> Result<()> {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if std::env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "ktdpflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // Ctrl-C aborts long poll loops inside the library
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("Failed to install Ctrl-C handler")?;
    }
    ktdpflash::set_interrupt_checker(move || interrupted.load(Ordering::Relaxed));

    match &cli.command {
        Commands::Update {
            firmware,
            esm_size,
            app_size,
            init_size,
            cmdb_size,
            xip,
        } => {
            let layout = build_layout(&cli, *esm_size, *app_size, *init_size, *cmdb_size, *xip);
            cmd_update(&cli, firmware, layout)?;
        }
        Commands::Probe { json } => {
            cmd_probe(&cli, *json)?;
        }
        Commands::Bank => {
            cmd_bank(&cli)?;
        }
        Commands::Info { firmware, json } => {
            let layout = ChipFamily::from(cli.chip).default_layout();
            cmd_info(firmware, layout, *json)?;
        }
        Commands::List { json } => {
            cmd_list(*json)?;
        }
        Commands::Forward { port, off } => {
            cmd_forward(&cli, *port, *off)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(*shell);
        }
    }

    Ok(())
}

/// Get the AUX device node from CLI args or auto-detection.
fn get_device(cli: &Cli) -> Result<String> {
    if let Some(ref device) = cli.device {
        return Ok(device.clone());
    }

    let nodes = DrmDpAuxDev::list_devices().context("Failed to scan for AUX device nodes")?;
    match nodes.as_slice() {
        [] => bail!("No DRM AUX device nodes found; is the converter connected?"),
        [single] => Ok(single.display().to_string()),
        many => {
            let listing: Vec<String> = many.iter().map(|p| p.display().to_string()).collect();
            bail!(
                "Multiple AUX device nodes found, pick one with --device:\n  {}",
                listing.join("\n  ")
            )
        }
    }
}

/// Region layout from the chip default plus command-line overrides.
fn build_layout(
    cli: &Cli,
    esm_size: Option<u32>,
    app_size: Option<u32>,
    init_size: Option<u16>,
    cmdb_size: Option<u16>,
    xip: bool,
) -> AppImageLayout {
    let mut layout = ChipFamily::from(cli.chip).default_layout();
    if let Some(size) = esm_size {
        layout.esm_size = size;
    }
    if let Some(size) = app_size {
        layout.app_code_size = size;
    }
    if let Some(size) = init_size {
        layout.app_init_data_size = size;
    }
    if let Some(size) = cmdb_size {
        layout.cmdb_size = size;
    }
    if xip {
        layout.xip_enabled = true;
    }
    layout
}

/// Open the device and build a concrete updater.
fn open_updater(cli: &Cli, layout: AppImageLayout) -> Result<SecureAuxIspUpdater<DrmDpAuxDev>> {
    let device = get_device(cli)?;
    if !cli.quiet {
        eprintln!("{} Using device {}", style("🔌").cyan(), style(&device).green());
    }
    let aux = DrmDpAuxDev::open(&device)
        .with_context(|| format!("Failed to open AUX device {device}"))?;
    Ok(SecureAuxIspUpdater::new(aux, cli.chip.into()).with_layout(layout))
}

/// Update command implementation.
fn cmd_update(cli: &Cli, firmware: &PathBuf, layout: AppImageLayout) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading firmware {}",
            style("📦").cyan(),
            firmware.display()
        );
    }

    let data = std::fs::read(firmware)
        .with_context(|| format!("Failed to read firmware file {}", firmware.display()))?;

    let mut updater = open_updater(cli, layout)?;
    let package = updater
        .prepare_firmware(&data)
        .context("Firmware file rejected")?;

    let info = updater.probe().context("Failed to probe converter")?;
    if !cli.quiet {
        eprintln!(
            "{} {} rev {:#04x}, firmware {} ({})",
            style("ℹ").blue(),
            updater.family(),
            info.chip_rev,
            info.fw_version_string(),
            info.run_state
        );
        eprintln!(
            "{} ISP driver {} bytes, payload {} bytes",
            style("ℹ").blue(),
            package.isp_driver().len(),
            package.total_payload_size()
        );
    }

    // Create progress bar
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(100);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let mut current_phase = String::new();
    updater.write_firmware(&package, &mut |phase, current, total| {
        if phase != current_phase {
            current_phase = phase.to_string();
            pb.set_message(current_phase.clone());
        }
        if total > 0 {
            pb.set_position(current * 100 / total);
        }
    })?;

    pb.finish_with_message("complete");

    if !cli.quiet {
        eprintln!(
            "\n{} Update complete, converter is restarting",
            style("🎉").green().bold()
        );
    }

    Ok(())
}

/// Probe command implementation.
fn cmd_probe(cli: &Cli, json: bool) -> Result<()> {
    let layout = ChipFamily::from(cli.chip).default_layout();
    let mut updater = open_updater(cli, layout)?;
    let info = updater.probe().context("Failed to probe converter")?;

    if json {
        let out = serde_json::json!({
            "family": updater.family().to_string(),
            "chip_rev": format!("{:#04x}", info.chip_rev),
            "chip_type": format!("{:#04x}", info.chip_type),
            "fw_version": info.fw_version_string(),
            "customer_fw_version": info.customer_fw_version,
            "customer_project_id": info.customer_project_id,
            "run_state": info.run_state.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    eprintln!("{}", style("Converter").bold().underlined());
    eprintln!("  Family:              {}", updater.family());
    eprintln!("  Chip revision:       {:#04x}", info.chip_rev);
    eprintln!("  Chip type:           {:#04x}", info.chip_type);
    eprintln!("  Firmware version:    {}", info.fw_version_string());
    eprintln!("  Customer version:    {:#06x}", info.customer_fw_version);
    eprintln!("  Customer project:    {}", info.customer_project_id);
    eprintln!("  Run state:           {}", info.run_state);
    Ok(())
}

/// Bank command implementation.
fn cmd_bank(cli: &Cli) -> Result<()> {
    let layout = ChipFamily::from(cli.chip).default_layout();
    let mut updater = open_updater(cli, layout)?;
    let bank = updater
        .active_flash_bank()
        .context("Failed to query active flash bank")?;
    println!("{bank}");
    Ok(())
}

/// Info command implementation.
fn cmd_info(firmware: &PathBuf, layout: AppImageLayout, json: bool) -> Result<()> {
    let data = std::fs::read(firmware)
        .with_context(|| format!("Failed to read firmware file {}", firmware.display()))?;
    let package = FirmwarePackage::parse(&data, layout)
        .with_context(|| format!("Invalid firmware file {}", firmware.display()))?;

    if json {
        let out = serde_json::json!({
            "file_size": data.len(),
            "payload_size": STD_PAYLOAD_SIZE,
            "isp_driver_size": package.isp_driver().len(),
            "esm_size": package.layout().esm_size,
            "app_code_size": package.layout().app_code_size,
            "app_init_data_size": package.layout().app_init_data_size,
            "cmdb_size": package.layout().cmdb_size,
            "xip_enabled": package.layout().xip_enabled,
            "total_payload_size": package.total_payload_size(),
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    eprintln!("{}", style("Firmware Update File").bold().underlined());
    eprintln!("  File size:           {} bytes", data.len());
    eprintln!("  ISP driver:          {} bytes", package.isp_driver().len());
    eprintln!("  ESM code:            {} bytes", package.layout().esm_size);
    eprintln!("  App code:            {} bytes", package.layout().app_code_size);
    eprintln!(
        "  App init data:       {} bytes",
        package.layout().app_init_data_size
    );
    eprintln!("  CMDB:                {} bytes", package.layout().cmdb_size);
    eprintln!(
        "  Execute in place:    {}",
        if package.layout().xip_enabled { "yes" } else { "no" }
    );
    eprintln!(
        "  Total transfer:      {} bytes (secure mode)",
        package.total_payload_size()
    );
    Ok(())
}

/// List command implementation.
fn cmd_list(json: bool) -> Result<()> {
    let nodes = DrmDpAuxDev::list_devices().context("Failed to scan for AUX device nodes")?;

    if json {
        let out: Vec<String> = nodes.iter().map(|p| p.display().to_string()).collect();
        println!("{}", serde_json::to_string_pretty(&out).unwrap_or_default());
        return Ok(());
    }

    eprintln!("{}", style("AUX Device Nodes").bold().underlined());
    if nodes.is_empty() {
        eprintln!("  {}", style("No AUX device nodes found").dim());
    } else {
        for node in &nodes {
            eprintln!("  {} {}", style("•").green(), style(node.display()).cyan());
        }
    }
    Ok(())
}

/// Forward command implementation.
fn cmd_forward(cli: &Cli, port: Option<u8>, off: bool) -> Result<()> {
    let layout = ChipFamily::from(cli.chip).default_layout();
    let mut updater = open_updater(cli, layout)?;

    if off {
        updater
            .disable_aux_forward()
            .context("Failed to disable AUX forwarding")?;
        if !cli.quiet {
            eprintln!("{} AUX forwarding disabled", style("✓").green());
        }
        return Ok(());
    }

    let port = match port {
        Some(0) => DevPort::Port0,
        Some(1) => DevPort::Port1,
        Some(2) => DevPort::Port2,
        _ => bail!("Specify a downstream port (0-2), or --off to stop forwarding"),
    };
    updater
        .enable_aux_forward(port)
        .context("Failed to enable AUX forwarding")?;
    if !cli.quiet {
        eprintln!(
            "{} AUX forwarding enabled to port {}",
            style("✓").green(),
            port.param()
        );
    }
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
