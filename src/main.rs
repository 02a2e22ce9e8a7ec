//! Board Arbiter CLI
//!
//! Inspect board models, pin numbering, boot configuration overlays and the
//! default bus pin assignments the library would use.
//!
//! # Usage
//!
//! ```bash
//! # List supported board models
//! board-arbiter boards list
//!
//! # Show a model's numbering and default bus tables
//! board-arbiter boards show raspberry-pi
//!
//! # Detect the board this machine is running on
//! board-arbiter boards probe
//!
//! # Convert header position 3 to its BCM number
//! board-arbiter pins convert 3 --from board --to logical --board rpi
//!
//! # Analyze dtoverlay lines of a boot configuration
//! board-arbiter overlay analyze /boot/firmware/config.txt
//!
//! # Pins the board would use for SPI0 CE1
//! board-arbiter defaults spi 0 1 --board rpi
//! ```

use anyhow::{Context, Result};
use board_arbiter::boards::{create_model, model_names, probe_model};
use board_arbiter::{
    Board, BoardConfig, BoardModel, I2cConnectionSettings, OverlayConfig, Pin, PinMode, PinNumberingScheme,
    PinUsage, PinValue, SimulatedBoard, SpiConnectionSettings, UNASSIGNED_PIN,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Board Arbiter
///
/// Pin reservation and bus brokering for single-board computers
#[derive(Parser)]
#[command(name = "board-arbiter")]
#[command(author = "Prasanna Gautam")]
#[command(version = "0.1.0")]
#[command(about = "Pin numbering, overlay and bus assignment inspector for single-board computers")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Board configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Board model to use instead of probing (e.g., rpi, generic, simulated)
    #[arg(short, long, global = true)]
    board: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Board model operations
    #[command(subcommand)]
    Boards(BoardCommands),

    /// Pin numbering operations
    #[command(subcommand)]
    Pins(PinCommands),

    /// Boot configuration overlay operations
    #[command(subcommand)]
    Overlay(OverlayCommands),

    /// Show the pins a bus would be assigned
    #[command(subcommand)]
    Defaults(DefaultCommands),

    /// Walk through reservations on the simulated board
    Demo,
}

#[derive(Subcommand)]
enum BoardCommands {
    /// List all supported board models
    List,

    /// Show detailed information about a board model
    Show {
        /// Board model name (e.g., raspberry-pi, generic)
        name: String,
    },

    /// Detect the board of this machine
    Probe,
}

#[derive(Subcommand)]
enum PinCommands {
    /// Print the logical ↔ board numbering table
    Table,

    /// Convert a pin number between numbering schemes
    Convert {
        /// Pin number
        pin: Pin,

        /// Scheme of the given number (logical, board)
        #[arg(long, default_value = "board")]
        from: PinNumberingScheme,

        /// Scheme to convert to
        #[arg(long, default_value = "logical")]
        to: PinNumberingScheme,
    },
}

#[derive(Subcommand)]
enum OverlayCommands {
    /// Parse config.txt and report its pin remapping overlays
    Analyze {
        /// Path to config.txt or the boot partition containing it
        /// (default: the configured boot configuration)
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DefaultCommands {
    /// SDA/SCL of an I2C bus
    I2c {
        /// Bus id (default: the board's preferred bus)
        bus: Option<u32>,
    },

    /// MISO/MOSI/SCLK and chip select of an SPI device
    Spi {
        /// Bus id
        bus: u32,

        /// Chip select line (-1 for none)
        #[arg(default_value = "0", allow_hyphen_values = true)]
        chip_select: i32,
    },

    /// Output pin of a PWM channel
    Pwm {
        /// PWM chip
        chip: u32,

        /// Channel on the chip
        channel: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = load_config(cli.config.as_deref())?;
    let board = cli.board.as_deref();

    match cli.command {
        Commands::Boards(cmd) => handle_boards(cmd, config),
        Commands::Pins(cmd) => handle_pins(cmd, open_board(board, config)?),
        Commands::Overlay(cmd) => handle_overlay(cmd, board, &config),
        Commands::Defaults(cmd) => handle_defaults(cmd, open_board(board, config)?),
        Commands::Demo => run_demo(),
    }
}

fn load_config(path: Option<&Path>) -> Result<BoardConfig> {
    match path {
        Some(path) => BoardConfig::load(path)
            .with_context(|| format!("Failed to load board configuration {}", path.display())),
        None => Ok(BoardConfig::default()),
    }
}

/// Named model, or whatever this machine probes as
fn open_board(name: Option<&str>, config: BoardConfig) -> Result<Board> {
    match name {
        Some(name) => {
            let model = create_model(name, &config).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown board model: {}. Use 'board-arbiter boards list' to see available models.",
                    name
                )
            })?;
            Ok(Board::with_config(model, config))
        }
        None => Ok(Board::create_with_config(config)),
    }
}

fn handle_boards(cmd: BoardCommands, config: BoardConfig) -> Result<()> {
    match cmd {
        BoardCommands::List => {
            println!("{}", "=".repeat(60));
            println!("{}", "Supported Board Models".cyan().bold());
            println!("{}", "=".repeat(60));

            for name in model_names() {
                if let Some(model) = create_model(name, &config) {
                    println!("\n  {}: {}", name.white().bold(), model.description());
                    println!("    GPIOs: {}", model.translator().pin_count());
                    println!("    Default I2C bus: {}", model.default_i2c_bus_id());
                }
            }

            println!("\n{}", "=".repeat(60));
            println!(
                "Use {} to see detailed model information",
                "board-arbiter boards show <name>".cyan()
            );
        }

        BoardCommands::Show { name } => {
            let model = create_model(&name, &config).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown board model: {}. Use 'board-arbiter boards list' to see available models.",
                    name
                )
            })?;
            print_board_model(model.as_ref());
        }

        BoardCommands::Probe => {
            let board = Board::create_with_config(config);
            println!(
                "{} Detected: {}",
                "[OK]".green().bold(),
                board.model().description().white()
            );
            println!("  Numbering: {}", board.default_numbering_scheme());
            let overlay = board.overlay_config();
            if overlay.path.is_empty() {
                println!("  Boot configuration: {}", "none".dimmed());
            } else {
                println!(
                    "  Boot configuration: {} ({} overlay directive(s))",
                    overlay.path,
                    overlay.directives.len()
                );
            }
        }
    }

    Ok(())
}

fn format_pins(pins: &[Pin]) -> String {
    pins.iter()
        .map(|p| if *p == UNASSIGNED_PIN { "-".to_string() } else { p.to_string() })
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_board_model(model: &dyn BoardModel) {
    println!("{}", "=".repeat(70));
    println!("{}", format!("Board Model: {}", model.name()).cyan().bold());
    println!("{}", "=".repeat(70));

    println!("\n{}", "Basic Information:".white().bold());
    println!("  Description: {}", model.description());
    println!("  GPIOs: {}", model.translator().pin_count());
    println!("  Boot overlays: {}", if model.uses_boot_overlays() { "yes" } else { "no" });

    println!("\n{}", "Default I2C buses (logical pins):".white().bold());
    let mut any = false;
    for bus in 0..8 {
        if let Ok([sda, scl]) = model.default_pins_for_i2c(bus) {
            let marker = if bus == model.default_i2c_bus_id() { " (default)" } else { "" };
            println!("  i2c-{}: SDA {}, SCL {}{}", bus, sda, scl, marker.dimmed());
            any = true;
        }
    }
    if !any {
        println!("  {}", "none, explicit pins required".dimmed());
    }

    println!("\n{}", "Default SPI buses (logical pins):".white().bold());
    any = false;
    for bus in 0..8 {
        let Ok(lines) = model.default_pins_for_spi(&SpiConnectionSettings::new(bus, -1)) else {
            continue;
        };
        let chip_selects: Vec<String> = (0..3)
            .filter_map(|cs| model.default_pins_for_spi(&SpiConnectionSettings::new(bus, cs)).ok())
            .filter_map(|pins| pins.get(3).copied())
            .map(|pin| pin.to_string())
            .collect();
        println!(
            "  spi{}: MISO/MOSI/SCLK [{}], CE [{}]",
            bus,
            format_pins(&lines[..lines.len().min(3)]),
            chip_selects.join(", ")
        );
        any = true;
    }
    if !any {
        println!("  {}", "none, explicit pins required".dimmed());
    }

    println!("\n{}", "Default PWM channels:".white().bold());
    any = false;
    for chip in 0..2 {
        for channel in 0..2 {
            if let Ok(pin) = model.default_pin_for_pwm(chip, channel) {
                println!("  pwmchip{}/pwm{}: pin {}", chip, channel, pin);
                any = true;
            }
        }
    }
    if !any {
        println!("  {}", "none, explicit pin required".dimmed());
    }

    println!("\n{}", "=".repeat(70));
}

fn handle_pins(cmd: PinCommands, board: Board) -> Result<()> {
    match cmd {
        PinCommands::Table => {
            let model = board.model();
            println!("{}", "=".repeat(70));
            println!("{}", format!("Pin Numbering: {}", model.description()).cyan().bold());
            println!("{}", "=".repeat(70));
            println!(
                "\n  {:>7}  {:>5}  {:<6} {:<6} {:<6}",
                "Logical".white().bold(),
                "Board".white().bold(),
                "I2C".white().bold(),
                "SPI".white().bold(),
                "PWM".white().bold()
            );

            let i2c_bus = model.default_i2c_bus_id();
            for (logical, header) in model.translator().pairs() {
                let alt = |usage, bus| {
                    model
                        .alternate_mode(logical, usage, bus)
                        .map(|m| m.to_string())
                        .unwrap_or_else(|_| "-".to_string())
                };
                println!(
                    "  {:>7}  {:>5}  {:<6} {:<6} {:<6}",
                    logical,
                    header,
                    alt(PinUsage::I2c, i2c_bus),
                    alt(PinUsage::Spi, 0),
                    alt(PinUsage::Pwm, 0)
                );
            }
            println!("\n{}", "=".repeat(70));
        }

        PinCommands::Convert { pin, from, to } => {
            let converted = board
                .convert_pin_number(pin, from, to)
                .with_context(|| format!("Cannot convert {} pin {}", from, pin))?;
            println!(
                "{} {} pin {} = {} pin {}",
                "[OK]".green().bold(),
                from,
                pin,
                to,
                converted.to_string().white().bold()
            );
        }
    }

    Ok(())
}

fn handle_overlay(cmd: OverlayCommands, board: Option<&str>, config: &BoardConfig) -> Result<()> {
    match cmd {
        OverlayCommands::Analyze { path } => {
            let path = match path {
                Some(p) if p.is_dir() => p.join("config.txt"),
                Some(p) => p,
                None => config.resolve_boot_config_path().ok_or_else(|| {
                    anyhow::anyhow!("No boot configuration found. Pass the path to config.txt.")
                })?,
            };

            // Conditional sections are evaluated for the named or detected board
            let model = match board {
                Some(name) => create_model(name, config)
                    .ok_or_else(|| anyhow::anyhow!("Unknown board model: {}", name))?,
                None => probe_model(config),
            };
            let overlay = OverlayConfig::parse(&path)
                .with_context(|| format!("Failed to parse {}", path.display()))?
                .for_board(&model.config_filters());
            overlay.print_report();
        }
    }

    Ok(())
}

fn handle_defaults(cmd: DefaultCommands, board: Board) -> Result<()> {
    let scheme = board.default_numbering_scheme();
    let overlay = board.overlay_config();

    match cmd {
        DefaultCommands::I2c { bus } => {
            let bus = bus.unwrap_or(board.model().default_i2c_bus_id());
            if let Some(pins) = overlay.overlay_pin_assignment_for_i2c(bus) {
                println!("{} i2c-{} remapped by overlay: [{}] (logical)", "[*]".cyan().bold(), bus, format_pins(&pins));
            }
            let [sda, scl] = board
                .default_pin_assignment_for_i2c(bus)
                .with_context(|| format!("No default pins for I2C bus {}", bus))?;
            println!("{} i2c-{} default: SDA {}, SCL {} ({})", "[OK]".green().bold(), bus, sda, scl, scheme);
        }

        DefaultCommands::Spi { bus, chip_select } => {
            let settings = SpiConnectionSettings::new(bus, chip_select);
            if let Some(pins) = overlay.overlay_pin_assignment_for_spi(&settings)? {
                println!("{} spi{} remapped by overlay: [{}] (logical)", "[*]".cyan().bold(), bus, format_pins(&pins));
            }
            let pins = board
                .default_pin_assignment_for_spi(&settings)
                .with_context(|| format!("No default pins for SPI bus {} CE{}", bus, chip_select))?;
            println!("{} spi{} default: [{}] ({})", "[OK]".green().bold(), bus, format_pins(&pins), scheme);
        }

        DefaultCommands::Pwm { chip, channel } => {
            let remapped = if chip == 0 { overlay.overlay_pin_assignment_for_pwm(channel) } else { UNASSIGNED_PIN };
            if remapped != UNASSIGNED_PIN {
                println!("{} pwm{} remapped by overlay: pin {} (logical)", "[*]".cyan().bold(), channel, remapped);
            }
            let pin = board
                .default_pin_assignment_for_pwm(chip, channel)
                .with_context(|| format!("No default pin for PWM chip {} channel {}", chip, channel))?;
            println!("{} pwmchip{}/pwm{} default: pin {} ({})", "[OK]".green().bold(), chip, channel, pin, scheme);
        }
    }

    Ok(())
}

fn print_reservations(board: &Board) {
    let reserved = board.reserved_pins();
    if reserved.is_empty() {
        println!("  {}", "no pins reserved".dimmed());
    }
    for (pin, usage, owner) in reserved {
        println!("  pin {:>2}: {:<4} {}", pin, usage.to_string().cyan(), owner.to_string().dimmed());
    }
}

fn run_demo() -> Result<()> {
    let board = Board::new(Box::new(SimulatedBoard::new()), PinNumberingScheme::Logical);

    println!("{}", "=".repeat(70));
    println!("{}", "Reservation Demo (simulated board)".cyan().bold());
    println!("{}", "=".repeat(70));

    let mut gpio = board.create_gpio_controller()?;
    gpio.open_pin_with_mode(17, PinMode::Output)?;
    gpio.write(17, PinValue::High)?;
    println!("\n{} GPIO 17 open as output", "[OK]".green().bold());

    let mut sensor = board.create_i2c_device(I2cConnectionSettings::new(0, 0x48))?;
    let mut display = board.create_i2c_device(I2cConnectionSettings::new(0, 0x3c))?;
    println!(
        "{} Two I2C devices share bus 0 (reads {:#04x}, {:#04x})",
        "[OK]".green().bold(),
        sensor.read_byte()?,
        display.read_byte()?
    );

    let mut flash = board.create_spi_device(SpiConnectionSettings::new(0, 0))?;
    println!("{} SPI device on [{}]", "[OK]".green().bold(), format_pins(flash.pins()));

    let mut pwm = board.create_pwm_channel(0, 0, 1000, 0.5)?;
    pwm.start()?;
    println!("{} PWM channel 0 running on pin {}", "[OK]".green().bold(), pwm.pin());

    println!("\n{}", "Reserved pins:".white().bold());
    print_reservations(&board);

    match gpio.open_pin(0) {
        Ok(_) => println!("\n{} GPIO 0 opened", "[??]".yellow().bold()),
        Err(e) => println!("\n{} GPIO 0: {}", "[BLOCKED]".red().bold(), e),
    }

    sensor.dispose();
    display.dispose();
    flash.dispose()?;
    pwm.dispose()?;
    gpio.dispose();
    board.dispose();

    println!("\n{}", "After dispose:".white().bold());
    print_reservations(&board);
    for pin in [0, 2, 12, 17] {
        println!("  pin {:>2} last used for {}", pin, board.determine_current_pin_usage(pin)?);
    }

    println!("\n{}", "=".repeat(70));
    Ok(())
}
