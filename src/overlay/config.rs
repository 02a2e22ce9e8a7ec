//! Boot configuration (config.txt) parser
//!
//! Reads the firmware configuration file line by line and collects the
//! `dtoverlay=` directives that move I2C, SPI or PWM functions to other pins.
//! Parsing never fails on content: lines that cannot be interpreted are kept
//! as issues and skipped.
//!
//! Directives inside a conditional section (`[pi4]`, `[cm4]`, ...) only take
//! effect once the config is bound to a board whose filters include that
//! section. Other filter kinds (`[EDID=...]`, `[gpio4=1]`, ...) never match.

use super::directive::{OverlayDirective, OverlayFunction};
use crate::bus::SpiConnectionSettings;
use crate::error::{BoardError, Result};
use crate::pins::{Pin, UNASSIGNED_PIN};
use colored::Colorize;
use std::fs;
use std::path::Path;

/// Parsed `key=value` line
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub line_number: usize,
    pub condition: Option<String>,
}

/// Problem found while parsing
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub line: usize,
    pub severity: ConfigSeverity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSeverity {
    Warning,
    Info,
}

/// Overlay directives of a boot configuration
#[derive(Debug, Default)]
pub struct OverlayConfig {
    pub path: String,
    pub entries: Vec<ConfigEntry>,
    pub filters: Vec<String>,
    pub directives: Vec<OverlayDirective>,
    pub issues: Vec<ConfigIssue>,
    /// Conditional sections the board matches, lowercase
    pub board_filters: Vec<String>,
}

impl OverlayConfig {
    /// Configuration without any directive
    pub fn empty() -> Self {
        Self::default()
    }

    /// Evaluate conditional sections against `filters` (e.g. `["pi4", "pi400"]`)
    pub fn for_board(mut self, filters: &[&str]) -> Self {
        self.board_filters = filters.iter().map(|f| f.to_lowercase()).collect();
        self
    }

    /// Whether `directive` takes effect on the bound board
    pub fn applies(&self, directive: &OverlayDirective) -> bool {
        match directive.condition {
            None => true,
            Some(ref condition) => {
                let condition = condition.to_lowercase();
                self.board_filters.iter().any(|f| *f == condition)
            }
        }
    }

    /// Parse config.txt from a file path
    pub fn parse(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BoardError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", path.display(), e),
            ))
        })?;

        Ok(Self::parse_content(&content, path.to_string_lossy().to_string()))
    }

    /// Parse config.txt content
    pub fn parse_content(content: &str, path: impl Into<String>) -> Self {
        let mut config = Self {
            path: path.into(),
            ..Self::default()
        };

        let mut current_filter: Option<String> = None;

        for (line_num, line) in content.lines().enumerate() {
            let line_number = line_num + 1;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            // Conditional sections [filter]
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let filter = &trimmed[1..trimmed.len() - 1];

                if filter == "all" {
                    current_filter = None;
                } else {
                    current_filter = Some(filter.to_string());
                    if !config.filters.iter().any(|f| f == filter) {
                        config.filters.push(filter.to_string());
                    }
                }
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                if !trimmed.starts_with("include ") {
                    config.issues.push(ConfigIssue {
                        line: line_number,
                        severity: ConfigSeverity::Warning,
                        message: format!("Unrecognized line format: {}", trimmed),
                    });
                }
                continue;
            };

            let key = key.trim();
            let value = value.trim();

            if key == "dtoverlay" {
                config.add_overlay(value, line_number, current_filter.clone());
            }

            config.entries.push(ConfigEntry {
                key: key.to_string(),
                value: value.to_string(),
                line_number,
                condition: current_filter.clone(),
            });
        }

        log::debug!(
            "Parsed {}: {} overlay directive(s), {} issue(s)",
            if config.path.is_empty() { "<memory>" } else { config.path.as_str() },
            config.directives.len(),
            config.issues.len()
        );

        config
    }

    fn add_overlay(&mut self, value: &str, line_number: usize, condition: Option<String>) {
        match OverlayDirective::parse(value, line_number, condition) {
            Ok(Some(directive)) => {
                let shadowed = self.directives.iter().any(|d| {
                    d.function == directive.function
                        && d.bus_or_channel == directive.bus_or_channel
                        && d.condition == directive.condition
                });
                if shadowed {
                    self.issues.push(ConfigIssue {
                        line: line_number,
                        severity: ConfigSeverity::Info,
                        message: format!(
                            "{} overlay for {} {} ignored, an earlier line already configures it",
                            directive.name, directive.function, directive.bus_or_channel
                        ),
                    });
                }
                self.directives.push(directive);
            }
            Ok(None) => {}
            Err(message) => {
                log::warn!("config line {}: {}", line_number, message);
                self.issues.push(ConfigIssue {
                    line: line_number,
                    severity: ConfigSeverity::Warning,
                    message,
                });
            }
        }
    }

    /// First applicable directive for a function and bus (first match wins)
    pub fn find(&self, function: OverlayFunction, bus_or_channel: u32) -> Option<&OverlayDirective> {
        self.directives
            .iter()
            .filter(|d| self.applies(d))
            .find(|d| d.function == function && d.bus_or_channel == bus_or_channel)
    }

    fn is_active(&self, function: OverlayFunction) -> bool {
        self.directives
            .iter()
            .any(|d| d.function == function && self.applies(d))
    }

    pub fn is_i2c_overlay_active(&self) -> bool {
        self.is_active(OverlayFunction::I2c)
    }

    pub fn is_spi_overlay_active(&self) -> bool {
        self.is_active(OverlayFunction::Spi)
    }

    pub fn is_pwm_overlay_active(&self) -> bool {
        self.is_active(OverlayFunction::Pwm)
    }

    /// `[sda, scl]` of the overlay that configures `bus_id`
    pub fn overlay_pin_assignment_for_i2c(&self, bus_id: u32) -> Option<[Pin; 2]> {
        self.find(OverlayFunction::I2c, bus_id)
            .and_then(|d| <[Pin; 2]>::try_from(d.pins.as_slice()).ok())
    }

    /// `[miso, mosi, sclk]` (MISO is `-1` with `no_miso`), followed by the
    /// chip-select pin of the requested line when `chip_select_line >= 0`.
    ///
    /// `Ok(None)` when no overlay configures the bus.
    pub fn overlay_pin_assignment_for_spi(&self, settings: &SpiConnectionSettings) -> Result<Option<Vec<Pin>>> {
        let Some(directive) = self.find(OverlayFunction::Spi, settings.bus_id) else {
            return Ok(None);
        };

        let mut pins = directive.pins.clone();
        if settings.chip_select_line >= 0 {
            let cs = directive
                .chip_select_pins
                .get(settings.chip_select_line as usize)
                .ok_or_else(|| {
                    BoardError::UnsupportedConfiguration(format!(
                        "overlay {} (line {}) defines no chip select line {}",
                        directive.name, directive.line_number, settings.chip_select_line
                    ))
                })?;
            pins.push(*cs);
        }

        Ok(Some(pins))
    }

    /// Pin of a PWM channel, `-1` when the active overlay does not map it
    pub fn overlay_pin_assignment_for_pwm(&self, channel: u32) -> Pin {
        self.find(OverlayFunction::Pwm, 0)
            .and_then(|d| d.pins.get(channel as usize).copied())
            .unwrap_or(UNASSIGNED_PIN)
    }

    /// Print formatted overlay report
    pub fn print_report(&self) {
        println!("{}", "=".repeat(70));
        println!("{}", "Boot Configuration Overlays (config.txt)".cyan().bold());
        println!("{}", "=".repeat(70));

        println!("\n{}: {}", "File".white().bold(), self.path);

        if !self.filters.is_empty() {
            println!(
                "\n{}: {}",
                "Conditional sections".white().bold(),
                self.filters.join(", ")
            );
        }

        if !self.board_filters.is_empty() {
            println!("{}: {}", "Board matches".white().bold(), self.board_filters.join(", "));
        }

        println!("\n{}", "Active functions:".white().bold());
        let flag = |on: bool| if on { "active".green() } else { "inactive".dimmed() };
        println!("  I2C overlay: {}", flag(self.is_i2c_overlay_active()));
        println!("  SPI overlay: {}", flag(self.is_spi_overlay_active()));
        println!("  PWM overlay: {}", flag(self.is_pwm_overlay_active()));

        if !self.directives.is_empty() {
            println!("\n{}", "Pin remapping directives:".white().bold());
            for d in &self.directives {
                let condition = match d.condition {
                    Some(ref c) if self.applies(d) => format!(" [{}]", c).dimmed().to_string(),
                    Some(ref c) => format!(" [{}] (not this board)", c).dimmed().to_string(),
                    None => String::new(),
                };
                let pins = d
                    .pins
                    .iter()
                    .map(|p| if *p == UNASSIGNED_PIN { "-".to_string() } else { p.to_string() })
                    .collect::<Vec<_>>()
                    .join(", ");
                print!(
                    "  {} {} {} -> [{}]",
                    format!("line {}:", d.line_number).dimmed(),
                    d.function.to_string().cyan(),
                    d.name.white(),
                    pins
                );
                if !d.chip_select_pins.is_empty() {
                    print!(" cs {:?}", d.chip_select_pins);
                }
                println!("{}", condition);
            }
        }

        if !self.issues.is_empty() {
            println!("\n{}", "Issues:".white().bold());
            for issue in &self.issues {
                let marker = match issue.severity {
                    ConfigSeverity::Warning => "[WARNING]".yellow().bold(),
                    ConfigSeverity::Info => "[INFO]".cyan().bold(),
                };

                let line_info = if issue.line > 0 {
                    format!(" (line {})", issue.line)
                } else {
                    String::new()
                };

                println!("  {}{} {}", marker, line_info.dimmed(), issue.message);
            }
        }

        println!("\n{}", "=".repeat(70));
    }
}
