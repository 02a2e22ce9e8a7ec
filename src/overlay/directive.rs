//! Interpretation of individual `dtoverlay=` lines
//!
//! Only the overlays that move I2C, SPI or PWM functions to other pins are
//! understood; everything else (`disable-bt`, `vc4-kms-v3d`, ...) is ignored.
//! All pins here are logical (BCM) numbers.

use crate::pins::{Pin, UNASSIGNED_PIN};
use std::fmt;

/// Function remapped by an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayFunction {
    I2c,
    Spi,
    Pwm,
}

impl fmt::Display for OverlayFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayFunction::I2c => write!(f, "I2C"),
            OverlayFunction::Spi => write!(f, "SPI"),
            OverlayFunction::Pwm => write!(f, "PWM"),
        }
    }
}

/// One recognized overlay directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDirective {
    pub function: OverlayFunction,
    /// Overlay name as written (e.g. `spi0-2cs`)
    pub name: String,
    /// Bus id for I2C/SPI, chip for PWM
    pub bus_or_channel: u32,
    /// I2C: `[sda, scl]`. SPI: `[miso, mosi, sclk]` with `-1` for a disabled MISO.
    /// PWM: one pin per channel, `-1` when the channel is not mapped.
    pub pins: Vec<Pin>,
    /// SPI only: chip-select pin per line
    pub chip_select_pins: Vec<Pin>,
    pub line_number: usize,
    /// Conditional section (`[pi4]`, ...) the line appeared in
    pub condition: Option<String>,
}

/// Default SDA/SCL of the `i2cN` overlays
const I2C_DEFAULT_PINS: &[(u32, [Pin; 2])] = &[
    (0, [0, 1]),
    (1, [2, 3]),
    (3, [4, 5]),
    (4, [6, 7]),
    (5, [10, 11]),
    (6, [22, 23]),
];

/// Default lines of the `spiN-Mcs` overlays: (bus, [miso, mosi, sclk], chip selects)
const SPI_DEFAULT_PINS: &[(u32, [Pin; 3], &[Pin])] = &[
    (0, [9, 10, 11], &[8, 7]),
    (1, [19, 20, 21], &[18, 17, 16]),
    (2, [40, 41, 42], &[43, 44, 45]),
    (3, [1, 2, 3], &[0, 24]),
    (4, [5, 6, 7], &[4, 25]),
    (5, [13, 14, 15], &[12, 26]),
    (6, [19, 20, 21], &[18, 27]),
];

const I2C_GPIO_DEFAULT_BUS: u32 = 3;
const I2C_GPIO_DEFAULT_SDA: Pin = 23;
const I2C_GPIO_DEFAULT_SCL: Pin = 24;
const PWM_DEFAULT_PIN: Pin = 18;

/// Parameters of an overlay line in line order: `key=value` pairs and bare
/// flags. A repeated key resolves to its first occurrence.
struct Params<'a> {
    values: Vec<(&'a str, &'a str)>,
}

impl<'a> Params<'a> {
    fn parse(parts: impl Iterator<Item = &'a str>) -> Self {
        let values = parts
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (p, ""),
            })
            .collect();
        Self { values }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.values.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn pin(&self, key: &str) -> Result<Option<Pin>, String> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => parse_pin(v)
                .map(Some)
                .ok_or_else(|| format!("invalid pin number '{}' for parameter {}", v, key)),
        }
    }

    /// First `pins_A_B` style parameter
    fn pin_pair(&self) -> Result<Option<[Pin; 2]>, String> {
        let Some(key) = self
            .values
            .iter()
            .map(|(k, _)| *k)
            .find(|k| k.starts_with("pins_"))
        else {
            return Ok(None);
        };
        let mut numbers = key["pins_".len()..].split('_').map(parse_pin);
        match (numbers.next(), numbers.next(), numbers.next()) {
            (Some(Some(a)), Some(Some(b)), None) => Ok(Some([a, b])),
            _ => Err(format!("malformed pin pair parameter '{}'", key)),
        }
    }
}

fn parse_pin(s: &str) -> Option<Pin> {
    s.trim().parse::<Pin>().ok().filter(|p| *p >= 0)
}

impl OverlayDirective {
    /// Interpret the value of a `dtoverlay=` line.
    ///
    /// Returns `Ok(None)` for overlays that do not remap I2C/SPI/PWM pins and
    /// `Err` with a message for recognized overlays with unusable parameters.
    pub fn parse(value: &str, line_number: usize, condition: Option<String>) -> Result<Option<Self>, String> {
        let mut parts = value.split(',');
        let name = parts.next().unwrap_or_default().trim();
        let params = Params::parse(parts);

        let parsed = if name == "i2c-gpio" {
            Some(Self::parse_i2c_gpio(&params)?)
        } else if let Some(bus) = i2c_bus_from_name(name) {
            Some(Self::parse_i2c(name, bus, &params)?)
        } else if let Some((bus, lines)) = spi_from_name(name) {
            Some(Self::parse_spi(name, bus, lines, &params)?)
        } else if name == "pwm" || name == "pwm-2chan" {
            Some(Self::parse_pwm(name, &params)?)
        } else {
            None
        };

        Ok(parsed.map(|(function, bus_or_channel, pins, chip_select_pins)| Self {
            function,
            name: name.to_string(),
            bus_or_channel,
            pins,
            chip_select_pins,
            line_number,
            condition,
        }))
    }

    fn parse_i2c(name: &str, bus: u32, params: &Params) -> Result<Parsed, String> {
        let pins = match params.pin_pair()? {
            Some(pair) => pair,
            None => I2C_DEFAULT_PINS
                .iter()
                .find(|(b, _)| *b == bus)
                .map(|(_, pins)| *pins)
                .ok_or_else(|| format!("{} has no default pins, add a pins_<sda>_<scl> parameter", name))?,
        };
        Ok((OverlayFunction::I2c, bus, pins.to_vec(), Vec::new()))
    }

    fn parse_i2c_gpio(params: &Params) -> Result<Parsed, String> {
        let bus = match params.get("bus") {
            Some(v) => v
                .parse::<u32>()
                .map_err(|_| format!("invalid bus number '{}' for i2c-gpio", v))?,
            None => I2C_GPIO_DEFAULT_BUS,
        };
        let sda = params.pin("i2c_gpio_sda")?.unwrap_or(I2C_GPIO_DEFAULT_SDA);
        let scl = params.pin("i2c_gpio_scl")?.unwrap_or(I2C_GPIO_DEFAULT_SCL);
        Ok((OverlayFunction::I2c, bus, vec![sda, scl], Vec::new()))
    }

    fn parse_spi(name: &str, bus: u32, lines: usize, params: &Params) -> Result<Parsed, String> {
        let (_, defaults, default_cs) = SPI_DEFAULT_PINS
            .iter()
            .find(|(b, _, _)| *b == bus)
            .ok_or_else(|| format!("unknown SPI bus in overlay {}", name))?;

        let mut pins = defaults.to_vec();
        if params.has("no_miso") {
            pins[0] = UNASSIGNED_PIN;
        }

        let mut chip_select_pins = Vec::with_capacity(lines);
        for line in 0..lines {
            let pin = match params.pin(&format!("cs{}_pin", line))? {
                Some(pin) => pin,
                None => *default_cs
                    .get(line)
                    .ok_or_else(|| format!("{} has no default pin for chip select {}", name, line))?,
            };
            chip_select_pins.push(pin);
        }

        Ok((OverlayFunction::Spi, bus, pins, chip_select_pins))
    }

    fn parse_pwm(name: &str, params: &Params) -> Result<Parsed, String> {
        let channel0 = params.pin("pin")?.unwrap_or(PWM_DEFAULT_PIN);
        let mut pins = vec![channel0];
        if name == "pwm-2chan" {
            pins.push(params.pin("pin2")?.unwrap_or(UNASSIGNED_PIN));
        }
        Ok((OverlayFunction::Pwm, 0, pins, Vec::new()))
    }
}

type Parsed = (OverlayFunction, u32, Vec<Pin>, Vec<Pin>);

/// `i2c3` or `i2c3-pi5` → 3
fn i2c_bus_from_name(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("i2c")?;
    let digits = rest.strip_suffix("-pi5").unwrap_or(rest);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `spi2-2cs` → (2, 2)
fn spi_from_name(name: &str) -> Option<(u32, usize)> {
    let rest = name.strip_prefix("spi")?;
    let (bus, lines) = rest.split_once('-')?;
    let lines = lines.strip_suffix("cs")?;
    Some((bus.parse().ok()?, lines.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> OverlayDirective {
        OverlayDirective::parse(value, 1, None).unwrap().unwrap()
    }

    #[test]
    fn test_i2c_with_pins() {
        let d = parse("i2c3,pins_2_3");
        assert_eq!(d.function, OverlayFunction::I2c);
        assert_eq!(d.bus_or_channel, 3);
        assert_eq!(d.pins, vec![2, 3]);
    }

    #[test]
    fn test_first_pin_pair_wins() {
        assert_eq!(parse("i2c3,pins_4_5,pins_2_3").pins, vec![4, 5]);
        assert_eq!(parse("i2c-gpio,bus=5,bus=6").bus_or_channel, 5);
    }

    #[test]
    fn test_i2c_defaults() {
        assert_eq!(parse("i2c6").pins, vec![22, 23]);
        assert_eq!(parse("i2c4-pi5").bus_or_channel, 4);
        assert!(OverlayDirective::parse("i2c2", 1, None).is_err());
        assert!(OverlayDirective::parse("i2c3,pins_x_3", 1, None).is_err());
    }

    #[test]
    fn test_i2c_gpio() {
        let d = parse("i2c-gpio,bus=7,i2c_gpio_sda=17,i2c_gpio_scl=27");
        assert_eq!(d.bus_or_channel, 7);
        assert_eq!(d.pins, vec![17, 27]);
        assert_eq!(parse("i2c-gpio").pins, vec![23, 24]);
    }

    #[test]
    fn test_spi_lines() {
        let d = parse("spi0-0cs,no_miso");
        assert_eq!(d.pins, vec![-1, 10, 11]);
        assert!(d.chip_select_pins.is_empty());

        let d = parse("spi2-2cs,cs0_pin=27,cs1_pin=22");
        assert_eq!(d.bus_or_channel, 2);
        assert_eq!(d.chip_select_pins, vec![27, 22]);

        let d = parse("spi1-3cs");
        assert_eq!(d.chip_select_pins, vec![18, 17, 16]);
        assert!(OverlayDirective::parse("spi0-3cs", 1, None).is_err());
    }

    #[test]
    fn test_pwm() {
        assert_eq!(parse("pwm,pin=12,func=4").pins, vec![12]);
        assert_eq!(parse("pwm-2chan,pin=12,func=4").pins, vec![12, -1]);
        assert_eq!(parse("pwm-2chan,pin=12,pin2=13").pins, vec![12, 13]);
    }

    #[test]
    fn test_unrelated_overlay() {
        assert_eq!(OverlayDirective::parse("disable-bt", 1, None).unwrap(), None);
        assert_eq!(OverlayDirective::parse("i2c-rtc,ds3231", 1, None).unwrap(), None);
        assert_eq!(OverlayDirective::parse("spi-gpio40-45", 1, None).unwrap(), None);
    }
}
