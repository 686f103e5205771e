use serde::{Deserialize, Serialize};

use crate::cli::{Cli, TransportKind};
use crate::sensors::mag::{I2cAddr, Odr, Range};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Transport {
    I2c { bus: u8, address: I2cAddr },
    Spi { bus: u8, cs_pin: u8 },
    Simulated,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub(crate) transport: Transport,
    pub(crate) range: Range,
    pub(crate) odr: Odr,
    pub(crate) poll_interval_ms: u64,
}

impl Config {
    pub fn new() -> Self {
        let config = Config {
            transport: Transport::I2c {
                bus: 1,
                address: I2cAddr::Primary,
            },
            range: Range::Range16Gs,
            odr: Odr::Odr155Hz,
            poll_interval_ms: 5,
        };

        config
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        let defaults = Config::new();

        let transport = match cli.transport {
            TransportKind::I2c => Transport::I2c {
                bus: cli.i2c_bus,
                address: cli.address,
            },
            TransportKind::Spi => Transport::Spi {
                bus: cli.spi_bus,
                cs_pin: cli.cs_pin,
            },
            TransportKind::Sim => Transport::Simulated,
        };

        Config {
            transport,
            range: cli.range.unwrap_or(defaults.range),
            odr: cli.odr.unwrap_or(defaults.odr),
            poll_interval_ms: cli.poll_ms.unwrap_or(defaults.poll_interval_ms),
        }
    }
}
