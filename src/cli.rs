use clap::{Parser, ValueEnum};

use crate::sensors::mag::{I2cAddr, Odr, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    I2c,
    Spi,
    Sim,
}

/// Lecture continue d'un magnétomètre LIS3MDL
#[derive(Debug, Parser, Clone)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = TransportKind::I2c)]
    pub transport: TransportKind,

    #[arg(long, default_value_t = 1)]
    pub i2c_bus: u8,

    #[arg(long, value_enum, default_value_t = I2cAddr::Primary)]
    pub address: I2cAddr,

    #[arg(long, default_value_t = 0)]
    pub spi_bus: u8,

    /// GPIO (BCM) du chip-select, hors broches CE du contrôleur SPI
    #[arg(long, default_value_t = 25)]
    pub cs_pin: u8,

    #[arg(long, value_enum)]
    pub range: Option<Range>,

    #[arg(long, value_enum)]
    pub odr: Option<Odr>,

    /// Intervalle entre deux lectures du statut (ms)
    #[arg(long)]
    pub poll_ms: Option<u64>,
}
