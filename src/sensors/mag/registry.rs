#![allow(unused)]

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::bus::BitField;

// LIS3MDL
pub const LIS3MDL_WHOAMI: u8 = 0x3D;

pub const LIS3MDL_WHO_AM_I: u8 = 0x0F;
pub const LIS3MDL_CTRL_REG1: u8 = 0x20;
pub const LIS3MDL_CTRL_REG2: u8 = 0x21;
pub const LIS3MDL_CTRL_REG3: u8 = 0x22;
pub const LIS3MDL_CTRL_REG4: u8 = 0x23;
pub const LIS3MDL_CTRL_REG5: u8 = 0x24;
pub const LIS3MDL_STATUS_REG: u8 = 0x27;
pub const LIS3MDL_OUT_X_L: u8 = 0x28;
pub const LIS3MDL_OUT_X_H: u8 = 0x29;
pub const LIS3MDL_OUT_Y_L: u8 = 0x2A;
pub const LIS3MDL_OUT_Y_H: u8 = 0x2B;
pub const LIS3MDL_OUT_Z_L: u8 = 0x2C;
pub const LIS3MDL_OUT_Z_H: u8 = 0x2D;
pub const LIS3MDL_TEMP_OUT_L: u8 = 0x2E;
pub const LIS3MDL_TEMP_OUT_H: u8 = 0x2F;
pub const LIS3MDL_INT_CFG: u8 = 0x30;
pub const LIS3MDL_INT_SRC: u8 = 0x31;
pub const LIS3MDL_INT_THS_L: u8 = 0x32;
pub const LIS3MDL_INT_THS_H: u8 = 0x33;

// Bits du registre de statut
pub const LIS3MDL_STATUS_XDA_BIT: u8 = 0;
pub const LIS3MDL_STATUS_YDA_BIT: u8 = 1;
pub const LIS3MDL_STATUS_ZDA_BIT: u8 = 2;
pub const LIS3MDL_STATUS_ZYXDA_BIT: u8 = 3;

// Champs de configuration
pub const TEMP_EN: BitField = BitField::new(LIS3MDL_CTRL_REG1, 1, 7);
pub const PERF_MODE_XY: BitField = BitField::new(LIS3MDL_CTRL_REG1, 2, 5);
pub const DATA_RATE: BitField = BitField::new(LIS3MDL_CTRL_REG1, 4, 1);
pub const FULL_SCALE: BitField = BitField::new(LIS3MDL_CTRL_REG2, 2, 5);
pub const OP_MODE: BitField = BitField::new(LIS3MDL_CTRL_REG3, 2, 0);
pub const PERF_MODE_Z: BitField = BitField::new(LIS3MDL_CTRL_REG4, 2, 2);
pub const BDU: BitField = BitField::new(LIS3MDL_CTRL_REG5, 1, 6);

// Temps d'attente après un changement de mode de performance (ms)
pub const ODR_SETTLE_MS: u64 = 50;

// SPI
pub const SPI_CLOCK: u32 = 7_000_000;
pub const SPI_READ: u8 = 0x80;
pub const SPI_MS: u8 = 0x40;

/// Adresse I2C (broche SDO/SA1)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[repr(u8)]
pub enum I2cAddr {
    Primary = 0x1C,
    Secondary = 0x1E,
}

/// Pleine échelle de mesure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[repr(u8)]
pub enum Range {
    #[value(name = "4gs")]
    Range4Gs = 0b00,
    #[value(name = "8gs")]
    Range8Gs = 0b01,
    #[value(name = "12gs")]
    Range12Gs = 0b10,
    #[value(name = "16gs")]
    Range16Gs = 0b11,
}

impl Range {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Range::Range4Gs,
            0b01 => Range::Range8Gs,
            0b10 => Range::Range12Gs,
            _ => Range::Range16Gs,
        }
    }

    /// Sensibilité (LSB/gauss) de la pleine échelle
    pub fn scale(self) -> f32 {
        match self {
            Range::Range4Gs => 6842.0,
            Range::Range8Gs => 3421.0,
            Range::Range12Gs => 2281.0,
            Range::Range16Gs => 1711.0,
        }
    }
}

/// Fréquence de sortie des données (DO[2:0] + FAST_ODR)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[repr(u8)]
pub enum Odr {
    #[value(name = "0.625hz")]
    Odr0_625Hz = 0b0000,
    #[value(name = "1.25hz")]
    Odr1_25Hz = 0b0010,
    #[value(name = "2.5hz")]
    Odr2_5Hz = 0b0100,
    #[value(name = "5hz")]
    Odr5Hz = 0b0110,
    #[value(name = "10hz")]
    Odr10Hz = 0b1000,
    #[value(name = "20hz")]
    Odr20Hz = 0b1010,
    #[value(name = "40hz")]
    Odr40Hz = 0b1100,
    #[value(name = "80hz")]
    Odr80Hz = 0b1110,
    #[value(name = "155hz")]
    Odr155Hz = 0b0001,
    #[value(name = "300hz")]
    Odr300Hz = 0b0011,
    #[value(name = "560hz")]
    Odr560Hz = 0b0101,
    #[value(name = "1000hz")]
    Odr1000Hz = 0b0111,
}

impl Odr {
    pub const ALL: [Odr; 12] = [
        Odr::Odr0_625Hz,
        Odr::Odr1_25Hz,
        Odr::Odr2_5Hz,
        Odr::Odr5Hz,
        Odr::Odr10Hz,
        Odr::Odr20Hz,
        Odr::Odr40Hz,
        Odr::Odr80Hz,
        Odr::Odr155Hz,
        Odr::Odr300Hz,
        Odr::Odr560Hz,
        Odr::Odr1000Hz,
    ];

    pub fn from_bits(bits: u8) -> Option<Self> {
        Odr::ALL.into_iter().find(|odr| *odr as u8 == bits & 0b1111)
    }

    /// Les fréquences FAST_ODR imposent un mode de performance
    pub fn perf_mode(self) -> Option<PerfMode> {
        match self {
            Odr::Odr155Hz => Some(PerfMode::UltraHigh),
            Odr::Odr300Hz => Some(PerfMode::High),
            Odr::Odr560Hz => Some(PerfMode::MediumPower),
            Odr::Odr1000Hz => Some(PerfMode::LowPower),
            _ => None,
        }
    }
}

/// Mode de performance (OM en CTRL_REG1, OMZ en CTRL_REG4)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PerfMode {
    LowPower = 0b00,
    MediumPower = 0b01,
    High = 0b10,
    UltraHigh = 0b11,
}

impl PerfMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => PerfMode::LowPower,
            0b01 => PerfMode::MediumPower,
            0b10 => PerfMode::High,
            _ => PerfMode::UltraHigh,
        }
    }
}

/// Mode de fonctionnement (MD en CTRL_REG3)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpMode {
    Continuous = 0b00,
    Single = 0b01,
    PowerDown = 0b11,
}

impl OpMode {
    /// 0b10 est aussi un mode "power-down" d'après la datasheet
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => OpMode::Continuous,
            0b01 => OpMode::Single,
            _ => OpMode::PowerDown,
        }
    }
}
