use anyhow::Context;
use log::info;
use rppal::i2c::I2c;

use crate::bus::Bus;
use crate::sensors::mag::I2cAddr;

/// Transport I2C (bus matériel du Raspberry Pi)
pub struct I2cBus {
    i2c: I2c,
    addr: I2cAddr,
}

impl I2cBus {
    pub fn new(bus: u8, addr: I2cAddr) -> anyhow::Result<Self> {
        info!("[I2C] Connexion au bus {} ({:#04x}) ...", bus, addr as u8);

        let mut i2c = I2c::with_bus(bus).with_context(|| format!("[I2C] Ouverture du bus {}", bus))?;
        i2c.set_slave_address(addr as u16)?;

        Ok(I2cBus { i2c, addr })
    }
}

impl Bus for I2cBus {
    /// Lecture de plusieurs octets à partir d'un registre 8 bits
    fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> anyhow::Result<()> {
        self.i2c
            .block_read(reg, buffer)
            .with_context(|| format!("[I2C] Lecture {:#04x} sur {:#04x}", reg, self.addr as u8))
    }

    /// Ecrit un octet sur un registre 8 bits
    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()> {
        self.i2c
            .block_write(reg, &[value])
            .with_context(|| format!("[I2C] Ecriture {:#04x} sur {:#04x}", reg, self.addr as u8))
    }
}
