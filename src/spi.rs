use anyhow::{anyhow, Context};
use log::info;
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus as SpiId, Mode, SlaveSelect, Spi};

use crate::bus::Bus;
use crate::sensors::mag::registry;

/// Octet d'adresse pour une lecture (bit lecture + auto-incrément)
pub(crate) fn read_command(reg: u8) -> u8 {
    reg | registry::SPI_READ | registry::SPI_MS
}

/// Transport SPI avec chip-select piloté en GPIO
pub struct SpiBus {
    spi: Spi,
    cs: OutputPin,
}

impl SpiBus {
    pub fn new(bus: u8, cs_pin: u8) -> anyhow::Result<Self> {
        info!("[SPI] Connexion au bus {} (CS GPIO {}) ...", bus, cs_pin);

        let id = match bus {
            0 => SpiId::Spi0,
            1 => SpiId::Spi1,
            2 => SpiId::Spi2,
            _ => return Err(anyhow!("[SPI] Bus inconnu: {}", bus)),
        };

        let spi = Spi::new(id, SlaveSelect::Ss0, registry::SPI_CLOCK, Mode::Mode0)
            .with_context(|| format!("[SPI] Ouverture du bus {}", bus))?;
        let mut cs = Gpio::new()?.get(cs_pin)?.into_output();
        cs.set_high();

        Ok(SpiBus { spi, cs })
    }
}

impl Bus for SpiBus {
    fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> anyhow::Result<()> {
        let mut tx = vec![0u8; buffer.len() + 1];
        let mut rx = vec![0u8; buffer.len() + 1];
        tx[0] = read_command(reg);

        self.cs.set_low();
        let result = self.spi.transfer(&mut rx, &tx);
        self.cs.set_high();

        result.with_context(|| format!("[SPI] Lecture {:#04x}", reg))?;
        buffer.copy_from_slice(&rx[1..]);
        Ok(())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()> {
        self.cs.set_low();
        let result = self.spi.write(&[reg, value]);
        self.cs.set_high();

        result.with_context(|| format!("[SPI] Ecriture {:#04x}", reg))?;
        Ok(())
    }

    /// Impulsion sur le CS pour verrouiller le capteur en mode SPI
    fn wake(&mut self) -> anyhow::Result<()> {
        self.cs.set_low();
        self.delay_ms(1);
        self.cs.set_high();
        self.delay_ms(1);
        Ok(())
    }
}
