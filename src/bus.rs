use anyhow::{anyhow, Context};
use std::thread;
use std::time::Duration;

/// Temps d'attente entre l'écriture d'un registre et sa relecture (ms)
pub const WRITE_SETTLE_MS: u64 = 10;

/// Transport brut vers le capteur (I2C, SPI ou simulé)
pub trait Bus {
    /// Lecture de `buffer.len()` octets à partir du registre donné
    fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> anyhow::Result<()>;

    /// Ecrit un octet dans le registre donné
    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()>;

    /// Prépare le capteur avant la première transaction (ex: verrouillage du mode SPI)
    fn wake(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Attente bloquante
    fn delay_ms(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    /// Lecture d'un seul octet
    fn read_register(&mut self, reg: u8) -> anyhow::Result<u8> {
        let mut buffer = [0u8];
        self.read_registers(reg, &mut buffer)?;
        Ok(buffer[0])
    }
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> anyhow::Result<()> {
        (**self).read_registers(reg, buffer)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()> {
        (**self).write_register(reg, value)
    }

    fn wake(&mut self) -> anyhow::Result<()> {
        (**self).wake()
    }

    fn delay_ms(&mut self, ms: u64) {
        (**self).delay_ms(ms)
    }
}

/// Ensemble de bits contigus dans un registre 8 bits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitField {
    pub reg: u8,
    pub width: u8,
    pub shift: u8,
}

impl BitField {
    pub const fn new(reg: u8, width: u8, shift: u8) -> Self {
        assert!(width >= 1 && width + shift <= 8, "champ hors du registre");
        BitField { reg, width, shift }
    }

    /// Masque non décalé (ex: 0b11 pour 2 bits)
    pub const fn mask(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }

    /// Récupére la valeur du champ dans l'octet du registre
    pub const fn extract(&self, byte: u8) -> u8 {
        (byte >> self.shift) & self.mask()
    }

    /// Remplace le champ dans l'octet du registre sans toucher aux autres bits
    pub const fn insert(&self, byte: u8, value: u8) -> u8 {
        let filtre_nettoyage = !(self.mask() << self.shift);
        (byte & filtre_nettoyage) | ((value & self.mask()) << self.shift)
    }
}

/// Accès aux champs de bits au dessus d'un transport
pub trait RegisterBits {
    fn get_field(&mut self, field: BitField) -> anyhow::Result<u8>;
    fn set_field(&mut self, field: BitField, value: u8) -> anyhow::Result<()>;
}

impl<B: Bus + ?Sized> RegisterBits for B {
    /// Lis un ensemble de bits sur une position donnée d'un registre 8 bits
    fn get_field(&mut self, field: BitField) -> anyhow::Result<u8> {
        let byte = self
            .read_register(field.reg)
            .with_context(|| format!("lecture du registre {:#04x}", field.reg))?;
        Ok(field.extract(byte))
    }

    /// Ecrit un ensemble de bits puis relis le registre pour vérifier l'écriture
    fn set_field(&mut self, field: BitField, value: u8) -> anyhow::Result<()> {
        let old = self
            .read_register(field.reg)
            .with_context(|| format!("lecture du registre {:#04x}", field.reg))?;
        let new = field.insert(old, value);

        self.write_register(field.reg, new)
            .with_context(|| format!("écriture du registre {:#04x}", field.reg))?;
        self.delay_ms(WRITE_SETTLE_MS);

        let readback = self
            .read_register(field.reg)
            .with_context(|| format!("relecture du registre {:#04x}", field.reg))?;

        if readback != new {
            return Err(anyhow!(
                "registre {:#04x}: écrit {:08b}, relu {:08b}",
                field.reg,
                new,
                readback
            ));
        }

        Ok(())
    }
}
