use anyhow::anyhow;

#[cfg(feature = "fake-sensors")]
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::bus::Bus;
use crate::sensors::mag::registry;
use crate::sensors::mag::sample::AxisId;

const REG_COUNT: usize = 0x40;

/// Registres écrivables du LIS3MDL, les autres sont en lecture seule
const WRITABLE: [u8; 8] = [
    registry::LIS3MDL_CTRL_REG1,
    registry::LIS3MDL_CTRL_REG2,
    registry::LIS3MDL_CTRL_REG3,
    registry::LIS3MDL_CTRL_REG4,
    registry::LIS3MDL_CTRL_REG5,
    registry::LIS3MDL_INT_CFG,
    registry::LIS3MDL_INT_THS_L,
    registry::LIS3MDL_INT_THS_H,
];

/// Capteur simulé : banc de registres avec les valeurs de mise sous tension
pub(crate) struct SimChip {
    regs: [u8; REG_COUNT],
    stuck: [u8; REG_COUNT],
    flipped: [u8; REG_COUNT],
    failing_reads: Vec<u8>,
    failing_writes: Vec<u8>,
    writes: Vec<(u8, u8)>,
    delays: Vec<u64>,
    wakes: usize,
    #[cfg(feature = "fake-sensors")]
    noise: Option<StdRng>,
}

impl SimChip {
    pub(crate) fn new() -> Self {
        let mut regs = [0u8; REG_COUNT];
        regs[registry::LIS3MDL_WHO_AM_I as usize] = registry::LIS3MDL_WHOAMI;
        regs[registry::LIS3MDL_CTRL_REG1 as usize] = 0x10;
        regs[registry::LIS3MDL_CTRL_REG3 as usize] = 0x03;

        SimChip {
            regs,
            stuck: [0u8; REG_COUNT],
            flipped: [0u8; REG_COUNT],
            failing_reads: Vec::new(),
            failing_writes: Vec::new(),
            writes: Vec::new(),
            delays: Vec::new(),
            wakes: 0,
            #[cfg(feature = "fake-sensors")]
            noise: None,
        }
    }

    /// Génère un champ terrestre bruité à chaque lecture du statut
    #[cfg(feature = "fake-sensors")]
    pub(crate) fn with_noise() -> Self {
        let mut chip = SimChip::new();
        chip.noise = Some(StdRng::from_entropy());
        chip
    }

    #[cfg(test)]
    pub(crate) fn register(&self, reg: u8) -> u8 {
        self.regs[reg as usize]
    }

    /// Force la valeur d'un registre (y compris en lecture seule)
    #[cfg(test)]
    pub(crate) fn set_register(&mut self, reg: u8, value: u8) {
        self.regs[reg as usize] = value;
    }

    /// Les bits du masque ignorent les écritures
    #[cfg(test)]
    pub(crate) fn stick_bits(&mut self, reg: u8, mask: u8) {
        self.stuck[reg as usize] = mask;
    }

    /// Les bits du masque sont inversés à chaque écriture
    #[cfg(test)]
    pub(crate) fn flip_bits(&mut self, reg: u8, mask: u8) {
        self.flipped[reg as usize] = mask;
    }

    /// Les lectures commençant à ce registre échouent
    #[cfg(test)]
    pub(crate) fn fail_reads(&mut self, reg: u8) {
        self.failing_reads.push(reg);
    }

    #[cfg(test)]
    pub(crate) fn fail_writes(&mut self, reg: u8) {
        self.failing_writes.push(reg);
    }

    /// Place une mesure brute sur un axe et lève son bit "data available"
    pub(crate) fn load_axis(&mut self, axis: AxisId, raw: i16) {
        let [low, high] = raw.to_le_bytes();
        let reg = axis.out_reg() as usize;
        self.regs[reg] = low;
        self.regs[reg + 1] = high;

        let status = &mut self.regs[registry::LIS3MDL_STATUS_REG as usize];
        *status |= (1 << axis.ready_bit()) | (1 << registry::LIS3MDL_STATUS_ZYXDA_BIT);
    }

    pub(crate) fn load_sample(&mut self, x: i16, y: i16, z: i16) {
        self.load_axis(AxisId::X, x);
        self.load_axis(AxisId::Y, y);
        self.load_axis(AxisId::Z, z);
    }

    #[cfg(test)]
    pub(crate) fn writes(&self) -> &[(u8, u8)] {
        &self.writes
    }

    #[cfg(test)]
    pub(crate) fn delays(&self) -> &[u64] {
        &self.delays
    }

    #[cfg(test)]
    pub(crate) fn wakes(&self) -> usize {
        self.wakes
    }

    /// Une lecture des registres de sortie efface les bits de statut associés
    fn clear_ready_bits(&mut self, start: usize, len: usize) {
        let status = &mut self.regs[registry::LIS3MDL_STATUS_REG as usize];
        for axis in AxisId::ALL {
            let reg = axis.out_reg() as usize;
            if reg >= start && reg < start + len {
                *status &= !(1 << axis.ready_bit());
            }
        }

        if *status & 0b111 == 0 {
            *status &= !(1 << registry::LIS3MDL_STATUS_ZYXDA_BIT);
        }
    }

    /// Conversion déclenchée par la lecture du statut.
    ///
    /// En mode simple la puce repasse en power-down après la mesure.
    fn convert(&mut self) {
        let ctrl3 = registry::LIS3MDL_CTRL_REG3 as usize;
        let op_mode = registry::OpMode::from_bits(registry::OP_MODE.extract(self.regs[ctrl3]));
        if op_mode == registry::OpMode::PowerDown {
            return;
        }

        #[cfg(feature = "fake-sensors")]
        {
            self.generate();
        }

        if op_mode == registry::OpMode::Single {
            self.regs[ctrl3] = registry::OP_MODE.insert(self.regs[ctrl3], registry::OpMode::PowerDown as u8);
        }
    }

    #[cfg(feature = "fake-sensors")]
    fn generate(&mut self) {
        if self.regs[registry::LIS3MDL_STATUS_REG as usize] & 0b111 != 0 {
            return;
        }

        let range = registry::FULL_SCALE.extract(self.regs[registry::LIS3MDL_CTRL_REG2 as usize]);
        let scale = registry::Range::from_bits(range).scale();

        if let Some(rng) = self.noise.as_mut() {
            // Champ terrestre typique en µT
            let field: [f32; 3] = [21.0, -4.5, 43.0];
            let counts = field.map(|ut| ((ut + rng.gen_range(-0.5..0.5)) * scale / 100.0) as i16);
            self.load_sample(counts[0], counts[1], counts[2]);
        }
    }
}

impl Bus for SimChip {
    fn read_registers(&mut self, reg: u8, buffer: &mut [u8]) -> anyhow::Result<()> {
        if self.failing_reads.contains(&reg) {
            return Err(anyhow!("[SIM] NACK en lecture ({:#04x})", reg));
        }

        let start = reg as usize;
        let end = start + buffer.len();
        if end > REG_COUNT {
            return Err(anyhow!("[SIM] Registre hors plage ({:#04x})", reg));
        }

        if reg == registry::LIS3MDL_STATUS_REG {
            self.convert();
        }

        buffer.copy_from_slice(&self.regs[start..end]);
        self.clear_ready_bits(start, buffer.len());
        Ok(())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> anyhow::Result<()> {
        if self.failing_writes.contains(&reg) || reg as usize >= REG_COUNT {
            return Err(anyhow!("[SIM] NACK en écriture ({:#04x})", reg));
        }

        self.writes.push((reg, value));

        if WRITABLE.contains(&reg) {
            let stuck = self.stuck[reg as usize];
            let old = self.regs[reg as usize];
            self.regs[reg as usize] = ((old & stuck) | (value & !stuck)) ^ self.flipped[reg as usize];
        }

        Ok(())
    }

    fn wake(&mut self) -> anyhow::Result<()> {
        self.wakes += 1;
        Ok(())
    }

    fn delay_ms(&mut self, ms: u64) {
        self.delays.push(ms);
    }
}
