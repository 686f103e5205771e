use anyhow::{anyhow, bail, Context};
use log::{debug, info};

use crate::bus::{Bus, RegisterBits};

pub mod reader;
pub mod registry;
pub mod sample;

#[cfg(any(test, feature = "fake-sensors"))]
pub(crate) mod sim;

pub use registry::{I2cAddr, Odr, OpMode, PerfMode, Range};
use sample::{AxisId, Sample};

/// Configuration active du capteur (validée par relecture)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceConfig {
    pub range: Range,
    pub odr: Odr,
    pub perf_mode: PerfMode,
    pub op_mode: OpMode,
    pub scale: f32,
}

impl Default for DeviceConfig {
    /// Valeurs de mise sous tension du LIS3MDL
    fn default() -> Self {
        DeviceConfig {
            range: Range::Range4Gs,
            odr: Odr::Odr10Hz,
            perf_mode: PerfMode::LowPower,
            op_mode: OpMode::PowerDown,
            scale: Range::Range4Gs.scale(),
        }
    }
}

/// Magnétomètre 3 axes LIS3MDL
pub struct Lis3mdl<B: Bus> {
    bus: B,
    config: DeviceConfig,
    sample: Sample,
}

impl<B: Bus> Lis3mdl<B> {
    /// Constructeur, le transport est choisi une fois pour toutes
    pub fn new(bus: B) -> Self {
        Lis3mdl {
            bus,
            config: DeviceConfig::default(),
            sample: Sample::default(),
        }
    }

    /// Rend le transport
    pub fn release(self) -> B {
        self.bus
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Vérifie l'identité puis amène le capteur en mesure continue.
    ///
    /// Les étapes sont exécutées dans l'ordre et la première erreur arrête la
    /// séquence. Les réglages déjà appliqués sur la puce ne sont pas annulés.
    pub fn begin(&mut self) -> anyhow::Result<()> {
        info!("[LIS3MDL] Initialisation ...");

        // Verrouille le mode du bus (SPI uniquement)
        self.bus.wake().context("[LIS3MDL] Réveil du bus")?;

        let who = self.whoami()?;
        if who != registry::LIS3MDL_WHOAMI {
            bail!("[LIS3MDL] Capteur inconnu (WHO_AM_I = {:#04x})", who);
        }

        info!("[LIS3MDL] Initialisation (TEMP) ...");
        self.enable_temp()?;

        info!("[LIS3MDL] Initialisation (RANGE / ODR) ...");
        self.config_range(Range::Range16Gs)?;
        self.config_odr(Odr::Odr155Hz)?;

        info!("[LIS3MDL] Initialisation (MODE) ...");
        self.set_op_mode(OpMode::Continuous)?;
        self.config.op_mode = OpMode::Continuous;
        self.enable_bdu()?;

        // Attend une première mesure
        while !self.read()? {}

        info!("[LIS3MDL] Fin d'initialisation.");
        Ok(())
    }

    /// Qui suis-je ?
    pub fn whoami(&mut self) -> anyhow::Result<u8> {
        self.bus
            .read_register(registry::LIS3MDL_WHO_AM_I)
            .context("[LIS3MDL] Lecture de WHO_AM_I")
    }

    /// Défini la fréquence de sortie (et le mode de performance associé)
    pub fn config_odr(&mut self, odr: Odr) -> anyhow::Result<()> {
        let perf_mode = odr.perf_mode();

        if let Some(mode) = perf_mode {
            self.set_perf_mode(mode)?;
            let readback = self.get_perf_mode()?;
            if readback != mode {
                bail!("[LIS3MDL] Mode de performance relu {:?}, attendu {:?}", readback, mode);
            }
        }
        let continuous = perf_mode.is_some();

        self.bus.delay_ms(registry::ODR_SETTLE_MS);

        self.bus.set_field(registry::DATA_RATE, odr as u8)?;
        let readback = self.bus.get_field(registry::DATA_RATE)?;
        if readback != odr as u8 {
            bail!("[LIS3MDL] ODR relu {:#06b}, attendu {:?}", readback, odr);
        }

        let op_mode = if continuous { OpMode::Continuous } else { OpMode::Single };
        self.set_op_mode(op_mode)?;

        self.config.odr = odr;
        self.config.op_mode = op_mode;
        if let Some(mode) = perf_mode {
            self.config.perf_mode = mode;
        }

        debug!("[LIS3MDL] ODR {:?} ({:?}, {:?})", odr, self.config.perf_mode, op_mode);
        Ok(())
    }

    pub fn odr(&self) -> Odr {
        self.config.odr
    }

    /// Défini la pleine échelle et le facteur de conversion associé
    pub fn config_range(&mut self, range: Range) -> anyhow::Result<()> {
        self.bus.set_field(registry::FULL_SCALE, range as u8)?;
        let readback = self.bus.get_field(registry::FULL_SCALE)?;
        if readback != range as u8 {
            bail!("[LIS3MDL] Pleine échelle relue {:#04b}, attendue {:?}", readback, range);
        }

        self.config.range = range;
        self.config.scale = range.scale();

        debug!("[LIS3MDL] Pleine échelle {:?} ({} LSB/G)", range, self.config.scale);
        Ok(())
    }

    /// Relance une mesure en mode simple.
    ///
    /// Après chaque conversion la puce repasse d'elle-même en power-down, le
    /// mode relu peut donc déjà différer : pas de vérification ici.
    pub fn start_conversion(&mut self) -> anyhow::Result<()> {
        let ctrl3 = self
            .bus
            .read_register(registry::LIS3MDL_CTRL_REG3)
            .context("[LIS3MDL] Lecture de CTRL_REG3")?;
        let value = registry::OP_MODE.insert(ctrl3, OpMode::Single as u8);

        self.bus
            .write_register(registry::LIS3MDL_CTRL_REG3, value)
            .context("[LIS3MDL] Déclenchement d'une mesure")
    }

    pub fn range(&self) -> Range {
        self.config.range
    }

    pub fn perf_mode(&self) -> PerfMode {
        self.config.perf_mode
    }

    pub fn op_mode(&self) -> OpMode {
        self.config.op_mode
    }

    pub fn scale(&self) -> f32 {
        self.config.scale
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Lis le statut puis les axes ayant une nouvelle donnée.
    ///
    /// Retourne `true` si au moins un axe était prêt. L'échec de lecture d'un
    /// axe est ignoré : l'axe garde sa valeur et son état précédents.
    pub fn read(&mut self) -> anyhow::Result<bool> {
        let status = self
            .bus
            .read_register(registry::LIS3MDL_STATUS_REG)
            .context("[LIS3MDL] Lecture du statut")?;

        self.sample.updated = false;

        for axis in AxisId::ALL {
            if !axis.is_ready(status) {
                continue;
            }
            self.sample.updated = true;

            let mut buffer = [0u8; 2];
            match self.bus.read_registers(axis.out_reg(), &mut buffer) {
                Ok(()) => {
                    let raw = i16::from_le_bytes(buffer);
                    self.sample.axis_mut(axis).update(raw, self.config.scale);
                }
                Err(e) => {
                    debug!("[LIS3MDL] Lecture de l'axe {:?} ignorée: {}", axis, e);
                }
            }
        }

        Ok(self.sample.updated)
    }

    /// Vrai une seule fois par nouvelle donnée en X
    pub fn new_x_data(&mut self) -> bool {
        self.sample.axis_mut(AxisId::X).take()
    }

    pub fn new_y_data(&mut self) -> bool {
        self.sample.axis_mut(AxisId::Y).take()
    }

    pub fn new_z_data(&mut self) -> bool {
        self.sample.axis_mut(AxisId::Z).take()
    }

    pub fn mag_x_ut(&self) -> f32 {
        self.sample.axis(AxisId::X).ut
    }

    pub fn mag_y_ut(&self) -> f32 {
        self.sample.axis(AxisId::Y).ut
    }

    pub fn mag_z_ut(&self) -> f32 {
        self.sample.axis(AxisId::Z).ut
    }

    pub fn mag_x_raw(&self) -> i16 {
        self.sample.axis(AxisId::X).raw
    }

    pub fn mag_y_raw(&self) -> i16 {
        self.sample.axis(AxisId::Y).raw
    }

    pub fn mag_z_raw(&self) -> i16 {
        self.sample.axis(AxisId::Z).raw
    }

    /// Vrai si le dernier `read` a trouvé au moins un axe prêt
    pub fn data_updated(&self) -> bool {
        self.sample.updated
    }

    pub fn sample(&self) -> &Sample {
        &self.sample
    }

    ///////////////////////////////////
    /// REGLAGES INTERNES
    ///////////////////////////////////

    /// Active le capteur de température
    fn enable_temp(&mut self) -> anyhow::Result<()> {
        self.bus.set_field(registry::TEMP_EN, 0x01)
    }

    /// Active le "Block Data Update"
    fn enable_bdu(&mut self) -> anyhow::Result<()> {
        self.bus.set_field(registry::BDU, 0x01)
    }

    /// Défini le mode de fonctionnement et vérifie la relecture
    fn set_op_mode(&mut self, op_mode: OpMode) -> anyhow::Result<()> {
        self.bus.set_field(registry::OP_MODE, op_mode as u8)?;
        let readback = OpMode::from_bits(self.bus.get_field(registry::OP_MODE)?);
        if readback != op_mode {
            bail!("[LIS3MDL] Mode relu {:?}, attendu {:?}", readback, op_mode);
        }
        Ok(())
    }

    /// Le mode de performance est réparti sur CTRL_REG1 (X/Y) et CTRL_REG4 (Z)
    fn set_perf_mode(&mut self, perf_mode: PerfMode) -> anyhow::Result<()> {
        self.bus.set_field(registry::PERF_MODE_XY, perf_mode as u8)?;
        self.bus.set_field(registry::PERF_MODE_Z, perf_mode as u8)?;
        Ok(())
    }

    fn get_perf_mode(&mut self) -> anyhow::Result<PerfMode> {
        let xy = self.bus.get_field(registry::PERF_MODE_XY)?;
        let z = self.bus.get_field(registry::PERF_MODE_Z)?;
        if xy != z {
            return Err(anyhow!("[LIS3MDL] Modes de performance différents (XY {:#04b}, Z {:#04b})", xy, z));
        }
        Ok(PerfMode::from_bits(xy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::mag::sim::SimChip;

    const RANGES: [Range; 4] = [Range::Range4Gs, Range::Range8Gs, Range::Range12Gs, Range::Range16Gs];

    fn chip_with_sample() -> SimChip {
        let mut chip = SimChip::new();
        chip.load_sample(1711, 0, -1711);
        chip
    }

    #[test]
    fn begin_brings_chip_to_continuous_sampling() {
        let mut mag = Lis3mdl::new(chip_with_sample());

        mag.begin().unwrap();

        assert_eq!(mag.range(), Range::Range16Gs);
        assert_eq!(mag.odr(), Odr::Odr155Hz);
        assert_eq!(mag.perf_mode(), PerfMode::UltraHigh);
        assert_eq!(mag.op_mode(), OpMode::Continuous);
        assert_eq!(mag.mag_x_ut(), 100.0);
        assert_eq!(mag.mag_z_ut(), -100.0);

        let chip = mag.release();
        assert_eq!(chip.wakes(), 1);
        // TEMP_EN | OM=11 | DO=000 FAST_ODR=1
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG1), 0xE2);
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG2), 0x60);
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG3), 0x00);
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG4), 0x0C);
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG5), 0x40);
    }

    #[test]
    fn begin_primes_the_first_sample() {
        let mut mag = Lis3mdl::new(chip_with_sample());
        mag.begin().unwrap();

        assert!(mag.data_updated());
        assert!(mag.new_x_data());
        assert!(mag.new_y_data());
        assert!(mag.new_z_data());
    }

    #[test]
    fn begin_rejects_unknown_chip_without_configuring() {
        let mut chip = chip_with_sample();
        chip.set_register(registry::LIS3MDL_WHO_AM_I, 0x33);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.begin().is_err());

        assert_eq!(*mag.config(), DeviceConfig::default());
        assert!(mag.release().writes().is_empty());
    }

    #[test]
    fn begin_fails_when_identity_cannot_be_read() {
        let mut chip = chip_with_sample();
        chip.fail_reads(registry::LIS3MDL_WHO_AM_I);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.begin().is_err());
        assert!(mag.release().writes().is_empty());
    }

    #[test]
    fn begin_stops_at_first_failing_step() {
        let mut chip = chip_with_sample();
        chip.fail_writes(registry::LIS3MDL_CTRL_REG2);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.begin().is_err());
        assert_eq!(mag.range(), Range::Range4Gs);

        let chip = mag.release();
        // Le capteur de température reste activé, rien après la pleine échelle
        assert_eq!(chip.register(registry::LIS3MDL_CTRL_REG1) & 0x80, 0x80);
        assert!(chip
            .writes()
            .iter()
            .all(|(reg, _)| *reg == registry::LIS3MDL_CTRL_REG1));
    }

    #[test]
    fn range_scale_round_trip() {
        for range in RANGES {
            let mut mag = Lis3mdl::new(SimChip::new());
            mag.config_range(range).unwrap();

            let count = range.scale() as i16;
            mag.bus_mut().load_sample(count, count, count);
            assert!(mag.read().unwrap());

            assert_eq!(mag.range(), range);
            assert_eq!(mag.mag_x_ut(), 100.0);
            assert_eq!(mag.mag_y_ut(), 100.0);
            assert_eq!(mag.mag_z_ut(), 100.0);
        }
    }

    #[test]
    fn rejected_range_keeps_previous_scale() {
        let mut chip = SimChip::new();
        chip.stick_bits(registry::LIS3MDL_CTRL_REG2, 0b0100_0000);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.config_range(Range::Range12Gs).is_err());

        assert_eq!(mag.range(), Range::Range4Gs);
        assert_eq!(mag.scale(), 6842.0);
    }

    #[test]
    fn odr_readback_for_every_rate() {
        for odr in Odr::ALL {
            let mut mag = Lis3mdl::new(SimChip::new());
            mag.config_odr(odr).unwrap();
            assert_eq!(mag.odr(), odr);

            let chip = mag.bus_mut();
            assert_eq!(chip.get_field(registry::DATA_RATE).unwrap(), odr as u8);

            let xy = chip.get_field(registry::PERF_MODE_XY).unwrap();
            let z = chip.get_field(registry::PERF_MODE_Z).unwrap();
            match odr.perf_mode() {
                Some(mode) => {
                    assert_eq!(xy, mode as u8);
                    assert_eq!(z, mode as u8);
                    assert_eq!(mag.perf_mode(), mode);
                    assert_eq!(mag.op_mode(), OpMode::Continuous);
                }
                None => {
                    assert_eq!(mag.perf_mode(), PerfMode::LowPower);
                    assert_eq!(mag.op_mode(), OpMode::Single);
                }
            }
        }
    }

    #[test]
    fn slow_rates_do_not_touch_perf_mode() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.config_odr(Odr::Odr40Hz).unwrap();

        let chip = mag.release();
        assert!(chip
            .writes()
            .iter()
            .all(|(reg, _)| *reg != registry::LIS3MDL_CTRL_REG4));
        assert!(chip.delays().contains(&registry::ODR_SETTLE_MS));
    }

    #[test]
    fn perf_mode_mismatch_aborts_odr() {
        let mut chip = SimChip::new();
        // OMZ bloqué à 00
        chip.stick_bits(registry::LIS3MDL_CTRL_REG4, 0b0000_1100);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.config_odr(Odr::Odr300Hz).is_err());

        assert_eq!(*mag.config(), DeviceConfig::default());
        // Le débit n'a pas été écrit
        assert_eq!(mag.bus_mut().get_field(registry::DATA_RATE).unwrap(), Odr::Odr10Hz as u8);
    }

    #[test]
    fn rate_readback_mismatch_keeps_previous_rate() {
        let mut chip = SimChip::new();
        // FAST_ODR bloqué à 0
        chip.stick_bits(registry::LIS3MDL_CTRL_REG1, 0b0000_0010);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.config_odr(Odr::Odr155Hz).is_err());

        assert_eq!(mag.odr(), Odr::Odr10Hz);
        assert_eq!(mag.perf_mode(), PerfMode::LowPower);
        assert_eq!(mag.op_mode(), OpMode::PowerDown);
    }

    #[test]
    fn read_without_new_status_is_idempotent() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.bus_mut().load_sample(100, -200, 300);

        assert!(mag.read().unwrap());
        let first = *mag.sample();

        assert!(!mag.read().unwrap());
        assert_eq!(mag.sample().axes, first.axes);
        assert!(!mag.data_updated());
    }

    #[test]
    fn new_data_flag_is_one_shot() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.bus_mut().load_axis(AxisId::X, 42);

        assert!(mag.read().unwrap());

        assert!(mag.new_x_data());
        assert!(!mag.new_x_data());
        assert!(!mag.new_y_data());
        assert!(!mag.new_z_data());
        assert_eq!(mag.mag_x_raw(), 42);
    }

    #[test]
    fn idle_axes_carry_over() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.bus_mut().load_sample(10, 20, 30);
        mag.read().unwrap();
        assert!(mag.new_x_data());

        mag.bus_mut().load_axis(AxisId::Y, 50);
        assert!(mag.read().unwrap());

        assert_eq!(mag.mag_x_raw(), 10);
        assert!(!mag.new_x_data());
        assert_eq!(mag.mag_y_raw(), 50);
        assert!(mag.new_y_data());
        assert_eq!(mag.mag_z_raw(), 30);
        assert!(mag.new_z_data());
    }

    #[test]
    fn failed_axis_read_is_swallowed() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.bus_mut().load_sample(100, 200, 300);
        mag.bus_mut().fail_reads(registry::LIS3MDL_OUT_Y_L);

        assert!(mag.read().unwrap());

        assert_eq!(mag.mag_x_raw(), 100);
        assert_eq!(mag.mag_y_raw(), 0);
        assert!(!mag.new_y_data());
        assert_eq!(mag.mag_z_raw(), 300);
    }

    #[test]
    fn status_failure_is_reported() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.bus_mut().load_sample(1, 2, 3);
        mag.bus_mut().fail_reads(registry::LIS3MDL_STATUS_REG);

        assert!(mag.read().is_err());
        assert_eq!(*mag.sample(), Sample::default());
    }

    #[test]
    fn single_mode_needs_a_new_trigger_per_sample() {
        let mut mag = Lis3mdl::new(SimChip::new());
        mag.config_odr(Odr::Odr10Hz).unwrap();
        assert_eq!(mag.op_mode(), OpMode::Single);

        mag.bus_mut().load_sample(1, 2, 3);
        assert!(mag.read().unwrap());
        assert_eq!(mag.bus_mut().register(registry::LIS3MDL_CTRL_REG3), 0x03);

        mag.start_conversion().unwrap();

        assert_eq!(mag.bus_mut().register(registry::LIS3MDL_CTRL_REG3), 0x01);
        assert_eq!(mag.op_mode(), OpMode::Single);
    }

    #[test]
    fn start_conversion_reports_bus_error() {
        let mut chip = SimChip::new();
        chip.fail_writes(registry::LIS3MDL_CTRL_REG3);
        let mut mag = Lis3mdl::new(chip);

        assert!(mag.start_conversion().is_err());
    }

    #[test]
    fn bring_up_then_narrow_range() {
        let mut mag = Lis3mdl::new(chip_with_sample());
        mag.begin().unwrap();

        mag.config_range(Range::Range16Gs).unwrap();
        mag.bus_mut().load_axis(AxisId::X, 1711);

        assert!(mag.read().unwrap());
        assert_eq!(mag.mag_x_ut(), 100.0);
    }
}
