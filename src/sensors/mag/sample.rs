use std::mem;

use crate::sensors::mag::registry;

/// Etat "nouvelle donnée" d'un axe
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Freshness {
    #[default]
    Stale,
    Fresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AxisId {
    X,
    Y,
    Z,
}

impl AxisId {
    pub const ALL: [AxisId; 3] = [AxisId::X, AxisId::Y, AxisId::Z];

    pub fn index(self) -> usize {
        match self {
            AxisId::X => 0,
            AxisId::Y => 1,
            AxisId::Z => 2,
        }
    }

    /// Bit "data available" de l'axe dans STATUS_REG
    pub fn ready_bit(self) -> u8 {
        match self {
            AxisId::X => registry::LIS3MDL_STATUS_XDA_BIT,
            AxisId::Y => registry::LIS3MDL_STATUS_YDA_BIT,
            AxisId::Z => registry::LIS3MDL_STATUS_ZDA_BIT,
        }
    }

    /// Premier registre de sortie (octet bas)
    pub fn out_reg(self) -> u8 {
        match self {
            AxisId::X => registry::LIS3MDL_OUT_X_L,
            AxisId::Y => registry::LIS3MDL_OUT_Y_L,
            AxisId::Z => registry::LIS3MDL_OUT_Z_L,
        }
    }

    pub fn is_ready(self, status: u8) -> bool {
        status & (1 << self.ready_bit()) != 0
    }
}

/// Dernière mesure connue d'un axe
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Axis {
    pub raw: i16,
    pub ut: f32,
    pub state: Freshness,
}

impl Axis {
    /// Enregistre une nouvelle valeur brute et la convertit en µT
    pub fn update(&mut self, raw: i16, scale: f32) {
        self.raw = raw;
        self.ut = raw as f32 / scale * 100.0;
        self.state = Freshness::Fresh;
    }

    /// Lis et efface l'état "nouveau"
    pub fn take(&mut self) -> bool {
        mem::replace(&mut self.state, Freshness::Stale) == Freshness::Fresh
    }
}

/// Mesure 3 axes, mise à jour sur place à chaque lecture
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    pub axes: [Axis; 3],
    pub updated: bool,
}

impl Sample {
    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.index()]
    }

    pub fn axis_mut(&mut self, id: AxisId) -> &mut Axis {
        &mut self.axes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_one_shot() {
        let mut axis = Axis::default();
        assert!(!axis.take());

        axis.update(100, 1711.0);
        assert!(axis.take());
        assert!(!axis.take());
        assert_eq!(axis.raw, 100);
    }

    #[test]
    fn full_scale_count_is_one_gauss() {
        let mut axis = Axis::default();
        axis.update(-3421, 3421.0);
        assert_eq!(axis.ut, -100.0);
    }

    #[test]
    fn status_bits_map_to_axes() {
        assert!(AxisId::X.is_ready(0b001));
        assert!(!AxisId::X.is_ready(0b110));
        assert!(AxisId::Y.is_ready(0b010));
        assert!(AxisId::Z.is_ready(0b100));
        // ZYXDA seul ne signale aucun axe
        assert!(AxisId::ALL.iter().all(|a| !a.is_ready(0b1000)));
    }
}
