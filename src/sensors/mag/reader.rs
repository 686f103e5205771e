use std::fmt;
use std::pin::Pin;
use std::task::Poll;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use futures::Stream;
use log::{info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::bus::Bus;
use crate::config::{Config, Transport};
use crate::sensors::mag::{Lis3mdl, OpMode};

#[cfg(feature = "real-sensors")]
use crate::{i2c::I2cBus, spi::SpiBus};

#[cfg(feature = "fake-sensors")]
use crate::sensors::mag::sim::SimChip;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub(crate) struct Data {
    pub new_data: (bool, bool, bool),
    pub raw: (i16, i16, i16),
    pub mag_ut: Vector3<f32>,
}

impl Data {
    /// Récupére la mesure courante et consomme les indicateurs "nouveau"
    pub(crate) fn take<B: Bus>(mag: &mut Lis3mdl<B>) -> Self {
        Data {
            new_data: (mag.new_x_data(), mag.new_y_data(), mag.new_z_data()),
            raw: (mag.mag_x_raw(), mag.mag_y_raw(), mag.mag_z_raw()),
            mag_ut: Vector3::new(mag.mag_x_ut(), mag.mag_y_ut(), mag.mag_z_ut()),
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{:.2}\t{:.2}\t{:.2}\t{:.2}",
            self.new_data.0 as u8,
            self.new_data.1 as u8,
            self.new_data.2 as u8,
            self.mag_ut.x,
            self.mag_ut.y,
            self.mag_ut.z,
            self.mag_ut.norm()
        )
    }
}

/// Ouvre le transport demandé
pub(crate) fn open_bus(transport: &Transport) -> anyhow::Result<Box<dyn Bus + Send>> {
    match transport {
        #[cfg(feature = "real-sensors")]
        Transport::I2c { bus, address } => Ok(Box::new(I2cBus::new(*bus, *address)?)),

        #[cfg(feature = "real-sensors")]
        Transport::Spi { bus, cs_pin } => Ok(Box::new(SpiBus::new(*bus, *cs_pin)?)),

        #[cfg(feature = "fake-sensors")]
        Transport::Simulated => Ok(Box::new(SimChip::with_noise())),

        #[allow(unreachable_patterns)]
        other => Err(anyhow!("[MAG] Transport non disponible dans ce build: {:?}", other)),
    }
}

/// Boucle de lecture du capteur (thread dédié)
fn poll_sensor(config: &Config, token: &CancellationToken, tx: &UnboundedSender<anyhow::Result<Data>>) -> anyhow::Result<()> {
    let bus = open_bus(&config.transport)?;
    let mut mag = Lis3mdl::new(bus);
    mag.begin()?;

    if mag.range() != config.range {
        mag.config_range(config.range)?;
    }

    if mag.odr() != config.odr {
        mag.config_odr(config.odr)?;
    }

    info!("[MAG] Capteur prêt {:?}", mag.config());

    // En mode simple, chaque mesure doit être redemandée
    let mut rearm = false;

    while !token.is_cancelled() {
        if rearm {
            match mag.start_conversion() {
                Ok(()) => rearm = false,
                Err(e) => {
                    warn!("[MAG] Erreur de déclenchement: {}", e);
                    if tx.send(Err(e)).is_err() {
                        break;
                    }
                }
            }
        }

        match mag.read() {
            Ok(true) => {
                if tx.send(Ok(Data::take(&mut mag))).is_err() {
                    break;
                }
                rearm = mag.op_mode() == OpMode::Single;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("[MAG] Erreur de lecture: {}", e);
                if tx.send(Err(e)).is_err() {
                    break;
                }
            }
        }

        thread::sleep(Duration::from_millis(config.poll_interval_ms));
    }

    Ok(())
}

pub(crate) struct Reader {
    rx: UnboundedReceiver<anyhow::Result<Data>>,
    token: CancellationToken,
}

impl Reader {
    pub(crate) fn new(config: Config, token: CancellationToken) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread_token = token.clone();

        info!("[MAG] Démarrage du thread ...");
        thread::Builder::new().name("lis3mdl".into()).spawn(move || {
            if let Err(e) = poll_sensor(&config, &thread_token, &tx) {
                warn!("[MAG] Arrêt du capteur: {:#}", e);
                let _ = tx.send(Err(e));
            }

            info!("[MAG] Fin du thread.");
        })?;

        Ok(Reader { rx, token })
    }
}

impl Stream for Reader {
    type Item = anyhow::Result<Data>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Option<Self::Item>> {
        if self.token.is_cancelled() {
            return Poll::Ready(None);
        }

        self.rx.poll_recv(cx)
    }
}
