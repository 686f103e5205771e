mod bus;
mod cli;
mod config;
mod sensors;

#[cfg(feature = "real-sensors")]
mod i2c;

#[cfg(feature = "real-sensors")]
mod spi;

use clap::Parser;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;
use tokio::signal::{self};

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::from(&cli);
    let token = CancellationToken::new();

    // MAG
    {
        let parent = token.clone();
        let token = token.child_token();
        let mut reader = match sensors::mag::reader::Reader::new(config, token.clone()) {
            Ok(reader) => reader,
            Err(e) => {
                eprintln!("[MAG] Erreur lors de l'init: {:#}", e);
                return;
            }
        };

        tokio::spawn(async move {
            println!("new_x\tnew_y\tnew_z\tx_ut\ty_ut\tz_ut\t|B|");

            while let Some(data) = reader.next().await {
                match data {
                    Ok(data) => println!("{}", data),
                    Err(e) => eprintln!("[MAG] Erreur: {:#}", e),
                }
            }

            // Plus de données : on arrête tout
            parent.cancel();
        });
    }

    #[cfg(unix)]
    {
        let mut interrupt = match tokio::signal::unix::signal(SignalKind::interrupt()) {
            Ok(interrupt) => interrupt,
            Err(e) => {
                eprintln!("Impossible d'écouter SIGINT: {}", e);
                token.cancel();
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => {
                println!("Signal d'interruption reçu");
                token.cancel();
            },
            _ = signal::ctrl_c() => {
                println!("Signal de contrôle C reçu");
                token.cancel();
            },
            _ = token.cancelled() => {
                println!("Fin de lecture du capteur");
            },
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("Signal de contrôle C reçu");
                token.cancel();
            },
            _ = token.cancelled() => {
                println!("Fin de lecture du capteur");
            },
        }
    }
}
