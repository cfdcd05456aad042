//! gps-device - watch a GPS source and print decoded fixes

use anyhow::Result;
use clap::Parser;
use gps_device::{DeviceConfig, DeviceEvent, GpsDevice, GpsSource};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gps-device", about = "Acquire and decode GPS data")]
struct Args {
    /// Serial port to read NMEA from (e.g. /dev/ttyUSB0)
    #[arg(long, conflicts_with_all = ["file", "gpsd"])]
    serial: Option<String>,

    /// Baud rate for the serial port
    #[arg(long, default_value_t = 4800)]
    baudrate: u32,

    /// NMEA log file to replay
    #[arg(long, conflicts_with = "gpsd")]
    file: Option<PathBuf>,

    /// gpsd daemon address as host:port
    #[arg(long)]
    gpsd: Option<String>,

    /// Directory for the raw session log
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn source(&self) -> Result<GpsSource> {
        if let Some(port) = &self.serial {
            return Ok(GpsSource::Serial {
                port: port.clone(),
                baudrate: self.baudrate,
            });
        }
        if let Some(path) = &self.file {
            return Ok(GpsSource::FileReplay { path: path.clone() });
        }
        if let Some(addr) = &self.gpsd {
            let (host, port) = match addr.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), port.parse()?),
                None => (addr.clone(), 2947),
            };
            return Ok(GpsSource::Gpsd { host, port });
        }
        // Nothing on the command line: fall back to the saved configuration.
        let config = DeviceConfig::load().unwrap_or_default();
        Ok(config.to_source()?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let source = args.source()?;
    info!("acquiring from {:?}", source);

    let mut device = GpsDevice::new(source);
    if let Some(dir) = args.log_dir.clone() {
        device = device.with_session_log(dir);
    }

    let mut events = device.subscribe();
    let store = device.store();

    device.open().await?;
    device.start()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(DeviceEvent::PositionUpdated(pos)) => {
                    println!(
                        "{:.6} {:.6}  alt {:.1} m  {:.1} km/h  heading {:.1}",
                        pos.latitude, pos.longitude, pos.altitude, pos.speed, pos.heading
                    );
                }
                Ok(DeviceEvent::StatusUpdated) => {
                    let snap = store.snapshot();
                    info!(
                        "status {:?} type {:?} sats {} dop {:.1}",
                        snap.status, snap.fix_type, snap.num_satellites, snap.dop
                    );
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }

    if device.is_running() {
        device.stop().await?;
    }
    device.close().await?;
    Ok(())
}
