use anyhow::{Context, Result};
use colored::Colorize;
use log::Level::Info;
use log::{debug, error, info, log_enabled};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::signal;
use tokio::task::spawn_blocking;
use tokio::time::{interval, sleep};
use tokio_serial::{FlowControl, SerialPortType, SerialStream};
use tokio_stream::StreamExt;
use tokio_util::codec::FramedRead;

use hdlc_serial::{FrameCodec, HdlcCodec, HdlcSerial, SerialConfig, StatisticsSnapshot};

type Serial = HdlcSerial<hdlc_serial::SerialTransport, HdlcCodec>;

pub struct LinkOptions {
    pub config: SerialConfig,
    pub send: Option<String>,
    pub period: Duration,
    pub stats_every: Option<Duration>,
}

fn print_statistics(stats: &StatisticsSnapshot) {
    println!(
        "{} TX Total={}, TX Good={}, TX Bad={} | RX Total={}, RX Good={}, RX Bad={}",
        "Statistics:".bold(),
        stats.tx_total,
        stats.tx_good.to_string().green(),
        stats.tx_bad.to_string().red(),
        stats.rx_total,
        stats.rx_good.to_string().green(),
        stats.rx_bad.to_string().red(),
    );
}

// Drains the inbox until the receive loop dies.
fn receiver(serial: &Serial, poll: Duration) {
    while serial.is_running() {
        if let Some(frame) = serial.take(poll) {
            match std::str::from_utf8(&frame) {
                Ok(text) => println!("{} {}", "<-".blue(), text.trim_end()),
                Err(_) => println!("{} {:x?}", "<-".blue(), frame),
            }
        }
    }
}

async fn sender(serial: Arc<Serial>, payload: Option<String>, period: Duration) -> Result<()> {
    let Some(payload) = payload else {
        return std::future::pending().await;
    };

    loop {
        let task_serial = serial.clone();
        let task_payload = payload.clone();
        let res = spawn_blocking(move || task_serial.transmit(task_payload.as_bytes()))
            .await
            .context("Transmit task failed")?;
        match res {
            Ok(()) => println!("{} {}", "->".yellow(), payload),
            Err(e) => error!("{e}"),
        }
        sleep(period).await;
    }
}

async fn reporter(serial: Arc<Serial>, every: Option<Duration>) {
    let Some(every) = every else {
        return std::future::pending().await;
    };

    let mut ticker = interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        print_statistics(&serial.statistics());
    }
}

/// Run the threaded engine on one port until interrupted or the port fails.
pub async fn run_link(options: LinkOptions) -> Result<()> {
    let config = options.config.clone();
    let serial = spawn_blocking(move || HdlcSerial::open(&config))
        .await?
        .context(format!("Failed to open serial port {}", options.config.name))?;
    let serial = Arc::new(serial);
    serial.start()?;

    let receiving = {
        let serial = serial.clone();
        let poll = options.config.timeout;
        spawn_blocking(move || receiver(&serial, poll))
    };

    select! {
        res = signal::ctrl_c() => {
            res.context("Failed to listen for ctrl-c")?;
            info!("Interrupted.");
        }
        _ = receiving => error!("Receive loop on {} ended.", serial.name()),
        res = sender(serial.clone(), options.send, options.period) => {
            error!("Sender completed with: {res:?}");
        }
        _ = reporter(serial.clone(), options.stats_every) => {}
    }

    serial.stop();
    let joining = serial.clone();
    spawn_blocking(move || joining.join()).await?;
    print_statistics(&serial.statistics());
    Ok(())
}

/// Print decoded frames using the async codec on a `SerialStream`.
pub async fn run_monitor(path: &str, baud_rate: u32) -> Result<()> {
    let port_builder = tokio_serial::new(path, baud_rate).flow_control(FlowControl::None);
    let stream: SerialStream =
        SerialStream::open(&port_builder).context(format!("Failed to open serial port {path}"))?;
    info!("Monitoring {path} at {baud_rate} baud.");

    let mut frames = FramedRead::new(stream, FrameCodec::new(HdlcCodec::new()));
    loop {
        select! {
            res = signal::ctrl_c() => {
                res.context("Failed to listen for ctrl-c")?;
                break;
            }
            frame = frames.next() => match frame {
                Some(Ok(frame)) => println!("{} {:x?}", "<-".blue(), frame),
                Some(Err(e)) => {
                    error!("{e}");
                    break;
                }
                None => {
                    debug!("{path} closed.");
                    break;
                }
            }
        }
    }

    print_statistics(&frames.decoder().statistics());
    Ok(())
}

pub fn list_serial_ports() -> Result<()> {
    println!("Available serial ports:");

    let ports = tokio_serial::available_ports()?;
    for port in ports {
        println!("Name: {}", port.port_name);

        if log_enabled!(Info) {
            if let SerialPortType::UsbPort(info) = &port.port_type {
                if let Some(man) = &info.manufacturer {
                    println!("Manufacturer: {}", man)
                }
                if let Some(prod) = &info.product {
                    println!("Product name: {}", prod);
                }
                if let Some(sn) = &info.serial_number {
                    println!("Serial number: {}", sn);
                }
                println!("Vendor ID {}", info.vid);
                println!("Product ID {}", info.pid);
            }
        };
    }
    Ok(())
}
