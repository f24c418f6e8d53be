use clap::Parser;
use log::error;
use std::process::ExitCode;
use std::time::Duration;

use hdlc_serial::SerialConfig;

mod session;
use session::{list_serial_ports, run_link, run_monitor, LinkOptions};

/// Exchange HDLC framed messages over a serial port
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Serial port
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = 921600)]
    baud_rate: u32,

    /// Poll interval and port read timeout in milliseconds
    #[arg(short = 't', long, default_value_t = 100)]
    poll_ms: u64,

    /// List serial ports
    #[arg(short, long, default_value_t = false)]
    list: bool,

    /// Text to transmit periodically
    #[arg(short, long)]
    send: Option<String>,

    /// Milliseconds between transmissions
    #[arg(long, default_value_t = 1000)]
    period_ms: u64,

    /// Only print received frames, using the async codec.
    #[arg(short, long, default_value_t = false)]
    monitor: bool,

    /// Seconds between statistics reports, 0 to disable.
    #[arg(long, default_value_t = 10)]
    stats_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = Args::parse();

    let res = if args.list {
        list_serial_ports()
    } else if args.monitor {
        run_monitor(&args.port, args.baud_rate).await
    } else {
        let mut config = SerialConfig::new(args.port, args.baud_rate);
        config.timeout = Duration::from_millis(args.poll_ms);
        run_link(LinkOptions {
            config,
            send: args.send,
            period: Duration::from_millis(args.period_ms),
            stats_every: (args.stats_secs > 0).then(|| Duration::from_secs(args.stats_secs)),
        })
        .await
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:?}");
            ExitCode::FAILURE
        }
    }
}
