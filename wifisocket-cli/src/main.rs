use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wifisocket_lib::absence::parse_absence_time;
use wifisocket_lib::provision::DEFAULT_PROVISIONING_DURATION;
use wifisocket_lib::timer::parse_time;
use wifisocket_lib::{
    DeviceAddress, DeviceCode, DeviceFilter, MacAddress, ProtocolConfig, RepeatMask, SocketClient, SwitchState,
    TimerSelector, TimerSlotId, send_password,
};

/// Control SWS-A1 style Wi-Fi sockets on the local network.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file with protocol settings; flags below override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Device code as hex (e.g. "C2 11 92 DD") or a known name (sws-a1, dis-120, u-device).
    #[arg(long, global = true)]
    device_code: Option<DeviceCode>,
    /// UDP port the sockets listen on.
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Packet sequence number sent in every request, decimal or 0x-prefixed hex.
    #[arg(long, global = true, value_parser = parse_packet_seq)]
    packet_seq: Option<u16>,
    /// Per-attempt reply timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Attempts per command.
    #[arg(long, global = true)]
    retries: Option<u32>,
    /// Local UDP port to bind, 0 for any.
    #[arg(long, global = true)]
    local_port: Option<u16>,
    /// Socket clock minus local time in seconds. Defaults to minus the local standard UTC offset.
    #[arg(long, global = true, allow_hyphen_values = true)]
    delta: Option<i64>,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(short, long, global = true)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Cmd,
}

/// A socket addressed by MAC and current IP
#[derive(Args, Debug, Clone)]
struct Target {
    /// MAC address, e.g. "ac cf 23 01 02 03"
    mac: MacAddress,
    ip: Ipv4Addr,
}

impl Target {
    fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.mac, self.ip)
    }
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Search the network for sockets
    Find {
        #[arg(long)]
        mac: Option<MacAddress>,
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },
    /// Switch a socket on or off
    Switch {
        #[command(flatten)]
        target: Target,
        state: SwitchState,
    },
    /// Print whether a socket is on or off
    State {
        #[command(flatten)]
        target: Target,
    },
    /// Switch a 433 MHz slave through its Wi-Fi socket (experimental)
    Slave {
        #[command(flatten)]
        target: Target,
        /// 3-byte slave code, e.g. 78fb12
        slave: String,
        state: SwitchState,
    },
    /// List timers: all, active, set, free or a slot number
    Timers {
        #[command(flatten)]
        target: Target,
        #[arg(long, default_value = "all")]
        which: TimerSelector,
    },
    /// Program a timer slot (1-10)
    SetTimer {
        #[command(flatten)]
        target: Target,
        slot: TimerSlotId,
        /// Local time, HH:MM
        #[arg(value_parser = parse_time)]
        time: NaiveTime,
        state: SwitchState,
        /// Weekdays, Monday first, e.g. 1111100
        #[arg(long, default_value = "0000000")]
        repeat: RepeatMask,
        /// Program the slot without activating it
        #[arg(long)]
        inactive: bool,
    },
    /// Switch after a delay, HH:MM from now
    Countdown {
        #[command(flatten)]
        target: Target,
        #[arg(value_parser = parse_time)]
        duration: NaiveTime,
        state: SwitchState,
    },
    /// Activate or deactivate a programmed timer
    ActivateTimer {
        #[command(flatten)]
        target: Target,
        slot: TimerSlotId,
        /// Deactivate instead
        #[arg(long)]
        off: bool,
    },
    DeleteTimer {
        #[command(flatten)]
        target: Target,
        slot: TimerSlotId,
    },
    /// Show the absence window
    Absence {
        #[command(flatten)]
        target: Target,
    },
    /// Program the absence window, times as "dd.mm.yyyy HH:MM"
    SetAbsence {
        #[command(flatten)]
        target: Target,
        #[arg(value_parser = parse_absence_time)]
        from: DateTime<Local>,
        #[arg(value_parser = parse_absence_time)]
        to: DateTime<Local>,
        #[arg(long)]
        inactive: bool,
    },
    DeleteAbsence {
        #[command(flatten)]
        target: Target,
    },
    /// Check that a socket answers
    Heartbeat {
        #[command(flatten)]
        target: Target,
    },
    /// Broadcast the Wi-Fi password to sockets in pairing mode
    SendPassword {
        password: String,
        /// Seconds to keep sending
        #[arg(long)]
        duration: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = setup_logging(cli.log_file.clone(), &cli.verbose)?;

    if let Err(e) = run(cli).await {
        error!("Command failed: {:?}", e);
        process::exit(1);
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ProtocolConfig> {
    let mut config = match &cli.config {
        Some(path) => ProtocolConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ProtocolConfig::default(),
    };

    if let Some(code) = cli.device_code {
        config.device_code = code;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(packet_seq) = cli.packet_seq {
        config.packet_seq = packet_seq;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.retries {
        config.retries = retries;
    }
    if let Some(local_port) = cli.local_port {
        config.local_port = local_port;
    }
    Ok(config)
}

fn parse_packet_seq(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("Invalid packet sequence '{s}': {e}"))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut client = SocketClient::new(config);
    client.set_time_delta(cli.delta.map(TimeDelta::seconds));

    match cli.command {
        Cmd::Find { mac, ip } => {
            if mac.is_none() && ip.is_none() {
                let devices = client.find_devices().await?;
                info!("{} socket(s) answered", devices.len());
                for device in devices {
                    println!("{device}");
                }
            } else {
                let filter = DeviceFilter { mac, ip };
                match client.find_device(filter).await? {
                    Some(device) => println!("{device}"),
                    None => println!("No matching socket found"),
                }
            }
        }
        Cmd::Switch { target, state } => {
            client.switch(&target.address(), state).await?;
        }
        Cmd::State { target } => {
            println!("{}", client.switch_state(&target.address()).await?);
        }
        Cmd::Slave { target, slave, state } => {
            let code: [u8; 3] = hex::decode(&slave)
                .ok()
                .and_then(|bytes| bytes.try_into().ok())
                .with_context(|| format!("Slave code must be 3 hex bytes, got '{slave}'"))?;
            client.switch_slave(&target.address(), code, state).await?;
        }
        Cmd::Timers { target, which } => {
            let slots = client.query_timers(&target.address(), which).await?;
            if which == TimerSelector::Free {
                let free: Vec<String> = slots.iter().map(|slot| slot.slot.to_string()).collect();
                println!("Free slots: {}", free.join(", "));
            } else {
                for slot in slots {
                    println!("{slot}");
                }
            }
        }
        Cmd::SetTimer {
            target,
            slot,
            time,
            state,
            repeat,
            inactive,
        } => {
            client
                .set_timer(&target.address(), slot, !inactive, repeat, time, state)
                .await?;
        }
        Cmd::Countdown {
            target,
            duration,
            state,
        } => {
            client.set_countdown(&target.address(), duration, state).await?;
        }
        Cmd::ActivateTimer { target, slot, off } => {
            client.activate_timer(&target.address(), slot, !off).await?;
        }
        Cmd::DeleteTimer { target, slot } => {
            client.delete_timer(&target.address(), slot).await?;
        }
        Cmd::Absence { target } => {
            println!("{}", client.query_absence(&target.address()).await?);
        }
        Cmd::SetAbsence {
            target,
            from,
            to,
            inactive,
        } => {
            client.set_absence(&target.address(), !inactive, &from, &to).await?;
        }
        Cmd::DeleteAbsence { target } => {
            client.delete_absence(&target.address()).await?;
        }
        Cmd::Heartbeat { target } => {
            client.heartbeat(&target.address()).await?;
            println!("{} is alive", target.address());
        }
        Cmd::SendPassword { password, duration } => {
            let duration = duration.map(Duration::from_secs).unwrap_or(DEFAULT_PROVISIONING_DURATION);
            send_password(&password, duration).await?;
        }
    }

    Ok(())
}

fn setup_logging(log_file_path: Option<PathBuf>, verbosity: &Verbosity<InfoLevel>) -> Result<Option<WorkerGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    let (file_layer, guard) = if let Some(ref path) = log_file_path {
        let log_file =
            File::create(path).with_context(|| format!("Failed to create log file at: {:?}", path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(log_file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // INFO by default, DEBUG with -v; RUST_LOG still wins
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file_path {
        info!("Logging to file: {:?}", path);
    }

    Ok(guard)
}
