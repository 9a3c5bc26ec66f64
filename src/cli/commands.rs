use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use log::{error, info};
use std::time::Duration;

use crate::bus::{open_serial, open_simulated, Transport};
use crate::config::Config;
use crate::devices::SoilSensor;
use crate::modbus::crc::crc16_modbus;
use crate::modbus::{MasterOptions, RtuMaster};
use crate::output::{ConsoleSink, OutputFormat};
use crate::services::PollService;

/// Register values served by `--simulate`, repeated to fill the map.
const SIMULATED_VALUES: [u16; 3] = [32, 21, 64];

pub async fn handle_subcommands(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("crc", sub)) => {
            let input = sub.get_one::<String>("hex").context("missing hex argument")?;
            crc_command(input)
        }
        Some(("list-ports", _)) => list_ports(),
        Some(("init-config", sub)) => {
            let path = sub.get_one::<String>("path").context("missing path argument")?;
            Config::default()
                .save_to_file(path)
                .with_context(|| format!("writing {}", path))?;
            println!("✅ Default configuration written to {}", path);
            Ok(())
        }
        Some(("poll", _)) => {
            info!("🔍 Executing single poll...");
            let mut service = build_service(matches)?;
            let reading = service.run_cycle().await;
            match service.sensor().label(&reading) {
                Some(labelled) => println!("{}", serde_json::to_string_pretty(&labelled.to_json())?),
                None => bail!("poll failed: {:?}", reading.error),
            }
            Ok(())
        }
        _ => {
            let mut service = build_service(matches)?;
            service
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("❌ Failed to listen for Ctrl+C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            Ok(())
        }
    }
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_overrides(matches)?;
    Ok(config)
}

fn open_master(config: &Config, simulate: bool) -> Result<RtuMaster<Box<dyn Transport>>> {
    let options = MasterOptions::from_register_map(&config.register_map);

    let (transport, direction) = if simulate {
        let registers = (0..config.register_map.register_count as usize)
            .map(|i| SIMULATED_VALUES[i % SIMULATED_VALUES.len()])
            .collect();
        let (sensor, direction) = open_simulated(config, registers);
        let transport: Box<dyn Transport> = Box::new(sensor.with_response_delay(Duration::from_millis(12)));
        (transport, direction)
    } else {
        let (port, direction) = open_serial(config)
            .with_context(|| format!("opening {}", config.serial.port))?;
        let transport: Box<dyn Transport> = Box::new(port);
        (transport, direction)
    };

    Ok(RtuMaster::new(transport, direction, options)?)
}

fn build_service(matches: &ArgMatches) -> Result<PollService<RtuMaster<Box<dyn Transport>>, ConsoleSink>> {
    let config = load_config(matches)?;
    let master = open_master(&config, matches.get_flag("simulate"))?;
    let sensor = SoilSensor::new(&config.register_map, &config.sink)?;
    let format: OutputFormat = config.sink.format.parse()?;
    Ok(PollService::new(master, ConsoleSink::new(format), sensor, config.polling.clone()))
}

fn crc_command(input: &str) -> Result<()> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(&cleaned).with_context(|| format!("invalid hex: {}", input))?;
    let crc = crc16_modbus(&bytes);
    let [low, high] = crc.to_le_bytes();

    println!("CRC-16/MODBUS: 0x{:04X} (low 0x{:02X}, high 0x{:02X})", crc, low, high);
    println!("Framed: {}{:02X}{:02X}", hex::encode_upper(&bytes), low, high);
    Ok(())
}

fn list_ports() -> Result<()> {
    println!("📡 Available Serial Ports:");

    let ports = serialport::available_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("   ⚠️  No serial ports found");
        return Ok(());
    }

    for (index, port) in ports.iter().enumerate() {
        println!("   {}. {}", index + 1, port.port_name);
        if let serialport::SerialPortType::UsbPort(usb_info) = &port.port_type {
            if let Some(manufacturer) = &usb_info.manufacturer {
                println!("      📱 Manufacturer: {}", manufacturer);
            }
            if let Some(serial_number) = &usb_info.serial_number {
                println!("      🔢 Serial Number: {}", serial_number);
            }
        }
    }
    Ok(())
}
