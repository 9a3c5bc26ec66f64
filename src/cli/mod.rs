pub mod commands;

use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("npk_rtu")
        .version(crate::VERSION)
        .about("Modbus RTU master for RS-485 soil nutrient sensors")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file")
                .global(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("DEVICE")
                .help("Serial port, e.g. /dev/ttyUSB0")
                .global(true),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .value_name("RATE")
                .help("Baud rate")
                .global(true),
        )
        .arg(
            Arg::new("slave")
                .short('s')
                .long("slave")
                .value_name("ADDR")
                .help("Sensor slave address")
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("MS")
                .help("Polling interval in milliseconds")
                .global(true),
        )
        .arg(
            Arg::new("simulate")
                .long("simulate")
                .action(ArgAction::SetTrue)
                .help("Talk to a built-in simulated sensor instead of hardware")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging, including raw frames")
                .global(true),
        )
        .subcommand(Command::new("run").about("Poll continuously and forward readings (default)"))
        .subcommand(Command::new("poll").about("Run a single transaction and print the reading"))
        .subcommand(
            Command::new("crc")
                .about("Compute the CRC-16/MODBUS of a hex string")
                .arg(Arg::new("hex").required(true).help("Bytes as hex, e.g. 0103001E0003")),
        )
        .subcommand(Command::new("list-ports").about("List available serial ports"))
        .subcommand(
            Command::new("init-config")
                .about("Write the default configuration to a file")
                .arg(Arg::new("path").required(true).value_name("FILE")),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let matches = build_cli()
            .try_get_matches_from(["npk_rtu", "poll", "--simulate", "--slave", "2"])
            .unwrap();
        assert!(matches.get_flag("simulate"));
        assert_eq!(matches.get_one::<String>("slave").map(String::as_str), Some("2"));
        assert_eq!(matches.subcommand_name(), Some("poll"));
    }
}
