use anyhow::Result;
use log::info;

use npk_rtu::cli::{build_cli, commands::handle_subcommands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    info!("🖥️  Soil Nutrient Modbus Interface v{}", npk_rtu::VERSION);
    handle_subcommands(&matches).await
}
