use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{
    Arg, ArgAction, ArgMatches, Command, crate_description, crate_name, crate_version,
    value_parser,
};

use rvdb::sdb::Debugger;
use rvdb::ui::GUI;
use rvdb::{Machine, MachineConfig};

fn cli() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("image")
                .value_name("IMAGE")
                .help("Raw binary loaded at the start of memory; a built-in program runs without it")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("TOML machine configuration")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("batch")
                .short('b')
                .long("batch")
                .help("Run to completion without the debugger shell")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tui")
                .long("tui")
                .help("Start the terminal front-end instead of the shell")
                .action(ArgAction::SetTrue)
                .conflicts_with("batch"),
        )
        .arg(
            Arg::new("mem-size")
                .long("mem-size")
                .value_name("BYTES")
                .help("Physical memory size")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("regs")
                .long("regs")
                .value_name("N")
                .help("General purpose register count, 16 or 32")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("FILTER")
                .help("Log filter, overrides RUST_LOG (e.g. debug, rvdb=trace)"),
        )
}

/// File values first, then command-line overrides.
fn config_from(matches: &ArgMatches) -> Result<MachineConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => MachineConfig::from_file(path)?,
        None => MachineConfig::default(),
    };
    if let Some(size) = matches.get_one::<usize>("mem-size") {
        config.mem_size = *size;
    }
    if let Some(regs) = matches.get_one::<usize>("regs") {
        config.num_regs = *regs;
    }
    if matches.get_flag("batch") {
        config.batch = true;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = matches.get_one::<String>("log-level") {
        logger.parse_filters(filter);
    }
    logger.init();

    let config = config_from(&matches)?;
    log::debug!("{config:?}");

    let mut machine = Machine::new(&config).context("cannot build the instruction decoder")?;
    match matches.get_one::<PathBuf>("image") {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("cannot read image {}", path.display()))?;
            machine
                .load(&image)
                .with_context(|| format!("image {} does not fit in memory", path.display()))?;
        }
        None => machine.load_builtin()?,
    }
    log::info!(
        "{} {}: {} registers, {:#x} bytes of memory at {:#010x}",
        crate_name!(),
        crate_version!(),
        config.num_regs,
        config.mem_size,
        config.mem_base
    );

    let machine = if matches.get_flag("tui") {
        let result = GUI::new(machine).run();
        ratatui::restore();
        result?
    } else {
        let mut debugger = Debugger::new(machine, config.batch);
        debugger.mainloop(io::stdin().lock(), &mut io::stdout())?;
        debugger.into_machine()
    };

    if machine.exit_status_bad() {
        std::process::exit(1);
    }
    Ok(())
}
