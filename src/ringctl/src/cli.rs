use anyhow::Context;
use caps::CapSet;
use clap::{Arg, ArgMatches, Command};
use rings::{names, HostCapabilities, Ring, RingConfig, RingManager};

pub fn ringctl_main() -> anyhow::Result<()> {
    let matches = command().get_matches();

    let level = logger::level_from_verbosity(matches.occurrences_of("v"));
    logger::init(level).map_err(|_| anyhow::anyhow!("failed to set log level"))?;

    match matches.subcommand() {
        Some(("list", _)) => list(),
        Some(("resolve", resolve)) => resolve_names(resolve),
        Some(("required", _)) => required(&config(&matches)?),
        Some(("probe", probe)) => probe_ring(&config(&matches)?, probe),
        e => anyhow::bail!("unknown subcommand for ringctl {:?}", e),
    }
}

fn command() -> Command<'static> {
    Command::new("ringctl")
        .about("Inspect and exercise capability rings")
        .subcommand_required(true)
        .arg(
            Arg::new("v")
                .short('v')
                .multiple_occurrences(true)
                .global(true)
                .help("More logging, repeat for more"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .takes_value(true)
                .help("JSON file with bypass/add/drop settings"),
        )
        .arg(
            Arg::new("caps")
                .long("caps")
                .takes_value(true)
                .multiple_occurrences(true)
                .help("bypass[=bool], add=NAME[,NAME] or drop=NAME[,NAME]"),
        )
        .subcommand(Command::new("list").about("Capabilities known to the running kernel"))
        .subcommand(
            Command::new("resolve")
                .about("Map capability names to values")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .takes_value(true)
                        .multiple_values(true),
                ),
        )
        .subcommand(
            Command::new("required").about("Harden the process and print the required ring"),
        )
        .subcommand(
            Command::new("probe")
                .about("Enter a ring and print the effective set seen inside it")
                .arg(
                    Arg::new("ring")
                        .long("ring")
                        .short('r')
                        .takes_value(true)
                        .default_value("required")
                        .possible_values(["privileged", "required", "requested", "unprivileged"]),
                )
                .arg(
                    Arg::new("request")
                        .long("request")
                        .takes_value(true)
                        .multiple_values(true)
                        .help("Capabilities for the requested ring"),
                ),
        )
}

fn config(matches: &ArgMatches) -> anyhow::Result<RingConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => RingConfig::load(path)?,
        None => RingConfig::default(),
    };
    if let Some(flags) = matches.values_of("caps") {
        config.merge_flags(&flags.collect::<Vec<_>>())?;
    }
    logger::debug!("capabilities config: {:?}", config);
    Ok(config)
}

fn manager(config: &RingConfig) -> anyhow::Result<RingManager<HostCapabilities>> {
    config
        .build(HostCapabilities::new())
        .context("failed to initialize capabilities")
}

fn list() -> anyhow::Result<()> {
    for name in names::list_host() {
        println!("{}", name);
    }
    Ok(())
}

fn resolve_names(matches: &ArgMatches) -> anyhow::Result<()> {
    let given = matches.values_of("names").unwrap().collect::<Vec<_>>();
    let resolved = names::resolve_host(&given)?;
    for (name, cap) in given.iter().zip(resolved) {
        println!("{} {} {}", name, cap, cap.index());
    }
    Ok(())
}

fn required(config: &RingConfig) -> anyhow::Result<()> {
    let manager = manager(config)?;
    if manager.is_bypassed() {
        println!("bypassed");
        return Ok(());
    }
    for cap in manager.members(Ring::Required)? {
        println!("{}", cap);
    }
    Ok(())
}

fn probe_ring(config: &RingConfig, matches: &ArgMatches) -> anyhow::Result<()> {
    let ring = matches.value_of("ring").unwrap().parse::<Ring>()?;
    let requested = matches
        .values_of("request")
        .map(|v| v.collect::<Vec<_>>())
        .unwrap_or_default();
    if ring != Ring::Requested && !requested.is_empty() {
        anyhow::bail!("--request only applies to the requested ring");
    }

    let manager = manager(config)?;
    let effective = || -> anyhow::Result<Vec<String>> {
        let effective = caps::read(None, CapSet::Effective)
            .context("failed to read effective capabilities")?;
        Ok(rings::list_available(&effective.into_iter().collect::<Vec<_>>()))
    };
    let seen = match ring {
        Ring::Privileged => manager.run_privileged(effective)?,
        Ring::Required => manager.run_required(effective)?,
        Ring::Requested => manager.run_requested_by_name(&requested, effective)?,
        Ring::Unprivileged => effective()?,
    };

    println!("{}:", ring);
    for name in seen {
        println!("  {}", name);
    }
    let after = effective()?;
    if !after.is_empty() && !manager.is_bypassed() {
        anyhow::bail!("still holding {:?} after leaving the {} ring", after, ring);
    }
    Ok(())
}
