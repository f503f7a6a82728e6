use clap::{App, Arg, ArgMatches, SubCommand};
use gralloc_refs::{
    error::RegistryError,
    handle::{map_attributes, SharedBuffer},
    BufferRegistry, LengthProbe, RegistryConfig, Result, SanityChecker,
};
use std::{str::FromStr, time::Instant};

fn main() -> Result<()> {
    env_logger::init();

    let matches = App::new("gralloc-refs-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Buffer reference registry diagnostics")
        .subcommand(
            SubCommand::with_name("check")
                .about("Run the descriptor sanity check against memfd-backed regions")
                .arg(
                    Arg::with_name("sizes")
                        .short("s")
                        .long("sizes")
                        .value_name("SIZES")
                        .help("Comma-separated advertised region sizes")
                        .default_value("4096")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("actual")
                        .short("a")
                        .long("actual")
                        .value_name("SIZES")
                        .help("Comma-separated real descriptor lengths (defaults to advertised)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("attr_size")
                        .long("attr-size")
                        .value_name("SIZE")
                        .help("Advertised metadata size")
                        .default_value("4096")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("probe")
                        .short("p")
                        .long("probe")
                        .value_name("PROBE")
                        .help("Length probe")
                        .possible_values(&["auto", "stat", "seek"])
                        .default_value("auto")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("page_size")
                        .long("page-size")
                        .value_name("BYTES")
                        .help("Sanity tolerance (defaults to the system page size)")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("lifecycle")
                .about("Retain, map, validate and release a batch of buffers")
                .arg(
                    Arg::with_name("count")
                        .short("c")
                        .long("count")
                        .value_name("COUNT")
                        .help("Number of buffers")
                        .default_value("64")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("regions")
                        .short("r")
                        .long("regions")
                        .value_name("REGIONS")
                        .help("Regions per buffer")
                        .default_value("1")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("size")
                        .short("s")
                        .long("size")
                        .value_name("SIZE")
                        .help("Region size in bytes")
                        .default_value("65536")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("metadata")
                        .long("metadata")
                        .help("Also map each buffer's metadata region"),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and layout information"))
        .get_matches();

    match matches.subcommand() {
        ("check", Some(check_matches)) => run_check(check_matches),
        ("lifecycle", Some(lifecycle_matches)) => run_lifecycle(lifecycle_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| RegistryError::invalid_parameter(name, "missing value"))?;
    raw.parse()
        .map_err(|_| RegistryError::invalid_parameter(name, format!("invalid value '{}'", raw)))
}

fn parse_sizes(raw: &str, name: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse().map_err(|_| {
                RegistryError::invalid_parameter(name, format!("invalid size '{}'", s))
            })
        })
        .collect()
}

fn run_check(matches: &ArgMatches) -> Result<()> {
    let sizes = parse_sizes(matches.value_of("sizes").unwrap_or("4096"), "sizes")?;
    let actual = match matches.value_of("actual") {
        Some(raw) => parse_sizes(raw, "actual")?,
        None => sizes.clone(),
    };
    if actual.len() != sizes.len() {
        return Err(RegistryError::invalid_parameter(
            "actual",
            "one length is required per advertised size",
        ));
    }
    let attr_size: u64 = parse_arg(matches, "attr_size")?;
    let probe = match matches.value_of("probe") {
        Some("stat") => LengthProbe::Stat,
        Some("seek") => LengthProbe::Seek,
        _ => LengthProbe::Auto,
    };
    let mut config = RegistryConfig::new().with_length_probe(probe);
    if matches.is_present("page_size") {
        config = config.with_page_size(parse_arg(matches, "page_size")?);
    }
    config.validate()?;

    let buffer = SharedBuffer::allocate("gralloc-refs-check", &sizes, attr_size)?;
    for (i, &len) in actual.iter().enumerate() {
        buffer.set_region_len(i, len)?;
    }
    let handle = buffer.handle()?;

    println!(
        "Checking {} region(s) with {} probe, tolerance {} bytes",
        sizes.len(),
        probe.name(),
        config.page_size
    );
    for (i, (advertised, real)) in sizes.iter().zip(&actual).enumerate() {
        println!("  region {}: advertised {} bytes, descriptor {} bytes", i, advertised, real);
    }

    match SanityChecker::new(config.page_size, probe).check(&handle) {
        Ok(()) => println!("Result: PASS"),
        Err(failure) => println!("Result: FAIL ({})", failure),
    }
    Ok(())
}

fn run_lifecycle(matches: &ArgMatches) -> Result<()> {
    let count: usize = parse_arg(matches, "count")?;
    let regions: usize = parse_arg(matches, "regions")?;
    let size: u64 = parse_arg(matches, "size")?;
    let with_metadata = matches.is_present("metadata");

    let registry = BufferRegistry::new(RegistryConfig::default())?;
    let buffers = (0..count)
        .map(|i| SharedBuffer::allocate(&format!("gralloc-refs-{}", i), &vec![size; regions], 4096))
        .collect::<Result<Vec<_>>>()?;
    let handles = buffers
        .iter()
        .map(|b| b.handle().map(Box::new))
        .collect::<Result<Vec<_>>>()?;

    println!("Running lifecycle on {} buffer(s), {} region(s) of {} bytes", count, regions, size);

    let start = Instant::now();
    for handle in &handles {
        registry.retain(handle)?;
        registry.map(handle)?;
        if with_metadata {
            map_attributes(handle)?;
        }
    }
    let mapped = start.elapsed();
    println!("  Registered: {}, mapped: {}", registry.registered_count(), registry.mapped_count());

    for handle in &handles {
        registry.validate(handle)?;
        registry.release(handle)?;
    }
    let elapsed = start.elapsed();

    let stats = registry.stats_snapshot();
    println!("\nResults:");
    println!("  Retain+map time: {:.2}ms", mapped.as_secs_f64() * 1000.0);
    println!("  Total time: {:.2}ms", elapsed.as_secs_f64() * 1000.0);
    println!("  Mapper invocations: {}", stats.mapper_invocations);
    println!("  Records destroyed: {}", stats.records_destroyed);
    println!("  Teardown errors: {}", stats.teardown_errors);
    println!("  Remaining records: {}", registry.registered_count());
    Ok(())
}

fn show_info() -> Result<()> {
    use gralloc_refs::{limits, BufferHandle};

    println!("gralloc-refs {}", gralloc_refs::VERSION);
    println!("  MAX_FDS: {}", limits::MAX_FDS);
    println!("  MAX_BUFFER_FDS: {}", limits::MAX_BUFFER_FDS);
    println!("  System page size: {}", limits::system_page_size());
    println!("  Handle size: {} bytes", std::mem::size_of::<BufferHandle>());
    println!("  Handle num_ints: {}", BufferHandle::NUM_INTS);
    Ok(())
}
