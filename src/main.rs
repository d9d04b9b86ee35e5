/// modrt - Module Runtime CLI
use itertools::Itertools;
use modrt::runtime::{CheckHashPolicy, ImportSystem, RuntimeConfig};
use std::env;
use std::path::PathBuf;
use std::process;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("modrt v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    modrt [OPTIONS] <MODULE>...");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help                     Print this help message");
    eprintln!("    -V, --version                  Print version information");
    eprintln!("    -p, --path <DIR>               Append DIR to the search path (repeatable)");
    eprintln!("    -c, --config <FILE>            Load configuration from a TOML file");
    eprintln!("    --no-cache                     Do not write compiled artifacts");
    eprintln!("    --check-hash-based <POLICY>    default | always | never");
    eprintln!("    --show                         Print each module's public names");
    eprintln!("    -v, --verbose                  Increase log verbosity (-v debug, -vv trace)");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    <MODULE>                       Dotted module name to import");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    modrt -p lib app.main");
    eprintln!("    modrt -p lib --no-cache --show app.settings");
    eprintln!("    MODRT_PATH=lib modrt -vv app");
}

fn print_version() {
    println!("modrt {}", VERSION);
}

struct Options {
    modules: Vec<String>,
    paths: Vec<PathBuf>,
    config: Option<PathBuf>,
    no_cache: bool,
    check_hash_based: Option<CheckHashPolicy>,
    show: bool,
    verbosity: u8,
}

fn parse_policy(value: &str) -> Result<CheckHashPolicy, String> {
    match value {
        "default" => Ok(CheckHashPolicy::Default),
        "always" => Ok(CheckHashPolicy::Always),
        "never" => Ok(CheckHashPolicy::Never),
        other => Err(format!("Unknown check-hash-based policy: {}", other)),
    }
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut options = Options {
        modules: Vec::new(),
        paths: Vec::new(),
        config: None,
        no_cache: false,
        check_hash_based: None,
        show: false,
        verbosity: 0,
    };
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-V" | "--version" => {
                print_version();
                process::exit(0);
            }
            "-p" | "--path" => {
                i += 1;
                let dir = args.get(i).ok_or("Missing directory after --path")?;
                options.paths.push(PathBuf::from(dir));
            }
            "-c" | "--config" => {
                i += 1;
                let file = args.get(i).ok_or("Missing file after --config")?;
                options.config = Some(PathBuf::from(file));
            }
            "--no-cache" => options.no_cache = true,
            "--check-hash-based" => {
                i += 1;
                let policy = args.get(i).ok_or("Missing policy after --check-hash-based")?;
                options.check_hash_based = Some(parse_policy(policy)?);
            }
            "--show" => options.show = true,
            "-v" | "--verbose" => options.verbosity += 1,
            "-vv" => options.verbosity += 2,
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => options.modules.push(arg.to_string()),
        }
        i += 1;
    }

    if options.modules.is_empty() {
        return Err("No module specified".to_string());
    }
    Ok(options)
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn load_config(options: &Options) -> Result<RuntimeConfig, String> {
    let mut config = match &options.config {
        Some(path) => {
            let mut config = RuntimeConfig::from_file(path).map_err(|e| e.to_string())?;
            config.apply_env();
            config
        }
        None => RuntimeConfig::discover().map_err(|e| e.to_string())?,
    };
    config.search_path.extend(options.paths.iter().cloned());
    if options.no_cache {
        config.dont_write_cache = true;
    }
    if let Some(policy) = options.check_hash_based {
        config.check_hash_based = policy;
    }
    Ok(config)
}

fn main() {
    let options = match parse_args() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };
    init_logging(options.verbosity);

    let config = match load_config(&options) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let sys = ImportSystem::new(config);
    let mut failed = false;
    for name in &options.modules {
        match sys.import_module(name, None) {
            Ok(module) => {
                println!("{}", module);
                if options.show {
                    for public in module.public_names() {
                        if let Some(value) = module.get_attr(&public) {
                            println!("    {} = {}", public, value);
                        }
                    }
                }
            }
            Err(e) => {
                eprintln!("Error importing '{}': {}", name, e);
                failed = true;
            }
        }
    }

    let torn_down = sys.shutdown();
    tracing::debug!(modules = %torn_down.iter().join(", "), "shutdown complete");

    if failed {
        process::exit(1);
    }
}
