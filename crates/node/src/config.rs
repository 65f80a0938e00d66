use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use btmd_consensus::{chain_params, ChainParams, Network};

use crate::logging;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const CONF_FILE_NAME: &str = "btmd.conf";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backend {
    Memory,
    Fjall,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "memory" => Some(Self::Memory),
            "fjall" => Some(Self::Fjall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Fjall => "fjall",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub network: Network,
    pub log_level: logging::Level,
    pub log_format: logging::Format,
    pub log_timestamps: bool,
    pub queue_capacity: usize,
    pub max_orphans: usize,
    pub orphan_ttl_secs: u64,
    pub check_pow: bool,
    pub import: Option<PathBuf>,
}

impl Config {
    /// Directory holding this network's lock file and database.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(chain_params(self.network).data_dir_name)
    }
}

#[derive(Debug)]
pub enum CliAction {
    Run(Config),
    PrintHelp,
    PrintVersion,
}

/// Settings as given on the command line or in the config file; unset
/// fields fall through to the next source and finally to network defaults.
#[derive(Default)]
struct Overrides {
    backend: Option<Backend>,
    network: Option<Network>,
    log_level: Option<logging::Level>,
    log_format: Option<logging::Format>,
    log_timestamps: Option<bool>,
    queue_capacity: Option<usize>,
    max_orphans: Option<usize>,
    orphan_ttl_secs: Option<u64>,
    check_pow: Option<bool>,
    import: Option<PathBuf>,
}

impl Overrides {
    fn or(self, fallback: Overrides) -> Overrides {
        Overrides {
            backend: self.backend.or(fallback.backend),
            network: self.network.or(fallback.network),
            log_level: self.log_level.or(fallback.log_level),
            log_format: self.log_format.or(fallback.log_format),
            log_timestamps: self.log_timestamps.or(fallback.log_timestamps),
            queue_capacity: self.queue_capacity.or(fallback.queue_capacity),
            max_orphans: self.max_orphans.or(fallback.max_orphans),
            orphan_ttl_secs: self.orphan_ttl_secs.or(fallback.orphan_ttl_secs),
            check_pow: self.check_pow.or(fallback.check_pow),
            import: self.import.or(fallback.import),
        }
    }

    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<(), String> {
        match key {
            "backend" => {
                self.backend = Some(
                    Backend::parse(value)
                        .ok_or_else(|| format!("invalid backend '{value}' {origin}"))?,
                );
            }
            "network" => {
                self.network = Some(value.parse().map_err(|err| format!("{err} {origin}"))?);
            }
            "log-level" => {
                self.log_level = Some(value.parse().map_err(|err| format!("{err} {origin}"))?);
            }
            "log-format" => {
                self.log_format = Some(value.parse().map_err(|err| format!("{err} {origin}"))?);
            }
            "log-timestamps" => {
                self.log_timestamps = Some(parse_bool(value, key, origin)?);
            }
            "queue-capacity" => {
                self.queue_capacity = Some(parse_positive(value, key, origin)?);
            }
            "max-orphans" => {
                self.max_orphans = Some(parse_positive(value, key, origin)?);
            }
            "orphan-ttl-secs" => {
                self.orphan_ttl_secs = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid {key} '{value}' {origin}"))?,
                );
            }
            "check-pow" => {
                self.check_pow = Some(parse_bool(value, key, origin)?);
            }
            "import" => {
                self.import = Some(PathBuf::from(value));
            }
            _ => return Err(format!("unknown option '{key}' {origin}")),
        }
        Ok(())
    }
}

fn parse_bool(value: &str, key: &str, origin: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid {key} '{value}' {origin}")),
    }
}

fn parse_positive(value: &str, key: &str, origin: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(format!("invalid {key} '{value}' {origin} (expected a positive integer)")),
    }
}

pub fn parse_args() -> Result<CliAction, String> {
    parse_args_from(std::env::args().skip(1))
}

pub fn parse_args_from<I>(raw_args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut data_dir: Option<PathBuf> = None;
    let mut cli = Overrides::default();
    let mut args = raw_args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" | "help" => return Ok(CliAction::PrintHelp),
            "--version" | "-V" | "version" => return Ok(CliAction::PrintVersion),
            "--data-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for --data-dir\n{}", usage()))?;
                data_dir = Some(PathBuf::from(value));
            }
            "--log-timestamps" => cli.log_timestamps = Some(true),
            "--no-log-timestamps" => cli.log_timestamps = Some(false),
            "--check-pow" => cli.check_pow = Some(true),
            "--no-check-pow" => cli.check_pow = Some(false),
            flag if flag.starts_with("--") => {
                let key = &flag[2..];
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for {flag}\n{}", usage()))?;
                cli.apply(key, &value, "on the command line")
                    .map_err(|err| format!("{err}\n{}", usage()))?;
            }
            other => return Err(format!("unexpected argument '{other}'\n{}", usage())),
        }
    }

    let data_dir = data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let conf_path = data_dir.join(CONF_FILE_NAME);
    let file = match load_conf(&conf_path)? {
        Some(entries) => {
            let origin = format!("in {}", conf_path.display());
            let mut file = Overrides::default();
            for (key, value) in entries {
                file.apply(&key, &value, &origin)?;
            }
            file
        }
        None => Overrides::default(),
    };

    Ok(CliAction::Run(resolve(data_dir, cli.or(file))))
}

fn resolve(data_dir: PathBuf, settings: Overrides) -> Config {
    let network = settings.network.unwrap_or(Network::Mainnet);
    let params: ChainParams = chain_params(network);
    Config {
        backend: settings.backend.unwrap_or(Backend::Fjall),
        data_dir,
        network,
        log_level: settings.log_level.unwrap_or(logging::Level::Info),
        log_format: settings.log_format.unwrap_or(logging::Format::Text),
        log_timestamps: settings.log_timestamps.unwrap_or(true),
        queue_capacity: settings.queue_capacity.unwrap_or(params.queue_capacity),
        max_orphans: settings.max_orphans.unwrap_or(params.max_orphans),
        orphan_ttl_secs: settings.orphan_ttl_secs.unwrap_or(params.orphan_ttl_secs),
        check_pow: settings.check_pow.unwrap_or(true),
        import: settings.import,
    }
}

/// Reads `key=value` lines; `#` and `;` start comments and a bare key means
/// `1`. Returns `None` when the file does not exist.
pub fn load_conf(path: &Path) -> Result<Option<Vec<(String, String)>>, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(format!("failed to read {}: {err}", path.display())),
    };

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<(String, String)> = Vec::new();
    for raw_line in contents.lines() {
        let mut line = raw_line.trim();
        if let Some(idx) = line.find(['#', ';']) {
            line = &line[..idx];
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => (line, "1"),
        };
        if key.is_empty() {
            continue;
        }
        let key = key.to_ascii_lowercase().replace('_', "-");
        match seen.get(&key) {
            Some(&slot) => out[slot].1 = value.to_string(),
            None => {
                seen.insert(key.clone(), out.len());
                out.push((key, value.to_string()));
            }
        }
    }
    Ok(Some(out))
}

pub fn usage() -> String {
    [
        "Usage:",
        "  btmd [options]",
        "",
        "Options:",
        "  --help, -h  Print this help and exit",
        "  --version, -V  Print version and exit",
        "  --network  Chain to run (mainnet|testnet|regtest) (default: mainnet)",
        "  --data-dir  Base data directory (default: ./data)",
        "  --backend  Storage backend to use (memory|fjall) (default: fjall)",
        "  --log-level  Log verbosity (error|warn|info|debug|trace) (default: info)",
        "  --log-format  Log output format (text|json) (default: text)",
        "  --log-timestamps  Enable timestamps in text logs (default: on)",
        "  --no-log-timestamps  Disable timestamps in text logs",
        "  --queue-capacity  Block requests buffered ahead of the chain worker (default: 1024)",
        "  --max-orphans  Orphan blocks held while waiting for parents (default: per network)",
        "  --orphan-ttl-secs  Seconds an orphan block is kept (default: per network)",
        "  --check-pow  Check block hashes against their compact target (default: on)",
        "  --no-check-pow  Skip the proof-of-work target check",
        "  --import  File of hex-encoded blocks, one per line, to submit at startup",
        "",
        "Every long option except --data-dir may also be set as key=value in",
        "<data-dir>/btmd.conf; the command line takes precedence.",
    ]
    .join("\n")
}
