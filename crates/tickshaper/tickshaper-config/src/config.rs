use std::path::Path;

/// Engine configuration, loaded from a line-oriented `key=value` file with
/// `#` comments. Every key has a default; a missing file means defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_file: String,
    pub symbols_file: String,
    pub zmq_endpoint: String,
    pub shared_memory_size: usize,
    /// Worker count; `<= 0` in the file means hardware concurrency.
    pub worker_threads: usize,
    pub cpu_affinity: bool,
    pub default_throttle_rate: u32,
    pub default_replay_speed: f64,
    pub microburst_threshold: u32,
    pub log_level: String,
    pub enable_monitoring: bool,
    pub monitoring_interval: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bad value for '{key}' on line {line}: '{value}'")]
    Parse {
        key: String,
        line: usize,
        value: String,
    },
}

mod defaults {
    pub const INPUT_FILE: &str = "data/sample.itch";
    pub const ZMQ_ENDPOINT: &str = "tcp://*:5555";
    pub const SHARED_MEMORY_SIZE: usize = 1024 * 1024 * 1024; // 1 GiB
    pub const DEFAULT_THROTTLE_RATE: u32 = 100_000;
    pub const DEFAULT_REPLAY_SPEED: f64 = 1.0;
    pub const MICROBURST_THRESHOLD: u32 = 50_000;
    pub const LOG_LEVEL: &str = "INFO";
    pub const MONITORING_INTERVAL: u64 = 1;

    pub fn worker_threads() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_file: defaults::INPUT_FILE.into(),
            symbols_file: String::new(),
            zmq_endpoint: defaults::ZMQ_ENDPOINT.into(),
            shared_memory_size: defaults::SHARED_MEMORY_SIZE,
            worker_threads: defaults::worker_threads(),
            cpu_affinity: true,
            default_throttle_rate: defaults::DEFAULT_THROTTLE_RATE,
            default_replay_speed: defaults::DEFAULT_REPLAY_SPEED,
            microburst_threshold: defaults::MICROBURST_THRESHOLD,
            log_level: defaults::LOG_LEVEL.into(),
            enable_monitoring: true,
            monitoring_interval: defaults::MONITORING_INTERVAL,
        }
    }
}

impl Config {
    /// Loads configuration from `path`. A file that cannot be opened because
    /// it does not exist is not an error: defaults apply. Any other read
    /// failure, or an unparseable value, is reported.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Self::parse(&contents)
    }

    /// Parses the `key=value` body. Unknown keys are ignored so configs can
    /// carry keys for external collaborators.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let line_no = index + 1;

            match key {
                "input_file" => config.input_file = value.into(),
                "symbols_file" => config.symbols_file = value.into(),
                "zmq_endpoint" => config.zmq_endpoint = value.into(),
                "shared_memory_size" => {
                    config.shared_memory_size = parse_num(key, value, line_no)?;
                }
                "worker_threads" => {
                    let requested: i64 = parse_num(key, value, line_no)?;
                    config.worker_threads = if requested <= 0 {
                        defaults::worker_threads()
                    } else {
                        requested as usize
                    };
                }
                "cpu_affinity" => config.cpu_affinity = value == "true",
                "default_throttle_rate" => {
                    config.default_throttle_rate = parse_num(key, value, line_no)?;
                }
                "default_replay_speed" => {
                    config.default_replay_speed = parse_num(key, value, line_no)?;
                }
                "microburst_threshold" => {
                    config.microburst_threshold = parse_num(key, value, line_no)?;
                }
                "log_level" => config.log_level = value.into(),
                "enable_monitoring" => config.enable_monitoring = value == "true",
                "monitoring_interval" => {
                    config.monitoring_interval = parse_num(key, value, line_no)?;
                }
                _ => {}
            }
        }

        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(
    key: &str,
    value: &str,
    line: usize,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Parse {
        key: key.into(),
        line,
        value: value.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_interface_table() {
        let config = Config::default();
        assert_eq!(config.input_file, "data/sample.itch");
        assert_eq!(config.zmq_endpoint, "tcp://*:5555");
        assert_eq!(config.shared_memory_size, 1 << 30);
        assert_eq!(config.default_throttle_rate, 100_000);
        assert_eq!(config.default_replay_speed, 1.0);
        assert_eq!(config.microburst_threshold, 50_000);
        assert!(config.cpu_affinity);
        assert!(config.enable_monitoring);
        assert_eq!(config.monitoring_interval, 1);
    }

    #[test]
    fn parses_keys_comments_and_whitespace() {
        let config = Config::parse(
            "# capture\n\
             input_file = /tmp/feed.itch\n\
             \n\
             worker_threads=4\n\
             cpu_affinity = false\n\
             default_replay_speed = 2.5\n\
             unknown_key = whatever\n",
        )
        .unwrap();
        assert_eq!(config.input_file, "/tmp/feed.itch");
        assert_eq!(config.worker_threads, 4);
        assert!(!config.cpu_affinity);
        assert_eq!(config.default_replay_speed, 2.5);
    }

    #[test]
    fn nonpositive_worker_count_falls_back_to_hardware() {
        let config = Config::parse("worker_threads=0\n").unwrap();
        assert!(config.worker_threads >= 1);
        let config = Config::parse("worker_threads=-2\n").unwrap();
        assert!(config.worker_threads >= 1);
    }

    #[test]
    fn bad_numeric_value_is_reported_with_line() {
        let err = Config::parse("shared_memory_size=huge\n").unwrap_err();
        match err {
            ConfigError::Parse { key, line, .. } => {
                assert_eq!(key, "shared_memory_size");
                assert_eq!(line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load("/definitely/not/here.conf").unwrap();
        assert_eq!(config.default_throttle_rate, 100_000);
    }
}
