use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `brands-worker` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for production.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "brands-worker",
    version,
    about = "Hosts the brands background worker pool"
)]
pub struct CliArgs {
    /// Number of worker threads in the pool.
    ///
    /// Defaults to the number of logical CPUs when unset. The pool never
    /// queues work, so this is also the maximum number of tasks in flight.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Seconds to wait for running tasks to finish on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,

    /// Interval in milliseconds between heartbeat tasks. `0` disables them.
    ///
    /// Environment variable: `HEARTBEAT_INTERVAL_MS`
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 5_000)]
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub num_workers: Option<usize>,
    pub shutdown_timeout: Duration,
    pub heartbeat_interval: Option<Duration>,
}

impl TryFrom<CliArgs> for HostConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == Some(0) {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.shutdown_timeout == 0 {
            bail!("SHUTDOWN_TIMEOUT must be greater than 0");
        }

        let heartbeat_interval = match args.heartbeat_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            num_workers: args.num_workers,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            heartbeat_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<HostConfig> {
        let argv = core::iter::once("brands-worker").chain(args.iter().copied());
        let args = CliArgs::try_parse_from(argv)?;
        HostConfig::try_from(args)
    }

    #[test]
    fn explicit_values_are_used() {
        let config = parse(&[
            "--num-workers",
            "3",
            "--shutdown-timeout",
            "2",
            "--heartbeat-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.num_workers, Some(3));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_millis(250)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = parse(&["--num-workers", "0"]).unwrap_err();
        assert!(err.to_string().contains("NUM_WORKERS"));
    }

    #[test]
    fn zero_shutdown_timeout_is_rejected() {
        let err = parse(&["--num-workers", "1", "--shutdown-timeout", "0"]).unwrap_err();
        assert!(err.to_string().contains("SHUTDOWN_TIMEOUT"));
    }

    #[test]
    fn zero_heartbeat_interval_disables_heartbeats() {
        let config = parse(&["--num-workers", "1", "--heartbeat-interval-ms", "0"]).unwrap();
        assert_eq!(config.heartbeat_interval, None);
    }
}
