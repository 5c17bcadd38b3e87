// SPDX-License-Identifier: GPL-3.0-or-later
use structopt::StructOpt;

use std::path::PathBuf;

#[derive(Debug, StructOpt)]
#[structopt(about = "Overlay a thermal camera on a visible camera and serve the result as MJPEG.")]
pub(crate) struct Args {
    /// Path to a configuration file.
    #[structopt(short, long, parse(from_os_str), default_value = "config.toml")]
    pub(crate) config_path: PathBuf,

    /// Log more. Can be given multiple times. `RUST_LOG` takes precedence.
    #[structopt(short, long, parse(from_occurrences))]
    pub(crate) verbose: u8,
}

impl Args {
    /// The default log filter for the chosen verbosity.
    pub(crate) fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod cli_test {
    use std::path::Path;

    use structopt::StructOpt;

    use super::Args;

    #[test]
    fn defaults() {
        let args = Args::from_iter(&["thermal-fusion"]);
        assert_eq!(args.config_path, Path::new("config.toml"));
        assert_eq!(args.log_level(), "warn");
    }

    #[test]
    fn flags() {
        let args = Args::from_iter(&["thermal-fusion", "-vv", "--config-path", "/etc/tf.toml"]);
        assert_eq!(args.config_path, Path::new("/etc/tf.toml"));
        assert_eq!(args.log_level(), "debug");
        let args = Args::from_iter(&["thermal-fusion", "-c", "other.toml", "-vvvv"]);
        assert_eq!(args.config_path, Path::new("other.toml"));
        assert_eq!(args.log_level(), "trace");
    }
}
