// Copyright (c) 2018-2025  Brendan Molloy <brendan@bbqsrc.net>,
//                          Ilya Solovyiov <ilya.solovyiov@gmail.com>,
//                          Kai Ren <tyranron@gmail.com>
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! CLI options tuning the engine.
//!
//! [`Cli`] is a [`clap::Args`] group, so an embedding test binary flattens it
//! into its own options:
//! ```rust
//! # use kubestep::cli;
//! #[derive(cli::Parser)] // re-export of `clap::Parser`
//! struct Opts {
//!     #[command(flatten)]
//!     engine: cli::Cli,
//! }
//!
//! let opts = <Opts as cli::Parser>::parse_from(["suite", "--step-timeout", "5m"]);
//! assert_eq!(opts.engine.step_timeout, Some(std::time::Duration::from_secs(300)));
//! ```

use std::time::Duration;

use smart_default::SmartDefault;

use crate::{assertion, matcher};

pub use clap::{Args, Parser};

/// CLI options of the step [`Engine`].
///
/// [`Engine`]: crate::Engine
#[derive(Clone, Copy, Debug, SmartDefault, clap::Args)]
#[group(skip)]
pub struct Cli {
    /// Maximum duration of a single step. Unbounded if not specified.
    #[arg(long, value_name = "duration", value_parser = humantime::parse_duration, global = true)]
    pub step_timeout: Option<Duration>,

    /// Default timeout of eventually/consistently assertions.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration,
        default_value = "1m",
        global = true
    )]
    #[default(assertion::DEFAULT_TIMEOUT)]
    pub assertion_timeout: Duration,

    /// Interval of progress reports of long-running assertions.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration,
        default_value = "1s",
        global = true
    )]
    #[default(assertion::DEFAULT_PROGRESS_INTERVAL)]
    pub progress_interval: Duration,

    /// Delay before re-watching a resource after a transient error, unless
    /// the server suggests its own.
    #[arg(
        long,
        value_name = "duration",
        value_parser = humantime::parse_duration,
        default_value = "2s",
        global = true
    )]
    #[default(assertion::DEFAULT_RETRY_INTERVAL)]
    pub retry_interval: Duration,

    /// Maximum nesting of matchers inside matchers.
    #[arg(long, value_name = "int", default_value_t = matcher::DEFAULT_MAX_DEPTH, global = true)]
    #[default(matcher::DEFAULT_MAX_DEPTH)]
    pub max_matcher_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct Opts {
        #[command(flatten)]
        cli: Cli,
    }

    #[test]
    fn defaults_agree_with_clap() {
        let parsed = Opts::parse_from(["suite"]).cli;
        let default = Cli::default();

        assert_eq!(parsed.step_timeout, default.step_timeout);
        assert_eq!(parsed.assertion_timeout, default.assertion_timeout);
        assert_eq!(parsed.progress_interval, default.progress_interval);
        assert_eq!(parsed.retry_interval, default.retry_interval);
        assert_eq!(parsed.max_matcher_depth, default.max_matcher_depth);
    }

    #[test]
    fn parses_human_durations() {
        let cli = Opts::parse_from([
            "suite",
            "--assertion-timeout",
            "1m30s",
            "--retry-interval",
            "500ms",
            "--max-matcher-depth",
            "4",
        ])
        .cli;

        assert_eq!(cli.assertion_timeout, Duration::from_secs(90));
        assert_eq!(cli.retry_interval, Duration::from_millis(500));
        assert_eq!(cli.max_matcher_depth, 4);
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(Opts::try_parse_from(["suite", "--step-timeout", "soon"]).is_err());
    }
}
