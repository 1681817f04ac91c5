//! Sets up the `log4rs` logging backend: a console appender for operators
//! watching the process directly, and a rolling file appender for anything
//! that needs to be grepped after the fact.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} [{T}] {m}{n}";
const LOG_FILE: &str = "jeux.log";
const LOG_FILE_ROLLED: &str = "jeux.{}.log.gz";
const MAX_LOG_FILE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_ROLLED_LOG_FILES: i32 = 4;

/// Translates `-v` repeat count into a log level: 0 is the production
/// default, each additional flag turns on one more level of detail.
pub fn verbosity_to_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger. Safe to call at most once per process; a
/// second call is a no-op failure that callers can ignore.
pub fn init(level: LevelFilter) -> std::io::Result<()> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let trigger = SizeTrigger::new(MAX_LOG_FILE_BYTES);
    let roller = FixedWindowRoller::builder()
        .build(LOG_FILE_ROLLED, MAX_ROLLED_LOG_FILES)
        .expect("static roller pattern is always valid");
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));
    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(LOG_FILE, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("console")
                .appender("file")
                .build(level),
        )
        .expect("static log config is always valid");

    let _ = log4rs::init_config(config);
    Ok(())
}
