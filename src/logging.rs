use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

use crate::error::{Error, Result};

/// Set up logging to stderr for binaries embedding the client.
///
/// Library consumers that bring their own `log` implementation should not
/// call this; the crate itself only ever logs through the facade.
pub fn init(level: LevelFilter) -> Result<()> {
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} {h({l})} {t} - {m}{n}",
        )))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| Error::Precondition(format!("invalid logging configuration: {err}")))?;
    log4rs::init_config(config)
        .map_err(|err| Error::Precondition(format!("logging already initialised: {err}")))?;
    Ok(())
}
