use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Initialize the global logger: timestamped, colored level, module target.
///
/// Only the first call in a process installs the logger; later calls return
/// an error which callers may ignore.
pub fn init_logging(level: LevelFilter) -> anyhow::Result<()> {
	let colors = ColoredLevelConfig::new()
		.error(Color::Red)
		.warn(Color::Yellow)
		.info(Color::Green)
		.debug(Color::Blue)
		.trace(Color::Magenta);

	fern::Dispatch::new()
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} {:<5} [{}] {}",
				chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				colors.color(record.level()),
				record.target(),
				message
			))
		})
		.level(level)
		// Keep dependency chatter out of the import/export log.
		.level_for("hyper", LevelFilter::Warn)
		.level_for("hyper_util", LevelFilter::Warn)
		.level_for("reqwest", LevelFilter::Warn)
		.chain(std::io::stderr())
		.apply()
		.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

	Ok(())
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn logging_initialization() {
		// Only one logger per process; the second call must fail cleanly.
		let _ = super::init_logging(log::LevelFilter::Debug);
		assert!(super::init_logging(log::LevelFilter::Debug).is_err());
	}
}
