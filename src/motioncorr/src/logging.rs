
use std::env;
use std::ops::Deref;

use anyhow::{Context, Result};
use display_error_chain::ErrorChainExt;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::UtcOffset;
use tracing::{debug, error, warn};
use tracing::dispatcher::DefaultGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use tracing_subscriber::fmt::format::{Format, Full};
use tracing_subscriber::fmt::time::OffsetTime;


/// overrides the --log filter, for pipelines that can't change the command line
pub const ENV_LOG: &'static str = "MOTIONCORR_LOG";


pub fn init(log: impl AsRef<str>) -> Result<()> {

	let env_log = env::var(ENV_LOG).ok()
		.filter(|log| !log.trim().is_empty());
	let filter = match &env_log {
		Some(log) => log_filter(log)
			.context(format!("Bad {}", ENV_LOG))?,
		None => log_filter(log)?
	};

	let log_subscriber = FmtSubscriber::builder()
		.with_env_filter(filter)
		.event_format(log_format())
		.finish();

	tracing::subscriber::set_global_default(log_subscriber)
		.context("Failed to set logging subscriber")?;

	if let Some(log) = env_log {
		debug!("Log filter from {}: {}", ENV_LOG, log);
	}

	Ok(())
}


/// everything from this crate, to the test harness's captured output
pub fn init_test() -> DefaultGuard {

	let subscriber = FmtSubscriber::builder()
		.with_env_filter(EnvFilter::new("motioncorr=trace"))
		.event_format(log_format())
		.with_test_writer()
		.finish();

	tracing::subscriber::set_default(subscriber)
}


fn log_filter(log: impl AsRef<str>) -> Result<EnvFilter> {
	let log = log.as_ref();
	EnvFilter::builder()
		.parse(log)
		.context(format!("Failed to parse log value: {}", log))
}


fn log_format() -> Format<Full,OffsetTime<&'static [FormatItem<'static>]>> {

	let time_format = format_description!(
		version = 2,
		"[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:4] [offset_hour sign:mandatory]:[offset_minute]"
	);

	let time_offset = UtcOffset::current_local_offset()
		.unwrap_or(UtcOffset::UTC);

	Format::default()
		.with_timer(OffsetTime::new(time_offset, time_format))
		.with_target(false)
}


/// Logs the whole error chain, so gain and resolver errors show their causes too.
pub trait ResultExt<T> {
	fn log_err(self) -> Result<T,()>;
	fn warn_err(self) -> Result<T,()>;
}

impl<T,E> ResultExt<T> for Result<T,E>
	where
		E: Into<anyhow::Error>
{

	fn log_err(self) -> Result<T,()> {
		self.map_err(|e| {
			let e: anyhow::Error = e.into();
			error!("{}", e.deref().chain());
		})
	}

	fn warn_err(self) -> Result<T,()> {
		self.map_err(|e| {
			let e: anyhow::Error = e.into();
			warn!("{}", e.deref().chain());
		})
	}
}


#[cfg(test)]
mod test {

	use galvanic_assert::{assert_that, matchers::*};

	use super::*;
	use crate::gain::GainError;


	#[test]
	fn filters() {
		assert!(log_filter("motioncorr=debug").is_ok());
		assert!(log_filter("motioncorr=loud").is_err());
	}


	#[test]
	fn typed_errors() {
		let _logging = init_test();
		let result: Result<u32,GainError> = Err(GainError::format("not a gain"));
		assert_that!(&result.log_err(), eq(Err(())));
		let result: Result<u32,GainError> = Ok(5);
		assert_that!(&result.warn_err(), eq(Ok(5)));
	}
}
