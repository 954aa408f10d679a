// self
use crate::{_prelude::*, obs::FlowStage};

/// Future returned by [`StageSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(feature = "tracing")]
pub type InstrumentedStage<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`StageSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedStage<F> = F;

/// `token_vault_flow.stage` span covering one identity, exchange, or listing call.
///
/// The span carries `stage` and `variant` from the start. `broker_status` stays empty until the
/// exchange stage reports the HTTP status the broker answered with.
#[derive(Clone, Debug)]
pub struct StageSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl StageSpan {
	/// Opens the span for `stage` of a flow running against the `variant` broker.
	pub fn new(stage: FlowStage, variant: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"token_vault_flow.stage",
				stage = stage.as_str(),
				variant,
				broker_status = tracing::field::Empty,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (stage, variant);

			Self {}
		}
	}

	/// Runs `fut` inside the span.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedStage<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}

	/// Records the broker's HTTP status; a non-2xx status means listing will be skipped.
	pub fn record_broker_status(&self, status: u16) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("broker_status", status);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = status;
		}
	}
}

/// Logs a stage failure with its root cause. The cause never contains token material.
pub fn stage_failed(stage: FlowStage, cause: &str) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(stage = stage.as_str(), cause, "Token flow stage failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (stage, cause);
	}
}

/// Logs why the listing stage did not run.
pub fn listing_skipped(reason: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(reason, "Downstream listing skipped.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = reason;
	}
}

/// Logs that the downstream API had more entries than the first page returned.
pub fn listing_truncated(listed: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(listed, "Downstream listing has more pages; only the first is shown.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = listed;
	}
}
