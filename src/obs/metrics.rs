// self
use crate::obs::{FlowStage, StageOutcome};

/// Bumps `token_vault_flow_stage_total` for `stage` and `outcome` when `metrics` is enabled.
pub fn record_stage_outcome(stage: FlowStage, outcome: StageOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"token_vault_flow_stage_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Bumps `token_vault_flow_broker_response_total`, labeled by the status class of the broker
/// answer.
pub fn record_broker_response(status: u16) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"token_vault_flow_broker_response_total",
			"class" => status_class(status)
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = status;
	}
}

/// Collapses an HTTP status into a bounded label such as `2xx`.
pub const fn status_class(status: u16) -> &'static str {
	match status {
		100..=199 => "1xx",
		200..=299 => "2xx",
		300..=399 => "3xx",
		400..=499 => "4xx",
		500..=599 => "5xx",
		_ => "other",
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_noops_without_a_recorder() {
		record_stage_outcome(FlowStage::Exchange, StageOutcome::Failure);
		record_broker_response(403);
	}

	#[test]
	fn broker_statuses_collapse_to_classes() {
		assert_eq!(status_class(200), "2xx");
		assert_eq!(status_class(302), "3xx");
		assert_eq!(status_class(403), "4xx");
		assert_eq!(status_class(503), "5xx");
		assert_eq!(status_class(42), "other");
	}
}
