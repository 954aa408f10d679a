//! Optional observability helpers for the token flow.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (default) to emit spans named `token_vault_flow.stage` with the `stage` and
//!   `variant` fields. The exchange span also gets `broker_status` once the broker answers. Events
//!   at stage boundaries never carry secrets.
//! - Enable `metrics` to count stage outcomes in `token_vault_flow_stage_total` (labels `stage`
//!   and `outcome`) and broker answers in `token_vault_flow_broker_response_total` (label
//!   `class`, e.g. `4xx`).

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Stages of the token flow observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowStage {
	/// Service identity acquisition.
	Identity,
	/// Token broker exchange.
	Exchange,
	/// Downstream folder listing.
	Listing,
}
impl FlowStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowStage::Identity => "identity",
			FlowStage::Exchange => "exchange",
			FlowStage::Listing => "listing",
		}
	}
}
impl Display for FlowStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure folded into the flow result.
	Failure,
	/// Stage intentionally not run.
	Skipped,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
			StageOutcome::Skipped => "skipped",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
