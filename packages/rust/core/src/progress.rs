//! Progress reporting hooks for a territory run.

use icpqualifier_shared::{CandidateCompany, QualifiedCompany};

use crate::pipeline::RunReport;

/// Progress callback for reporting pipeline status.
pub trait PipelineProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before discovery for each profile (1-based index).
    fn profile_started(&self, index: usize, total: usize, profile: &str);
    /// Called when a candidate passes relevance scoring.
    fn candidate_accepted(&self, candidate: &CandidateCompany);
    /// Called when a company passes the revenue threshold.
    fn company_qualified(&self, company: &QualifiedCompany);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn profile_started(&self, _index: usize, _total: usize, _profile: &str) {}
    fn candidate_accepted(&self, _candidate: &CandidateCompany) {}
    fn company_qualified(&self, _company: &QualifiedCompany) {}
    fn done(&self, _report: &RunReport) {}
}
