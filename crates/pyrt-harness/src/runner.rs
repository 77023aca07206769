//! Test execution engine.

use crate::exec::execute;
use crate::fixtures::{FixtureCase, FixtureSet};
use crate::verify::{VerificationResult, render_diff};

/// Runs fixture sets and collects verification results.
pub struct TestRunner {
    /// Name of the verification campaign.
    pub campaign: String,
}

impl TestRunner {
    #[must_use]
    pub fn new(campaign: impl Into<String>) -> Self {
        Self {
            campaign: campaign.into(),
        }
    }

    /// Run every case in `set`, in order.
    #[must_use]
    pub fn run(&self, set: &FixtureSet) -> Vec<VerificationResult> {
        set.cases
            .iter()
            .map(|case| self.run_case(&set.family, case))
            .collect()
    }

    /// Execute one case and compare against its expected output.
    #[must_use]
    pub fn run_case(&self, family: &str, case: &FixtureCase) -> VerificationResult {
        run_case(family, case)
    }
}

fn run_case(family: &str, case: &FixtureCase) -> VerificationResult {
    let actual = match execute(&case.function, &case.inputs) {
        Ok(output) => output,
        Err(err) => format!("harness:{err}"),
    };
    let passed = actual == case.expected_output;
    VerificationResult {
        case_name: case.name.clone(),
        family: family.to_owned(),
        function: case.function.clone(),
        passed,
        diff: (!passed).then(|| render_diff(&case.expected_output, &actual)),
        expected: case.expected_output.clone(),
        actual,
    }
}
