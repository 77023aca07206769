//! Report generation for verification results.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::verify::VerificationSummary;

/// Fixture input identified by content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureDigest {
    pub family: String,
    pub origin: String,
    pub sha256: String,
}

impl FixtureDigest {
    #[must_use]
    pub fn of(family: &str, origin: &str, content: &str) -> Self {
        Self {
            family: family.to_owned(),
            origin: origin.to_owned(),
            sha256: sha256_hex(content.as_bytes()),
        }
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub title: String,
    pub timestamp: String,
    pub fixtures: Vec<FixtureDigest>,
    pub summary: VerificationSummary,
}

impl ConformanceReport {
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        out.push_str("## Fixtures\n\n");
        out.push_str("| Family | Source | SHA-256 |\n");
        out.push_str("|--------|--------|---------|\n");
        for f in &self.fixtures {
            out.push_str(&format!("| {} | {} | `{}` |\n", f.family, f.origin, f.sha256));
        }

        out.push_str("\n## Cases\n\n");
        out.push_str("| Case | Family | Function | Status |\n");
        out.push_str("|------|--------|----------|--------|\n");
        for r in &self.summary.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.case_name, r.family, r.function, status
            ));
        }

        let failures: Vec<_> = self.summary.results.iter().filter(|r| !r.passed).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n");
            for r in failures {
                out.push_str(&format!("\n### {}\n\n```diff\n", r.case_name));
                out.push_str(r.diff.as_deref().unwrap_or(""));
                out.push_str("```\n");
            }
        }
        out
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}
