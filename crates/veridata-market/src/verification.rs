//! # Verification Registry
//!
//! Append-only store of AI quality attestations, keyed by dataset
//! fingerprint and versioned monotonically. The registry never interprets
//! dataset content itself; scores and anomaly counts arrive as opaque inputs
//! from accounts holding the verifier capability.
//!
//! ## Storage model
//!
//! Records live in an immutable log keyed by `(fingerprint, version)` with a
//! separate latest-pointer map. A stored version is never mutated in place,
//! only superseded by `latest + 1`. Only the latest version per fingerprint
//! is authoritative for `is_verified`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use veridata_core::{
    valid_content_ref, AccountId, Fingerprint, Hash256, MarketError, Result,
};

use crate::policy::{AuthorityPolicy, Capability};

/// Attestation submitted by a verifier
///
/// `provider` names the dataset submitter; a passing attestation mints the
/// asset to this account. `is_private` and `decryption_key` pass through to
/// the mint and are not stored in the registry itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationInput {
    pub fingerprint: Fingerprint,
    pub verification_hash: Hash256,
    pub passed: bool,
    /// Overall quality, 0-100
    pub quality_score: u8,
    /// Demographic/sample diversity, 0-100
    pub diversity_score: u8,
    /// Demographic balance, 0-100 (100 = balanced)
    pub bias_score: u8,
    /// Statistical outliers flagged by the model, unbounded
    pub anomaly_count: u64,
    /// Rows duplicated inside or across known datasets, unbounded
    pub duplicate_count: u64,
    /// Missing-value cells found during the quality pass
    pub missing_values: u64,
    /// Columns with unexpected types
    pub incorrect_types: u64,
    /// Whether the PII scan flagged anything
    pub pii_detected: bool,
    /// URI of the dataset content
    pub content_ref: String,
    /// URI of the full analysis report
    pub report_ref: String,
    pub is_private: bool,
    pub decryption_key: Option<String>,
    pub provider: AccountId,
}

/// A stored attestation; immutable once written
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub fingerprint: Fingerprint,
    /// Monotonic per fingerprint, starts at 1
    pub version: u32,
    pub verification_hash: Hash256,
    pub passed: bool,
    pub quality_score: u8,
    pub diversity_score: u8,
    pub bias_score: u8,
    pub anomaly_count: u64,
    pub duplicate_count: u64,
    pub missing_values: u64,
    pub incorrect_types: u64,
    pub pii_detected: bool,
    pub content_ref: String,
    pub report_ref: String,
    /// Submission time, Utc seconds
    pub timestamp: i64,
}

/// Versioned attestation store
pub struct VerificationRegistry {
    policy: Arc<AuthorityPolicy>,
    /// Immutable record log keyed by (fingerprint, version)
    records: RwLock<BTreeMap<(Fingerprint, u32), VerificationRecord>>,
    /// Latest authoritative version per fingerprint
    latest: RwLock<HashMap<Fingerprint, u32>>,
}

impl VerificationRegistry {
    pub fn new(policy: Arc<AuthorityPolicy>) -> Self {
        Self {
            policy,
            records: RwLock::new(BTreeMap::new()),
            latest: RwLock::new(HashMap::new()),
        }
    }

    /// Store a new attestation version
    ///
    /// Caller must hold `SubmitVerification`. On success the record is
    /// permanent; failed validation stores nothing and leaves the version
    /// counter untouched.
    pub fn submit(&self, caller: &AccountId, input: &VerificationInput) -> Result<VerificationRecord> {
        self.policy.require(caller, Capability::SubmitVerification)?;
        Self::validate(input)?;

        let mut latest = self.latest.write();
        let version = latest.get(&input.fingerprint).copied().unwrap_or(0) + 1;

        let record = VerificationRecord {
            fingerprint: input.fingerprint,
            version,
            verification_hash: input.verification_hash,
            passed: input.passed,
            quality_score: input.quality_score,
            diversity_score: input.diversity_score,
            bias_score: input.bias_score,
            anomaly_count: input.anomaly_count,
            duplicate_count: input.duplicate_count,
            missing_values: input.missing_values,
            incorrect_types: input.incorrect_types,
            pii_detected: input.pii_detected,
            content_ref: input.content_ref.clone(),
            report_ref: input.report_ref.clone(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        self.records
            .write()
            .insert((input.fingerprint, version), record.clone());
        latest.insert(input.fingerprint, version);

        debug!(
            fingerprint = %input.fingerprint,
            version,
            passed = input.passed,
            "verification recorded"
        );
        Ok(record)
    }

    /// Whether the latest version for a fingerprint passed; false for unknown fingerprints
    pub fn is_verified(&self, fingerprint: &Fingerprint) -> bool {
        let latest = self.latest.read();
        let Some(version) = latest.get(fingerprint) else {
            return false;
        };
        self.records
            .read()
            .get(&(*fingerprint, *version))
            .map(|r| r.passed)
            .unwrap_or(false)
    }

    /// Point lookup of a specific version
    pub fn get_version(&self, fingerprint: &Fingerprint, version: u32) -> Result<VerificationRecord> {
        self.records
            .read()
            .get(&(*fingerprint, version))
            .cloned()
            .ok_or(MarketError::RecordNotFound {
                fingerprint: *fingerprint,
                version,
            })
    }

    /// Latest record for a fingerprint
    pub fn get_latest(&self, fingerprint: &Fingerprint) -> Result<VerificationRecord> {
        let version = self
            .latest
            .read()
            .get(fingerprint)
            .copied()
            .ok_or(MarketError::RecordNotFound {
                fingerprint: *fingerprint,
                version: 0,
            })?;
        self.get_version(fingerprint, version)
    }

    /// Latest version number, if any record exists
    pub fn latest_version(&self, fingerprint: &Fingerprint) -> Option<u32> {
        self.latest.read().get(fingerprint).copied()
    }

    fn validate(input: &VerificationInput) -> Result<()> {
        if input.fingerprint.is_zero() {
            return Err(MarketError::InvalidInput("fingerprint is zero".into()));
        }
        if input.verification_hash == [0u8; 32] {
            return Err(MarketError::InvalidInput("verification hash is zero".into()));
        }
        for (name, score) in [
            ("quality_score", input.quality_score),
            ("diversity_score", input.diversity_score),
            ("bias_score", input.bias_score),
        ] {
            if score > 100 {
                return Err(MarketError::InvalidInput(format!(
                    "{} {} exceeds 100",
                    name, score
                )));
            }
        }
        if !valid_content_ref(&input.content_ref) {
            return Err(MarketError::InvalidInput(format!(
                "content_ref '{}' is empty or has an unaccepted scheme",
                input.content_ref
            )));
        }
        if !valid_content_ref(&input.report_ref) {
            return Err(MarketError::InvalidInput(format!(
                "report_ref '{}' is empty or has an unaccepted scheme",
                input.report_ref
            )));
        }
        if input.provider.is_zero() {
            return Err(MarketError::InvalidInput("provider account is zero".into()));
        }
        Ok(())
    }
}
