use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WitnessError, WitnessResult};
use crate::pair::WitnessPair;

/// How an investigation was opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationTrigger {
    /// Correlation crossed the threshold.
    Automatic,
    Manual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Cleared,
    Confirmed,
}

/// Investigation lifecycle. Only `Active` may be resolved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvestigationStatus {
    Active,
    Cleared {
        resolver: String,
        reason: String,
        resolved_at: DateTime<Utc>,
    },
    Confirmed {
        resolver: String,
        reason: String,
        resolved_at: DateTime<Utc>,
    },
}

impl InvestigationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InvestigationStatus::Active => "active",
            InvestigationStatus::Cleared { .. } => "cleared",
            InvestigationStatus::Confirmed { .. } => "confirmed",
        }
    }
}

/// Blocking state of a witness pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairStatus {
    Suspended { investigation_id: Uuid },
    Banned { investigation_id: Uuid },
}

impl PairStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PairStatus::Suspended { .. } => "suspended",
            PairStatus::Banned { .. } => "banned",
        }
    }

    pub fn investigation_id(&self) -> Uuid {
        match self {
            PairStatus::Suspended { investigation_id } | PairStatus::Banned { investigation_id } => {
                *investigation_id
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub investigation_id: Uuid,
    pub pair: WitnessPair,
    pub correlation_score: f64,
    /// Confirmed breaches in the window that involved both witnesses.
    pub breach_ids: Vec<String>,
    /// Anomalies involving both witnesses, kept as supporting evidence.
    pub anomaly_ids: Vec<String>,
    /// Caller-supplied evidence references for manual investigations.
    pub evidence: Vec<String>,
    pub trigger: InvestigationTrigger,
    pub opened_at: DateTime<Utc>,
    pub status: InvestigationStatus,
}

impl Investigation {
    pub fn open(
        pair: WitnessPair,
        correlation_score: f64,
        breach_ids: Vec<String>,
        anomaly_ids: Vec<String>,
        evidence: Vec<String>,
        trigger: InvestigationTrigger,
    ) -> Self {
        Self {
            investigation_id: Uuid::new_v4(),
            pair,
            correlation_score,
            breach_ids,
            anomaly_ids,
            evidence,
            trigger,
            opened_at: Utc::now(),
            status: InvestigationStatus::Active,
        }
    }

    pub fn pair_key(&self) -> String {
        self.pair.pair_key()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, InvestigationStatus::Active)
    }

    /// Apply a resolution. Fails for anything but an active investigation
    /// and for a blank resolver or reason.
    pub fn resolve(
        &self,
        outcome: ResolutionOutcome,
        reason: &str,
        resolver: &str,
    ) -> WitnessResult<Investigation> {
        if resolver.trim().is_empty() {
            return Err(WitnessError::MissingResolution("resolver"));
        }
        if reason.trim().is_empty() {
            return Err(WitnessError::MissingResolution("reason"));
        }

        let status = match (&self.status, outcome) {
            (InvestigationStatus::Active, ResolutionOutcome::Cleared) => {
                InvestigationStatus::Cleared {
                    resolver: resolver.to_owned(),
                    reason: reason.to_owned(),
                    resolved_at: Utc::now(),
                }
            }
            (InvestigationStatus::Active, ResolutionOutcome::Confirmed) => {
                InvestigationStatus::Confirmed {
                    resolver: resolver.to_owned(),
                    reason: reason.to_owned(),
                    resolved_at: Utc::now(),
                }
            }
            (InvestigationStatus::Cleared { .. } | InvestigationStatus::Confirmed { .. }, _) => {
                return Err(WitnessError::AlreadyResolved {
                    id: self.investigation_id,
                    status: self.status.label().to_owned(),
                });
            }
        };

        Ok(Investigation {
            status,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active() -> Investigation {
        Investigation::open(
            WitnessPair::new("w1", "w2"),
            0.9,
            vec!["b-1".into()],
            vec![],
            vec![],
            InvestigationTrigger::Automatic,
        )
    }

    #[test]
    fn active_can_be_cleared_once() {
        let cleared = active()
            .resolve(ResolutionOutcome::Cleared, "coincidental rota", "steward-1")
            .unwrap();
        assert_eq!(cleared.status.label(), "cleared");

        let err = cleared
            .resolve(ResolutionOutcome::Confirmed, "second look", "steward-2")
            .unwrap_err();
        assert!(matches!(err, WitnessError::AlreadyResolved { .. }));
    }

    #[test]
    fn resolver_and_reason_are_required() {
        assert_eq!(
            active()
                .resolve(ResolutionOutcome::Cleared, "fine", " ")
                .unwrap_err(),
            WitnessError::MissingResolution("resolver")
        );
        assert_eq!(
            active()
                .resolve(ResolutionOutcome::Confirmed, "", "steward-1")
                .unwrap_err(),
            WitnessError::MissingResolution("reason")
        );
    }

    #[test]
    fn status_serializes_as_tagged() {
        let confirmed = active()
            .resolve(ResolutionOutcome::Confirmed, "shared keys", "steward-1")
            .unwrap();
        let value = serde_json::to_value(&confirmed.status).unwrap();
        assert_eq!(value["status"], "confirmed");
        assert_eq!(value["resolver"], "steward-1");
    }
}
