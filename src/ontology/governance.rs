// src/ontology/governance.rs
// Governance gates: decide the lifecycle status of a submitted definition.

use crate::config::Settings;

use super::types::{Governance, Status};

/// Threshold set for the publish/propose gates.
#[derive(Debug, Clone)]
pub struct GovernanceGates {
    pub publish_confidence: f64,
    pub publish_complexity: u32,
    pub publish_depth: u32,
    pub propose_confidence: f64,
    pub propose_complexity: u32,
    pub propose_depth: u32,
}

impl GovernanceGates {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            publish_confidence: settings.publish_confidence,
            publish_complexity: settings.publish_complexity,
            publish_depth: settings.publish_depth,
            propose_confidence: settings.propose_confidence,
            propose_complexity: settings.propose_complexity,
            propose_depth: settings.propose_depth,
        }
    }

    /// Gate a submitted definition: Published when it clears the strict
    /// thresholds, Proposed when it clears the loose ones, Rejected
    /// otherwise.
    pub fn evaluate(&self, g: &Governance) -> Status {
        if g.confidence >= self.publish_confidence
            && g.complexity <= self.publish_complexity
            && g.depth <= self.publish_depth
        {
            Status::Published
        } else if g.confidence >= self.propose_confidence
            && g.complexity <= self.propose_complexity
            && g.depth <= self.propose_depth
        {
            Status::Proposed
        } else {
            Status::Rejected
        }
    }
}

impl Default for GovernanceGates {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gov(confidence: f64, complexity: u32, depth: u32) -> Governance {
        Governance::new(confidence, complexity, depth, "test")
    }

    #[test]
    fn high_confidence_low_complexity_publishes() {
        let gates = GovernanceGates::default();
        assert_eq!(gates.evaluate(&gov(0.9, 3, 2)), Status::Published);
        // Boundary values publish
        assert_eq!(gates.evaluate(&gov(0.85, 5, 4)), Status::Published);
    }

    #[test]
    fn middling_definitions_are_proposed() {
        let gates = GovernanceGates::default();
        assert_eq!(gates.evaluate(&gov(0.6, 7, 6)), Status::Proposed);
        // Too complex to publish, acceptable to propose
        assert_eq!(gates.evaluate(&gov(0.9, 8, 2)), Status::Proposed);
    }

    #[test]
    fn weak_definitions_are_rejected() {
        let gates = GovernanceGates::default();
        assert_eq!(gates.evaluate(&gov(0.4, 3, 2)), Status::Rejected);
        assert_eq!(gates.evaluate(&gov(0.9, 10, 2)), Status::Rejected);
        assert_eq!(gates.evaluate(&gov(0.9, 3, 10)), Status::Rejected);
    }
}
