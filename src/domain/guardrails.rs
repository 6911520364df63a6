use serde::{Deserialize, Serialize};

/// Post-LLM derived flags from momentum + institutional fragments
/// (spec.md §3, §4.8).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Guardrails {
    pub severe_momentum: bool,
    pub selling_pressure: bool,
}

impl Guardrails {
    pub fn derive(momentum_score: f64, institutional_label: &str, severe_threshold: f64) -> Self {
        Self {
            severe_momentum: momentum_score <= severe_threshold,
            selling_pressure: super::institutional::InstitutionalSignal::indicates_selling_pressure(
                institutional_label,
            ),
        }
    }

    pub fn any_triggered(&self) -> bool {
        self.severe_momentum || self.selling_pressure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_from_score_and_label() {
        let g = Guardrails::derive(10.0, "減碼", 20.0);
        assert!(g.severe_momentum);
        assert!(g.selling_pressure);
        assert!(g.any_triggered());
    }

    #[test]
    fn healthy_inputs_trigger_nothing() {
        let g = Guardrails::derive(80.0, "加碼", 20.0);
        assert!(!g.any_triggered());
    }
}
