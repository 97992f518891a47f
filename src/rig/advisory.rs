use crate::tier::TierBudget;

use super::mesh::MeshProfile;

/// Optional caps from an external mesh analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RigAdvice {
    pub bone_cap: Option<usize>,
    pub morph_cap: Option<usize>,
    /// Free-form origin of the advice, for logs and reports.
    pub source: String,
}

/// Seam for an optional analysis service that may suggest lower counts for a
/// mesh. Advice can only lower the tier maxima, never raise them.
pub trait RigAdvisor: Send + Sync {
    fn advise(&self, profile: &MeshProfile, budget: &TierBudget) -> Option<RigAdvice>;
}

/// Fixed caps, e.g. from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAdvisor {
    pub bone_cap: Option<usize>,
    pub morph_cap: Option<usize>,
}

impl RigAdvisor for StaticAdvisor {
    fn advise(&self, _profile: &MeshProfile, _budget: &TierBudget) -> Option<RigAdvice> {
        if self.bone_cap.is_none() && self.morph_cap.is_none() {
            return None;
        }
        Some(RigAdvice {
            bone_cap: self.bone_cap,
            morph_cap: self.morph_cap,
            source: "static".to_string(),
        })
    }
}

/// Apply `advisor` to `budget`. Returns the effective budget and whether it
/// was lowered.
pub fn apply(
    advisor: Option<&dyn RigAdvisor>,
    profile: &MeshProfile,
    budget: &TierBudget,
) -> (TierBudget, bool) {
    let Some(advice) = advisor.and_then(|advisor| advisor.advise(profile, budget)) else {
        return (budget.clone(), false);
    };

    let capped = budget.capped(advice.bone_cap, advice.morph_cap);
    let lowered = capped != *budget;
    if lowered {
        log::info!(
            "advisor '{}' lowered limits to {} bone(s), {} morph(s)",
            advice.source,
            capped.max_bones,
            capped.max_morph_targets
        );
    }
    (capped, lowered)
}
