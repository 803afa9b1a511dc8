use crate::contour::DEFAULT_LEVEL;
use crate::overlap::RuleTable;

/// Conversion parameters.
///
/// Defaults: contour level 0.8, one component kept per detection, and the
/// floor-plan suppression rules.
#[derive(Debug, Clone)]
pub struct Params {
    /// Iso level for contour extraction, strictly between 0 and 1.
    pub level: f64,
    /// Connected components kept per detection mask when denoising.
    pub components_per_detection: usize,
    /// Cross-label suppression rules.
    pub rules: RuleTable,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            level: DEFAULT_LEVEL,
            components_per_detection: 1,
            rules: RuleTable::floor_plan(),
        }
    }
}

impl Params {
    pub fn with_rules(rules: RuleTable) -> Self {
        Params {
            rules,
            ..Params::default()
        }
    }
}
