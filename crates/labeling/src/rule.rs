//! Initiation thresholds.

use storm_common::report;

/// Thresholds a grid point must meet to count as convective initiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelRule {
    /// Minimum -10C reflectivity in dBz.
    pub ref_dbz: f32,
    /// Minimum most-unstable CAPE in J/kg.
    pub cape: f32,
    /// Most negative most-unstable CIN in J/kg still allowed; points with
    /// deeper inhibition never activate.
    pub cin: f32,
    /// Minimum number of other active points the neighborhood must hold.
    pub touch: u32,
}

impl Default for LabelRule {
    fn default() -> Self {
        Self {
            ref_dbz: 35.0,
            cape: 100.0,
            cin: -50.0,
            touch: 3,
        }
    }
}

impl LabelRule {
    /// Header line placed at the top of the instance log.
    pub fn banner(&self) -> String {
        report::rule_line(self.ref_dbz, self.cape, self.cin, self.touch as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_banner_wording() {
        assert_eq!(
            LabelRule::default().banner(),
            "Rule: At least 35 dBz reflectivity and 100 j/kg of MUCAPE and at most -50 j/kg \
             of MUCIN and touching at least 3 other point(s)"
        );
    }
}
