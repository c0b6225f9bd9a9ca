//! Climate Regime Module
//! The four aridity/radiation regimes used to stratify the analysis.

use plotters::style::RGBColor;

/// Climate regime of a model grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClimateRegime {
    WetWarm,
    WetCold,
    DryCold,
    DryWarm,
}

impl ClimateRegime {
    /// All regimes in plotting order.
    pub const ALL: [ClimateRegime; 4] = [
        ClimateRegime::WetWarm,
        ClimateRegime::WetCold,
        ClimateRegime::DryCold,
        ClimateRegime::DryWarm,
    ];

    /// Parse a regime label as written in the domains table.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "wet warm" => Some(ClimateRegime::WetWarm),
            "wet cold" => Some(ClimateRegime::WetCold),
            "dry cold" => Some(ClimateRegime::DryCold),
            "dry warm" => Some(ClimateRegime::DryWarm),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClimateRegime::WetWarm => "wet warm",
            ClimateRegime::WetCold => "wet cold",
            ClimateRegime::DryCold => "dry cold",
            ClimateRegime::DryWarm => "dry warm",
        }
    }

    /// Position used when sorting rows and ordering legend entries.
    pub fn sort_order(&self) -> u32 {
        match self {
            ClimateRegime::WetWarm => 0,
            ClimateRegime::WetCold => 1,
            ClimateRegime::DryCold => 2,
            ClimateRegime::DryWarm => 3,
        }
    }

    /// Diverging brown/teal palette colour.
    pub fn color(&self) -> RGBColor {
        match self {
            ClimateRegime::WetWarm => RGBColor(0x01, 0x85, 0x71), // #018571
            ClimateRegime::WetCold => RGBColor(0x80, 0xcd, 0xc1), // #80cdc1
            ClimateRegime::DryCold => RGBColor(0xdf, 0xc2, 0x7d), // #dfc27d
            ClimateRegime::DryWarm => RGBColor(0xa6, 0x61, 0x1a), // #a6611a
        }
    }
}

impl std::fmt::Display for ClimateRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_parse_back() {
        for regime in ClimateRegime::ALL {
            assert_eq!(ClimateRegime::from_label(regime.label()), Some(regime));
        }
        assert_eq!(ClimateRegime::from_label(" dry warm "), Some(ClimateRegime::DryWarm));
        assert_eq!(ClimateRegime::from_label("humid"), None);
    }

    #[test]
    fn test_sort_order_matches_plotting_order() {
        let orders: Vec<u32> = ClimateRegime::ALL.iter().map(|r| r.sort_order()).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);
    }
}
