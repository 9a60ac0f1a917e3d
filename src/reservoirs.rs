/// Reservoir registry for the Yalong river chart service.
///
/// Defines the reservoirs the importer queries and the dashboard knows about,
/// along with display metadata and the normal pool level used as a reference
/// line on the level axis. Reservoirs not listed here still chart normally;
/// they just get no reference line.

// ---------------------------------------------------------------------------
// Reservoir metadata
// ---------------------------------------------------------------------------

/// Metadata for a single reservoir.
pub struct Reservoir {
    /// Station name exactly as it appears in `reservoir_data.name` and in
    /// gateway responses (`zhanming`).
    pub name: &'static str,
    /// River the dam sits on.
    pub river: &'static str,
    /// Human-readable description of the reservoir's role in the cascade.
    pub description: &'static str,
    /// Normal pool level (正常蓄水位), metres.
    pub normal_pool_level_m: Option<f64>,
}

/// All reservoirs on the lower Yalong cascade, upstream to downstream.
pub static RESERVOIR_REGISTRY: &[Reservoir] = &[
    Reservoir {
        name: "锦屏一级",
        river: "雅砻江",
        description: "Seasonal-regulation reservoir at the head of the lower \
                      cascade. Its releases drive the levels of everything \
                      downstream.",
        normal_pool_level_m: Some(1880.0),
    },
    Reservoir {
        name: "官地",
        river: "雅砻江",
        description: "Daily-regulation run-of-river reservoir between Jinping \
                      and Ertan. Level moves within a narrow band.",
        normal_pool_level_m: Some(1330.0),
    },
    Reservoir {
        name: "二滩",
        river: "雅砻江",
        description: "Large seasonal reservoir near the Jinsha confluence. \
                      Storage swings are the clearest signal of cascade \
                      operations.",
        normal_pool_level_m: Some(1200.0),
    },
];

/// Names of every registered reservoir, upstream first. This is the query
/// list for gateway imports.
pub fn all_reservoir_names() -> Vec<&'static str> {
    RESERVOIR_REGISTRY.iter().map(|r| r.name).collect()
}

/// Looks up a reservoir by name. Returns `None` if not registered.
pub fn find_reservoir(name: &str) -> Option<&'static Reservoir> {
    RESERVOIR_REGISTRY.iter().find(|r| r.name == name.trim())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_duplicate_names() {
        let mut seen = std::collections::HashSet::new();
        for reservoir in RESERVOIR_REGISTRY {
            assert!(
                seen.insert(reservoir.name),
                "duplicate reservoir '{}' found in RESERVOIR_REGISTRY",
                reservoir.name
            );
        }
    }

    #[test]
    fn test_registry_contains_cascade_reservoirs() {
        let names = all_reservoir_names();
        for expected in ["二滩", "锦屏一级", "官地"] {
            assert!(names.contains(&expected), "registry missing '{}'", expected);
        }
    }

    #[test]
    fn test_pool_levels_decrease_downstream() {
        // Registry order is upstream to downstream, so each dam's normal pool
        // must sit below the one before it.
        let levels: Vec<f64> = RESERVOIR_REGISTRY
            .iter()
            .filter_map(|r| r.normal_pool_level_m)
            .collect();
        for pair in levels.windows(2) {
            assert!(pair[0] > pair[1], "pool levels out of order: {:?}", levels);
        }
    }

    #[test]
    fn test_find_reservoir_trims_whitespace() {
        let r = find_reservoir(" 二滩 ").expect("二滩 should be registered");
        assert_eq!(r.normal_pool_level_m, Some(1200.0));
    }

    #[test]
    fn test_find_reservoir_returns_none_for_unknown_name() {
        assert!(find_reservoir("三峡").is_none());
    }
}
