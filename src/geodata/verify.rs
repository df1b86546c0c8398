//! Verification policy for externally supplied geodata.
//!
//! New coordinates are accepted only when they stay within a drift
//! threshold of the stored ones and, when strict checking is on, the
//! formatted address mentions the expected city and state. Rejections
//! never clear stored data; they only annotate the row.

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Great-circle distance between two WGS84 coordinate pairs.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = lat1.to_radians();
    let p2 = lat2.to_radians();
    let dphi = p2 - p1;
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Case-insensitive substring containment of the expected city and state
/// in a formatted address. An absent expectation always passes.
///
/// Known fragility, inherited from the original heuristic: a short city
/// name embedded in an unrelated word will false-positive.
pub fn locality_matches(
    formatted_address: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> bool {
    let haystack = formatted_address.unwrap_or("").to_lowercase();
    let contains = |needle: Option<&str>| match needle {
        Some(n) if !n.trim().is_empty() => haystack.contains(&n.trim().to_lowercase()),
        _ => true,
    };
    contains(city) && contains(state)
}

/// Best-effort city extraction from a free-text address: the
/// second-to-last comma-separated segment, e.g.
/// "201 W Main St, Arlington, TX 76010" -> "Arlington".
///
/// A bare two-letter uppercase segment is a state code, not a city.
/// Addresses with suite/unit segments will misparse; accepted as-is.
pub fn city_from_address(address: &str) -> Option<String> {
    let parts: Vec<&str> = address.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return None;
    }
    let candidate = parts[parts.len() - 2];
    if candidate.is_empty() {
        return None;
    }
    if candidate.len() == 2 && candidate.chars().all(|c| c.is_ascii_uppercase()) {
        return None;
    }
    Some(candidate.to_string())
}

/// Thresholds for coordinate acceptance.
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub max_drift_km: f64,
    pub strict_locality: bool,
}

/// Outcome of verifying a candidate coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Candidate coordinates may be written. Distance is `None` when no
    /// prior coordinates existed to measure against.
    Accepted { distance_km: Option<f64> },
    /// Drift from the stored coordinates exceeds the threshold.
    TooFar { distance_km: f64 },
    /// Formatted address does not mention the expected city/state.
    LocalityMismatch { distance_km: Option<f64> },
}

impl Verdict {
    pub fn distance_km(&self) -> Option<f64> {
        match self {
            Verdict::Accepted { distance_km } => *distance_km,
            Verdict::TooFar { distance_km } => Some(*distance_km),
            Verdict::LocalityMismatch { distance_km } => *distance_km,
        }
    }
}

/// Verify candidate coordinates against stored data.
///
/// Checks that do not apply (no prior coordinates, strictness off) pass
/// vacuously, per the policy of monotone improvement.
pub fn verify(
    policy: VerifyPolicy,
    prior: Option<(f64, f64)>,
    candidate: (f64, f64),
    formatted_address: Option<&str>,
    expected_city: Option<&str>,
    expected_state: Option<&str>,
) -> Verdict {
    let distance_km =
        prior.map(|(lat, lon)| haversine_km(lat, lon, candidate.0, candidate.1));

    if policy.strict_locality
        && !locality_matches(formatted_address, expected_city, expected_state)
    {
        return Verdict::LocalityMismatch { distance_km };
    }

    if let Some(d) = distance_km {
        if d > policy.max_drift_km {
            return Verdict::TooFar { distance_km: d };
        }
    }

    Verdict::Accepted { distance_km }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DALLAS: (f64, f64) = (32.7767, -96.7970);
    const FORT_WORTH: (f64, f64) = (32.7555, -97.3308);

    fn policy(max_drift_km: f64, strict: bool) -> VerifyPolicy {
        VerifyPolicy {
            max_drift_km,
            strict_locality: strict,
        }
    }

    #[test]
    fn haversine_of_a_point_with_itself_is_zero() {
        assert_eq!(haversine_km(DALLAS.0, DALLAS.1, DALLAS.0, DALLAS.1), 0.0);
    }

    #[test]
    fn dallas_fort_worth_is_a_short_hop() {
        let d = haversine_km(DALLAS.0, DALLAS.1, FORT_WORTH.0, FORT_WORTH.1);
        assert!(d > 30.0 && d < 60.0, "got {}", d);
    }

    #[test]
    fn drift_within_threshold_is_accepted() {
        let verdict = verify(policy(55.0, false), Some(DALLAS), FORT_WORTH, None, None, None);
        match verdict {
            Verdict::Accepted { distance_km: Some(d) } => assert!(d < 55.0),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn eighty_km_drift_is_rejected_at_fifty() {
        // ~0.72 degrees of latitude is ~80 km.
        let candidate = (DALLAS.0 + 0.7194, DALLAS.1);
        let verdict = verify(policy(50.0, false), Some(DALLAS), candidate, None, None, None);
        match verdict {
            Verdict::TooFar { distance_km } => {
                assert!((79.0..81.0).contains(&distance_km), "got {}", distance_km)
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn excessive_drift_is_rejected_with_the_distance() {
        // Austin is ~180 km from Dallas.
        let austin = (30.2672, -97.7431);
        let verdict = verify(policy(50.0, false), Some(DALLAS), austin, None, None, None);
        match verdict {
            Verdict::TooFar { distance_km } => assert!(distance_km > 150.0),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn no_prior_coordinates_accepts_without_a_distance() {
        let verdict = verify(policy(50.0, false), None, DALLAS, None, None, None);
        assert_eq!(verdict, Verdict::Accepted { distance_km: None });
    }

    #[test]
    fn strict_locality_requires_city_and_state() {
        let formatted = Some("201 W Main St, Arlington, TX 76010, USA");
        let ok = verify(
            policy(50.0, true),
            None,
            DALLAS,
            formatted,
            Some("Arlington"),
            Some("TX"),
        );
        assert!(matches!(ok, Verdict::Accepted { .. }));

        let bad = verify(
            policy(50.0, true),
            None,
            DALLAS,
            formatted,
            Some("Plano"),
            Some("TX"),
        );
        assert!(matches!(bad, Verdict::LocalityMismatch { .. }));
    }

    #[test]
    fn locality_match_is_case_insensitive_substring() {
        assert!(locality_matches(
            Some("1 Main St, ARLINGTON, tx 76010"),
            Some("arlington"),
            Some("TX"),
        ));
        // Missing expectations pass vacuously.
        assert!(locality_matches(Some("anything"), None, None));
        assert!(!locality_matches(None, Some("Arlington"), None));
    }

    #[test]
    fn city_parses_from_the_penultimate_segment() {
        assert_eq!(
            city_from_address("201 W Main St, Arlington, TX 76010").as_deref(),
            Some("Arlington")
        );
        assert_eq!(city_from_address("Arlington"), None);
        // Penultimate segment that is a bare state code is not a city.
        assert_eq!(city_from_address("201 W Main St, TX, 76010"), None);
    }
}
