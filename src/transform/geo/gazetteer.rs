//! Offline gazetteer used when no geocoding credential is configured
//!
//! Accuracy contract: only exact names resolve (case-insensitive, with
//! whitespace normalised). US state names and postal abbreviations map to
//! `US-XX`, a fixed table of well-known US cities maps to a single state
//! each, and country names map to ISO 3166-1 alpha-2 codes. Coordinates
//! resolve only to a one-decimal grid cell with no region.

use rustc_hash::FxHashMap;

use super::{GeoPlace, GeoQuery};

const US_STATES: &[(&str, &str)] = &[
    ("alabama", "AL"),
    ("alaska", "AK"),
    ("arizona", "AZ"),
    ("arkansas", "AR"),
    ("california", "CA"),
    ("colorado", "CO"),
    ("connecticut", "CT"),
    ("delaware", "DE"),
    ("district of columbia", "DC"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("hawaii", "HI"),
    ("idaho", "ID"),
    ("illinois", "IL"),
    ("indiana", "IN"),
    ("iowa", "IA"),
    ("kansas", "KS"),
    ("kentucky", "KY"),
    ("louisiana", "LA"),
    ("maine", "ME"),
    ("maryland", "MD"),
    ("massachusetts", "MA"),
    ("michigan", "MI"),
    ("minnesota", "MN"),
    ("mississippi", "MS"),
    ("missouri", "MO"),
    ("montana", "MT"),
    ("nebraska", "NE"),
    ("nevada", "NV"),
    ("new hampshire", "NH"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("new york", "NY"),
    ("north carolina", "NC"),
    ("north dakota", "ND"),
    ("ohio", "OH"),
    ("oklahoma", "OK"),
    ("oregon", "OR"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south carolina", "SC"),
    ("south dakota", "SD"),
    ("tennessee", "TN"),
    ("texas", "TX"),
    ("utah", "UT"),
    ("vermont", "VT"),
    ("virginia", "VA"),
    ("washington", "WA"),
    ("west virginia", "WV"),
    ("wisconsin", "WI"),
    ("wyoming", "WY"),
    ("puerto rico", "PR"),
];

// Ambiguous names resolve to the single state listed here
const US_CITIES: &[(&str, &str)] = &[
    ("new york", "NY"),
    ("new york city", "NY"),
    ("los angeles", "CA"),
    ("chicago", "IL"),
    ("houston", "TX"),
    ("phoenix", "AZ"),
    ("philadelphia", "PA"),
    ("san antonio", "TX"),
    ("san diego", "CA"),
    ("dallas", "TX"),
    ("austin", "TX"),
    ("san jose", "CA"),
    ("san francisco", "CA"),
    ("seattle", "WA"),
    ("denver", "CO"),
    ("boston", "MA"),
    ("detroit", "MI"),
    ("nashville", "TN"),
    ("memphis", "TN"),
    ("portland", "OR"),
    ("las vegas", "NV"),
    ("baltimore", "MD"),
    ("milwaukee", "WI"),
    ("albuquerque", "NM"),
    ("atlanta", "GA"),
    ("miami", "FL"),
    ("orlando", "FL"),
    ("tampa", "FL"),
    ("minneapolis", "MN"),
    ("cleveland", "OH"),
    ("columbus", "OH"),
    ("cincinnati", "OH"),
    ("pittsburgh", "PA"),
    ("st. louis", "MO"),
    ("saint louis", "MO"),
    ("kansas city", "MO"),
    ("new orleans", "LA"),
    ("salt lake city", "UT"),
    ("sacramento", "CA"),
    ("honolulu", "HI"),
    ("anchorage", "AK"),
    ("indianapolis", "IN"),
    ("charlotte", "NC"),
    ("raleigh", "NC"),
    ("richmond", "VA"),
    ("washington", "DC"),
    ("springfield", "IL"),
    ("rochester", "NY"),
    ("buffalo", "NY"),
    ("omaha", "NE"),
];

const COUNTRIES: &[(&str, &str)] = &[
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("us", "US"),
    ("canada", "CA"),
    ("mexico", "MX"),
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("great britain", "GB"),
    ("ireland", "IE"),
    ("france", "FR"),
    ("germany", "DE"),
    ("spain", "ES"),
    ("portugal", "PT"),
    ("italy", "IT"),
    ("netherlands", "NL"),
    ("belgium", "BE"),
    ("switzerland", "CH"),
    ("austria", "AT"),
    ("denmark", "DK"),
    ("sweden", "SE"),
    ("norway", "NO"),
    ("finland", "FI"),
    ("poland", "PL"),
    ("india", "IN"),
    ("china", "CN"),
    ("japan", "JP"),
    ("south korea", "KR"),
    ("australia", "AU"),
    ("new zealand", "NZ"),
    ("brazil", "BR"),
    ("argentina", "AR"),
    ("south africa", "ZA"),
    ("nigeria", "NG"),
    ("egypt", "EG"),
];

/// Lowercase and collapse whitespace
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title-case a normalised name
#[must_use]
pub fn title_case(name: &str) -> String {
    name.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Offline place-name tables
#[derive(Debug, Clone)]
pub struct Gazetteer {
    states: FxHashMap<String, &'static str>,
    cities: FxHashMap<&'static str, &'static str>,
    countries: FxHashMap<String, &'static str>,
}

impl Default for Gazetteer {
    fn default() -> Self {
        let mut states = FxHashMap::default();
        for (name, code) in US_STATES {
            states.insert((*name).to_string(), *code);
            states.insert(code.to_lowercase(), *code);
            states.insert(format!("us-{}", code.to_lowercase()), *code);
        }

        let cities = US_CITIES.iter().copied().collect();

        let mut countries = FxHashMap::default();
        for (name, code) in COUNTRIES {
            countries.insert((*name).to_string(), *code);
            countries.insert(code.to_lowercase(), *code);
        }

        Self {
            states,
            cities,
            countries,
        }
    }
}

impl Gazetteer {
    /// US state code for a state name or abbreviation
    #[must_use]
    pub fn state_code(&self, state: &str) -> Option<&'static str> {
        self.states.get(&normalize_name(state)).copied()
    }

    /// ISO alpha-2 code for a country name or code
    #[must_use]
    pub fn country_code(&self, country: &str) -> Option<&'static str> {
        self.countries.get(&normalize_name(country)).copied()
    }

    /// Resolve a query against the offline tables
    #[must_use]
    pub fn resolve(&self, query: &GeoQuery) -> Option<GeoPlace> {
        let country = query.country.as_deref().and_then(|c| self.country_code(c));
        let city = query.city.as_deref().map(normalize_name);
        let known_city = city
            .as_deref()
            .and_then(|c| self.cities.get_key_value(c))
            .map(|(name, state)| (*name, *state));

        let state = query
            .state
            .as_deref()
            .and_then(|s| self.state_code(s))
            .or_else(|| known_city.map(|(_, state)| state));

        let region = match (country, state) {
            (Some(country), _) if country != "US" => Some(country.to_string()),
            (_, Some(state)) => Some(format!("US-{state}")),
            (Some(country), None) => Some(country.to_string()),
            (None, None) => None,
        };
        let locality = known_city.map(|(name, _)| title_case(name));

        if region.is_some() || locality.is_some() {
            return Some(GeoPlace { region, locality });
        }

        query.coordinates.map(|(lat, lng)| GeoPlace {
            region: None,
            locality: Some(format!("{lat:.1},{lng:.1}")),
        })
    }
}
