//! Country-name to ISO-3166 alpha-2 resolution.
//!
//! One `CountryResolver` is built per run and owns its cache, so nothing
//! survives between unrelated runs or tests.

use crate::schema::UNKNOWN_COUNTRY;
use log::{debug, warn};
use std::collections::HashMap;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

/// Irregular names published by the source that never match the reference
/// list cleanly. Checked before any normalisation.
pub const COUNTRY_OVERRIDES: &[(&str, &str)] = &[
    ("Namibia", "NA"),
    ("Wallis and Futuna Islands", "WF"),
    ("Yugoslavia", "RS"),
    ("Zaire", "CD"),
    ("Swaziland", "SZ"),
    ("Kazakstan", "KZ"),
    ("Viet Nam", "VN"),
    ("Libyan Arab Jamahiriya", "LY"),
    ("Holy See (Vatican)", "VA"),
    ("Brunei Darussalam", "BN"),
    ("Cote d'Ivoire", "CI"),
    ("Turkey", "TR"),
    ("Congo", "CG"),
    ("East Timor", "TL"),
    ("Christmas Island[Australia]", "CX"),
    ("Cocos (Keeling) Islands", "CC"),
    ("Bouvet Island", "BV"),
    ("British Indian Ocean Territory", "IO"),
    ("Kosovo", "XK"),
    ("Taiwan, Province of China", "TW"),
    ("Serbia (Europe)", "RS"),
    ("The former Yugoslav Rep. Macedonia", "MK"),
    ("Johnston Island", "UM"),
    ("Midway Islands", "UM"),
    ("Wake Island", "UM"),
    ("Saint Helena", "SH"),
    ("Saint Lucia", "LC"),
    ("Saint Vincent and the Grenadines", "VC"),
    ("Many Countries", "Many"),
    ("Many", "Many"),
    ("Not_Specified", "Not_Specified"),
    ("Not Specified", "Not_Specified"),
    ("Unknown", UNKNOWN_COUNTRY),
];

/// Source spellings rewritten to the reference spelling before lookup.
pub const COUNTRY_NAME_NORMALIZATIONS: &[(&str, &str)] = &[
    ("Iran, Islamic Republic of", "Iran"),
    (
        "Korea, Democratic People's Rep. of",
        "Korea, Democratic People's Republic of",
    ),
    ("United Republic of Tanzania", "Tanzania, United Republic of"),
    ("Republic of Moldova", "Moldova, Republic of"),
    ("United States Virgin Islands", "Virgin Islands, U.S."),
    ("British Virgin Islands", "Virgin Islands, British"),
    ("Cape Verde", "Cabo Verde"),
];

/// ISO-3166-1 reference list: (alpha-2, official short name, common name).
pub const ISO_COUNTRIES: &[(&str, &str, Option<&str>)] = &[
    ("AD", "Andorra", None),
    ("AE", "United Arab Emirates", Some("UAE")),
    ("AF", "Afghanistan", None),
    ("AG", "Antigua and Barbuda", None),
    ("AI", "Anguilla", None),
    ("AL", "Albania", None),
    ("AM", "Armenia", None),
    ("AO", "Angola", None),
    ("AQ", "Antarctica", None),
    ("AR", "Argentina", None),
    ("AS", "American Samoa", None),
    ("AT", "Austria", None),
    ("AU", "Australia", None),
    ("AW", "Aruba", None),
    ("AX", "Åland Islands", None),
    ("AZ", "Azerbaijan", None),
    ("BA", "Bosnia and Herzegovina", None),
    ("BB", "Barbados", None),
    ("BD", "Bangladesh", None),
    ("BE", "Belgium", None),
    ("BF", "Burkina Faso", None),
    ("BG", "Bulgaria", None),
    ("BH", "Bahrain", None),
    ("BI", "Burundi", None),
    ("BJ", "Benin", None),
    ("BL", "Saint Barthélemy", None),
    ("BM", "Bermuda", None),
    ("BN", "Brunei Darussalam", Some("Brunei")),
    ("BO", "Bolivia, Plurinational State of", Some("Bolivia")),
    ("BQ", "Bonaire, Sint Eustatius and Saba", None),
    ("BR", "Brazil", None),
    ("BS", "Bahamas", None),
    ("BT", "Bhutan", None),
    ("BV", "Bouvet Island", None),
    ("BW", "Botswana", None),
    ("BY", "Belarus", None),
    ("BZ", "Belize", None),
    ("CA", "Canada", None),
    ("CC", "Cocos (Keeling) Islands", None),
    ("CD", "Congo, The Democratic Republic of the", Some("Democratic Republic of the Congo")),
    ("CF", "Central African Republic", None),
    ("CG", "Congo", None),
    ("CH", "Switzerland", None),
    ("CI", "Côte d'Ivoire", Some("Ivory Coast")),
    ("CK", "Cook Islands", None),
    ("CL", "Chile", None),
    ("CM", "Cameroon", None),
    ("CN", "China", None),
    ("CO", "Colombia", None),
    ("CR", "Costa Rica", None),
    ("CU", "Cuba", None),
    ("CV", "Cabo Verde", None),
    ("CW", "Curaçao", None),
    ("CX", "Christmas Island", None),
    ("CY", "Cyprus", None),
    ("CZ", "Czechia", Some("Czech Republic")),
    ("DE", "Germany", None),
    ("DJ", "Djibouti", None),
    ("DK", "Denmark", None),
    ("DM", "Dominica", None),
    ("DO", "Dominican Republic", None),
    ("DZ", "Algeria", None),
    ("EC", "Ecuador", None),
    ("EE", "Estonia", None),
    ("EG", "Egypt", None),
    ("EH", "Western Sahara", None),
    ("ER", "Eritrea", None),
    ("ES", "Spain", None),
    ("ET", "Ethiopia", None),
    ("FI", "Finland", None),
    ("FJ", "Fiji", None),
    ("FK", "Falkland Islands (Malvinas)", None),
    ("FM", "Micronesia, Federated States of", None),
    ("FO", "Faroe Islands", None),
    ("FR", "France", None),
    ("GA", "Gabon", None),
    ("GB", "United Kingdom", Some("UK")),
    ("GD", "Grenada", None),
    ("GE", "Georgia", None),
    ("GF", "French Guiana", None),
    ("GG", "Guernsey", None),
    ("GH", "Ghana", None),
    ("GI", "Gibraltar", None),
    ("GL", "Greenland", None),
    ("GM", "Gambia", None),
    ("GN", "Guinea", None),
    ("GP", "Guadeloupe", None),
    ("GQ", "Equatorial Guinea", None),
    ("GR", "Greece", None),
    ("GS", "South Georgia and the South Sandwich Islands", None),
    ("GT", "Guatemala", None),
    ("GU", "Guam", None),
    ("GW", "Guinea-Bissau", None),
    ("GY", "Guyana", None),
    ("HK", "Hong Kong", None),
    ("HM", "Heard Island and McDonald Islands", None),
    ("HN", "Honduras", None),
    ("HR", "Croatia", None),
    ("HT", "Haiti", None),
    ("HU", "Hungary", None),
    ("ID", "Indonesia", None),
    ("IE", "Ireland", None),
    ("IL", "Israel", None),
    ("IM", "Isle of Man", None),
    ("IN", "India", None),
    ("IO", "British Indian Ocean Territory", None),
    ("IQ", "Iraq", None),
    ("IR", "Iran, Islamic Republic of", Some("Iran")),
    ("IS", "Iceland", None),
    ("IT", "Italy", None),
    ("JE", "Jersey", None),
    ("JM", "Jamaica", None),
    ("JO", "Jordan", None),
    ("JP", "Japan", None),
    ("KE", "Kenya", None),
    ("KG", "Kyrgyzstan", None),
    ("KH", "Cambodia", None),
    ("KI", "Kiribati", None),
    ("KM", "Comoros", None),
    ("KN", "Saint Kitts and Nevis", None),
    ("KP", "Korea, Democratic People's Republic of", Some("North Korea")),
    ("KR", "Korea, Republic of", Some("South Korea")),
    ("KW", "Kuwait", None),
    ("KY", "Cayman Islands", None),
    ("KZ", "Kazakhstan", None),
    ("LA", "Lao People's Democratic Republic", Some("Laos")),
    ("LB", "Lebanon", None),
    ("LC", "Saint Lucia", None),
    ("LI", "Liechtenstein", None),
    ("LK", "Sri Lanka", None),
    ("LR", "Liberia", None),
    ("LS", "Lesotho", None),
    ("LT", "Lithuania", None),
    ("LU", "Luxembourg", None),
    ("LV", "Latvia", None),
    ("LY", "Libya", None),
    ("MA", "Morocco", None),
    ("MC", "Monaco", None),
    ("MD", "Moldova, Republic of", Some("Moldova")),
    ("ME", "Montenegro", None),
    ("MF", "Saint Martin (French part)", None),
    ("MG", "Madagascar", None),
    ("MH", "Marshall Islands", None),
    ("MK", "North Macedonia", None),
    ("ML", "Mali", None),
    ("MM", "Myanmar", Some("Burma")),
    ("MN", "Mongolia", None),
    ("MO", "Macao", Some("Macau")),
    ("MP", "Northern Mariana Islands", None),
    ("MQ", "Martinique", None),
    ("MR", "Mauritania", None),
    ("MS", "Montserrat", None),
    ("MT", "Malta", None),
    ("MU", "Mauritius", None),
    ("MV", "Maldives", None),
    ("MW", "Malawi", None),
    ("MX", "Mexico", None),
    ("MY", "Malaysia", None),
    ("MZ", "Mozambique", None),
    ("NA", "Namibia", None),
    ("NC", "New Caledonia", None),
    ("NE", "Niger", None),
    ("NF", "Norfolk Island", None),
    ("NG", "Nigeria", None),
    ("NI", "Nicaragua", None),
    ("NL", "Netherlands", None),
    ("NO", "Norway", None),
    ("NP", "Nepal", None),
    ("NR", "Nauru", None),
    ("NU", "Niue", None),
    ("NZ", "New Zealand", None),
    ("OM", "Oman", None),
    ("PA", "Panama", None),
    ("PE", "Peru", None),
    ("PF", "French Polynesia", None),
    ("PG", "Papua New Guinea", None),
    ("PH", "Philippines", None),
    ("PK", "Pakistan", None),
    ("PL", "Poland", None),
    ("PM", "Saint Pierre and Miquelon", None),
    ("PN", "Pitcairn", None),
    ("PR", "Puerto Rico", None),
    ("PS", "Palestine, State of", Some("Palestine")),
    ("PT", "Portugal", None),
    ("PW", "Palau", None),
    ("PY", "Paraguay", None),
    ("QA", "Qatar", None),
    ("RE", "Réunion", None),
    ("RO", "Romania", None),
    ("RS", "Serbia", None),
    ("RU", "Russian Federation", Some("Russia")),
    ("RW", "Rwanda", None),
    ("SA", "Saudi Arabia", None),
    ("SB", "Solomon Islands", None),
    ("SC", "Seychelles", None),
    ("SD", "Sudan", None),
    ("SE", "Sweden", None),
    ("SG", "Singapore", None),
    ("SH", "Saint Helena, Ascension and Tristan da Cunha", None),
    ("SI", "Slovenia", None),
    ("SJ", "Svalbard and Jan Mayen", None),
    ("SK", "Slovakia", None),
    ("SL", "Sierra Leone", None),
    ("SM", "San Marino", None),
    ("SN", "Senegal", None),
    ("SO", "Somalia", None),
    ("SR", "Suriname", None),
    ("SS", "South Sudan", None),
    ("ST", "Sao Tome and Principe", None),
    ("SV", "El Salvador", None),
    ("SX", "Sint Maarten (Dutch part)", None),
    ("SY", "Syrian Arab Republic", Some("Syria")),
    ("SZ", "Eswatini", None),
    ("TC", "Turks and Caicos Islands", None),
    ("TD", "Chad", None),
    ("TF", "French Southern Territories", None),
    ("TG", "Togo", None),
    ("TH", "Thailand", None),
    ("TJ", "Tajikistan", None),
    ("TK", "Tokelau", None),
    ("TL", "Timor-Leste", None),
    ("TM", "Turkmenistan", None),
    ("TN", "Tunisia", None),
    ("TO", "Tonga", None),
    ("TR", "Türkiye", Some("Turkey")),
    ("TT", "Trinidad and Tobago", None),
    ("TV", "Tuvalu", None),
    ("TW", "Taiwan, Province of China", Some("Taiwan")),
    ("TZ", "Tanzania, United Republic of", Some("Tanzania")),
    ("UA", "Ukraine", None),
    ("UG", "Uganda", None),
    ("UM", "United States Minor Outlying Islands", None),
    ("US", "United States", Some("USA")),
    ("UY", "Uruguay", None),
    ("UZ", "Uzbekistan", None),
    ("VA", "Holy See (Vatican City State)", None),
    ("VC", "Saint Vincent and the Grenadines", None),
    ("VE", "Venezuela, Bolivarian Republic of", Some("Venezuela")),
    ("VG", "Virgin Islands, British", None),
    ("VI", "Virgin Islands, U.S.", None),
    ("VN", "Viet Nam", Some("Vietnam")),
    ("VU", "Vanuatu", None),
    ("WF", "Wallis and Futuna", None),
    ("WS", "Samoa", None),
    ("YE", "Yemen", None),
    ("YT", "Mayotte", None),
    ("ZA", "South Africa", None),
    ("ZM", "Zambia", None),
    ("ZW", "Zimbabwe", None),
];

pub struct CountryResolver {
    threshold: f64,
    cache: HashMap<String, String>,
    unresolved: usize,
}

impl Default for CountryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_FUZZY_THRESHOLD)
    }
}

impl CountryResolver {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            cache: HashMap::new(),
            unresolved: 0,
        }
    }

    /// Number of distinct inputs that fell through every tier.
    pub fn unresolved_count(&self) -> usize {
        self.unresolved
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Returns the ISO-2 code for `name`, a sentinel, or the trimmed input
    /// unchanged when nothing matches.
    pub fn resolve(&mut self, name: &str) -> String {
        let key = name.trim().to_string();
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let resolved = match self.lookup(&key) {
            Some(code) => code,
            None => {
                warn!("No ISO-2 mapping found for: '{}'", key);
                self.unresolved += 1;
                key.clone()
            }
        };

        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if name.is_empty() {
            return Some(UNKNOWN_COUNTRY.to_string());
        }

        if let Some((_, code)) = COUNTRY_OVERRIDES.iter().find(|(n, _)| *n == name) {
            return Some(code.to_string());
        }

        let normalized = normalize_country_name(name)?;
        let lower = normalized.to_lowercase();

        if normalized.chars().count() == 2 {
            let upper = normalized.to_ascii_uppercase();
            if ISO_COUNTRIES.iter().any(|(code, _, _)| *code == upper) {
                return Some(upper);
            }
        }

        if let Some((code, _, _)) = ISO_COUNTRIES.iter().find(|(_, official, common)| {
            official.to_lowercase() == lower || common.is_some_and(|c| c.to_lowercase() == lower)
        }) {
            return Some(code.to_string());
        }

        if lower.chars().count() >= 4 {
            if let Some((code, official, _)) = ISO_COUNTRIES
                .iter()
                .find(|(_, official, _)| official.to_lowercase().starts_with(&lower))
            {
                debug!("Prefix matched '{}' to '{}'", name, official);
                return Some(code.to_string());
            }
        }

        self.fuzzy_match(&lower)
    }

    fn fuzzy_match(&self, lower: &str) -> Option<String> {
        let mut best: Option<(&str, &str)> = None;
        let mut best_ratio = 0.0;

        for (code, official, common) in ISO_COUNTRIES {
            let candidates = std::iter::once(*official).chain(common.iter().copied());
            for candidate in candidates {
                let ratio = similarity_ratio(lower, &candidate.to_lowercase());
                if ratio > best_ratio {
                    best_ratio = ratio;
                    best = Some((*code, candidate));
                }
            }
        }

        match best {
            Some((code, candidate)) if best_ratio >= self.threshold => {
                debug!(
                    "Fuzzy matched '{}' to '{}' (ratio {:.2})",
                    lower, candidate, best_ratio
                );
                Some(code.to_string())
            }
            _ => None,
        }
    }
}

/// Applies the normalisation table and strips bracketed annotations such as
/// `[Australia]`.
pub fn normalize_country_name(name: &str) -> Option<String> {
    if let Some((_, target)) = COUNTRY_NAME_NORMALIZATIONS.iter().find(|(n, _)| *n == name) {
        return Some(target.to_string());
    }

    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for ch in name.trim().chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Ratcliff/Obershelp similarity: twice the matched characters over the
/// total length, matching longest common blocks recursively.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (mut best_len, mut best_a, mut best_b) = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        let mut row = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                row[j] = prev[j - 1] + 1;
                if row[j] > best_len {
                    best_len = row[j];
                    best_a = i - best_len;
                    best_b = j - best_len;
                }
            }
        }
        prev = row;
    }

    if best_len == 0 {
        return 0;
    }

    best_len
        + matching_chars(&a[..best_a], &b[..best_b])
        + matching_chars(&a[best_a + best_len..], &b[best_b + best_len..])
}
