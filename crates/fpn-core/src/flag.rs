//! Country display name to flag emoji.
//!
//! Names resolve against the ISO 3166-1 registry from `rust_iso3166`. The feed reports
//! everyday names ("United States", "Russia") where ISO uses formal ones, so those go
//! through a short alias table first.

/// Display names that differ from the ISO 3166-1 short name, plus Kosovo (user-assigned `XK`).
const DISPLAY_ALIASES: &[(&str, &str)] = &[
    ("united states", "US"),
    ("usa", "US"),
    ("united kingdom", "GB"),
    ("great britain", "GB"),
    ("uk", "GB"),
    ("russia", "RU"),
    ("south korea", "KR"),
    ("korea", "KR"),
    ("north korea", "KP"),
    ("iran", "IR"),
    ("syria", "SY"),
    ("vietnam", "VN"),
    ("viet nam", "VN"),
    ("laos", "LA"),
    ("moldova", "MD"),
    ("tanzania", "TZ"),
    ("venezuela", "VE"),
    ("bolivia", "BO"),
    ("taiwan", "TW"),
    ("czech republic", "CZ"),
    ("czechia", "CZ"),
    ("turkey", "TR"),
    ("turkiye", "TR"),
    ("macedonia", "MK"),
    ("north macedonia", "MK"),
    ("palestine", "PS"),
    ("palestinian territories", "PS"),
    ("kosovo", "XK"),
    ("ivory coast", "CI"),
    ("cote d'ivoire", "CI"),
    ("brunei", "BN"),
    ("cape verde", "CV"),
    ("micronesia", "FM"),
    ("netherlands", "NL"),
    ("the netherlands", "NL"),
    ("democratic republic of the congo", "CD"),
    ("dr congo", "CD"),
    ("republic of the congo", "CG"),
    ("congo", "CG"),
    ("swaziland", "SZ"),
    ("eswatini", "SZ"),
    ("burma", "MM"),
    ("myanmar", "MM"),
    ("vatican city", "VA"),
    ("hong kong", "HK"),
    ("macau", "MO"),
    ("macao", "MO"),
    ("the bahamas", "BS"),
    ("bahamas", "BS"),
    ("the gambia", "GM"),
    ("gambia", "GM"),
    ("saint kitts and nevis", "KN"),
    ("saint vincent and the grenadines", "VC"),
    ("st. lucia", "LC"),
    ("falkland islands", "FK"),
    ("british virgin islands", "VG"),
    ("us virgin islands", "VI"),
];

/// The ISO short name without its qualifier: "Bolivia (Plurinational State of)" -> "bolivia".
fn iso_base_name(name: &str) -> String {
    let base = name.split(" (").next().unwrap_or(name);
    base.trim().to_lowercase()
}

pub fn country_code(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    if let Some((_, code)) = DISPLAY_ALIASES.iter().find(|(alias, _)| *alias == needle) {
        return Some(*code);
    }

    if needle.len() == 2 && needle.chars().all(|c| c.is_ascii_alphabetic()) {
        return rust_iso3166::from_alpha2(&needle.to_uppercase()).map(|country| country.alpha2);
    }

    rust_iso3166::ALL
        .iter()
        .find(|country| {
            country.name.eq_ignore_ascii_case(&needle) || iso_base_name(country.name) == needle
        })
        .map(|country| country.alpha2)
}

/// Flag glyph for a country display name, or `None` for names we cannot place.
pub fn flag_for_country(name: &str) -> Option<String> {
    let code = country_code(name)?;
    code.chars()
        .map(|c| char::from_u32(0x1F1E6 + (c.to_ascii_uppercase() as u32 - 'A' as u32)))
        .collect()
}
