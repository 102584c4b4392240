use signpost_common::types::{CardSource, RiskLevel};

/// 高危关键词（任一命中即为 HIGH）
const HIGH_ACUITY_TERMS: &[&str] = &[
    "chest pain",
    "anaphylaxis",
    "999",
    "self-harm",
    "self harm",
    "suicid",
    "overdose",
    "stroke",
    "sepsis",
    "meningitis",
    "difficulty breathing",
    "shortness of breath",
    "unconscious",
    "seizure",
    "severe bleeding",
    "collapse",
];

/// 可信来源域名（含子域名）
pub const TRUSTED_SOURCE_DOMAINS: &[&str] = &[
    "nhs.uk",
    "nice.org.uk",
    "gov.uk",
    "cqc.org.uk",
    "rcgp.org.uk",
    "signpostingtool.co.uk",
];

/// Classifies content as HIGH risk when it mentions any high-acuity term.
///
/// Matching is a case-insensitive substring search, so the function is total
/// and deterministic for every input.
///
/// # Examples
///
/// ```
/// use signpost_rules::safety::infer_risk_level;
/// use signpost_common::types::RiskLevel;
///
/// assert_eq!(infer_risk_level("Patient reports ANAPHYLAXIS symptoms"), RiskLevel::High);
/// assert_eq!(infer_risk_level("Repeat prescription requests"), RiskLevel::Low);
/// ```
pub fn infer_risk_level(text: &str) -> RiskLevel {
    let lower = text.to_lowercase();
    if HIGH_ACUITY_TERMS.iter().any(|term| lower.contains(term)) {
        RiskLevel::High
    } else {
        RiskLevel::Low
    }
}

/// Decides whether a card still needs sourcing work before it can go live.
///
/// Absence of evidence of good sourcing counts as "needs sourcing": the
/// result is `true` when the model flagged it, when there are no sources, or
/// when no source URL points at a trusted domain.
pub fn resolve_needs_sourcing(sources: &[CardSource], model_flag: bool) -> bool {
    if model_flag || sources.is_empty() {
        return true;
    }
    !sources
        .iter()
        .filter_map(|s| s.url.as_deref())
        .any(is_trusted_url)
}

/// URL 的主机名是否属于可信域名列表
pub fn is_trusted_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw.trim()) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    TRUSTED_SOURCE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}
