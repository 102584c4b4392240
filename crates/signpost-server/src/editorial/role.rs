use signpost_common::types::TargetRole;

/// Resolves the audience a generation run is actually written for.
///
/// Implementations are pure: the same text and requested role always give
/// the same answer.
pub trait RoleResolver: Send + Sync {
    fn resolve(&self, prompt_text: &str, requested: TargetRole) -> TargetRole;
}

/// 基于提示词中受众短语的默认实现
///
/// Only an admin request is ever re-targeted, and only when the prompt names
/// a clinical audience outright ("for practice nurses", "for GPs"). Clinical
/// requests are kept as asked.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordRoleResolver;

const NURSE_AUDIENCE: &[&str] = &[
    "for nurses",
    "for practice nurses",
    "for the nursing team",
    "for hcas",
    "for healthcare assistants",
];

const GP_AUDIENCE: &[&str] = &[
    "for gps",
    "for clinicians",
    "for prescribers",
    "for the duty doctor",
];

impl RoleResolver for KeywordRoleResolver {
    fn resolve(&self, prompt_text: &str, requested: TargetRole) -> TargetRole {
        if requested != TargetRole::Admin {
            return requested;
        }
        let text = prompt_text.to_lowercase();
        if NURSE_AUDIENCE.iter().any(|p| text.contains(p)) {
            TargetRole::Nurse
        } else if GP_AUDIENCE.iter().any(|p| text.contains(p)) {
            TargetRole::Gp
        } else {
            TargetRole::Admin
        }
    }
}
