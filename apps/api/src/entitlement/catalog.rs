//! Plan Catalog — immutable, process-wide mapping from a plan to its
//! per-category quotas and feature flags.
//!
//! Built once at startup and carried in `AppState` as `Arc<PlanCatalog>`.
//! Pure lookup, no side effects. Unknown plan strings resolve to the free
//! tier (safe default), while unknown categories fail loudly — a category
//! outside the closed enumeration is a caller bug, not user input.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Subscription plan, as assigned by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Starter,
    Pro,
    Premium,
}

impl PlanId {
    /// Parses a plan string, falling back to `Free` for anything unknown.
    /// A stale or misspelled plan name from an upstream token must never
    /// take the request down, and the free tier is the conservative grant.
    pub fn parse_or_default(s: &str) -> PlanId {
        match s.to_ascii_lowercase().as_str() {
            "free" => PlanId::Free,
            "starter" => PlanId::Starter,
            "pro" => PlanId::Pro,
            "premium" => PlanId::Premium,
            other => {
                tracing::warn!("Unknown plan '{other}', falling back to free tier");
                PlanId::Free
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanId::Free => "free",
            PlanId::Starter => "starter",
            PlanId::Pro => "pro",
            PlanId::Premium => "premium",
        }
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document category tracked by the usage ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    Cv,
    Letter,
}

impl DocumentCategory {
    pub const ALL: [DocumentCategory; 2] = [DocumentCategory::Cv, DocumentCategory::Letter];

    /// Strict parse. Unlike plans, there is no sensible default here.
    pub fn parse(s: &str) -> Result<DocumentCategory, AppError> {
        match s.to_ascii_lowercase().as_str() {
            "cv" => Ok(DocumentCategory::Cv),
            "letter" => Ok(DocumentCategory::Letter),
            _ => Err(AppError::UnsupportedCategory(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Cv => "cv",
            DocumentCategory::Letter => "letter",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature flags gated by plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// LLM strengths/gaps analysis of a document.
    Analysis,
    /// PDF import of an existing CV.
    Import,
    /// Access to premium-tier templates.
    PremiumTemplates,
}

/// A per-cycle creation ceiling, or unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Limited(i64),
    Unlimited,
}

impl Quota {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Quota::Unlimited)
    }

    /// Whether a creation is permitted at the given current count.
    pub fn permits(&self, current: i64) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Limited(limit) => current < *limit,
        }
    }

    pub fn remaining(&self, current: i64) -> Quota {
        match self {
            Quota::Unlimited => Quota::Unlimited,
            Quota::Limited(limit) => Quota::Limited((limit - current).max(0)),
        }
    }
}

/// Serializes as the integer ceiling, or the string `"unlimited"`.
impl Serialize for Quota {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quota::Limited(limit) => serializer.serialize_i64(*limit),
            Quota::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Quotas and feature flags for one plan.
#[derive(Debug, Clone)]
pub struct PlanLimits {
    pub cv: Quota,
    pub letter: Quota,
    pub analysis: bool,
    pub import: bool,
    pub premium_templates: bool,
}

impl PlanLimits {
    /// The free tier doubles as the fallback for any plan the catalog does
    /// not know about.
    pub fn free_tier() -> Self {
        Self {
            cv: Quota::Limited(3),
            letter: Quota::Limited(3),
            analysis: false,
            import: false,
            premium_templates: false,
        }
    }

    fn quota(&self, category: DocumentCategory) -> Quota {
        match category {
            DocumentCategory::Cv => self.cv,
            DocumentCategory::Letter => self.letter,
        }
    }

    fn feature(&self, feature: Feature) -> bool {
        match feature {
            Feature::Analysis => self.analysis,
            Feature::Import => self.import,
            Feature::PremiumTemplates => self.premium_templates,
        }
    }
}

/// The catalog itself. Quotas for a given plan are immutable for the life of
/// the process; changing them takes effect for all users of that plan on
/// their next check after a restart.
pub struct PlanCatalog {
    plans: HashMap<PlanId, PlanLimits>,
}

impl PlanCatalog {
    pub fn builtin() -> Self {
        let mut plans = HashMap::new();
        plans.insert(PlanId::Free, PlanLimits::free_tier());
        plans.insert(
            PlanId::Starter,
            PlanLimits {
                cv: Quota::Limited(15),
                letter: Quota::Limited(15),
                analysis: false,
                import: true,
                premium_templates: false,
            },
        );
        plans.insert(
            PlanId::Pro,
            PlanLimits {
                cv: Quota::Unlimited,
                letter: Quota::Unlimited,
                analysis: true,
                import: true,
                premium_templates: false,
            },
        );
        plans.insert(
            PlanId::Premium,
            PlanLimits {
                cv: Quota::Unlimited,
                letter: Quota::Unlimited,
                analysis: true,
                import: true,
                premium_templates: true,
            },
        );
        Self { plans }
    }

    pub fn quota_for(&self, plan: PlanId, category: DocumentCategory) -> Quota {
        self.limits(plan).quota(category)
    }

    pub fn feature_enabled(&self, plan: PlanId, feature: Feature) -> bool {
        self.limits(plan).feature(feature)
    }

    fn limits(&self, plan: PlanId) -> PlanLimits {
        self.plans
            .get(&plan)
            .cloned()
            .unwrap_or_else(PlanLimits::free_tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_plan_string_falls_back_to_free() {
        assert_eq!(PlanId::parse_or_default("enterprise"), PlanId::Free);
        assert_eq!(PlanId::parse_or_default(""), PlanId::Free);
        assert_eq!(PlanId::parse_or_default("PRO"), PlanId::Pro);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        assert!(DocumentCategory::parse("memo").is_err());
        assert!(matches!(
            DocumentCategory::parse("memo"),
            Err(AppError::UnsupportedCategory(_))
        ));
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(DocumentCategory::parse("CV").unwrap(), DocumentCategory::Cv);
        assert_eq!(
            DocumentCategory::parse("Letter").unwrap(),
            DocumentCategory::Letter
        );
    }

    #[test]
    fn test_starter_cv_quota_is_15() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(
            catalog.quota_for(PlanId::Starter, DocumentCategory::Cv),
            Quota::Limited(15)
        );
    }

    #[test]
    fn test_pro_and_premium_are_unlimited() {
        let catalog = PlanCatalog::builtin();
        for plan in [PlanId::Pro, PlanId::Premium] {
            for category in DocumentCategory::ALL {
                assert!(catalog.quota_for(plan, category).is_unlimited());
            }
        }
    }

    #[test]
    fn test_feature_matrix() {
        let catalog = PlanCatalog::builtin();
        assert!(!catalog.feature_enabled(PlanId::Free, Feature::Import));
        assert!(catalog.feature_enabled(PlanId::Starter, Feature::Import));
        assert!(!catalog.feature_enabled(PlanId::Starter, Feature::Analysis));
        assert!(catalog.feature_enabled(PlanId::Pro, Feature::Analysis));
        assert!(!catalog.feature_enabled(PlanId::Pro, Feature::PremiumTemplates));
        assert!(catalog.feature_enabled(PlanId::Premium, Feature::PremiumTemplates));
    }

    #[test]
    fn test_quota_permits_below_limit_only() {
        let quota = Quota::Limited(3);
        assert!(quota.permits(0));
        assert!(quota.permits(2));
        assert!(!quota.permits(3));
        assert!(!quota.permits(4));
        assert!(Quota::Unlimited.permits(i64::MAX));
    }

    #[test]
    fn test_quota_remaining_never_negative() {
        assert_eq!(Quota::Limited(3).remaining(5), Quota::Limited(0));
        assert_eq!(Quota::Limited(15).remaining(14), Quota::Limited(1));
        assert_eq!(Quota::Unlimited.remaining(1000), Quota::Unlimited);
    }

    #[test]
    fn test_quota_serializes_as_number_or_sentinel() {
        assert_eq!(serde_json::to_value(Quota::Limited(15)).unwrap(), 15);
        assert_eq!(
            serde_json::to_value(Quota::Unlimited).unwrap(),
            serde_json::Value::String("unlimited".to_string())
        );
    }
}
