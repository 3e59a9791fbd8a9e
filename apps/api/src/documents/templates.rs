//! Template catalog — the static list of layout templates a client can pick
//! from. Premium-tier templates are visible only to plans carrying the
//! `premium_templates` feature.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entitlement::catalog::{DocumentCategory, Feature, PlanCatalog, PlanId};
use crate::entitlement::resolve_plan;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateTier {
    Standard,
    Premium,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: &'static str,
    pub name: &'static str,
    pub category: DocumentCategory,
    pub tier: TemplateTier,
}

const TEMPLATES: &[Template] = &[
    Template {
        id: "classic",
        name: "Classic",
        category: DocumentCategory::Cv,
        tier: TemplateTier::Standard,
    },
    Template {
        id: "compact",
        name: "Compact",
        category: DocumentCategory::Cv,
        tier: TemplateTier::Standard,
    },
    Template {
        id: "executive",
        name: "Executive",
        category: DocumentCategory::Cv,
        tier: TemplateTier::Premium,
    },
    Template {
        id: "plain-letter",
        name: "Plain Letter",
        category: DocumentCategory::Letter,
        tier: TemplateTier::Standard,
    },
    Template {
        id: "letterhead",
        name: "Letterhead",
        category: DocumentCategory::Letter,
        tier: TemplateTier::Premium,
    },
];

/// Templates visible to a plan.
pub fn templates_for(catalog: &PlanCatalog, plan: PlanId) -> Vec<Template> {
    let premium = catalog.feature_enabled(plan, Feature::PremiumTemplates);
    TEMPLATES
        .iter()
        .filter(|t| premium || t.tier == TemplateTier::Standard)
        .cloned()
        .collect()
}

#[derive(Deserialize)]
pub struct TemplatesQuery {
    pub user_id: Uuid,
    pub plan: Option<String>,
}

/// GET /api/v1/templates
pub async fn handle_list_templates(
    State(state): State<AppState>,
    Query(params): Query<TemplatesQuery>,
) -> Result<Json<Vec<Template>>, AppError> {
    let plan = resolve_plan(&state.ledger, params.user_id, params.plan.as_deref()).await?;
    Ok(Json(templates_for(&state.catalog, plan)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_plan_sees_only_standard_templates() {
        let catalog = PlanCatalog::builtin();
        let visible = templates_for(&catalog, PlanId::Free);
        assert_eq!(visible.len(), 3);
        assert!(visible.iter().all(|t| t.tier == TemplateTier::Standard));
    }

    #[test]
    fn test_premium_plan_sees_everything() {
        let catalog = PlanCatalog::builtin();
        let visible = templates_for(&catalog, PlanId::Premium);
        assert_eq!(visible.len(), TEMPLATES.len());
        assert!(visible.iter().any(|t| t.tier == TemplateTier::Premium));
    }

    #[test]
    fn test_pro_plan_is_not_premium_templates() {
        let catalog = PlanCatalog::builtin();
        let visible = templates_for(&catalog, PlanId::Pro);
        assert!(visible.iter().all(|t| t.tier == TemplateTier::Standard));
    }
}
