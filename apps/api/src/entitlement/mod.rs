// Entitlement & usage accounting: plan catalog, per-user cycle counters,
// the allow/deny decision point, and lazy monthly rollover.
// Document handlers must gate every creation through check_and_reserve and
// record success through record_creation — no handler touches the counters
// directly.

pub mod catalog;
pub mod check;
pub mod handlers;
pub mod ledger;
pub mod memory;
pub mod postgres;

use uuid::Uuid;

use crate::entitlement::catalog::PlanId;
use crate::entitlement::ledger::UsageLedger;
use crate::errors::AppError;

/// Effective plan for a request: the gateway's plan claim when present,
/// otherwise the plan stored on the usage row (free tier for new users).
pub async fn resolve_plan(
    ledger: &UsageLedger,
    user_id: Uuid,
    claim: Option<&str>,
) -> Result<PlanId, AppError> {
    if let Some(claim) = claim {
        return Ok(PlanId::parse_or_default(claim));
    }
    let row = ledger.current(user_id, PlanId::Free).await?;
    Ok(PlanId::parse_or_default(&row.plan))
}
