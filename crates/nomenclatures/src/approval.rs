//! Multi-level approvals guarding status transitions.
//!
//! A rule says: moving a document of `document_type` from `from_status` to
//! `to_status` needs a sign-off at `level` by someone holding `role`,
//! optionally only within an amount range. Levels are signed off in
//! ascending order. Decisions belong to a round; closing the round (after
//! the guarded transition happened or after a rejection) archives them so
//! the next attempt starts from scratch.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use optimapos_core::{ApprovalRuleId, DocumentId, DomainError, DomainResult, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRule {
    pub id: ApprovalRuleId,
    pub document_type: String,
    pub from_status: String,
    pub to_status: String,
    pub level: u32,
    pub role: String,
    /// Inclusive bounds on the document total.
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
}

impl ApprovalRule {
    pub fn new(
        document_type: impl Into<String>,
        from_status: impl Into<String>,
        to_status: impl Into<String>,
        level: u32,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: ApprovalRuleId::new(),
            document_type: document_type.into(),
            from_status: from_status.into(),
            to_status: to_status.into(),
            level,
            role: role.into(),
            min_amount: None,
            max_amount: None,
            is_active: true,
        }
    }

    pub fn for_amounts(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Self {
        self.min_amount = min;
        self.max_amount = max;
        self
    }

    pub fn applies_to(&self, amount: Decimal) -> bool {
        self.min_amount.is_none_or(|min| amount >= min)
            && self.max_amount.is_none_or(|max| amount <= max)
    }

    fn matches(&self, ctx: &ApprovalContext) -> bool {
        self.is_active
            && self.document_type == ctx.document_type
            && self.from_status == ctx.from_status
            && self.to_status == ctx.to_status
            && self.applies_to(ctx.amount)
    }
}

/// The transition an approval is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalContext {
    pub document_id: DocumentId,
    pub document_type: String,
    pub from_status: String,
    pub to_status: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalVerdict {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub document_id: DocumentId,
    pub rule_id: ApprovalRuleId,
    pub level: u32,
    pub user_id: UserId,
    pub verdict: ApprovalVerdict,
    pub comment: Option<String>,
    pub round: u32,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approver {
    pub user_id: UserId,
    pub roles: BTreeSet<String>,
}

impl Approver {
    pub fn new<I, T>(user_id: UserId, roles: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            user_id,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Pending { next_level: u32 },
    Completed,
}

#[derive(Debug, Default)]
struct DecisionLog {
    decisions: Vec<ApprovalDecision>,
    rounds: HashMap<DocumentId, u32>,
}

impl DecisionLog {
    fn round(&self, document_id: DocumentId) -> u32 {
        self.rounds.get(&document_id).copied().unwrap_or(0)
    }

    fn current(&self, document_id: DocumentId) -> impl Iterator<Item = &ApprovalDecision> {
        let round = self.round(document_id);
        self.decisions
            .iter()
            .filter(move |d| d.document_id == document_id && d.round == round)
    }
}

#[derive(Debug, Default)]
pub struct ApprovalService {
    rules: RwLock<Vec<ApprovalRule>>,
    log: RwLock<DecisionLog>,
}

fn poisoned() -> DomainError {
    DomainError::storage("approval lock poisoned")
}

impl ApprovalService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&self, rule: ApprovalRule) -> DomainResult<ApprovalRuleId> {
        if rule.level == 0 {
            return Err(DomainError::validation("approval levels start at 1"));
        }
        if rule.role.trim().is_empty() {
            return Err(DomainError::validation("approval rule needs a role"));
        }
        if rule.from_status == rule.to_status {
            return Err(DomainError::validation("approval rule must guard a status change"));
        }
        if let (Some(min), Some(max)) = (rule.min_amount, rule.max_amount) {
            if min > max {
                return Err(DomainError::validation("approval amount range is inverted"));
            }
        }
        let mut rules = self.rules.write().map_err(|_| poisoned())?;
        let id = rule.id;
        rules.push(rule);
        rules.sort_by_key(|r| r.level);
        Ok(id)
    }

    pub fn rules_for(&self, document_type: &str) -> DomainResult<Vec<ApprovalRule>> {
        Ok(self
            .rules
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|r| r.document_type == document_type)
            .cloned()
            .collect())
    }

    /// Rules that apply to the transition, lowest level first.
    pub fn requirements(&self, ctx: &ApprovalContext) -> DomainResult<Vec<ApprovalRule>> {
        Ok(self
            .rules
            .read()
            .map_err(|_| poisoned())?
            .iter()
            .filter(|r| r.matches(ctx))
            .cloned()
            .collect())
    }

    pub fn is_guarded(&self, ctx: &ApprovalContext) -> DomainResult<bool> {
        Ok(!self.requirements(ctx)?.is_empty())
    }

    /// Target statuses reachable from `from_status` that carry approval
    /// rules for `amount`.
    pub fn guarded_targets(
        &self,
        document_type: &str,
        from_status: &str,
        amount: Decimal,
    ) -> DomainResult<Vec<String>> {
        let rules = self.rules.read().map_err(|_| poisoned())?;
        let mut targets: Vec<String> = Vec::new();
        for r in rules.iter().filter(|r| {
            r.is_active
                && r.document_type == document_type
                && r.from_status == from_status
                && r.applies_to(amount)
        }) {
            if !targets.contains(&r.to_status) {
                targets.push(r.to_status.clone());
            }
        }
        Ok(targets)
    }

    /// Lowest-level rule still lacking an approval in the current round.
    pub fn pending_rule(&self, ctx: &ApprovalContext) -> DomainResult<Option<ApprovalRule>> {
        let requirements = self.requirements(ctx)?;
        let log = self.log.read().map_err(|_| poisoned())?;
        Ok(requirements.into_iter().find(|rule| {
            !log.current(ctx.document_id)
                .any(|d| d.rule_id == rule.id && d.verdict == ApprovalVerdict::Approved)
        }))
    }

    /// True when every applicable level is signed off (or none applies).
    pub fn is_approved(&self, ctx: &ApprovalContext) -> DomainResult<bool> {
        Ok(self.pending_rule(ctx)?.is_none())
    }

    pub fn approve(
        &self,
        ctx: &ApprovalContext,
        approver: &Approver,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<ApprovalOutcome> {
        let rule = self.authorize(ctx, approver)?;
        {
            let mut log = self.log.write().map_err(|_| poisoned())?;
            if log
                .current(ctx.document_id)
                .any(|d| d.user_id == approver.user_id && d.verdict == ApprovalVerdict::Approved)
            {
                return Err(DomainError::NotAuthorized(format!(
                    "user {} already signed off this round",
                    approver.user_id
                )));
            }
            let round = log.round(ctx.document_id);
            log.decisions.push(ApprovalDecision {
                document_id: ctx.document_id,
                rule_id: rule.id,
                level: rule.level,
                user_id: approver.user_id,
                verdict: ApprovalVerdict::Approved,
                comment,
                round,
                decided_at: at,
            });
        }
        info!(document_id = %ctx.document_id, level = rule.level, user_id = %approver.user_id, "approval recorded");

        Ok(match self.pending_rule(ctx)? {
            Some(next) => ApprovalOutcome::Pending {
                next_level: next.level,
            },
            None => ApprovalOutcome::Completed,
        })
    }

    /// Record a rejection at the pending level and close the round.
    pub fn reject(
        &self,
        ctx: &ApprovalContext,
        approver: &Approver,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> DomainResult<ApprovalDecision> {
        let rule = self.authorize(ctx, approver)?;
        let decision = {
            let mut log = self.log.write().map_err(|_| poisoned())?;
            let decision = ApprovalDecision {
                document_id: ctx.document_id,
                rule_id: rule.id,
                level: rule.level,
                user_id: approver.user_id,
                verdict: ApprovalVerdict::Rejected,
                comment,
                round: log.round(ctx.document_id),
                decided_at: at,
            };
            log.decisions.push(decision.clone());
            *log.rounds.entry(ctx.document_id).or_insert(0) += 1;
            decision
        };
        info!(document_id = %ctx.document_id, level = rule.level, user_id = %approver.user_id, "approval rejected");
        Ok(decision)
    }

    /// Archive the current round's decisions.
    pub fn close_round(&self, document_id: DocumentId) -> DomainResult<()> {
        let mut log = self.log.write().map_err(|_| poisoned())?;
        *log.rounds.entry(document_id).or_insert(0) += 1;
        Ok(())
    }

    /// Every decision ever taken on the document, oldest first.
    pub fn history(&self, document_id: DocumentId) -> DomainResult<Vec<ApprovalDecision>> {
        Ok(self
            .log
            .read()
            .map_err(|_| poisoned())?
            .decisions
            .iter()
            .filter(|d| d.document_id == document_id)
            .cloned()
            .collect())
    }

    fn authorize(&self, ctx: &ApprovalContext, approver: &Approver) -> DomainResult<ApprovalRule> {
        let rule = self.pending_rule(ctx)?.ok_or_else(|| {
            DomainError::conflict(format!(
                "no approval pending for {} -> {}",
                ctx.from_status, ctx.to_status
            ))
        })?;
        if !approver.has_role(&rule.role) {
            warn!(
                document_id = %ctx.document_id,
                level = rule.level,
                role = %rule.role,
                user_id = %approver.user_id,
                "approver lacks role"
            );
            return Err(DomainError::NotAuthorized(format!(
                "level {} needs role {}",
                rule.level, rule.role
            )));
        }
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ctx(document_id: DocumentId, amount: Decimal) -> ApprovalContext {
        ApprovalContext {
            document_id,
            document_type: "PO".to_string(),
            from_status: "draft".to_string(),
            to_status: "approved".to_string(),
            amount,
        }
    }

    fn service() -> ApprovalService {
        let svc = ApprovalService::new();
        svc.add_rule(ApprovalRule::new("PO", "draft", "approved", 1, "buyer"))
            .unwrap();
        svc.add_rule(
            ApprovalRule::new("PO", "draft", "approved", 2, "manager")
                .for_amounts(Some(dec!(1000)), None),
        )
        .unwrap();
        svc
    }

    #[test]
    fn small_amounts_need_one_level() {
        let svc = service();
        let doc = DocumentId::new();
        let buyer = Approver::new(UserId::new(), ["buyer"]);

        assert!(!svc.is_approved(&ctx(doc, dec!(500))).unwrap());
        let outcome = svc.approve(&ctx(doc, dec!(500)), &buyer, None, Utc::now()).unwrap();
        assert_eq!(outcome, ApprovalOutcome::Completed);
        assert!(svc.is_approved(&ctx(doc, dec!(500))).unwrap());
    }

    #[test]
    fn levels_are_signed_in_order_by_distinct_users() {
        let svc = service();
        let doc = DocumentId::new();
        let c = ctx(doc, dec!(5000));
        let buyer = Approver::new(UserId::new(), ["buyer", "manager"]);
        let manager = Approver::new(UserId::new(), ["manager"]);

        assert_eq!(
            svc.approve(&c, &manager, None, Utc::now()).unwrap_err().code(),
            "NOT_AUTHORIZED"
        );
        assert_eq!(
            svc.approve(&c, &buyer, None, Utc::now()).unwrap(),
            ApprovalOutcome::Pending { next_level: 2 }
        );
        // Same user cannot sign the next level too.
        assert_eq!(
            svc.approve(&c, &buyer, None, Utc::now()).unwrap_err().code(),
            "NOT_AUTHORIZED"
        );
        assert_eq!(
            svc.approve(&c, &manager, None, Utc::now()).unwrap(),
            ApprovalOutcome::Completed
        );
        assert_eq!(svc.history(doc).unwrap().len(), 2);
    }

    #[test]
    fn rejection_resets_the_round() {
        let svc = service();
        let doc = DocumentId::new();
        let c = ctx(doc, dec!(5000));
        let buyer = Approver::new(UserId::new(), ["buyer"]);
        let manager = Approver::new(UserId::new(), ["manager"]);

        svc.approve(&c, &buyer, None, Utc::now()).unwrap();
        let decision = svc
            .reject(&c, &manager, Some("too expensive".to_string()), Utc::now())
            .unwrap();
        assert_eq!(decision.verdict, ApprovalVerdict::Rejected);
        assert_eq!(decision.level, 2);

        // Back to level 1.
        assert_eq!(svc.pending_rule(&c).unwrap().unwrap().level, 1);
        assert_eq!(svc.history(doc).unwrap().len(), 2);
    }

    #[test]
    fn nothing_pending_is_a_conflict() {
        let svc = service();
        let c = ApprovalContext {
            to_status: "cancelled".to_string(),
            ..ctx(DocumentId::new(), dec!(1))
        };
        let err = svc
            .approve(&c, &Approver::new(UserId::new(), ["buyer"]), None, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn guarded_targets_respect_amount() {
        let svc = service();
        svc.add_rule(
            ApprovalRule::new("PO", "draft", "rush", 1, "director").for_amounts(None, Some(dec!(10))),
        )
        .unwrap();
        assert_eq!(
            svc.guarded_targets("PO", "draft", dec!(50)).unwrap(),
            vec!["approved".to_string()]
        );
        assert_eq!(svc.guarded_targets("PO", "draft", dec!(5)).unwrap().len(), 2);
    }
}
