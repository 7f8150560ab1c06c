//! Digest challenge policy
//!
//! Decides per request whether the auth manager must demand credentials
//! before the request reaches its handler. The decision is a table lookup:
//! every method maps to a [`ChallengeRule`], methods missing from the table
//! are admitted without a challenge (the server registers no handler for
//! them anyway).

use super::message::{SipMethod, SipRequest};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeDecision {
    Required,
    NotRequired,
}

impl ChallengeDecision {
    pub fn is_required(&self) -> bool {
        matches!(self, ChallengeDecision::Required)
    }
}

/// Table entry of the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeRule {
    Fixed(ChallengeDecision),
    /// Depends on whether the Call-ID belongs to a dialog this server
    /// started. Without a dialog lookup `otherwise` applies.
    DialogAware {
        in_dialog: ChallengeDecision,
        otherwise: ChallengeDecision,
    },
}

impl ChallengeRule {
    pub const fn required() -> Self {
        ChallengeRule::Fixed(ChallengeDecision::Required)
    }

    pub const fn not_required() -> Self {
        ChallengeRule::Fixed(ChallengeDecision::NotRequired)
    }

    /// Decision when nothing is known about the dialog
    fn without_dialog(&self) -> ChallengeDecision {
        match self {
            ChallengeRule::Fixed(decision) => *decision,
            ChallengeRule::DialogAware { otherwise, .. } => *otherwise,
        }
    }
}

/// Session bookkeeping the policy may consult
#[cfg_attr(test, mockall::automock)]
pub trait DialogLookup: Send + Sync {
    /// True when `call_id` names a dialog this server initiated
    fn is_local_dialog(&self, call_id: &str) -> bool;
}

#[derive(Clone)]
pub struct ChallengePolicy {
    rules: HashMap<SipMethod, ChallengeRule>,
    dialogs: Option<Arc<dyn DialogLookup>>,
}

impl Default for ChallengePolicy {
    fn default() -> Self {
        let rules = HashMap::from([
            (SipMethod::Register, ChallengeRule::required()),
            (SipMethod::Invite, ChallengeRule::required()),
            (SipMethod::Cancel, ChallengeRule::not_required()),
            (SipMethod::Options, ChallengeRule::not_required()),
            (SipMethod::Info, ChallengeRule::not_required()),
            // In-dialog requests of an authenticated session are not
            // challenged again
            (SipMethod::Bye, ChallengeRule::not_required()),
        ]);

        Self {
            rules,
            dialogs: None,
        }
    }
}

impl ChallengePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override or add the rule for `method`
    pub fn with_rule(mut self, method: SipMethod, rule: ChallengeRule) -> Self {
        self.rules.insert(method, rule);
        self
    }

    pub fn with_dialog_lookup(mut self, dialogs: Arc<dyn DialogLookup>) -> Self {
        self.dialogs = Some(dialogs);
        self
    }

    pub fn rule(&self, method: SipMethod) -> Option<ChallengeRule> {
        self.rules.get(&method).copied()
    }

    /// Method-only decision
    pub fn requires_challenge(&self, method: SipMethod) -> bool {
        self.rules
            .get(&method)
            .map(|rule| rule.without_dialog())
            .unwrap_or(ChallengeDecision::NotRequired)
            .is_required()
    }

    /// Full decision for a request, consulting the dialog lookup for
    /// dialog-aware rules
    pub fn decide(&self, request: &SipRequest) -> ChallengeDecision {
        let Some(rule) = request.method().and_then(|m| self.rule(m)) else {
            return ChallengeDecision::NotRequired;
        };

        match (rule, &self.dialogs, request.call_id()) {
            (
                ChallengeRule::DialogAware {
                    in_dialog,
                    otherwise,
                },
                Some(dialogs),
                Some(call_id),
            ) => {
                if dialogs.is_local_dialog(&call_id) {
                    in_dialog
                } else {
                    otherwise
                }
            }
            (rule, _, _) => rule.without_dialog(),
        }
    }
}
