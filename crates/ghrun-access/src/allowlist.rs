use std::collections::BTreeSet;

const ALLOW_OPEN_DEPLOYMENT: &str = "allow_open_deployment";
const ALLOW_ALLOWLIST: &str = "allow_allowlist";
const DENY_ACTOR_ID_MISSING: &str = "deny_actor_id_missing";
const DENY_ACTOR_NOT_ALLOWLISTED: &str = "deny_actor_not_allowlisted";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `AccessDecision` values.
pub enum AccessDecision {
    Allow { reason_code: &'static str },
    Deny { reason_code: &'static str },
}

impl AccessDecision {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Allow { reason_code } | Self::Deny { reason_code } => reason_code,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// User identities permitted to talk to the bot. Empty means everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    user_ids: BTreeSet<String>,
}

impl AllowList {
    /// Parses a comma-separated id list, ignoring blanks around and between entries.
    pub fn parse(raw: &str) -> Self {
        Self::from_ids(raw.split(','))
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let user_ids = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Self { user_ids }
    }

    pub fn is_open(&self) -> bool {
        self.user_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    pub fn evaluate(&self, user_id: &str) -> AccessDecision {
        if self.is_open() {
            return AccessDecision::Allow {
                reason_code: ALLOW_OPEN_DEPLOYMENT,
            };
        }
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return AccessDecision::Deny {
                reason_code: DENY_ACTOR_ID_MISSING,
            };
        }
        if self.user_ids.contains(user_id) {
            AccessDecision::Allow {
                reason_code: ALLOW_ALLOWLIST,
            }
        } else {
            AccessDecision::Deny {
                reason_code: DENY_ACTOR_NOT_ALLOWLISTED,
            }
        }
    }

    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.evaluate(user_id).is_allowed()
    }
}
