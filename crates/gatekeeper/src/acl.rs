//! Role-based access list.
//!
//! Entries are read from the policy file as plain strings and compiled into
//! `AccessList` during provisioning, so a typo in an action or HTTP method
//! fails the policy up front instead of at request time.
//!
//! Evaluation is first-match: the first rule whose roles (and, when the
//! request carries method/path metadata, whose methods and path) match decides.
//! A claim set matching no rule is denied.

use axum::http::Method;
use serde::Deserialize;

/// The only claim access lists can currently match on.
pub const ROLES_CLAIM: &str = "roles";

/// Role value matching any role.
pub const ANY_ROLE: &str = "*";

/// Access list entry as written in the policy file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessListEntry {
    /// `allow` or `deny`.
    pub action: String,

    /// Claim the values apply to (only `roles`).
    #[serde(default = "default_claim")]
    pub claim: String,

    /// Role names; `*` matches any role.
    #[serde(default)]
    pub values: Vec<String>,

    /// HTTP methods this entry is limited to (empty = any).
    #[serde(default)]
    pub methods: Vec<String>,

    /// Path this entry is limited to; a trailing `*` makes it a prefix.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_claim() -> String {
    ROLES_CLAIM.to_string()
}

impl AccessListEntry {
    /// An entry allowing the given roles on any method and path.
    pub fn allow_roles(roles: &[&str]) -> Self {
        Self {
            action: "allow".to_string(),
            claim: default_claim(),
            values: roles.iter().map(|r| (*r).to_string()).collect(),
            methods: Vec::new(),
            path: None,
        }
    }

    /// An entry denying the given roles on any method and path.
    pub fn deny_roles(roles: &[&str]) -> Self {
        Self {
            action: "deny".to_string(),
            ..Self::allow_roles(roles)
        }
    }

    fn compile(&self) -> Result<AccessRule, String> {
        let action = match self.action.as_str() {
            "allow" => AclAction::Allow,
            "deny" => AclAction::Deny,
            other => return Err(format!("unsupported access list action '{other}'")),
        };

        if self.claim != ROLES_CLAIM {
            return Err(format!("unsupported access list claim '{}'", self.claim));
        }

        if self.values.is_empty() || self.values.iter().any(|v| v.trim().is_empty()) {
            return Err("access list entry has no role values".to_string());
        }

        let methods = self
            .methods
            .iter()
            .map(|m| {
                let upper = m.to_ascii_uppercase();
                match upper.as_str() {
                    "GET" | "HEAD" | "POST" | "PUT" | "PATCH" | "DELETE" | "OPTIONS" | "CONNECT"
                    | "TRACE" => Method::from_bytes(upper.as_bytes())
                        .map_err(|_| format!("unsupported access list method '{m}'")),
                    _ => Err(format!("unsupported access list method '{m}'")),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(path) = &self.path {
            if !path.starts_with('/') {
                return Err(format!("access list path '{path}' must start with '/'"));
            }
        }

        Ok(AccessRule {
            action,
            roles: self.values.clone(),
            methods,
            path: self.path.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclAction {
    Allow,
    Deny,
}

/// Compiled access list rule.
#[derive(Debug, Clone)]
pub struct AccessRule {
    action: AclAction,
    roles: Vec<String>,
    methods: Vec<Method>,
    path: Option<String>,
}

impl AccessRule {
    fn matches(&self, roles: &[String], method: Option<&str>, path: Option<&str>) -> bool {
        let role_match = self
            .roles
            .iter()
            .any(|allowed| allowed == ANY_ROLE || roles.iter().any(|r| r == allowed));
        if !role_match {
            return false;
        }

        if let Some(method) = method {
            if !self.methods.is_empty() && !self.methods.iter().any(|m| m.as_str() == method) {
                return false;
            }
        }

        if let (Some(path), Some(pattern)) = (path, self.path.as_deref()) {
            let path_match = match pattern.strip_suffix('*') {
                Some(prefix) => path.starts_with(prefix),
                None => path == pattern,
            };
            if !path_match {
                return false;
            }
        }

        true
    }
}

/// Outcome of evaluating an access list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    Allow,
    Deny,
}

/// Compiled, ordered access list.
#[derive(Debug, Clone)]
pub struct AccessList {
    rules: Vec<AccessRule>,
}

impl AccessList {
    /// Compile raw entries, rejecting any syntax error.
    pub fn compile(entries: &[AccessListEntry]) -> Result<Self, String> {
        let rules = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| entry.compile().map_err(|e| format!("access list entry {i}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate the list for a role set.
    ///
    /// `method` and `path` are only consulted when present, i.e. when the
    /// policy validates method and path.
    pub fn evaluate(&self, roles: &[String], method: Option<&str>, path: Option<&str>) -> AclDecision {
        match self.rules.iter().find(|rule| rule.matches(roles, method, path)) {
            Some(rule) if rule.action == AclAction::Allow => AclDecision::Allow,
            _ => AclDecision::Deny,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn roles(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_first_match_wins() {
        let list = AccessList::compile(&[
            AccessListEntry::deny_roles(&["guest"]),
            AccessListEntry::allow_roles(&["*"]),
        ])
        .unwrap();

        assert_eq!(list.evaluate(&roles(&["guest"]), None, None), AclDecision::Deny);
        assert_eq!(list.evaluate(&roles(&["user"]), None, None), AclDecision::Allow);
    }

    #[test]
    fn test_no_match_is_denied() {
        let list = AccessList::compile(&[AccessListEntry::allow_roles(&["admin"])]).unwrap();

        assert_eq!(list.evaluate(&roles(&["user"]), None, None), AclDecision::Deny);
        assert_eq!(list.evaluate(&[], None, None), AclDecision::Deny);
    }

    #[test]
    fn test_method_and_path_only_apply_when_present() {
        let entry = AccessListEntry {
            methods: vec!["get".to_string()],
            path: Some("/api/*".to_string()),
            ..AccessListEntry::allow_roles(&["user"])
        };
        let list = AccessList::compile(&[entry]).unwrap();
        let user = roles(&["user"]);

        assert_eq!(list.evaluate(&user, None, None), AclDecision::Allow);
        assert_eq!(list.evaluate(&user, Some("GET"), Some("/api/items")), AclDecision::Allow);
        assert_eq!(list.evaluate(&user, Some("POST"), Some("/api/items")), AclDecision::Deny);
        assert_eq!(list.evaluate(&user, Some("GET"), Some("/admin")), AclDecision::Deny);
    }

    #[test]
    fn test_exact_path_match() {
        let entry = AccessListEntry {
            path: Some("/health".to_string()),
            ..AccessListEntry::allow_roles(&["*"])
        };
        let list = AccessList::compile(&[entry]).unwrap();

        assert_eq!(list.evaluate(&roles(&["x"]), Some("GET"), Some("/health")), AclDecision::Allow);
        assert_eq!(list.evaluate(&roles(&["x"]), Some("GET"), Some("/healthz")), AclDecision::Deny);
    }

    #[test]
    fn test_compile_rejects_bad_syntax() {
        let bad_action = AccessListEntry {
            action: "permit".to_string(),
            ..AccessListEntry::allow_roles(&["user"])
        };
        let bad_claim = AccessListEntry {
            claim: "groups".to_string(),
            ..AccessListEntry::allow_roles(&["user"])
        };
        let no_values = AccessListEntry::allow_roles(&[]);
        let bad_method = AccessListEntry {
            methods: vec!["FETCH".to_string()],
            ..AccessListEntry::allow_roles(&["user"])
        };
        let bad_path = AccessListEntry {
            path: Some("api".to_string()),
            ..AccessListEntry::allow_roles(&["user"])
        };

        for entry in [bad_action, bad_claim, no_values, bad_method, bad_path] {
            let err = AccessList::compile(&[entry]).unwrap_err();
            assert!(err.starts_with("access list entry 0"), "unexpected error: {err}");
        }
    }

    #[test]
    fn test_deserialize_defaults_claim() {
        let entry: AccessListEntry =
            serde_json::from_str(r#"{"action": "allow", "values": ["admin"]}"#).unwrap();
        assert_eq!(entry.claim, ROLES_CLAIM);
        assert!(entry.methods.is_empty());
    }
}
