//! Credential table authorizer backed by the `access` config section.

use git_http::{AccessKind, Authorizer, RefAction};

use crate::config::{Access, RefRule, User};

pub struct StaticAuthorizer {
    users: Vec<User>,
    ref_rules: Vec<RefRule>,
}

impl StaticAuthorizer {
    pub fn new(access: Access) -> Self {
        Self {
            users: access.users,
            ref_rules: access.ref_rules,
        }
    }

    fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name)
    }
}

fn pattern_matches(pattern: &str, repo: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(namespace) => repo
            .strip_prefix(namespace)
            .is_some_and(|rest| rest.starts_with('/')),
        None => pattern == repo,
    }
}

fn any_matches(patterns: &[String], repo: &str) -> bool {
    patterns.iter().any(|p| pattern_matches(p, repo))
}

impl Authorizer for StaticAuthorizer {
    fn authorize_repo(&self, repo: &str, user: &str, password: &str, access: AccessKind) -> bool {
        let Some(entry) = self.user(user) else {
            return false;
        };
        if entry.password != password {
            return false;
        }
        match access {
            AccessKind::Read => any_matches(&entry.read, repo) || any_matches(&entry.write, repo),
            AccessKind::Write => any_matches(&entry.write, repo),
        }
    }

    fn authorize_ref(
        &self,
        _repo: &str,
        user: &str,
        ref_name: &str,
        action: RefAction,
        _access: AccessKind,
    ) -> bool {
        self.ref_rules
            .iter()
            .filter(|rule| ref_name.starts_with(&rule.prefix) && rule.actions.contains(&action))
            .all(|rule| rule.users.iter().any(|u| u == user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, read: &[&str], write: &[&str]) -> User {
        User {
            name: name.to_string(),
            password: "pw".to_string(),
            read: read.iter().map(|s| s.to_string()).collect(),
            write: write.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn authorizer() -> StaticAuthorizer {
        StaticAuthorizer::new(Access {
            users: vec![
                user("admin", &[], &["*"]),
                user("dev", &["*"], &["team/*", "tools"]),
                user("guest", &["public"], &[]),
            ],
            ref_rules: vec![RefRule {
                prefix: "refs/heads/main".to_string(),
                actions: vec![RefAction::Update, RefAction::Delete],
                users: vec!["admin".to_string()],
            }],
        })
    }

    #[test]
    fn patterns() {
        assert!(pattern_matches("*", "anything/at/all"));
        assert!(pattern_matches("team/*", "team/app"));
        assert!(pattern_matches("team/*", "team/nested/app"));
        assert!(!pattern_matches("team/*", "team"));
        assert!(!pattern_matches("team/*", "teammate/app"));
        assert!(pattern_matches("tools", "tools"));
        assert!(!pattern_matches("tools", "tools/x"));
    }

    #[test]
    fn repository_access() {
        let auth = authorizer();
        assert!(auth.authorize_repo("x", "admin", "pw", AccessKind::Read));
        assert!(auth.authorize_repo("x", "admin", "pw", AccessKind::Write));
        assert!(!auth.authorize_repo("x", "admin", "wrong", AccessKind::Read));
        assert!(!auth.authorize_repo("x", "nobody", "pw", AccessKind::Read));

        assert!(auth.authorize_repo("other", "dev", "pw", AccessKind::Read));
        assert!(!auth.authorize_repo("other", "dev", "pw", AccessKind::Write));
        assert!(auth.authorize_repo("team/app", "dev", "pw", AccessKind::Write));
        assert!(auth.authorize_repo("tools", "dev", "pw", AccessKind::Write));

        assert!(auth.authorize_repo("public", "guest", "pw", AccessKind::Read));
        assert!(!auth.authorize_repo("public", "guest", "pw", AccessKind::Write));
        assert!(!auth.authorize_repo("team/app", "guest", "pw", AccessKind::Read));
    }

    #[test]
    fn ref_rules() {
        let auth = authorizer();
        let check = |user, ref_name, action| auth.authorize_ref("team/app", user, ref_name, action, AccessKind::Write);

        assert!(check("admin", "refs/heads/main", RefAction::Update));
        assert!(!check("dev", "refs/heads/main", RefAction::Update));
        assert!(!check("dev", "refs/heads/main", RefAction::Delete));
        // creating is not restricted by the rule
        assert!(check("dev", "refs/heads/main", RefAction::Create));
        assert!(check("dev", "refs/heads/feature", RefAction::Delete));
    }
}
