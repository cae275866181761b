use crate::config::SESSION_PREFIX;

/// A parsed actor address. Downstream code switches on this variant instead
/// of re-parsing raw "/"-separated paths.
///
/// Address grammar:
/// - `mayor`, `deacon`, `narrator`: town-level fixed roles
/// - `<workspace>/witness`, `<workspace>/refinery`, `<workspace>/narrator`
/// - `<workspace>/crew/<name>`: a human member
/// - `<workspace>/workers/<name>` or `<workspace>/<name>`: an agent worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Mayor,
    Deacon,
    Witness,
    Refinery,
    Narrator,
    Worker(String),
    Human(String),
}

impl Address {
    /// Parse an actor path into a tagged role.
    /// Returns None for empty or unrecognizable paths.
    pub fn parse(path: &str) -> Option<Address> {
        let trimmed = path.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        let parts: Vec<&str> = trimmed.split('/').collect();

        if parts.len() == 1 {
            return match parts[0] {
                "mayor" => Some(Address::Mayor),
                "deacon" => Some(Address::Deacon),
                "narrator" => Some(Address::Narrator),
                _ => None,
            };
        }

        match parts[1] {
            "witness" => Some(Address::Witness),
            "refinery" => Some(Address::Refinery),
            "narrator" => Some(Address::Narrator),
            "crew" if parts.len() >= 3 => Some(Address::Human(parts[2].to_string())),
            "workers" if parts.len() >= 3 => Some(Address::Worker(parts[2].to_string())),
            // An arbitrary second segment is a worker name: gastown/toast
            name => Some(Address::Worker(name.to_string())),
        }
    }

    /// Role label used in event summaries and status output.
    pub fn role(&self) -> &str {
        match self {
            Address::Mayor => "mayor",
            Address::Deacon => "deacon",
            Address::Witness => "witness",
            Address::Refinery => "refinery",
            Address::Narrator => "narrator",
            Address::Worker(_) => "worker",
            Address::Human(_) => "human",
        }
    }
}

/// Extract the workspace from an actor path, excluding town-level actors.
pub fn workspace_of(actor: &str) -> Option<&str> {
    let first = actor.split('/').next()?;
    if first.is_empty() {
        return None;
    }
    match first {
        "mayor" | "deacon" | "narrator" | "gt" => None,
        ws => Some(ws),
    }
}

/// Resolve a mail address to a supervised session id.
///
/// `"mayor"` and `"mayor/"` resolve to the town-level `gt-mayor` session;
/// `"gastown/toast"` resolves to `gt-gastown-toast`. Returns None when the
/// address has no live-session form.
pub fn session_id_for(address: &str) -> Option<String> {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.splitn(2, '/').collect();
    if parts.len() == 1 {
        // Town-level fixed session
        return Some(format!("{}{}", SESSION_PREFIX, parts[0]));
    }
    if parts[1].is_empty() {
        return None;
    }
    Some(format!("{}{}-{}", SESSION_PREFIX, parts[0], parts[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_town_level_roles() {
        assert_eq!(Address::parse("mayor"), Some(Address::Mayor));
        assert_eq!(Address::parse("deacon"), Some(Address::Deacon));
        assert_eq!(Address::parse("narrator"), Some(Address::Narrator));
        assert_eq!(Address::parse(""), None);
    }

    #[test]
    fn test_parse_workspace_roles() {
        assert_eq!(Address::parse("gastown/witness"), Some(Address::Witness));
        assert_eq!(Address::parse("gastown/refinery"), Some(Address::Refinery));
        assert_eq!(
            Address::parse("gastown/crew/ada"),
            Some(Address::Human("ada".to_string()))
        );
        assert_eq!(
            Address::parse("gastown/workers/toast"),
            Some(Address::Worker("toast".to_string()))
        );
        assert_eq!(
            Address::parse("gastown/toast"),
            Some(Address::Worker("toast".to_string()))
        );
    }

    #[test]
    fn test_workspace_extraction() {
        assert_eq!(workspace_of("gastown/witness"), Some("gastown"));
        assert_eq!(workspace_of("mayor"), None);
        assert_eq!(workspace_of("deacon"), None);
        assert_eq!(workspace_of("gt"), None);
    }

    #[test]
    fn test_session_id_forms() {
        assert_eq!(session_id_for("mayor"), Some("gt-mayor".to_string()));
        assert_eq!(session_id_for("mayor/"), Some("gt-mayor".to_string()));
        assert_eq!(
            session_id_for("gastown/toast"),
            Some("gt-gastown-toast".to_string())
        );
        assert_eq!(session_id_for(""), None);
    }
}
