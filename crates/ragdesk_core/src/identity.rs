/// Access scope used when the caller has no principals of its own.
pub const PUBLIC_PRINCIPAL: &str = "public";

/// Ordered, duplicate-free set of access-scope identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrincipalSet(Vec<String>);

impl PrincipalSet {
    /// Builds a set from `principals`, dropping blanks and repeats while
    /// keeping first-seen order. An empty result falls back to the public
    /// scope.
    pub fn new<I, S>(principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: Vec<String> = Vec::new();
        for principal in principals {
            let principal = principal.into();
            let principal = principal.trim();
            if principal.is_empty() || set.iter().any(|known| known == principal) {
                continue;
            }
            set.push(principal.to_string());
        }
        if set.is_empty() {
            set.push(PUBLIC_PRINCIPAL.to_string());
        }
        Self(set)
    }

    pub fn public() -> Self {
        Self(vec![PUBLIC_PRINCIPAL.to_string()])
    }

    pub fn for_identity(identity: Option<&Identity>) -> Self {
        match identity {
            Some(identity) => identity.principals.clone(),
            None => Self::public(),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl Default for PrincipalSet {
    fn default() -> Self {
        Self::public()
    }
}

/// Authenticated caller as seen by the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub principals: PrincipalSet,
}

impl Identity {
    pub fn new<I, S>(user_id: impl Into<String>, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            principals: PrincipalSet::new(principals),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_principals_default_to_public() {
        let set = PrincipalSet::new(Vec::<String>::new());
        assert_eq!(set.as_slice(), ["public"]);
        let blank = PrincipalSet::new(["  ", ""]);
        assert_eq!(blank, PrincipalSet::public());
    }

    #[test]
    fn principals_are_deduplicated_in_order() {
        let set = PrincipalSet::new(["group:b", "user:1", "group:b", " user:1 "]);
        assert_eq!(set.as_slice(), ["group:b", "user:1"]);
    }

    #[test]
    fn anonymous_callers_use_public_scope() {
        assert_eq!(PrincipalSet::for_identity(None), PrincipalSet::public());
        let identity = Identity::new("u1", ["team:a"]);
        assert_eq!(
            PrincipalSet::for_identity(Some(&identity)).as_slice(),
            ["team:a"]
        );
    }
}
