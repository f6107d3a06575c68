use std::collections::BTreeSet;

/// The set of location names an event may use. Supplied from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationWhitelist {
    names: BTreeSet<String>,
}

impl LocationWhitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { names }
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, location: &str) -> bool {
        self.names.contains(location)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
