use super::hierarchy::SEPARATOR;

/// Refuses source deletion below any protected path prefix.
#[derive(Debug, Clone, Default)]
pub struct DeleteGuard {
    protected: Vec<String>,
}

impl DeleteGuard {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            protected: prefixes
                .into_iter()
                .map(|prefix| with_leading_separator(prefix.as_ref()))
                .collect(),
        }
    }

    pub fn may_delete(&self, parent_path: &str) -> bool {
        may_delete(parent_path, &self.protected)
    }

    /// The first prefix shielding `parent_path`, if any.
    pub fn protecting_prefix(&self, parent_path: &str) -> Option<&str> {
        let parent_path = with_leading_separator(parent_path);
        self.protected
            .iter()
            .find(|prefix| parent_path.starts_with(prefix.as_str()))
            .map(String::as_str)
    }
}

pub fn may_delete<S: AsRef<str>>(parent_path: &str, protected_prefixes: &[S]) -> bool {
    let parent_path = with_leading_separator(parent_path);
    !protected_prefixes
        .iter()
        .any(|prefix| parent_path.starts_with(prefix.as_ref()))
}

fn with_leading_separator(path: &str) -> String {
    format!("{SEPARATOR}{}", path.trim_start_matches(SEPARATOR))
}
