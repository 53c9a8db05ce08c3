//! The client name registry kept under the `dw_clients` metadata key.

use std::collections::BTreeSet;

use dw_core::Demand;

/// Trim, drop blanks, dedupe and sort case-insensitively.
pub fn normalize<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let unique: BTreeSet<String> = names
        .into_iter()
        .map(|n| n.as_ref().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    let mut list: Vec<String> = unique.into_iter().collect();
    list.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    list
}

/// Decode the stored list. Non-string entries are skipped; an unreadable
/// value is logged and treated as empty.
pub fn from_meta(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(items) => normalize(items.iter().filter_map(|v| v.as_str())),
        Err(err) => {
            tracing::warn!(%err, "ignoring unreadable client list");
            Vec::new()
        }
    }
}

pub fn to_meta(list: &[String]) -> String {
    serde_json::Value::from(list.to_vec()).to_string()
}

/// Distinct client names used by `demands`.
pub fn seed_from_demands(demands: &[Demand]) -> Vec<String> {
    normalize(demands.iter().map(|d| d.client.as_str()))
}

pub fn with_added(list: &[String], name: &str) -> Vec<String> {
    normalize(list.iter().map(String::as_str).chain([name]))
}

pub fn with_renamed(list: &[String], from: &str, to: &str) -> Vec<String> {
    normalize(list.iter().map(|c| if c == from { to } else { c.as_str() }))
}

pub fn without(list: &[String], name: &str) -> Vec<String> {
    list.iter().filter(|c| *c != name).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_dedupes_and_sorts_case_insensitively() {
        assert_eq!(
            normalize(["  globex", "Acme", "", "acme", "Acme ", "beta"]),
            vec!["Acme", "acme", "beta", "globex"]
        );
    }

    #[test]
    fn from_meta_skips_junk() {
        assert_eq!(from_meta(None), Vec::<String>::new());
        assert_eq!(from_meta(Some("{oops")), Vec::<String>::new());
        assert_eq!(from_meta(Some(r#"["Zed", 3, null, "Acme"]"#)), vec!["Acme", "Zed"]);
        assert_eq!(to_meta(&["Acme".into()]), r#"["Acme"]"#);
    }

    #[test]
    fn rename_merges_into_existing_names() {
        let list = normalize(["Acme", "Acme Corp", "Globex"]);
        assert_eq!(with_renamed(&list, "Acme", "Acme Corp"), vec!["Acme Corp", "Globex"]);
        assert_eq!(with_added(&list, " Initech "), vec!["Acme", "Acme Corp", "Globex", "Initech"]);
        assert_eq!(without(&list, "Globex"), vec!["Acme", "Acme Corp"]);
    }
}
