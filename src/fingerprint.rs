use std::collections::BTreeMap;

/// Query keys that steer request handling rather than generator behavior.
/// They must never influence the fingerprint, or debug/reload requests
/// would each get their own cache entry instead of sharing one with plain
/// scrape requests.
const CONTROL_KEYS: &[&str] = &["debug", "reload"];

/// Computes the stable cache/queue key for a request: the path plus its
/// query arguments in sorted order, with control keys removed first.
///
/// `args` should already be the fully decoded query map (axum's `Query`
/// extractor form); this function does not itself do percent-decoding.
pub fn compute(path: &str, args: &BTreeMap<String, String>) -> String {
    let filtered = strip_control_keys(args);
    if filtered.is_empty() {
        path.to_string()
    } else {
        let qs = canonical_query_string(&filtered);
        format!("{path}?{qs}")
    }
}

/// Returns a copy of `args` with `debug`/`reload` removed.
pub fn strip_control_keys(args: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    args.iter()
        .filter(|(k, _)| !CONTROL_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn canonical_query_string(args: &BTreeMap<String, String>) -> String {
    // BTreeMap already iterates in sorted key order.
    args.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn is_true(args: &BTreeMap<String, String>, key: &str) -> bool {
    args.get(key).map(|v| v == "true").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn same_args_same_fp_regardless_of_insertion_order() {
        let a = map(&[("b", "2"), ("a", "1")]);
        let b = map(&[("a", "1"), ("b", "2")]);
        assert_eq!(compute("/targets/x", &a), compute("/targets/x", &b));
    }

    #[test]
    fn debug_and_reload_do_not_affect_fp() {
        let plain = map(&[("foo", "1")]);
        let debug = map(&[("foo", "1"), ("debug", "true")]);
        let reload = map(&[("foo", "1"), ("reload", "true")]);
        let fp = compute("/targets/x", &plain);
        assert_eq!(fp, compute("/targets/x", &debug));
        assert_eq!(fp, compute("/targets/x", &reload));
    }

    #[test]
    fn no_args_has_bare_path_fp() {
        let empty = map(&[]);
        assert_eq!(compute("/targets/x", &empty), "/targets/x");
    }
}
