/// Entry file names recognised by the packager, highest priority first.
pub const CANONICAL_ENTRY_POINTS: [&str; 3] = ["index.js", "main.js", "app.js"];

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Pick the file the generated script runs.
///
/// `paths` are `/`-separated paths relative to the emitted directory. Only
/// `.js` files are candidates. A canonical name wins over everything else,
/// preferring the shallowest match and then the lexicographically smallest
/// path; without one, the lexicographically smallest `.js` path is chosen.
/// The result never depends on the order of `paths`.
pub fn select_entry_point(paths: &[String]) -> Option<&str> {
    let candidates: Vec<&str> = paths
        .iter()
        .map(String::as_str)
        .filter(|p| file_name(p).ends_with(".js"))
        .collect();

    for canonical in CANONICAL_ENTRY_POINTS {
        let best = candidates
            .iter()
            .copied()
            .filter(|p| file_name(p) == canonical)
            .min_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
        if best.is_some() {
            return best;
        }
    }

    candidates.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_wins_regardless_of_order() {
        let forward = paths(&["alpha.js", "index.js", "util.js"]);
        let reversed = paths(&["util.js", "index.js", "alpha.js"]);
        assert_eq!(select_entry_point(&forward), Some("index.js"));
        assert_eq!(select_entry_point(&reversed), Some("index.js"));
    }

    #[test]
    fn test_canonical_priority() {
        let files = paths(&["app.js", "main.js", "zeta.js"]);
        assert_eq!(select_entry_point(&files), Some("main.js"));

        let files = paths(&["app.js", "lib.js"]);
        assert_eq!(select_entry_point(&files), Some("app.js"));
    }

    #[test]
    fn test_shallowest_canonical_match() {
        let files = paths(&["src/lib/index.js", "src/index.js", "a/index.js"]);
        assert_eq!(select_entry_point(&files), Some("a/index.js"));

        let files = paths(&["src/lib/index.js", "index.js"]);
        assert_eq!(select_entry_point(&files), Some("index.js"));
    }

    #[test]
    fn test_fallback_is_lexicographic() {
        let files = paths(&["zeta.js", "beta.js", "alpha.js"]);
        assert_eq!(select_entry_point(&files), Some("alpha.js"));
    }

    #[test]
    fn test_non_js_files_are_not_candidates() {
        let files = paths(&["data.json", "index.js.map", "types.d.ts", "run.js"]);
        assert_eq!(select_entry_point(&files), Some("run.js"));

        let files = paths(&["index.js.map", "data.json"]);
        assert_eq!(select_entry_point(&files), None);
        assert_eq!(select_entry_point(&[]), None);
    }
}
