//! Domain glob matching (`*` and `?`).

pub(crate) fn is_glob(s: &str) -> bool {
	s.contains(['*', '?'])
}

/// Matches `text` against a glob with `*` (any run) and `?` (one char).
///
/// Iterative with single-star backtracking, so worst case is O(n*m).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
	let p: Vec<char> = pattern.chars().collect();
	let t: Vec<char> = text.chars().collect();
	let (mut pi, mut ti) = (0, 0);
	let mut star: Option<(usize, usize)> = None;

	while ti < t.len() {
		if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
			pi += 1;
			ti += 1;
		} else if pi < p.len() && p[pi] == '*' {
			star = Some((pi, ti));
			pi += 1;
		} else if let Some((sp, st)) = star {
			pi = sp + 1;
			ti = st + 1;
			star = Some((sp, st + 1));
		} else {
			return false;
		}
	}
	p[pi..].iter().all(|&c| c == '*')
}
