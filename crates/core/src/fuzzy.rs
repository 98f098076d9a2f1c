/// Levenshtein edit distance over chars, two-row O(min(m,n)) space.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    // Keep the shorter string in the inner loop to minimise allocation.
    let (a, b, m, n) = if m <= n { (a, b, m, n) } else { (b, a, n, m) };

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Similarity in 0.0..=1.0, where 1.0 means identical.
pub fn similarity(s1: &str, s2: &str) -> f32 {
    let longest = s1.chars().count().max(s2.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein_distance(s1, s2) as f32 / longest as f32
}

/// Pick the candidate label closest to `input`, if it clears `threshold`.
///
/// Ties keep the earlier candidate, so callers control precedence by order.
pub fn closest_match<'a, T: Copy>(
    input: &str,
    candidates: impl IntoIterator<Item = (&'a str, T)>,
    threshold: f32,
) -> Option<T> {
    let mut best: Option<(f32, T)> = None;
    for (label, value) in candidates {
        let score = similarity(input, label);
        if score >= threshold && best.map_or(true, |(b, _)| score > b) {
            best = Some((score, value));
        }
    }
    best.map(|(_, v)| v)
}
