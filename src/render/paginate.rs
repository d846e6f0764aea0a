/// Split `body` into pages of at most `max` characters.
///
/// Cuts prefer a paragraph break (`\n\n`), then a line break, then a hard cut
/// at `max`. The separator at a break is dropped, so joining the pages with
/// the separators reproduces `body`. A break is only taken if the rest still
/// fits in the `ceil(len / max)` page budget.
pub fn split_pages(body: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if max == 0 || len <= max {
        return vec![body.to_string()];
    }

    let budget = len.div_ceil(max);
    let mut pages = Vec::with_capacity(budget);
    let mut start = 0;

    while len - start > max {
        let pages_left_after = budget - pages.len() - 1;
        let fits = |next: usize| (len - next).div_ceil(max) <= pages_left_after;
        let window_end = start + max;

        let cut = find_break(&chars, start, window_end, &['\n', '\n'])
            .map(|at| (at, at + 2))
            .filter(|&(_, next)| fits(next))
            .or_else(|| {
                find_break(&chars, start, window_end, &['\n'])
                    .map(|at| (at, at + 1))
                    .filter(|&(_, next)| fits(next))
            })
            .unwrap_or((window_end, window_end));

        pages.push(chars[start..cut.0].iter().collect());
        start = cut.1;
    }
    pages.push(chars[start..].iter().collect());
    pages
}

/// Rightmost position `at` with `start < at <= end` where `sep` begins.
fn find_break(chars: &[char], start: usize, end: usize, sep: &[char]) -> Option<usize> {
    (start + 1..=end)
        .rev()
        .find(|&at| chars.get(at..at + sep.len()) == Some(sep))
}
