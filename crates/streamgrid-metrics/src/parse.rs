//! Prometheus text exposition parsing.
//!
//! Extracts a single named counter from a metrics page. A replica reports
//! the counter once per partition, so the scraper sums every sample line
//! whose name and required labels match.

/// Sum all samples of `metric` whose labels include every `(key, value)`
/// pair in `required`.
///
/// Returns `None` when no sample line matches, so the caller can
/// distinguish "metric missing" from a genuine zero.
pub fn sum_counter(body: &str, metric: &str, required: &[(&str, &str)]) -> Option<f64> {
    let mut sum = 0.0;
    let mut matched = false;

    for line in body.lines() {
        let Some((name, labels, value)) = parse_sample(line) else {
            continue;
        };
        if name != metric {
            continue;
        }
        let satisfied = required
            .iter()
            .all(|(k, v)| labels.iter().any(|(lk, lv)| lk == k && lv == v));
        if satisfied {
            sum += value;
            matched = true;
        }
    }

    matched.then_some(sum)
}

/// Parse one exposition line into `(name, labels, value)`.
///
/// Comment lines (`# HELP`, `# TYPE`), blank lines, and malformed lines
/// yield `None`. An optional trailing timestamp is ignored.
fn parse_sample(line: &str) -> Option<(&str, Vec<(String, String)>, f64)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (name, rest) = match line.find(|c: char| c == '{' || c.is_whitespace()) {
        Some(idx) => line.split_at(idx),
        None => return None,
    };

    let (labels, rest) = if let Some(inner) = rest.strip_prefix('{') {
        parse_labels(inner)?
    } else {
        (Vec::new(), rest)
    };

    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
    Some((name, labels, value))
}

/// Parse a `key="value",...}` label block, handling `\"`, `\\`, and `\n`
/// escapes inside values. Returns the labels and the remainder after `}`.
fn parse_labels(s: &str) -> Option<(Vec<(String, String)>, &str)> {
    let mut labels = Vec::new();
    let mut rest = s;

    loop {
        rest = rest.trim_start_matches([',', ' ']);
        if let Some(after) = rest.strip_prefix('}') {
            return Some((labels, after));
        }

        let eq = rest.find('=')?;
        let key = rest[..eq].trim().to_string();
        rest = rest[eq + 1..].strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let close;
        loop {
            let (i, c) = chars.next()?;
            match c {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => {
                    close = i;
                    break;
                }
                other => value.push(other),
            }
        }
        labels.push((key, value));
        rest = &rest[close + 1..];
    }
}
