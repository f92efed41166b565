/// Substring identifying an operating-period header token.
pub const PERIOD_MARKER: &str = "OperatingPeriod";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodGroup {
    /// Raw marker token, e.g. `OperatingPeriod:01/2020-Dec2020`.
    pub key: String,
    /// Label/value tokens following the marker, up to the next marker.
    pub values: Vec<String>,
}

pub fn is_period_marker(token: &str) -> bool {
    token.contains(PERIOD_MARKER)
}

/// Split tokens into maximal runs of equal marker classification, in order.
fn runs(tokens: &[String]) -> Vec<(bool, &[String])> {
    let mut out = Vec::new();
    let mut start = 0;
    for i in 1..=tokens.len() {
        if i == tokens.len() || is_period_marker(&tokens[i]) != is_period_marker(&tokens[start]) {
            if start < i {
                out.push((is_period_marker(&tokens[start]), &tokens[start..i]));
            }
            start = i;
        }
    }
    out
}

/// Pair every marker run with the value run that follows it.
///
/// Only the first token of a marker run becomes the key; the rest of that run
/// is dropped. A trailing marker run with nothing after it yields no group.
/// Duplicate keys are kept as separate groups in source order.
pub fn segment(tokens: &[String]) -> Vec<PeriodGroup> {
    let runs = runs(tokens);
    let mut groups = Vec::new();
    for (idx, (is_marker, run)) in runs.iter().enumerate() {
        if !is_marker {
            continue;
        }
        let Some((_, values)) = runs.get(idx + 1) else {
            break;
        };
        groups.push(PeriodGroup {
            key: run[0].clone(),
            values: values.to_vec(),
        });
    }
    groups
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn one_group_per_marker() {
        let tokens = toks(&[
            "OperatingPeriod:Jan2021",
            "OperatingDays:",
            "OperatingDays:31days",
            "OperatingPeriod:Feb2021",
            "OperatingDays:",
            "OperatingDays:28days",
            "OperatingPeriod:Mar2021",
            "ProductionCompany:",
            "ProductionCompany:Acme",
        ]);
        let groups = segment(&tokens);
        assert_eq!(groups.len(), 3);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["OperatingPeriod:Jan2021", "OperatingPeriod:Feb2021", "OperatingPeriod:Mar2021"]
        );
        assert_eq!(groups[1].values, toks(&["OperatingDays:", "OperatingDays:28days"]));
    }

    #[test]
    fn dangling_marker_dropped() {
        let tokens = toks(&[
            "OperatingPeriod:Jan2021",
            "OperatingDays:",
            "OperatingDays:31days",
            "OperatingPeriod:Feb2021",
        ]);
        let groups = segment(&tokens);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "OperatingPeriod:Jan2021");
    }

    #[test]
    fn adjacent_markers_keep_first_only() {
        let tokens = toks(&[
            "OperatingPeriod:Jan2021",
            "OperatingPeriod:Feb2021",
            "OperatingDays:",
            "OperatingDays:20days",
        ]);
        let groups = segment(&tokens);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "OperatingPeriod:Jan2021");
        assert!(!groups[0].values.iter().any(|v| is_period_marker(v)));
    }

    #[test]
    fn leading_values_ignored() {
        let tokens = toks(&["WellReport", "Summary", "OperatingPeriod:Jan2021", "a", "b"]);
        let groups = segment(&tokens);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].values, toks(&["a", "b"]));
    }

    #[test]
    fn duplicate_markers_not_merged() {
        let tokens = toks(&["OperatingPeriod:Jan2021", "a", "OperatingPeriod:Jan2021", "b"]);
        let groups = segment(&tokens);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, groups[1].key);
        assert_eq!(groups[1].values, toks(&["b"]));
    }

    #[test]
    fn empty_and_marker_only_streams() {
        assert!(segment(&[]).is_empty());
        assert!(segment(&toks(&["OperatingPeriod:Jan2021"])).is_empty());
        assert!(segment(&toks(&["no", "markers", "here"])).is_empty());
    }

    #[test]
    fn runs_alternate() {
        let tokens = toks(&["x", "OperatingPeriod:A", "OperatingPeriod:B", "y", "z"]);
        let r = runs(&tokens);
        let shape: Vec<(bool, usize)> = r.iter().map(|(m, run)| (*m, run.len())).collect();
        assert_eq!(shape, vec![(false, 1), (true, 2), (false, 2)]);
    }
}
