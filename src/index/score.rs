use crate::index::scan::PageScores;

/// 对每个 `latest` 乘以 `(1 + boost)` 并取整。
///
/// `boost == 0` 时原样返回输入；`latest` 无法解析为数字的条目保持不变。
pub fn boost_scores(mut scores: PageScores, boost: f64) -> PageScores {
    if boost == 0.0 {
        return scores;
    }
    let factor = 1.0 + boost;
    for (page_id, activity) in scores.iter_mut() {
        match activity.latest.trim().parse::<f64>() {
            Ok(latest) => {
                let boosted = (latest * factor).round();
                if boosted.is_finite() {
                    activity.latest = format!("{boosted:.0}");
                }
            }
            Err(_) => {
                tracing::debug!(
                    "Non-numeric latest {:?} for {}, left unboosted",
                    activity.latest,
                    page_id
                );
            }
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::scan::Activity;
    use pretty_assertions::assert_eq;

    fn scores(items: &[(&str, &str)]) -> PageScores {
        items
            .iter()
            .map(|(id, latest)| (id.to_string(), Activity::new(*latest)))
            .collect()
    }

    #[test]
    fn zero_boost_is_identity() {
        let input = scores(&[("a", "100"), ("b", "not-a-number")]);
        assert_eq!(boost_scores(input.clone(), 0.0), input);
    }

    #[test]
    fn boost_multiplies_and_rounds() {
        let out = boost_scores(scores(&[("a", "100"), ("b", "3")]), 0.5);
        assert_eq!(out["a"].latest, "150");
        // 3 * 1.5 = 4.5 → 5
        assert_eq!(out["b"].latest, "5");
    }

    #[test]
    fn negative_boost_shrinks() {
        let out = boost_scores(scores(&[("a", "1000")]), -0.25);
        assert_eq!(out["a"].latest, "750");
    }

    #[test]
    fn zero_padded_timestamps_parse() {
        let out = boost_scores(scores(&[("a", "0001700000000000")]), 0.1);
        assert_eq!(out["a"].latest, "1870000000000");
    }

    #[test]
    fn non_numeric_latest_is_left_alone() {
        let out = boost_scores(scores(&[("a", "yesterday"), ("b", "10")]), 1.0);
        assert_eq!(out["a"].latest, "yesterday");
        assert_eq!(out["b"].latest, "20");
    }
}
