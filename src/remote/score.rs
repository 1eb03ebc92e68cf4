use super::ImageRecord;

/// Server score, less the negative-prompt score when the image has a prompt. Images
/// without a prompt were given a negative score anyway, so it is ignored for them.
pub fn effective_score(record: &ImageRecord) -> f64 {
    if record.prompt.trim().is_empty() {
        record.score
    } else {
        record.score - record.negative_score
    }
}

/// Stable sort, best effective score first.
pub fn rank_by_score<T>(items: &mut [T], record: impl Fn(&T) -> &ImageRecord) {
    items.sort_by(|a, b| effective_score(record(b)).total_cmp(&effective_score(record(a))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ImageId, ImageStatus};

    fn scored(id: &str, score: f64, negative_score: f64, prompt: &str) -> ImageRecord {
        ImageRecord {
            score,
            negative_score,
            prompt: prompt.to_string(),
            ..ImageRecord::new(ImageId::new(id), ImageStatus::Completed)
        }
    }

    #[test]
    fn negative_score_only_counts_with_prompt() {
        assert_eq!(effective_score(&scored("a", 0.9, 0.4, "a lake")), 0.9 - 0.4);
        assert_eq!(effective_score(&scored("b", 0.9, 0.4, "  ")), 0.9);
    }

    #[test]
    fn rank_by_score_sorts_descending_and_keeps_ties_in_order() {
        let mut records = vec![
            scored("low", 0.2, 0.0, "x"),
            scored("tie-1", 0.5, 0.0, "x"),
            scored("high", 0.9, 0.1, "x"),
            scored("tie-2", 0.5, 0.0, "x"),
        ];

        rank_by_score(&mut records, |record| record);

        let order: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(order, vec!["high", "tie-1", "tie-2", "low"]);
    }
}
