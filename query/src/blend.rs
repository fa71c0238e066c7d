use std::collections::HashMap;

use alayasiki_core::model::{ChunkId, DocumentId};

/// A merged dense+lexical hit, keyed by `chunk_id`. Carries
/// whichever of `dense_score`/`lexical_score` its source stream(s)
/// contributed; a side it didn't appear on is `None` until blending, when
/// it is treated as a 0 contribution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub content: String,
    pub source_uri: String,
    pub page_number: Option<u32>,
    pub metadata: HashMap<String, String>,
    pub dense_score: Option<f32>,
    pub lexical_score: Option<f32>,
    pub blended_score: f32,
}

/// Min-max normalizes `(key, raw_score)` pairs independently: `(x-min)/(max-min)`.
/// If every value is equal (including a single entry), all contributors get
/// `1.0` rather than dividing by zero.
pub fn min_max_normalize(pairs: &[(ChunkId, f32)]) -> HashMap<ChunkId, f32> {
    if pairs.is_empty() {
        return HashMap::new();
    }
    let min = pairs.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = pairs
        .iter()
        .map(|(_, s)| *s)
        .fold(f32::NEG_INFINITY, f32::max);

    pairs
        .iter()
        .map(|(id, score)| {
            let normalized = if (max - min).abs() < f32::EPSILON {
                1.0
            } else {
                (score - min) / (max - min)
            };
            (id.clone(), normalized)
        })
        .collect()
}

/// Normalizes each score stream independently and computes the blended
/// score `0.5*dense_norm + 0.5*lexical_norm`, then sorts descending by
/// blended score with a lexicographic `chunk_id` tie-break.
pub fn blend(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    let dense_pairs: Vec<(ChunkId, f32)> = candidates
        .iter()
        .filter_map(|c| c.dense_score.map(|s| (c.chunk_id.clone(), s)))
        .collect();
    let lexical_pairs: Vec<(ChunkId, f32)> = candidates
        .iter()
        .filter_map(|c| c.lexical_score.map(|s| (c.chunk_id.clone(), s)))
        .collect();

    let dense_norm = min_max_normalize(&dense_pairs);
    let lexical_norm = min_max_normalize(&lexical_pairs);

    for candidate in &mut candidates {
        let dense = dense_norm.get(&candidate.chunk_id).copied().unwrap_or(0.0);
        let lexical = lexical_norm
            .get(&candidate.chunk_id)
            .copied()
            .unwrap_or(0.0);
        candidate.blended_score = 0.5 * dense + 0.5 * lexical;
    }

    candidates.sort_by(|a, b| {
        b.blended_score
            .partial_cmp(&a.blended_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.0.cmp(&b.chunk_id.0))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ChunkId {
        ChunkId(s.to_string())
    }

    fn candidate(id: &str, dense: Option<f32>, lexical: Option<f32>) -> Candidate {
        Candidate {
            chunk_id: cid(id),
            document_id: DocumentId("doc-1".to_string()),
            content: "content".to_string(),
            source_uri: "gs://bucket/doc.pdf".to_string(),
            page_number: None,
            metadata: HashMap::new(),
            dense_score: dense,
            lexical_score: lexical,
            blended_score: 0.0,
        }
    }

    #[test]
    fn equal_scores_normalize_to_one() {
        let pairs = vec![(cid("a"), 3.0), (cid("b"), 3.0)];
        let norm = min_max_normalize(&pairs);
        assert_eq!(norm[&cid("a")], 1.0);
        assert_eq!(norm[&cid("b")], 1.0);
    }

    #[test]
    fn missing_side_contributes_zero() {
        let candidates = vec![
            candidate("a", Some(1.0), None),
            candidate("b", None, Some(1.0)),
        ];
        let blended = blend(candidates);
        // Both are sole members of their stream so each stream normalizes to
        // 1.0; missing side contributes 0, so both candidates tie at 0.5.
        assert_eq!(blended[0].blended_score, 0.5);
        assert_eq!(blended[1].blended_score, 0.5);
        // Tie-break is lexicographic chunk_id.
        assert_eq!(blended[0].chunk_id, cid("a"));
        assert_eq!(blended[1].chunk_id, cid("b"));
    }

    #[test]
    fn dense_and_lexical_streams_normalize_independently() {
        let candidates = vec![
            candidate("a", Some(10.0), Some(1.0)),
            candidate("b", Some(0.0), Some(3.0)),
        ];
        let blended = blend(candidates);
        // "a": dense_norm=1.0, lexical_norm=0.0 -> 0.5
        // "b": dense_norm=0.0, lexical_norm=1.0 -> 0.5
        assert_eq!(blended[0].blended_score, 0.5);
        assert_eq!(blended[1].blended_score, 0.5);
    }

    #[test]
    fn higher_blended_score_sorts_first() {
        let candidates = vec![
            candidate("a", Some(0.0), Some(0.0)),
            candidate("b", Some(1.0), Some(1.0)),
        ];
        let blended = blend(candidates);
        assert_eq!(blended[0].chunk_id, cid("b"));
        assert_eq!(blended[1].chunk_id, cid("a"));
    }
}
