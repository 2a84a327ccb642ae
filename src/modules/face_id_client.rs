use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Length of the descriptor produced by the recognition engine.
pub const EMBEDDING_DIM: usize = 128;

/// Embedding is a face descriptor together with its capture metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
    pub quality: f64,
    pub angle: String,
}

impl Embedding {
    pub fn new(vector: Array1<f32>, quality: f64, angle: &str) -> Self {
        Embedding {
            vector,
            quality,
            angle: angle.to_string(),
        }
    }

    pub fn empty() -> Self {
        Embedding::new(Array1::zeros(0), 0.0, "")
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

/// MatchResult is the nearest gallery entry for a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Index into the gallery, `None` for an empty gallery.
    pub index: Option<usize>,
    pub distance: f64,
    pub matched: bool,
}

impl MatchResult {
    pub fn no_match() -> Self {
        MatchResult {
            index: None,
            distance: f64::MAX,
            matched: false,
        }
    }
}

/// euclidean_distance calculates the distance between two descriptors.
///
/// # Arguments
/// * `a` - &Array1<f32>
/// * `b` - &Array1<f32>
///
/// # Returns
/// * `f64` - `f64::MAX` when the lengths differ
pub fn euclidean_distance(a: &Array1<f32>, b: &Array1<f32>) -> f64 {
    if a.len() != b.len() {
        return f64::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = (*x as f64) - (*y as f64);
            diff * diff
        })
        .sum::<f64>()
        .sqrt()
}

/// average_vector returns the per-component mean of the vectors.
///
/// Vectors whose length differs from the first one are skipped.
pub fn average_vector<'a, I>(vectors: I) -> Option<Array1<f32>>
where
    I: IntoIterator<Item = &'a Array1<f32>>,
{
    let mut iter = vectors.into_iter();
    let first = iter.next()?;
    let mut sum = first.mapv(|v| v as f64);
    let mut count = 1usize;
    for vector in iter {
        if vector.len() != sum.len() {
            continue;
        }
        sum.zip_mut_with(vector, |acc, v| *acc += *v as f64);
        count += 1;
    }
    Some(sum.mapv(|v| (v / count as f64) as f32))
}

/// average_embedding combines several embeddings of the same face.
///
/// A single embedding is returned unchanged; an empty input yields an empty embedding.
pub fn average_embedding(embeddings: &[Embedding]) -> Embedding {
    match embeddings {
        [] => Embedding::empty(),
        [single] => single.clone(),
        _ => {
            let vector = average_vector(embeddings.iter().map(|e| &e.vector)).unwrap_or_else(|| Array1::zeros(0));
            let quality = embeddings.iter().map(|e| e.quality).sum::<f64>() / embeddings.len() as f64;
            Embedding::new(vector, quality, "averaged")
        }
    }
}

/// EmbeddingMatcher compares probes against an enrolled gallery.
#[derive(Debug, Clone)]
pub struct EmbeddingMatcher {
    tolerance: f64,
}

impl Default for EmbeddingMatcher {
    fn default() -> Self {
        EmbeddingMatcher::new(0.4)
    }
}

impl EmbeddingMatcher {
    pub fn new(tolerance: f64) -> Self {
        EmbeddingMatcher { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// set_tolerance changes the match tolerance. Lower is stricter.
    pub fn set_tolerance(&mut self, tolerance: f64) {
        self.tolerance = tolerance;
    }

    pub fn compare(&self, a: &Embedding, b: &Embedding) -> f64 {
        euclidean_distance(&a.vector, &b.vector)
    }

    pub fn is_match(&self, a: &Embedding, b: &Embedding) -> bool {
        self.accepts(self.compare(a, b))
    }

    fn accepts(&self, distance: f64) -> bool {
        distance < self.tolerance
    }

    /// find_best_match returns the closest gallery entry to the probe.
    ///
    /// # Arguments
    /// * `probe` - the embedding to look up
    /// * `gallery` - enrolled embeddings of one user
    ///
    /// # Returns
    /// * `MatchResult` - `MatchResult::no_match()` for an empty gallery
    pub fn find_best_match(&self, probe: &Embedding, gallery: &[Embedding]) -> MatchResult {
        let best = gallery
            .iter()
            .enumerate()
            .map(|(idx, emb)| (idx, self.compare(probe, emb)))
            .min_by(|(_, a), (_, b)| a.total_cmp(b));

        match best {
            None => MatchResult::no_match(),
            Some((idx, distance)) => MatchResult {
                index: Some(idx),
                distance,
                matched: self.accepts(distance),
            },
        }
    }
}
