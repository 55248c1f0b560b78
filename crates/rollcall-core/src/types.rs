use serde::{Deserialize, Serialize};

/// Dimensionality of a face embedding produced by the upstream encoder.
pub const EMBEDDING_DIM: usize = 128;

/// Maximum Euclidean distance for a usable match. Strict `<`: a probe at
/// exactly this distance is treated as unknown.
pub const MATCH_DISTANCE_THRESHOLD: f32 = 0.6;

/// Bounding box for a detected face, as reported by the upstream detector.
/// Metadata only; the matching core never reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face embedding vector (128-dimensional, upstream-normalized space).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance to another embedding. Lower = more similar.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Serialize to little-endian f32 bytes for BLOB storage.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.values.len() * 4);
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Deserialize from little-endian f32 bytes. Returns `None` when the
    /// byte length is not a multiple of 4.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self { values })
    }
}

/// An enrolled identity loaded into the in-memory roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: i64,
    pub name: String,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the roster.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the best candidate. `f32::INFINITY` when the
    /// roster was empty.
    pub distance: f32,
    /// Id of the matched identity (if any).
    pub identity_id: Option<i64>,
    /// Name of the matched identity (if any).
    pub identity_name: Option<String>,
}

/// Scan the whole roster and return the index and distance of the nearest
/// entry, or `None` when the roster is empty.
///
/// Exact distance ties are broken by the lowest index: the scan only
/// replaces the running best on a strictly smaller distance.
pub fn find_best_match(probe: &Embedding, roster: &[RosterEntry]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;

    for (i, entry) in roster.iter().enumerate() {
        let dist = probe.euclidean_distance(&entry.embedding);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((i, dist)),
        }
    }

    best
}

/// Strategy for comparing a probe embedding against the enrolled roster.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, roster: &[RosterEntry], threshold: f32) -> MatchResult;
}

/// Euclidean minimum-distance matcher.
///
/// Always scans the full roster; the nearest entry wins and is accepted
/// only below the distance threshold.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, roster: &[RosterEntry], threshold: f32) -> MatchResult {
        match find_best_match(probe, roster) {
            Some((idx, dist)) if dist < threshold => MatchResult {
                matched: true,
                distance: dist,
                identity_id: Some(roster[idx].id),
                identity_name: Some(roster[idx].name.clone()),
            },
            Some((_, dist)) => MatchResult {
                matched: false,
                distance: dist,
                identity_id: None,
                identity_name: None,
            },
            None => MatchResult {
                matched: false,
                distance: f32::INFINITY,
                identity_id: None,
                identity_name: None,
            },
        }
    }
}
