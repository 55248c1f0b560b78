//! Frame source and face encoder seams, plus the JSONL feed reader.

use rollcall_core::{BoundingBox, Embedding, EMBEDDING_DIM};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("feed i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame on line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("embedding on line {line} has {got} components, expected {expected}")]
    EmbeddingDimension {
        line: usize,
        expected: usize,
        got: usize,
    },
}

/// One detected face: its embedding plus optional detector metadata.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub embedding: Embedding,
    pub bbox: Option<BoundingBox>,
}

/// Produces one frame per call; `None` signals end of stream.
pub trait FrameSource {
    type Frame;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, CaptureError>;
}

/// Extracts zero or more detected faces from a frame.
pub trait FaceEncoder {
    type Frame;

    fn encode(&mut self, frame: &Self::Frame) -> Result<Vec<DetectedFace>, CaptureError>;
}

#[derive(Deserialize)]
struct WireFace {
    embedding: Vec<f32>,
    #[serde(rename = "box", default)]
    bbox: Option<BoundingBox>,
}

/// JSON Lines feed of pre-encoded captures.
///
/// One frame per line: a JSON array of `{ "embedding": [...], "box": ... }`
/// objects, one per detected face. Blank lines are skipped. Embeddings
/// must be [`EMBEDDING_DIM`] components.
pub struct JsonlFeed<R = BufReader<File>> {
    reader: R,
    line: usize,
}

impl JsonlFeed<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!(path = %path.display(), "opened capture feed");
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlFeed<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { reader, line: 0 }
    }
}

impl<R: BufRead> FrameSource for JsonlFeed<R> {
    type Frame = Vec<DetectedFace>;

    fn next_frame(&mut self) -> Result<Option<Self::Frame>, CaptureError> {
        loop {
            let mut buf = String::new();
            if self.reader.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            if buf.trim().is_empty() {
                continue;
            }

            let faces: Vec<WireFace> =
                serde_json::from_str(&buf).map_err(|source| CaptureError::Malformed {
                    line: self.line,
                    source,
                })?;

            let mut frame = Vec::with_capacity(faces.len());
            for face in faces {
                if face.embedding.len() != EMBEDDING_DIM {
                    return Err(CaptureError::EmbeddingDimension {
                        line: self.line,
                        expected: EMBEDDING_DIM,
                        got: face.embedding.len(),
                    });
                }
                frame.push(DetectedFace {
                    embedding: Embedding::new(face.embedding),
                    bbox: face.bbox,
                });
            }
            return Ok(Some(frame));
        }
    }
}

/// Pass-through encoder for frames whose faces are already encoded
/// upstream (the JSONL feed case).
pub struct PreEncoded;

impl FaceEncoder for PreEncoded {
    type Frame = Vec<DetectedFace>;

    fn encode(&mut self, frame: &Self::Frame) -> Result<Vec<DetectedFace>, CaptureError> {
        Ok(frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn feed(data: &str) -> JsonlFeed<Cursor<Vec<u8>>> {
        JsonlFeed::from_reader(Cursor::new(data.as_bytes().to_vec()))
    }

    fn embedding_json(fill: f32) -> String {
        let components = vec![fill.to_string(); EMBEDDING_DIM].join(",");
        format!("[{components}]")
    }

    #[test]
    fn test_reads_frames_and_faces() {
        let data = format!(
            "[{{\"embedding\":{}}}]\n\n[{{\"embedding\":{}}},{{\"embedding\":{}}}]\n",
            embedding_json(0.0),
            embedding_json(1.0),
            embedding_json(2.0),
        );
        let mut source = feed(&data);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].embedding.len(), EMBEDDING_DIM);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].embedding.values[0], 2.0);

        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_frame_is_zero_faces() {
        let mut source = feed("[]\n");
        let frame = source.next_frame().unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let mut source = feed("[{\"embedding\":[1.0,2.0]}]\n");
        match source.next_frame() {
            Err(CaptureError::EmbeddingDimension {
                line,
                expected,
                got,
            }) => {
                assert_eq!(line, 1);
                assert_eq!(expected, EMBEDDING_DIM);
                assert_eq!(got, 2);
            }
            other => panic!("expected dimension error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_malformed_line() {
        let mut source = feed("not json\n");
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_bounding_box_metadata_parses() {
        let data = format!(
            "[{{\"embedding\":{},\"box\":{{\"x\":1.0,\"y\":2.0,\"width\":30.0,\"height\":40.0,\"confidence\":0.93}}}}]\n",
            embedding_json(0.5),
        );
        let mut source = feed(&data);
        let frame = source.next_frame().unwrap().unwrap();
        let bbox = frame[0].bbox.as_ref().unwrap();
        assert_eq!(bbox.width, 30.0);
        assert!((bbox.confidence - 0.93).abs() < 1e-6);
    }

    #[test]
    fn test_pre_encoded_passes_through() {
        let frame = vec![DetectedFace {
            embedding: Embedding::new(vec![0.0; EMBEDDING_DIM]),
            bbox: None,
        }];
        let encoded = PreEncoded.encode(&frame).unwrap();
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].embedding, frame[0].embedding);
    }
}
