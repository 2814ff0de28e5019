use serde::{Deserialize, Serialize};

use crate::association::MatchedToken;

/// Texts shorter than this (in characters) are OCR noise and never end up in a `FishRecord`.
pub const MIN_FIELD_CHARS: usize = 2;

/// The text fields belonging to one fish card, in OCR response order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FishRecord(pub Vec<String>);

impl FishRecord {
    pub fn fields(&self) -> &[String] {
        &self.0
    }
}

fn is_field(text: &str) -> bool {
    text.chars().count() >= MIN_FIELD_CHARS
}

/// Group bound token texts into one `FishRecord` per detection.
///
/// Records are returned in ascending detection index order. Detections without any bound token
/// passing the length filter produce no record. Tokens bound to an index outside of
/// `0..detection_count` are ignored.
pub fn assemble(matched: &[MatchedToken], detection_count: usize) -> Vec<FishRecord> {
    let mut fields: Vec<Vec<String>> = vec![Vec::new(); detection_count];

    for m in matched {
        let Some(index) = m.detection else {
            continue;
        };
        if !is_field(&m.token.text) {
            continue;
        }
        if let Some(record) = fields.get_mut(index) {
            record.push(m.token.text.clone());
        }
    }

    fields
        .into_iter()
        .filter(|record| !record.is_empty())
        .map(FishRecord)
        .collect()
}
