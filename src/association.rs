use crate::geometry::Rect;

/// A fish card panel found by the detector service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub rect: Rect,
}

impl From<Rect> for Detection {
    fn from(rect: Rect) -> Self {
        Self { rect }
    }
}

/// A piece of text found by the OCR service.
#[derive(Debug, Clone, PartialEq)]
pub struct TextToken {
    pub rect: Rect,
    pub text: String,
}

impl TextToken {
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            rect,
            text: text.into(),
        }
    }
}

/// A `TextToken` together with the index of the `Detection` it was bound to, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedToken<'t> {
    pub token: &'t TextToken,
    pub detection: Option<usize>,
}

/// Bind every token to at most one detection.
///
/// Each token is bound to the *first* detection (in detector response order) whose rectangle
/// overlaps it. A token overlapping several detections is never bound to a later one, even if the
/// later overlap is larger. Tokens overlapping nothing stay unbound.
///
/// The returned tokens are in the same order as `tokens`.
pub fn associate<'t>(detections: &[Detection], tokens: &'t [TextToken]) -> Vec<MatchedToken<'t>> {
    tokens
        .iter()
        .map(|token| MatchedToken {
            token,
            detection: detections
                .iter()
                .position(|detection| detection.rect.overlaps(&token.rect)),
        })
        .collect()
}
