use crate::emotion::Emotion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

/// Probability per emotion label, indexed in classifier order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EmotionScores([f32; 7]);

impl EmotionScores {
    pub fn new(scores: [f32; 7]) -> Self {
        Self(scores)
    }

    /// All mass on one label, used mostly to build test fixtures.
    pub fn single(emotion: Emotion, score: f32) -> Self {
        let mut scores = [0.0; 7];
        scores[emotion.index()] = score;
        Self(scores)
    }

    pub fn get(&self, emotion: Emotion) -> f32 {
        self.0[emotion.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f32)> + '_ {
        Emotion::ALL.into_iter().zip(self.0.iter().copied())
    }

    /// Highest scoring label. Equal scores resolve to the earlier label.
    ///
    /// NaN scores are skipped; if every score is NaN the first label is
    /// returned with a NaN score.
    pub fn top(&self) -> (Emotion, f32) {
        let mut best: Option<(Emotion, f32)> = None;
        for (emotion, score) in self.iter().filter(|(_, score)| !score.is_nan()) {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((emotion, score)),
            }
        }
        best.unwrap_or((Emotion::ALL[0], f32::NAN))
    }
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub scores: EmotionScores,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, scores: EmotionScores) -> Self {
        Self {
            bounding_box,
            scores,
        }
    }

    pub fn top_emotion(&self) -> (Emotion, f32) {
        self.scores.top()
    }
}
