use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Axis-aligned face region reported by the localizer, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Detector score for this region (not the identity confidence).
    pub score: f32,
}

/// Integer pixel rectangle, guaranteed to lie inside the frame it was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Detection {
    /// Clamp this detection to a `frame_width` x `frame_height` frame.
    ///
    /// Returns `None` when nothing of the region remains inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let x0 = self.x.max(0.0).floor();
        let y0 = self.y.max(0.0).floor();
        let x1 = (self.x + self.width).min(frame_width as f32).ceil();
        let y1 = (self.y + self.height).min(frame_height as f32).ceil();

        if !(x1 > x0 && y1 > y0) {
            return None;
        }

        let x = x0 as u32;
        let y = y0 as u32;
        let width = (x1 as u32).min(frame_width).saturating_sub(x);
        let height = (y1 as u32).min(frame_height).saturating_sub(y);
        if width == 0 || height == 0 {
            return None;
        }

        Some(Region { x, y, width, height })
    }
}

/// Face embedding vector (512-dimensional for FaceNet).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Outcome of classifying one face crop against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Gallery label of the highest-scoring class.
    pub identity: String,
    /// Decision-function score of that class. Unbounded above.
    pub confidence: f32,
}

/// An enrolled person as known to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub department: Option<String>,
    pub position: Option<String>,
}

/// A deduplicated attendance record.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceEvent {
    pub employee_id: i64,
    pub identity: String,
    pub timestamp: NaiveDateTime,
}

/// One recognized face drawn onto a published frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub identity: String,
    pub confidence: f32,
    /// Whether this sighting produced a new attendance record.
    pub recorded: bool,
}

impl Annotation {
    /// Display label, e.g. `"alice (1.52)"`.
    pub fn label(&self) -> String {
        format!("{} ({:.2})", self.identity, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection { x, y, width: w, height: h, score: 0.9 }
    }

    #[test]
    fn test_clamp_inside_frame() {
        let region = det(10.0, 20.0, 30.0, 40.0).clamp_to(100, 100).unwrap();
        assert_eq!(region, Region { x: 10, y: 20, width: 30, height: 40 });
    }

    #[test]
    fn test_clamp_overhanging_edges() {
        let region = det(-5.0, 90.0, 20.0, 20.0).clamp_to(100, 100).unwrap();
        assert_eq!(region, Region { x: 0, y: 90, width: 15, height: 10 });
    }

    #[test]
    fn test_clamp_outside_frame() {
        assert!(det(150.0, 10.0, 20.0, 20.0).clamp_to(100, 100).is_none());
        assert!(det(10.0, 10.0, 0.0, 20.0).clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_annotation_label() {
        let a = Annotation {
            x: 0, y: 0, width: 1, height: 1,
            identity: "alice".into(), confidence: 1.516, recorded: true,
        };
        assert_eq!(a.label(), "alice (1.52)");
    }
}
