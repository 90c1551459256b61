//! Bounding box types and operations.

use serde::{Deserialize, Serialize};

/// A geographic bounding box, used as the envelope of a feature of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Degenerate box around a single position.
    pub fn point(x: f64, y: f64) -> Self {
        Self::new(x, y, x, y)
    }

    /// Parse a BBOX parameter string: "minx,miny,maxx,maxy"
    pub fn from_bbox_string(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }

        let parse = |part: &str| {
            part.parse::<f64>()
                .map_err(|_| BboxParseError::InvalidNumber(part.to_string()))
        };

        let bbox = Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?, parse(parts[3])?);
        if bbox.min_x > bbox.max_x || bbox.min_y > bbox.max_y {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }
        Ok(bbox)
    }

    /// Check if this bbox intersects another. Touching edges count, so point
    /// envelopes on the boundary intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this bbox lies entirely inside `other`.
    pub fn within(&self, other: &BoundingBox) -> bool {
        self.min_x >= other.min_x
            && self.max_x <= other.max_x
            && self.min_y >= other.min_y
            && self.max_y <= other.max_y
    }

    /// Check if a point is contained within this bbox.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid BBOX format: {0}. Expected 'minx,miny,maxx,maxy'")]
    InvalidFormat(String),

    #[error("Invalid number in BBOX: {0}")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::from_bbox_string("-125.0, 24.0,-66.0,50.0").unwrap();
        assert_eq!(bbox.min_x, -125.0);
        assert_eq!(bbox.min_y, 24.0);
        assert_eq!(bbox.max_x, -66.0);
        assert_eq!(bbox.max_y, 50.0);
    }

    #[test]
    fn test_parse_bbox_rejects_inverted_corners() {
        assert!(BoundingBox::from_bbox_string("10,10,5,5").is_err());
        assert!(BoundingBox::from_bbox_string("1,2,3").is_err());
    }

    #[test]
    fn test_point_envelope_on_edge_intersects() {
        let area = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(BoundingBox::point(10.0, 5.0).intersects(&area));
        assert!(!BoundingBox::point(10.5, 5.0).intersects(&area));
    }

    #[test]
    fn test_within() {
        let area = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(BoundingBox::new(1.0, 1.0, 2.0, 2.0).within(&area));
        assert!(!BoundingBox::new(5.0, 5.0, 15.0, 15.0).within(&area));
    }
}
