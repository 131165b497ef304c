use serde::{Deserialize, Serialize};

/// Axis-aligned box in page space (PDF points, origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Map a box from raster pixel space back to page space.
    pub fn unscale(&self, scale: f32, origin: (f32, f32)) -> BoundingBox {
        let scale = if scale > 0.0 { scale } else { 1.0 };
        BoundingBox {
            x0: self.x0 / scale + origin.0,
            y0: self.y0 / scale + origin.1,
            x1: self.x1 / scale + origin.0,
            y1: self.y1 / scale + origin.1,
        }
    }

    /// True when the box lies within `margin` (fraction of page extent) of any
    /// edge of `page`.
    pub fn is_near_border(&self, page: &BoundingBox, margin: f32) -> bool {
        let mx = page.width() * margin;
        let my = page.height() * margin;
        self.x0 <= page.x0 + mx
            || self.y0 <= page.y0 + my
            || self.x1 >= page.x1 - mx
            || self.y1 >= page.y1 - my
    }
}

/// Intersection over union of two boxes; 0.0 for disjoint or degenerate boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let ix0 = a.x0.max(b.x0);
    let iy0 = a.y0.max(b.y0);
    let ix1 = a.x1.min(b.x1);
    let iy1 = a.y1.min(b.y1);

    let inter = (ix1 - ix0).max(0.0) * (iy1 - iy0).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 { inter / union } else { 0.0 }
}

/// Text orientation, snapped to the nearest quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Snap a baseline direction vector (page space, y pointing down) to a quadrant.
    ///
    /// Text running down the page is `Deg90`, text running up is `Deg270`.
    pub fn from_direction(dx: f32, dy: f32) -> Self {
        if dx == 0.0 && dy == 0.0 {
            return Rotation::Deg0;
        }
        if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                Rotation::Deg0
            } else {
                Rotation::Deg180
            }
        } else if dy > 0.0 {
            Rotation::Deg90
        } else {
            Rotation::Deg270
        }
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_disjoint_is_zero() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // 50 / 150
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn new_normalizes_corner_order() {
        let b = BoundingBox::new(10.0, 8.0, 2.0, 1.0);
        assert_eq!(b, BoundingBox::new(2.0, 1.0, 10.0, 8.0));
        assert_eq!(b.width(), 8.0);
    }

    #[test]
    fn unscale_maps_pixels_to_points() {
        let px = BoundingBox::new(200.0, 100.0, 400.0, 140.0);
        let pt = px.unscale(2.0, (0.0, 0.0));
        assert_eq!(pt, BoundingBox::new(100.0, 50.0, 200.0, 70.0));
    }

    #[test]
    fn near_border_detection() {
        let page = BoundingBox::new(0.0, 0.0, 1000.0, 800.0);
        let corner = BoundingBox::new(5.0, 400.0, 15.0, 412.0);
        let middle = BoundingBox::new(500.0, 400.0, 510.0, 412.0);
        assert!(corner.is_near_border(&page, 0.05));
        assert!(!middle.is_near_border(&page, 0.05));
    }

    #[test]
    fn rotation_from_direction() {
        assert_eq!(Rotation::from_direction(1.0, 0.0), Rotation::Deg0);
        assert_eq!(Rotation::from_direction(0.0, 1.0), Rotation::Deg90);
        assert_eq!(Rotation::from_direction(-1.0, 0.1), Rotation::Deg180);
        assert_eq!(Rotation::from_direction(0.05, -1.0), Rotation::Deg270);
        assert!(Rotation::Deg270.is_vertical());
    }
}
