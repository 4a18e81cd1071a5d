use serde::Serialize;

/// Axis-aligned box in fractions of image dimensions.
///
/// Always satisfies `0 <= x_min <= x_max <= 1` and `0 <= y_min <= y_max <= 1`;
/// constructors reorder and clamp their inputs.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (x0, x1) = (unit(x0), unit(x1));
        let (y0, y1) = (unit(y0), unit(y1));
        Self {
            x_min: x0.min(x1),
            y_min: y0.min(y1),
            x_max: x0.max(x1),
            y_max: y0.max(y1),
        }
    }

    /// Convert a pixel rectangle on a `width` x `height` image.
    pub fn from_pixels(rect: PixelRect, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self::new(
            rect.left as f32 / w,
            rect.top as f32 / h,
            rect.right as f32 / w,
            rect.bottom as f32 / h,
        )
    }

    pub fn to_pixels(self, width: u32, height: u32) -> PixelRect {
        let w = width as f32;
        let h = height as f32;
        PixelRect {
            left: (self.x_min * w).round() as i32,
            top: (self.y_min * h).round() as i32,
            right: (self.x_max * w).round() as i32,
            bottom: (self.y_max * h).round() as i32,
        }
    }

    pub fn is_valid(&self) -> bool {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        coords.iter().all(|c| (0.0..=1.0).contains(c))
            && self.x_min <= self.x_max
            && self.y_min <= self.y_max
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Pixel rectangle on a full-resolution image. Both corners lie on the outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: left.max(right),
            bottom: top.max(bottom),
        }
    }

    /// Build from the `(x, y, w, h)` tuples face cascades return.
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x.saturating_add(w), y.saturating_add(h))
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.left as f32 + (self.right - self.left) as f32 / 2.0,
            self.top as f32 + (self.bottom - self.top) as f32 / 2.0,
        )
    }
}

/// One structured detector result.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            label: label.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
        }
    }
}
