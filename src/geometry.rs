/// Placement of one decoded frame on the output surface.
///
/// Frames are never scaled. A frame larger than the surface is center
/// clipped (`skip_*` source pixels are dropped on the leading edge), a
/// smaller one is centered (`place_*` pixels of the surface are left
/// untouched around it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub frame_width: u16,
    pub frame_height: u16,
    pub visible_width: u16,
    pub visible_height: u16,
    pub place_x: u16,
    pub place_y: u16,
    pub skip_x: u16,
    pub skip_y: u16,
}

impl Geometry {
    /// Computes the clip and centering offsets of a frame on a surface.
    pub fn resolve(frame_width: u16, frame_height: u16, surface_width: u16, surface_height: u16) -> Self {
        let (visible_width, place_x, skip_x) = resolve_axis(frame_width, surface_width);
        let (visible_height, place_y, skip_y) = resolve_axis(frame_height, surface_height);
        Self {
            frame_width,
            frame_height,
            visible_width,
            visible_height,
            place_x,
            place_y,
            skip_x,
            skip_y,
        }
    }

    /// First source column past the visible window.
    pub fn visible_right(&self) -> u16 {
        self.skip_x + self.visible_width
    }

    /// First source row past the visible window.
    pub fn visible_bottom(&self) -> u16 {
        self.skip_y + self.visible_height
    }

    pub fn is_empty(&self) -> bool {
        self.visible_width == 0 || self.visible_height == 0
    }
}

// (visible, place, skip) for one axis; the offset is halved with an
// arithmetic shift so odd negative differences round toward -inf.
fn resolve_axis(frame: u16, surface: u16) -> (u16, u16, u16) {
    let visible = frame.min(surface);
    let offset = (i32::from(surface) - i32::from(frame)) >> 1;
    if offset < 0 {
        (visible, 0, (-offset) as u16)
    } else {
        (visible, offset as u16, 0)
    }
}
