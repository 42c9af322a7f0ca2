/// Visible window of a scrolling list, in logical pixels along the scroll axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset: f32,
    pub extent: f32,
}

impl Viewport {
    pub fn new(offset: f32, extent: f32) -> Self {
        Self { offset, extent }
    }

    pub fn end(&self) -> f32 {
        self.offset + self.extent
    }
}

/// Position of the last rendered item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub index: usize,
    pub offset: f32,
}

/// Watches one marker and reports once when it comes within `margin` of
/// the viewport's trailing edge.
#[derive(Debug, Clone)]
pub struct ScrollSentinel {
    margin: f32,
    marker: Option<Marker>,
    armed: bool,
}

impl ScrollSentinel {
    pub fn new(margin: f32) -> Self {
        Self {
            margin: margin.max(0.0),
            marker: None,
            armed: false,
        }
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn attach(&mut self, marker: Marker) {
        self.detach();
        self.marker = Some(marker);
        self.armed = true;
    }

    pub fn detach(&mut self) -> Option<Marker> {
        self.armed = false;
        self.marker.take()
    }

    /// Returns `true` at most once per attachment.
    pub fn observe(&mut self, viewport: Viewport) -> bool {
        let Some(marker) = self.marker else {
            return false;
        };
        if !self.armed || marker.offset > viewport.end() + self.margin {
            return false;
        }
        self.armed = false;
        true
    }
}
