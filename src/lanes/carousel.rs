//! Which lanes are on screen.
//!
//! Narrow viewports show every lane stacked; wide viewports show a sliding
//! window of at most `window_size` consecutive lanes.

use crate::provider::TopicId;

/// Lanes shown side by side on wide viewports unless configured otherwise.
pub const DEFAULT_WINDOW_SIZE: usize = 3;
/// Widths at or below this many columns are narrow.
pub const DEFAULT_NARROW_BREAKPOINT: u16 = 768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportClass {
    Narrow,
    #[default]
    Wide,
}

impl ViewportClass {
    pub fn from_width(width: u16, breakpoint: u16) -> Self {
        if width <= breakpoint {
            Self::Narrow
        } else {
            Self::Wide
        }
    }
}

/// The visible slice of the lane list plus navigation affordances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window<'a> {
    pub visible: &'a [TopicId],
    pub offset: usize,
    pub can_prev: bool,
    pub can_next: bool,
}

/// Largest offset that still fills a window of `size` lanes.
pub fn max_offset(len: usize, size: usize) -> usize {
    len.saturating_sub(size.max(1))
}

/// Compute the visible window over `topics`.
///
/// `offset` is clamped into `0..=max_offset`; narrow viewports ignore it
/// entirely and show everything.
pub fn window(topics: &[TopicId], offset: usize, viewport: ViewportClass, size: usize) -> Window<'_> {
    match viewport {
        ViewportClass::Narrow => Window {
            visible: topics,
            offset: 0,
            can_prev: false,
            can_next: false,
        },
        ViewportClass::Wide => {
            let size = size.max(1);
            let max = max_offset(topics.len(), size);
            let offset = offset.min(max);
            let end = (offset + size).min(topics.len());
            Window {
                visible: &topics[offset..end],
                offset,
                can_prev: offset > 0,
                can_next: offset < max,
            }
        }
    }
}

/// Navigation state for the wide-viewport window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Carousel {
    offset: usize,
    window_size: usize,
}

impl Default for Carousel {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl Carousel {
    pub fn new(window_size: usize) -> Self {
        Self {
            offset: 0,
            window_size: window_size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Step back one lane; stops at the first.
    pub fn prev(&mut self) {
        self.offset = self.offset.saturating_sub(1);
    }

    /// Step forward one lane; stops once the last lane is in view.
    pub fn next(&mut self, len: usize) {
        self.offset = (self.offset + 1).min(max_offset(len, self.window_size));
    }

    /// Pull the offset back in range after the lane list shrank.
    pub fn clamp(&mut self, len: usize) {
        self.offset = self.offset.min(max_offset(len, self.window_size));
    }

    pub fn visible<'a>(&self, topics: &'a [TopicId], viewport: ViewportClass) -> Window<'a> {
        window(topics, self.offset, viewport, self.window_size)
    }
}
