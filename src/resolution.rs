//! Monitor configuration requested by the agent.

use crate::display::ScreenSize;

/// Geometry of one monitor of the remote client.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct MonitorConfig {
    pub height: u32,
    pub width: u32,
    pub depth: u32,
    pub x: i32,
    pub y: i32,
}

/// The monitor layout of the remote client.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Default)]
pub struct MonitorsConfig {
    pub flags: u32,
    pub monitors: Vec<MonitorConfig>,
}

/// Picks the screen size closest to `width` x `height` among those fitting inside it.
///
/// Closeness is the squared distance between the corners. The first of several equally close
/// sizes wins. Returns the index into `sizes`.
pub fn best_fit(sizes: &[ScreenSize], width: u32, height: u32) -> Option<usize> {
    let mut best = None;
    let mut closest = u128::MAX;

    for (index, size) in sizes.iter().enumerate() {
        let (size_width, size_height) = (u32::from(size.width), u32::from(size.height));
        if size_width > width || size_height > height {
            continue;
        }

        let dw = u128::from(width - size_width);
        let dh = u128::from(height - size_height);
        let diff = dw * dw + dh * dh;
        if diff < closest {
            closest = diff;
            best = Some(index);
        }
    }

    best
}
