//! Interactive correspondence authoring.

use glam::{DVec2, DVec3};

use super::correspondence::CorrespondenceSet;

/// Progress after recording one correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureProgress {
    Collecting { count: usize, target: usize },
    /// The target was reached with this point; the set is ready to save.
    Complete,
}

/// Accumulates display/world pairs until a target count is reached.
#[derive(Debug, Clone)]
pub struct CorrespondenceCapture {
    points: CorrespondenceSet,
    target: usize,
}

impl CorrespondenceCapture {
    pub fn new(target: usize) -> Self {
        Self {
            points: CorrespondenceSet::default(),
            target: target.max(1),
        }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn is_complete(&self) -> bool {
        self.points.len() >= self.target
    }

    pub fn points(&self) -> &CorrespondenceSet {
        &self.points
    }

    /// Record a pair. Points beyond the target are ignored.
    pub fn record(&mut self, display: DVec2, world: DVec3) -> CaptureProgress {
        if self.is_complete() {
            return CaptureProgress::Complete;
        }
        self.points.push(display, world);
        log::debug!(
            "captured correspondence {}/{}: ({:.1}, {:.1}) -> ({:.1}, {:.1}, {:.1})",
            self.points.len(),
            self.target,
            display.x,
            display.y,
            world.x,
            world.y,
            world.z
        );

        if self.is_complete() {
            CaptureProgress::Complete
        } else {
            CaptureProgress::Collecting {
                count: self.points.len(),
                target: self.target,
            }
        }
    }

    /// Hand the collected set over and start again.
    pub fn take(&mut self) -> CorrespondenceSet {
        std::mem::take(&mut self.points)
    }

    pub fn reset(&mut self) {
        self.points.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_until_target() {
        let mut capture = CorrespondenceCapture::new(3);
        assert_eq!(
            capture.record(DVec2::new(1.0, 2.0), DVec3::new(0.0, 0.0, 1.0)),
            CaptureProgress::Collecting { count: 1, target: 3 }
        );
        capture.record(DVec2::new(3.0, 4.0), DVec3::new(1.0, 0.0, 1.0));
        assert_eq!(
            capture.record(DVec2::new(5.0, 6.0), DVec3::new(0.0, 1.0, 1.0)),
            CaptureProgress::Complete
        );

        // Extra points are dropped once complete.
        assert_eq!(
            capture.record(DVec2::new(7.0, 8.0), DVec3::ONE),
            CaptureProgress::Complete
        );
        assert_eq!(capture.count(), 3);

        let set = capture.take();
        assert_eq!(set.len(), 3);
        assert_eq!(set.image()[2], DVec2::new(5.0, 6.0));
        assert_eq!(capture.count(), 0);
        assert!(!capture.is_complete());
    }
}
