use std::time::{Duration, Instant};

use crate::config::PollingConfig;

use super::{ImageId, ImageRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerTimeouts {
    pub fallback_poll: Duration,
    /// No status change for this long after the first change ends the wait.
    pub idle: Duration,
    pub absolute: Duration,
}

impl TrackerTimeouts {
    pub const fn from_config(polling: &PollingConfig) -> Self {
        Self {
            fallback_poll: polling.fallback_poll(),
            idle: polling.idle_timeout(),
            absolute: polling.absolute_timeout(),
        }
    }
}

impl Default for TrackerTimeouts {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Running,
    AllTerminal,
    TimedOut,
}

/// Status of every image of one generation request. Push notifications and fallback
/// polls both feed `apply`, which ignores anything that would not advance an image.
#[derive(Debug, Clone)]
pub struct GenerationTracker {
    images: Vec<ImageRecord>,
    timeouts: TrackerTimeouts,
    started_at: Instant,
    last_progress_at: Option<Instant>,
    next_poll_at: Instant,
}

impl GenerationTracker {
    pub fn new(images: Vec<ImageRecord>, now: Instant, timeouts: TrackerTimeouts) -> Self {
        Self {
            images,
            timeouts,
            started_at: now,
            last_progress_at: None,
            next_poll_at: now + timeouts.fallback_poll,
        }
    }

    /// Returns whether the update advanced an image of this request.
    pub fn apply(&mut self, update: &ImageRecord, now: Instant) -> bool {
        let Some(image) = self.images.iter_mut().find(|image| image.id == update.id) else {
            return false;
        };
        if update.status.rank() <= image.status.rank() {
            return false;
        }
        tracing::debug!(
            id = %update.id,
            from = ?image.status,
            to = ?update.status,
            "image status advanced"
        );
        *image = update.clone();
        self.last_progress_at = Some(now);
        true
    }

    pub fn images(&self) -> &[ImageRecord] {
        &self.images
    }

    pub fn pending_ids(&self) -> Vec<ImageId> {
        self.images
            .iter()
            .filter(|image| !image.status.is_terminal())
            .map(|image| image.id.clone())
            .collect()
    }

    pub fn completed(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images
            .iter()
            .filter(|image| image.status == super::ImageStatus::Completed)
    }

    /// Fraction of images in a terminal state.
    pub fn progress(&self) -> f32 {
        if self.images.is_empty() {
            return 1.0;
        }
        let done = self.images.iter().filter(|image| image.status.is_terminal()).count();
        done as f32 / self.images.len() as f32
    }

    pub fn fallback_poll_due(&self, now: Instant) -> bool {
        now >= self.next_poll_at
    }

    pub fn mark_polled(&mut self, now: Instant) {
        self.next_poll_at = now + self.timeouts.fallback_poll;
    }

    pub fn settlement(&self, now: Instant) -> Settlement {
        if self.images.iter().all(|image| image.status.is_terminal()) {
            return Settlement::AllTerminal;
        }
        if now.saturating_duration_since(self.started_at) >= self.timeouts.absolute {
            return Settlement::TimedOut;
        }
        match self.last_progress_at {
            Some(at) if now.saturating_duration_since(at) >= self.timeouts.idle => Settlement::TimedOut,
            _ => Settlement::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ImageStatus;

    fn record(id: &str, status: ImageStatus) -> ImageRecord {
        ImageRecord::new(ImageId::new(id), status)
    }

    fn tracker(now: Instant) -> GenerationTracker {
        GenerationTracker::new(
            vec![record("a", ImageStatus::Pending), record("b", ImageStatus::Pending)],
            now,
            TrackerTimeouts::default(),
        )
    }

    #[test]
    fn apply_only_advances_status() {
        let start = Instant::now();
        let mut tracker = tracker(start);

        assert!(tracker.apply(&record("a", ImageStatus::Completed), start));
        assert!(!tracker.apply(&record("a", ImageStatus::Processing), start));
        assert!(!tracker.apply(&record("a", ImageStatus::Completed), start));
        assert!(!tracker.apply(&record("a", ImageStatus::Error), start));
        assert!(!tracker.apply(&record("unknown", ImageStatus::Completed), start));

        assert_eq!(tracker.images()[0].status, ImageStatus::Completed);
        assert_eq!(tracker.progress(), 0.5);
        assert_eq!(tracker.pending_ids(), vec![ImageId::new("b")]);
    }

    #[test]
    fn settles_when_all_images_are_terminal() {
        let start = Instant::now();
        let mut tracker = tracker(start);
        tracker.apply(&record("a", ImageStatus::Completed), start);
        tracker.apply(&record("b", ImageStatus::Error), start);

        assert_eq!(tracker.settlement(start), Settlement::AllTerminal);
        assert_eq!(tracker.completed().count(), 1);
    }

    #[test]
    fn idle_cap_starts_after_first_progress() {
        let start = Instant::now();
        let mut tracker = tracker(start);

        assert_eq!(tracker.settlement(start + Duration::from_secs(60)), Settlement::Running);

        let progressed = start + Duration::from_secs(5);
        tracker.apply(&record("a", ImageStatus::Processing), progressed);
        assert_eq!(
            tracker.settlement(progressed + Duration::from_secs(29)),
            Settlement::Running
        );
        assert_eq!(
            tracker.settlement(progressed + Duration::from_secs(30)),
            Settlement::TimedOut
        );
    }

    #[test]
    fn absolute_cap_ends_wait_without_progress() {
        let start = Instant::now();
        let tracker = tracker(start);
        assert_eq!(
            tracker.settlement(start + Duration::from_secs(120)),
            Settlement::TimedOut
        );
    }

    #[test]
    fn fallback_poll_schedule() {
        let start = Instant::now();
        let mut tracker = tracker(start);

        assert!(!tracker.fallback_poll_due(start + Duration::from_secs(9)));
        assert!(tracker.fallback_poll_due(start + Duration::from_secs(10)));

        tracker.mark_polled(start + Duration::from_secs(10));
        assert!(!tracker.fallback_poll_due(start + Duration::from_secs(15)));
    }
}
