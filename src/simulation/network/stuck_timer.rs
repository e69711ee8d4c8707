/// Remembers when the buffer of a link last moved. A vehicle at the head of a buffer which did not
/// move for longer than the threshold is considered stuck.
#[derive(Debug, Clone)]
pub struct StuckTimer {
    last_moved: Option<u32>,
    stuck_threshold: u32,
}

impl StuckTimer {
    pub fn new(stuck_threshold: u32) -> Self {
        StuckTimer {
            last_moved: None,
            stuck_threshold,
        }
    }

    pub fn reset(&mut self, now: u32) {
        self.last_moved = Some(now);
    }

    pub fn last_moved(&self) -> Option<u32> {
        self.last_moved
    }

    pub fn is_stuck(&self, now: u32) -> bool {
        if let Some(time) = self.last_moved {
            now.saturating_sub(time) > self.stuck_threshold
        } else {
            false
        }
    }
}
