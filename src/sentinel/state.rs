use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};

/// Enrolled user id as assigned by the user store.
pub type UserId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum GuardMode {
    #[default]
    Monitoring,
    Locked,
}

/// Shared presence state for one monitoring session.
///
/// The capture loop owns every field except `last_input_at`, which belongs to
/// the activity listener.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub mode: GuardMode,
    pub authorized_user_id: UserId,
    /// Last tick on which only the authorized user was in frame.
    pub last_verified_at: Option<Instant>,
    pub last_face_seen_at: Instant,
    pub last_input_at: Instant,
    pub consecutive_unknown_count: u32,
    pub debug_status: String,
    pub absence_event_count: u32,
    pub ticks_seen: u64,
}

impl ControllerState {
    pub fn new(authorized_user_id: UserId, now: Instant) -> Self {
        Self {
            mode: GuardMode::Monitoring,
            authorized_user_id,
            last_verified_at: None,
            last_face_seen_at: now,
            last_input_at: now,
            consecutive_unknown_count: 0,
            debug_status: "Ready".to_string(),
            absence_event_count: 0,
            ticks_seen: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.mode == GuardMode::Locked
    }

    /// Counts a tick; returns `true` while it still falls inside warmup.
    pub fn consume_warmup(&mut self, warmup_tick_count: u32) -> bool {
        self.ticks_seen = self.ticks_seen.saturating_add(1);
        self.ticks_seen <= u64::from(warmup_tick_count)
    }

    pub fn mark_verified(&mut self, now: Instant) {
        self.last_verified_at = Some(now);
        self.consecutive_unknown_count = 0;
    }

    /// Input events can arrive out of order across the listener channel.
    pub fn record_input(&mut self, at: Instant) {
        if at > self.last_input_at {
            self.last_input_at = at;
        }
    }

    /// Enters `Locked`. Returns `false` if a lock episode is already open.
    pub fn begin_lock(&mut self) -> bool {
        if self.is_locked() {
            return false;
        }
        self.mode = GuardMode::Locked;
        self.absence_event_count = self.absence_event_count.saturating_add(1);
        true
    }

    /// Closes the lock episode. `last_verified_at` is left alone.
    pub fn end_lock(&mut self, now: Instant) -> bool {
        let was_locked = self.is_locked();
        self.mode = GuardMode::Monitoring;
        self.last_face_seen_at = now;
        self.consecutive_unknown_count = 0;
        was_locked
    }

    pub fn verified_within(&self, window: Duration, now: Instant) -> bool {
        self.last_verified_at
            .map(|at| now.saturating_duration_since(at) < window)
            .unwrap_or(false)
    }

    pub fn since_face_seen(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_face_seen_at)
    }

    pub fn since_input(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_input_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_idempotent_within_an_episode() {
        let mut state = ControllerState::new(1, Instant::now());

        assert!(state.begin_lock());
        assert!(!state.begin_lock());
        assert!(!state.begin_lock());
        assert_eq!(state.mode, GuardMode::Locked);
        assert_eq!(state.absence_event_count, 1);

        assert!(state.end_lock(Instant::now()));
        assert!(state.begin_lock());
        assert_eq!(state.absence_event_count, 2);
    }

    #[test]
    fn end_lock_keeps_verification_time() {
        let start = Instant::now();
        let mut state = ControllerState::new(1, start);
        state.mark_verified(start);
        state.consecutive_unknown_count = 4;
        state.begin_lock();

        let later = start + Duration::from_secs(30);
        state.end_lock(later);

        assert_eq!(state.mode, GuardMode::Monitoring);
        assert_eq!(state.last_verified_at, Some(start));
        assert_eq!(state.last_face_seen_at, later);
        assert_eq!(state.consecutive_unknown_count, 0);
    }

    #[test]
    fn stale_input_does_not_rewind_last_input() {
        let start = Instant::now();
        let mut state = ControllerState::new(1, start);

        state.record_input(start + Duration::from_secs(2));
        state.record_input(start + Duration::from_secs(1));

        assert_eq!(state.last_input_at, start + Duration::from_secs(2));
    }

    #[test]
    fn warmup_consumes_exactly_the_configured_ticks() {
        let mut state = ControllerState::new(1, Instant::now());

        let skipped = (0..35).filter(|_| state.consume_warmup(30)).count();
        assert_eq!(skipped, 30);
        assert_eq!(state.ticks_seen, 35);
    }

    #[test]
    fn never_verified_is_never_fresh() {
        let now = Instant::now();
        let state = ControllerState::new(1, now);
        assert!(!state.verified_within(Duration::from_secs(2), now));
    }
}
