//! Per-tick presence policy.
//!
//! Pure functions over [`ControllerState`]; the controller runs them under
//! its state lock and handles every side effect afterwards.

use std::fmt;

use tokio::time::Instant;

use crate::db::LockReason;
use crate::vision::FaceObservation;

use super::config::{DetectionOnlyPolicy, SentinelConfig};
use super::state::{ControllerState, UserId};

/// What the classifier output for one frame means for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct TickClassification {
    /// The authorized user matched and nobody else is in frame.
    pub authorized: bool,
    /// At least one face is not a confident match for the authorized user.
    pub unauthorized: bool,
    pub face_count: usize,
    /// Diagnostic line for the lock screen.
    pub summary: String,
}

/// Status reported on ticks that do not lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Verified,
    /// No verified face, still inside the ghost-input window.
    IdleWarning,
    /// No verified face for longer than the ghost-input window.
    IdleNoUser,
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PresenceStatus::Verified => "Active — Verified",
            PresenceStatus::IdleWarning => "Idling — Warning",
            PresenceStatus::IdleNoUser => "Idling — No User",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// Camera still settling; nothing was evaluated.
    Warmup,
    Status(PresenceStatus),
    /// Stranger in frame, strike count below the limit.
    Strike(u32),
    /// This tick opened a lock episode.
    Lock(LockReason),
    /// Already locked; only verification bookkeeping ran.
    Held,
}

pub fn classify_observations(
    observations: &[FaceObservation],
    authorized_user_id: UserId,
    config: &SentinelConfig,
    identifies: bool,
) -> TickClassification {
    let face_count = observations.len();

    if face_count == 0 {
        return TickClassification {
            authorized: false,
            unauthorized: false,
            face_count,
            summary: "No Face Detected".to_string(),
        };
    }

    if !identifies {
        let fail_open = config.detection_only_policy == DetectionOnlyPolicy::FailOpen;
        return TickClassification {
            authorized: fail_open,
            unauthorized: !fail_open,
            face_count,
            summary: format!("Detection Only (Faces: {face_count})"),
        };
    }

    let mut matched = false;
    let mut unauthorized = false;
    let mut summary = String::new();

    for observation in observations {
        let is_match = observation.identity == Some(authorized_user_id)
            && observation.confidence_score < config.confidence_threshold;

        let id = observation
            .identity
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        summary = format!(
            "ID:{id} Conf:{} {}",
            observation.confidence_score as i64,
            if is_match { "[MATCH]" } else { "[INTRUDER]" }
        );

        if is_match {
            matched = true;
        } else {
            unauthorized = true;
        }
    }

    TickClassification {
        authorized: matched && !unauthorized,
        unauthorized,
        face_count,
        summary,
    }
}

/// Applies one tick to `state` and decides what the controller must do.
pub fn evaluate_tick(
    state: &mut ControllerState,
    config: &SentinelConfig,
    tick: &TickClassification,
    now: Instant,
) -> TickDecision {
    state.debug_status = tick.summary.clone();

    if tick.authorized && !tick.unauthorized {
        state.mark_verified(now);
    }

    if state.is_locked() {
        return TickDecision::Held;
    }

    if tick.unauthorized {
        state.consecutive_unknown_count = state.consecutive_unknown_count.saturating_add(1);
        if state.consecutive_unknown_count > config.intruder_strike_limit {
            return open_lock(state, LockReason::IntruderDetected);
        }
        return TickDecision::Strike(state.consecutive_unknown_count);
    }

    if tick.authorized {
        state.last_face_seen_at = now;
        state.consecutive_unknown_count = 0;
        return TickDecision::Status(PresenceStatus::Verified);
    }

    // Empty frame: absence does not feed the intruder count.
    let gap = state.since_face_seen(now);
    if gap > config.absence_lock_timeout() {
        return open_lock(state, LockReason::AbsenceTimeout);
    }

    if gap > config.ghost_input_window() {
        if state.since_input(now) < config.ghost_input_recency() {
            return open_lock(state, LockReason::GhostInput);
        }
        return TickDecision::Status(PresenceStatus::IdleNoUser);
    }

    TickDecision::Status(PresenceStatus::IdleWarning)
}

fn open_lock(state: &mut ControllerState, reason: LockReason) -> TickDecision {
    if state.begin_lock() {
        TickDecision::Lock(reason)
    } else {
        TickDecision::Held
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration;

    use super::*;
    use crate::sentinel::state::GuardMode;

    const USER: UserId = 1;

    fn config() -> SentinelConfig {
        SentinelConfig {
            warmup_tick_count: 0,
            ..SentinelConfig::default()
        }
    }

    fn tick(observations: &[FaceObservation]) -> TickClassification {
        classify_observations(observations, USER, &config(), true)
    }

    fn authorized() -> TickClassification {
        tick(&[FaceObservation::identified(USER, 60.0)])
    }

    fn stranger() -> TickClassification {
        tick(&[FaceObservation::identified(99, 40.0)])
    }

    fn empty() -> TickClassification {
        tick(&[])
    }

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    #[test]
    fn confident_match_is_authorized() {
        let result = tick(&[FaceObservation::identified(USER, 100.0)]);
        assert!(result.authorized);
        assert!(!result.unauthorized);
        assert!(result.summary.ends_with("[MATCH]"));
    }

    #[test]
    fn weak_match_counts_as_stranger() {
        let result = tick(&[FaceObservation::identified(USER, 130.0)]);
        assert!(!result.authorized);
        assert!(result.unauthorized);
        assert_eq!(result.summary, "ID:1 Conf:130 [INTRUDER]");
    }

    #[test]
    fn score_at_threshold_is_not_a_match() {
        let result = tick(&[FaceObservation::identified(USER, 125.0)]);
        assert!(result.unauthorized);
    }

    #[test]
    fn stranger_next_to_user_spoils_verification() {
        let result = tick(&[
            FaceObservation::identified(USER, 50.0),
            FaceObservation::identified(2, 50.0),
        ]);
        assert!(!result.authorized);
        assert!(result.unauthorized);
        assert_eq!(result.face_count, 2);
    }

    #[test]
    fn unidentified_face_is_a_stranger() {
        let result = tick(&[FaceObservation::unidentified()]);
        assert!(result.unauthorized);
        assert!(result.summary.starts_with("ID:?"));
    }

    #[test]
    fn detection_only_follows_policy() {
        let faces = [FaceObservation::unidentified()];

        let open = classify_observations(&faces, USER, &config(), false);
        assert!(open.authorized);
        assert!(!open.unauthorized);

        let closed_config = SentinelConfig {
            detection_only_policy: DetectionOnlyPolicy::FailClosed,
            ..config()
        };
        let closed = classify_observations(&faces, USER, &closed_config, false);
        assert!(!closed.authorized);
        assert!(closed.unauthorized);

        let nobody = classify_observations(&[], USER, &closed_config, false);
        assert!(!nobody.authorized && !nobody.unauthorized);
    }

    #[test]
    fn authorized_tick_resets_strikes() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        let config = config();

        for i in 0..5 {
            evaluate_tick(&mut state, &config, &stranger(), start + secs(0.1 * i as f64));
        }
        assert_eq!(state.consecutive_unknown_count, 5);

        let now = start + secs(1.0);
        let decision = evaluate_tick(&mut state, &config, &authorized(), now);

        assert_eq!(decision, TickDecision::Status(PresenceStatus::Verified));
        assert_eq!(state.consecutive_unknown_count, 0);
        assert_eq!(state.last_verified_at, Some(now));
        assert_eq!(state.last_face_seen_at, now);
    }

    #[test]
    fn eleventh_stranger_tick_locks_once() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        let config = config();

        for i in 1..=10u32 {
            let decision =
                evaluate_tick(&mut state, &config, &stranger(), start + secs(0.1 * i as f64));
            assert_eq!(decision, TickDecision::Strike(i));
            assert_eq!(state.mode, GuardMode::Monitoring);
        }

        let decision = evaluate_tick(&mut state, &config, &stranger(), start + secs(1.1));
        assert_eq!(decision, TickDecision::Lock(LockReason::IntruderDetected));
        assert_eq!(state.mode, GuardMode::Locked);
        assert_eq!(state.absence_event_count, 1);

        let decision = evaluate_tick(&mut state, &config, &stranger(), start + secs(1.2));
        assert_eq!(decision, TickDecision::Held);
        assert_eq!(state.absence_event_count, 1);
        assert_eq!(state.consecutive_unknown_count, 11);
    }

    #[test]
    fn absence_past_timeout_locks() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);

        let decision = evaluate_tick(&mut state, &config(), &empty(), start + secs(10.1));

        assert_eq!(decision, TickDecision::Lock(LockReason::AbsenceTimeout));
        assert_eq!(state.mode, GuardMode::Locked);
    }

    #[test]
    fn absence_short_of_timeout_only_idles() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);

        let decision = evaluate_tick(&mut state, &config(), &empty(), start + secs(9.9));

        assert_eq!(decision, TickDecision::Status(PresenceStatus::IdleNoUser));
        assert_eq!(state.mode, GuardMode::Monitoring);
        assert_eq!(state.consecutive_unknown_count, 0);
    }

    #[test]
    fn recent_input_without_face_is_ghost_input() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        state.record_input(start + secs(5.5));

        let decision = evaluate_tick(&mut state, &config(), &empty(), start + secs(6.0));

        assert_eq!(decision, TickDecision::Lock(LockReason::GhostInput));
        assert_eq!(state.absence_event_count, 1);
    }

    #[test]
    fn old_input_without_face_is_not_ghost_input() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        state.record_input(start + secs(3.0));

        let decision = evaluate_tick(&mut state, &config(), &empty(), start + secs(6.0));

        assert_eq!(decision, TickDecision::Status(PresenceStatus::IdleNoUser));
        assert_eq!(decision.to_string_status(), Some("Idling — No User".to_string()));
        assert_eq!(state.mode, GuardMode::Monitoring);
    }

    #[test]
    fn input_inside_ghost_window_only_warns() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        state.record_input(start + secs(2.9));

        let decision = evaluate_tick(&mut state, &config(), &empty(), start + secs(3.0));

        assert_eq!(decision, TickDecision::Status(PresenceStatus::IdleWarning));
    }

    #[test]
    fn locked_state_still_tracks_verification() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        state.begin_lock();
        state.consecutive_unknown_count = 3;

        let now = start + secs(1.0);
        let decision = evaluate_tick(&mut state, &config(), &authorized(), now);

        assert_eq!(decision, TickDecision::Held);
        assert_eq!(state.last_verified_at, Some(now));
        assert_eq!(state.consecutive_unknown_count, 0);
        assert_eq!(state.last_face_seen_at, start);
        assert_eq!(state.mode, GuardMode::Locked);
    }

    #[test]
    fn strikes_reset_for_every_authorized_sequence() {
        let start = Instant::now();
        let mut state = ControllerState::new(USER, start);
        let config = config();
        let pattern = [true, false, false, true, false, true, true, false, false, false];

        for (i, is_stranger) in pattern.iter().enumerate() {
            let now = start + secs(0.1 * i as f64);
            let tick = if *is_stranger { stranger() } else { authorized() };
            evaluate_tick(&mut state, &config, &tick, now);
            if !is_stranger {
                assert_eq!(state.consecutive_unknown_count, 0);
            }
        }
    }

    impl TickDecision {
        fn to_string_status(&self) -> Option<String> {
            match self {
                TickDecision::Status(status) => Some(status.to_string()),
                _ => None,
            }
        }
    }
}
