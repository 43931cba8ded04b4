mod lock_events;
mod sessions;
