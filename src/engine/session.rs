use std::time::{Duration, Instant};

use super::hints::HintCursor;
use super::progress::Progress;
use super::schedule::{Stage, Ticket, TimerId};

/// Connection lifecycle. `Connected` always carries its host and deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    Idle,
    /// `stage` is `None` until the first stage has been announced.
    Connecting { host: String, stage: Option<Stage> },
    Connected { host: String, ends_at: Instant },
}

/// Mutable play-through state; one per engine.
#[derive(Debug)]
pub struct Session {
    pub link: Link,
    pub progress: Progress,
    pub hints: HintCursor,
    countdown: Option<TimerId>,
    generation: u64,
    episode: u64,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            link: Link::Idle,
            progress: Progress::default(),
            hints: HintCursor::default(),
            countdown: None,
            generation: 0,
            episode: 0,
        }
    }
}

impl Session {
    pub fn current_host(&self) -> Option<&str> {
        match &self.link {
            Link::Connected { host, .. } => Some(host),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.link, Link::Connected { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.link, Link::Idle)
    }

    pub fn session_ends_at(&self) -> Option<Instant> {
        match self.link {
            Link::Connected { ends_at, .. } => Some(ends_at),
            _ => None,
        }
    }

    pub fn time_remaining(&self, now: Instant) -> Duration {
        self.session_ends_at()
            .map(|end| end.saturating_duration_since(now))
            .unwrap_or_default()
    }

    /// Ticket for timers that live as long as the session (scan, probe timeouts).
    pub fn session_ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            episode: None,
        }
    }

    /// Ticket for timers that belong to the current link episode.
    pub fn link_ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
            episode: Some(self.episode),
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.generation == self.generation
            && ticket.episode.map_or(true, |e| e == self.episode)
    }

    pub fn begin_link(&mut self, host: &str) {
        self.episode += 1;
        self.link = Link::Connecting {
            host: host.to_string(),
            stage: None,
        };
    }

    pub fn set_countdown(&mut self, id: TimerId) {
        self.countdown = Some(id);
    }

    pub fn take_countdown(&mut self) -> Option<TimerId> {
        self.countdown.take()
    }

    /// Drop the link and retire its episode; returns the retired episode.
    pub fn end_link(&mut self) -> u64 {
        let retired = self.episode;
        self.episode += 1;
        self.countdown = None;
        self.link = Link::Idle;
        retired
    }

    /// Back to the initial state. Every outstanding ticket becomes stale.
    pub fn reset(&mut self) {
        self.end_link();
        self.generation += 1;
        self.progress.clear();
        self.hints.clear();
    }
}

/// `mm:ss`, rounded down.
pub fn fmt_clock(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
