use std::time::Instant;

/// Connection stages announced while a link is being established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probing,
    Handshake,
    Elevating,
}

impl Stage {
    pub fn message(&self) -> &'static str {
        match self {
            Stage::Probing => "Probing…",
            Stage::Handshake => "Handshake…",
            Stage::Elevating => "Elevating…",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    ScanReport,
    ProbeTimeout,
    Stage(Stage),
    Establish,
    Countdown,
}

/// Identifies what a timer belongs to. A task fires only while both the
/// session generation and (for link tasks) the link episode still match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub generation: u64,
    pub episode: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Timer {
    id: TimerId,
    due: Instant,
    ticket: Ticket,
    task: Task,
}

/// A fired timer: the task, its ticket, and the instant it was due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Due {
    pub at: Instant,
    pub ticket: Ticket,
    pub task: Task,
}

/// Pending timers, fired in due order (ties in scheduling order).
#[derive(Debug, Default)]
pub struct Schedule {
    timers: Vec<Timer>,
    next_id: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: Instant, ticket: Ticket, task: Task) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            due,
            ticket,
            task,
        });
        id
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Due> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= now)
            .min_by_key(|(_, t)| (t.due, t.id.0))
            .map(|(i, _)| i)?;
        let timer = self.timers.swap_remove(index);
        Some(Due {
            at: timer.due,
            ticket: timer.ticket,
            task: timer.task,
        })
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    /// Drop every timer tied to the given link episode.
    pub fn cancel_episode(&mut self, episode: u64) {
        self.timers.retain(|t| t.ticket.episode != Some(episode));
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.due).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
